use serde::Serialize;

const CORE_ROOT: &str = "api";
const GROUP_ROOT: &str = "apis";
const NAMESPACES: &str = "namespaces";
const LEGACY_WATCH_PREFIX: &str = "watch";

/// An object addressed by a single API request.
///
/// `group` is empty for the core API group, `namespace` is empty for
/// cluster-scoped objects.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct ResourceReference {
    pub group: String,
    pub version: String,
    pub resource: String,
    pub name: String,
    pub namespace: String,
}

/// Decode the URL path of an API request into the object it addresses.
///
/// Only requests that name a single object are recognized:
///
/// ```text
/// /api/{version}/{resource}/{name}
/// /api/{version}/namespaces/{namespace}/{resource}/{name}
/// /apis/{group}/{version}/{resource}/{name}
/// /apis/{group}/{version}/namespaces/{namespace}/{resource}/{name}
/// ```
///
/// Collections, discovery, watches and anything else yield `None`.
pub fn decode_path(path: &str) -> Option<ResourceReference> {
    let segments: Vec<&str> = path.split('/').collect();

    let reference = match segments.as_slice() {
        ["", CORE_ROOT, version, resource, name] => ResourceReference {
            group: String::new(),
            version: version.to_string(),
            resource: resource.to_string(),
            name: name.to_string(),
            namespace: String::new(),
        },
        ["", CORE_ROOT, version, NAMESPACES, namespace, resource, name] if !namespace.is_empty() => {
            ResourceReference {
                group: String::new(),
                version: version.to_string(),
                resource: resource.to_string(),
                name: name.to_string(),
                namespace: namespace.to_string(),
            }
        }
        ["", GROUP_ROOT, group, version, resource, name] if !group.is_empty() => {
            ResourceReference {
                group: group.to_string(),
                version: version.to_string(),
                resource: resource.to_string(),
                name: name.to_string(),
                namespace: String::new(),
            }
        }
        ["", CORE_ROOT | GROUP_ROOT, group, version, NAMESPACES, namespace, resource, name]
            if !group.is_empty() && !namespace.is_empty() =>
        {
            ResourceReference {
                group: group.to_string(),
                version: version.to_string(),
                resource: resource.to_string(),
                name: name.to_string(),
                namespace: namespace.to_string(),
            }
        }
        _ => return None,
    };

    if reference.version.is_empty()
        || reference.resource.is_empty()
        || reference.name.is_empty()
        || reference.resource == LEGACY_WATCH_PREFIX
    {
        return None;
    }

    Some(reference)
}
