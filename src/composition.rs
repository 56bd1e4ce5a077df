use k8s_openapi::api::core::v1::Secret;
use kube::api::{ApiResource, DynamicObject};
use kube::{Api, Client, ResourceExt};
use serde::Deserialize;
use thiserror::Error;

use crate::consts::{GRACEFULLY_PAUSED_ANNOTATION_KEY, RELEASE_NAME_ANNOTATION_KEY};
use crate::error_codes::is_404_not_found_error;

#[derive(Debug, Error)]
pub enum CompositionError {
    #[error("{resource} '{namespace}/{name}' not found")]
    NotFound {
        resource: String,
        namespace: String,
        name: String,
    },

    #[error("unable to get {resource} '{namespace}/{name}'")]
    Get {
        resource: String,
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("unable to read the spec of composition definition '{name}'")]
    InvalidDefinition {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unable to convert the spec of composition '{name}' to values")]
    InvalidValues {
        name: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("chart credentials secret '{namespace}/{name}' not found")]
    MissingSecret { namespace: String, name: String },

    #[error("key '{key}' not found in secret '{namespace}/{name}'")]
    MissingSecretKey {
        namespace: String,
        name: String,
        key: String,
    },
}

/// Group, version and plural of a resource type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupVersionResource {
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl GroupVersionResource {
    pub fn new(group: &str, version: &str, resource: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            resource: resource.to_string(),
        }
    }

    pub fn group_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    fn api_resource(&self) -> ApiResource {
        ApiResource {
            group: self.group.clone(),
            version: self.version.clone(),
            api_version: self.group_version(),
            kind: String::new(),
            plural: self.resource.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionDefinitionSpec {
    pub chart: Option<ChartInfo>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartInfo {
    pub url: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub repo: String,
    #[serde(default, rename = "insecureSkipVerifyTLS")]
    pub insecure_skip_verify_tls: bool,
    pub credentials: Option<Credentials>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub username: String,
    pub password_ref: SecretKeySelector,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SecretKeySelector {
    pub name: String,
    pub namespace: String,
    pub key: String,
}

pub async fn fetch_object(
    client: &Client,
    gvr: &GroupVersionResource,
    namespace: &str,
    name: &str,
) -> Result<DynamicObject, CompositionError> {
    let api: Api<DynamicObject> =
        Api::namespaced_with(client.clone(), namespace, &gvr.api_resource());

    api.get(name).await.map_err(|source| {
        if is_404_not_found_error(&source) {
            CompositionError::NotFound {
                resource: gvr.resource.clone(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            }
        } else {
            CompositionError::Get {
                resource: gvr.resource.clone(),
                namespace: namespace.to_string(),
                name: name.to_string(),
                source,
            }
        }
    })
}

pub async fn fetch_composition_definition(
    client: &Client,
    gvr: &GroupVersionResource,
    namespace: &str,
    name: &str,
) -> Result<CompositionDefinitionSpec, CompositionError> {
    let object = fetch_object(client, gvr, namespace, name).await?;
    let Some(spec) = object.data.get("spec") else {
        return Ok(CompositionDefinitionSpec::default());
    };

    CompositionDefinitionSpec::deserialize(spec).map_err(|source| {
        CompositionError::InvalidDefinition {
            name: name.to_string(),
            source,
        }
    })
}

/// The composition's `.spec` as a YAML values document.
pub fn values_from_spec(composition: &DynamicObject) -> Result<String, CompositionError> {
    match composition.data.get("spec") {
        Some(spec) if !spec.is_null() => {
            serde_yaml::to_string(spec).map_err(|source| CompositionError::InvalidValues {
                name: composition.name_any(),
                source,
            })
        }
        _ => Ok(String::new()),
    }
}

pub fn release_name(composition: &DynamicObject) -> String {
    match composition.annotations().get(RELEASE_NAME_ANNOTATION_KEY) {
        Some(release_name) if !release_name.is_empty() => release_name.clone(),
        _ => composition.name_any(),
    }
}

pub fn is_gracefully_paused(composition: &DynamicObject) -> bool {
    composition
        .annotations()
        .get(GRACEFULLY_PAUSED_ANNOTATION_KEY)
        .is_some_and(|value| value == "true")
}

pub async fn read_secret_key(
    client: &Client,
    selector: &SecretKeySelector,
) -> Result<String, CompositionError> {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), &selector.namespace);
    let secret = secrets.get(&selector.name).await.map_err(|source| {
        if is_404_not_found_error(&source) {
            CompositionError::MissingSecret {
                namespace: selector.namespace.clone(),
                name: selector.name.clone(),
            }
        } else {
            CompositionError::Get {
                resource: String::from("secrets"),
                namespace: selector.namespace.clone(),
                name: selector.name.clone(),
                source,
            }
        }
    })?;

    secret
        .data
        .as_ref()
        .and_then(|data| data.get(&selector.key))
        .map(|value| String::from_utf8_lossy(&value.0).into_owned())
        .ok_or_else(|| CompositionError::MissingSecretKey {
            namespace: selector.namespace.clone(),
            name: selector.name.clone(),
            key: selector.key.clone(),
        })
}
