use serde_yaml::{Mapping, Value};
use thiserror::Error;

const GLOBAL_KEY: &str = "global";

#[derive(Debug, Error)]
pub enum InjectError {
    #[error("failed to parse values: {0}")]
    Parse(#[source] serde_yaml::Error),

    #[error("values document is not a mapping")]
    NotAMapping,

    #[error("field '{path}' is not a map")]
    PathConflict { path: String },

    #[error("failed to serialize values: {0}")]
    Serialize(#[source] serde_yaml::Error),
}

/// Composition facts every chart can read from `.Values.global`.
#[derive(Clone, Debug, Default)]
pub struct CompositionValues {
    pub krateo_namespace: String,
    pub composition_name: String,
    pub composition_namespace: String,
    pub composition_id: String,
    pub composition_group: String,
    pub composition_installed_version: String,
    pub composition_resource: String,
    pub composition_kind: String,
    pub gracefully_paused: bool,
}

impl CompositionValues {
    fn api_version(&self) -> String {
        if self.composition_group.is_empty() {
            self.composition_installed_version.clone()
        } else {
            format!(
                "{}/{}",
                self.composition_group, self.composition_installed_version
            )
        }
    }
}

/// Write `opts` under the `global` key of a YAML values document.
///
/// Existing keys at the written paths are overwritten, everything else is
/// kept. `gracefullyPaused` is only written when set.
pub fn inject_values(values: &str, opts: &CompositionValues) -> Result<String, InjectError> {
    let mut document = parse(values)?;

    // TODO: decide with chart authors whether `gracefullyPaused: false` should be written too
    if opts.gracefully_paused {
        set_field(&mut document, &[GLOBAL_KEY, "gracefullyPaused"], Value::Bool(true))?;
    }

    let fields = [
        ("compositionNamespace", opts.composition_namespace.clone()),
        ("compositionName", opts.composition_name.clone()),
        ("krateoNamespace", opts.krateo_namespace.clone()),
        ("compositionId", opts.composition_id.clone()),
        // deprecated in favor of compositionGroup and compositionInstalledVersion
        ("compositionApiVersion", opts.api_version()),
        ("compositionGroup", opts.composition_group.clone()),
        (
            "compositionInstalledVersion",
            opts.composition_installed_version.clone(),
        ),
        ("compositionResource", opts.composition_resource.clone()),
        ("compositionKind", opts.composition_kind.clone()),
    ];
    for (field, value) in fields {
        set_field(&mut document, &[GLOBAL_KEY, field], Value::String(value))?;
    }

    serde_yaml::to_string(&Value::Mapping(document)).map_err(InjectError::Serialize)
}

/// Set `value` at `path` in a YAML values document, creating intermediate
/// mappings as needed.
pub fn add_or_update_field(
    values: &str,
    value: impl Into<Value>,
    path: &[&str],
) -> Result<String, InjectError> {
    let mut document = parse(values)?;
    set_field(&mut document, path, value.into())?;
    serde_yaml::to_string(&Value::Mapping(document)).map_err(InjectError::Serialize)
}

fn parse(values: &str) -> Result<Mapping, InjectError> {
    if values.trim().is_empty() {
        return Ok(Mapping::new());
    }

    match serde_yaml::from_str(values).map_err(InjectError::Parse)? {
        Value::Null => Ok(Mapping::new()),
        Value::Mapping(mapping) => Ok(mapping),
        _ => Err(InjectError::NotAMapping),
    }
}

fn set_field(document: &mut Mapping, path: &[&str], value: Value) -> Result<(), InjectError> {
    let Some((last, parents)) = path.split_last() else {
        return Ok(());
    };

    let mut current = document;
    for (depth, field) in parents.iter().enumerate() {
        let entry = current
            .entry(Value::from(*field))
            .or_insert_with(|| Value::Mapping(Mapping::new()));

        current = match entry {
            Value::Mapping(nested) => nested,
            _ => {
                return Err(InjectError::PathConflict {
                    path: path[..=depth].join("."),
                })
            }
        };
    }

    current.insert(Value::from(*last), value);
    Ok(())
}
