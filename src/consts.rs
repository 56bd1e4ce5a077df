pub const RELEASE_NAME_ANNOTATION_KEY: &str = "krateo.io/release-name";
pub const GRACEFULLY_PAUSED_ANNOTATION_KEY: &str = "krateo.io/gracefully-paused";

pub const DEFAULT_COMPOSITION_GROUP: &str = "composition.krateo.io";
pub const DEFAULT_COMPOSITION_DEFINITION_GROUP: &str = "core.krateo.io";
pub const DEFAULT_COMPOSITION_DEFINITION_VERSION: &str = "v1alpha1";
pub const DEFAULT_COMPOSITION_DEFINITION_RESOURCE: &str = "compositiondefinitions";
