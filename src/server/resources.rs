use axum::extract::{Query, State};
use axum::Json;
use kube::ResourceExt;
use serde::Deserialize;
use tracing::{debug, info, span, Level};

use crate::composition::{
    fetch_composition_definition, fetch_object, is_gracefully_paused, read_secret_key,
    release_name, values_from_spec, GroupVersionResource,
};
use crate::consts::{
    DEFAULT_COMPOSITION_DEFINITION_GROUP, DEFAULT_COMPOSITION_DEFINITION_RESOURCE,
    DEFAULT_COMPOSITION_DEFINITION_VERSION, DEFAULT_COMPOSITION_GROUP,
};
use crate::instrumented;
use crate::render::ChartSpec;
use crate::server::error::ApiError;
use crate::server::AppState;
use crate::tracer::{ResourceReference, ResourceTrace};
use crate::values::{inject_values, CompositionValues};

/// Raw query of `GET /resources`. Empty values count as absent.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResourcesQuery {
    composition_name: Option<String>,
    composition_namespace: Option<String>,
    composition_version: Option<String>,
    composition_resource: Option<String>,
    composition_group: Option<String>,
    composition_definition_name: Option<String>,
    composition_definition_namespace: Option<String>,
    composition_definition_group: Option<String>,
    composition_definition_version: Option<String>,
    composition_definition_resource: Option<String>,
}

#[derive(Debug, PartialEq)]
struct ResourcesRequest {
    composition_name: String,
    composition_namespace: String,
    composition_version: String,
    composition_group: String,
    /// Resolved through discovery when absent.
    composition_resource: Option<String>,
    definition_name: String,
    definition_namespace: String,
    definition: GroupVersionResource,
}

impl ResourcesQuery {
    fn into_request(self) -> Result<ResourcesRequest, ApiError> {
        let mut missing = Vec::new();
        let mut required = |value: Option<String>, name: &'static str| {
            let value = non_empty(value);
            if value.is_none() {
                missing.push(name);
            }
            value.unwrap_or_default()
        };

        let composition_name = required(self.composition_name, "compositionName");
        let composition_namespace = required(self.composition_namespace, "compositionNamespace");
        let definition_name = required(self.composition_definition_name, "compositionDefinitionName");
        let definition_namespace = required(
            self.composition_definition_namespace,
            "compositionDefinitionNamespace",
        );
        let composition_version = required(self.composition_version, "compositionVersion");

        if !missing.is_empty() {
            return Err(ApiError::MissingParameters(missing));
        }

        Ok(ResourcesRequest {
            composition_name,
            composition_namespace,
            composition_version,
            composition_group: or_default(self.composition_group, DEFAULT_COMPOSITION_GROUP),
            composition_resource: non_empty(self.composition_resource),
            definition_name,
            definition_namespace,
            definition: GroupVersionResource::new(
                &or_default(
                    self.composition_definition_group,
                    DEFAULT_COMPOSITION_DEFINITION_GROUP,
                ),
                &or_default(
                    self.composition_definition_version,
                    DEFAULT_COMPOSITION_DEFINITION_VERSION,
                ),
                &or_default(
                    self.composition_definition_resource,
                    DEFAULT_COMPOSITION_DEFINITION_RESOURCE,
                ),
            ),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

fn or_default(value: Option<String>, default: &str) -> String {
    non_empty(value).unwrap_or_else(|| default.to_string())
}

pub(crate) async fn resources_handler(
    State(state): State<AppState>,
    Query(query): Query<ResourcesQuery>,
) -> Result<Json<Vec<ResourceReference>>, ApiError> {
    let request = query.into_request()?;
    let composition = format!(
        "{}/{}",
        request.composition_namespace, request.composition_name
    );
    let request_id: u32 = rand::random();

    let resources = instrumented!(
        span!(Level::ERROR, "resources", %composition, request_id),
        inspect(&state, &request)
    )
    .await?;

    Ok(Json(resources))
}

/// Render the composition's chart and collect every object it would touch.
async fn inspect(
    state: &AppState,
    request: &ResourcesRequest,
) -> Result<Vec<ResourceReference>, ApiError> {
    let client = &state.api_resolver.client;

    let composition_resource = match &request.composition_resource {
        Some(resource) => resource.clone(),
        None => {
            let group_version = format!(
                "{}/{}",
                request.composition_group, request.composition_version
            );
            let resource = state.discovery.first_resource(&group_version).await?;
            let Some(resource) = resource else {
                return Err(ApiError::UnknownResource { group_version });
            };
            debug!(%resource, "resolved composition resource");
            resource
        }
    };

    let composition_gvr = GroupVersionResource::new(
        &request.composition_group,
        &request.composition_version,
        &composition_resource,
    );
    let composition = fetch_object(
        client,
        &composition_gvr,
        &request.composition_namespace,
        &request.composition_name,
    )
    .await?;

    let definition = fetch_composition_definition(
        client,
        &request.definition,
        &request.definition_namespace,
        &request.definition_name,
    )
    .await?;
    let Some(chart) = definition.chart else {
        return Err(ApiError::NoChart {
            namespace: request.definition_namespace.clone(),
            name: request.definition_name.clone(),
        });
    };

    let values = values_from_spec(&composition)?;
    let values = inject_values(
        &values,
        &CompositionValues {
            krateo_namespace: state.krateo_namespace.clone(),
            composition_name: request.composition_name.clone(),
            composition_namespace: request.composition_namespace.clone(),
            composition_id: composition.uid().unwrap_or_default(),
            composition_group: request.composition_group.clone(),
            composition_installed_version: request.composition_version.clone(),
            composition_resource,
            composition_kind: composition
                .types
                .as_ref()
                .map(|types| types.kind.clone())
                .unwrap_or_default(),
            gracefully_paused: is_gracefully_paused(&composition),
        },
    )?;

    let (username, password) = match &chart.credentials {
        Some(credentials) => {
            let password = read_secret_key(client, &credentials.password_ref).await?;
            (Some(credentials.username.clone()), Some(password))
        }
        None => (None, None),
    };

    let chart = ChartSpec {
        release_name: release_name(&composition),
        namespace: request.composition_namespace.clone(),
        chart_name: chart.url,
        version: chart.version,
        repo: chart.repo,
        values_yaml: values,
        insecure_skip_tls_verify: chart.insecure_skip_verify_tls,
        username,
        password,
    };

    let trace = ResourceTrace::new();
    let traced_client = state.api_resolver.traced_client(&trace)?;
    state.renderer.render(traced_client, &chart).await?;

    let resources = trace.resources();
    info!(count = resources.len(), "inspected composition resources");
    Ok(resources)
}
