use crate::api::pagination::PaginationParams;
use crate::api::{ApiResult, Paged};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use vigil_common::id::{new_id, now_millis};
use vigil_common::types::{AlertConfig, AlertRecord, AlertRules, GLOBAL_AGENT_ID};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertConfigRequest {
    /// Defaults to the fleet-wide `"global"` scope.
    pub agent_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub rules: AlertRules,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigListQuery {
    pub agent_id: Option<String>,
}

pub async fn list_configs(
    State(state): State<AppState>,
    Query(query): Query<ConfigListQuery>,
) -> ApiResult<Json<Vec<AlertConfig>>> {
    Ok(Json(
        state.store.list_alert_configs(query.agent_id.as_deref())?,
    ))
}

pub async fn create_config(
    State(state): State<AppState>,
    Json(req): Json<AlertConfigRequest>,
) -> ApiResult<(StatusCode, Json<AlertConfig>)> {
    let now = now_millis();
    let config = AlertConfig {
        id: new_id(),
        agent_id: req
            .agent_id
            .unwrap_or_else(|| GLOBAL_AGENT_ID.to_string()),
        name: req.name,
        enabled: req.enabled,
        rules: req.rules,
        created_at: now,
        updated_at: now,
    };
    state.alerts.create_config(&config)?;
    Ok((StatusCode::CREATED, Json(config)))
}

pub async fn update_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AlertConfigRequest>,
) -> ApiResult<Json<AlertConfig>> {
    let mut config = state.store.get_alert_config(&id)?;
    if let Some(agent_id) = req.agent_id {
        config.agent_id = agent_id;
    }
    config.name = req.name;
    config.enabled = req.enabled;
    config.rules = req.rules;
    config.updated_at = now_millis();

    state.alerts.update_config(&config)?;
    Ok(Json(config))
}

pub async fn delete_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.alerts.delete_config(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordListQuery {
    pub agent_id: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

pub async fn list_records(
    State(state): State<AppState>,
    Query(query): Query<RecordListQuery>,
) -> ApiResult<Json<Paged<AlertRecord>>> {
    let page = PaginationParams {
        limit: query.limit,
        offset: query.offset,
    };
    let agent_id = query.agent_id.as_deref();
    let items = state
        .store
        .list_alert_records(agent_id, page.limit(), page.offset())?;
    let total = state.store.count_alert_records(agent_id)?;
    Ok(Json(Paged { items, total }))
}
