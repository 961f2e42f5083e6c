use crate::api::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use vigil_common::id::{new_id, now_millis};
use vigil_common::types::{
    HttpProbeConfig, MonitorKind, MonitorStats, MonitorTask, TcpProbeConfig, Visibility,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorTaskRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MonitorKind,
    pub target: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub enabled: bool,
    /// Probe cadence in seconds; ≤ 0 falls back to 60.
    #[serde(default)]
    pub interval_secs: i64,
    #[serde(default)]
    pub agent_ids: Vec<String>,
    #[serde(default)]
    pub http: Option<HttpProbeConfig>,
    #[serde(default)]
    pub tcp: Option<TcpProbeConfig>,
    #[serde(default)]
    pub visibility: Visibility,
}

impl MonitorTaskRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::BadRequest("name is required".into()));
        }
        if self.target.trim().is_empty() {
            return Err(ApiError::BadRequest("target is required".into()));
        }
        Ok(())
    }

    fn interval(&self) -> i64 {
        if self.interval_secs <= 0 {
            60
        } else {
            self.interval_secs
        }
    }
}

pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<MonitorTask>>> {
    Ok(Json(state.store.list_monitors(None)?))
}

pub async fn list_public(State(state): State<AppState>) -> ApiResult<Json<Vec<MonitorTask>>> {
    Ok(Json(state.store.list_monitors(Some(Visibility::Public))?))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<MonitorTask>> {
    Ok(Json(state.store.get_monitor(&id)?))
}

pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<MonitorTaskRequest>,
) -> ApiResult<(StatusCode, Json<MonitorTask>)> {
    req.validate()?;
    let now = now_millis();
    let task = MonitorTask {
        id: new_id(),
        name: req.name.trim().to_string(),
        kind: req.kind,
        target: req.target.trim().to_string(),
        description: req.description.clone(),
        enabled: req.enabled,
        interval_secs: req.interval(),
        agent_ids: req.agent_ids.clone(),
        http: req.http.clone(),
        tcp: req.tcp.clone(),
        visibility: req.visibility,
        created_at: now,
        updated_at: now,
    };
    state.store.create_monitor(&task)?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<MonitorTaskRequest>,
) -> ApiResult<Json<MonitorTask>> {
    req.validate()?;
    let mut task = state.store.get_monitor(&id)?;
    task.name = req.name.trim().to_string();
    task.kind = req.kind;
    task.target = req.target.trim().to_string();
    task.interval_secs = req.interval();
    task.description = req.description;
    task.enabled = req.enabled;
    task.agent_ids = req.agent_ids;
    task.http = req.http;
    task.tcp = req.tcp;
    task.visibility = req.visibility;
    task.updated_at = now_millis();

    state.store.update_monitor(&task)?;
    Ok(Json(task))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.delete_monitor(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Rolling statistics for one monitor, across its agents.
pub async fn stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<MonitorStats>>> {
    let task = state.store.get_monitor(&id)?;
    Ok(Json(state.store.list_monitor_stats(&task.name)?))
}
