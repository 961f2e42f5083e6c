use crate::api::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use vigil_common::id::now_millis;
use vigil_common::types::{Agent, Visibility};

pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<Agent>>> {
    Ok(Json(state.store.list_agents(None)?))
}

/// Unauthenticated listing: only agents whose stats are public.
pub async fn list_public(State(state): State<AppState>) -> ApiResult<Json<Vec<Agent>>> {
    Ok(Json(state.store.list_agents(Some(Visibility::Public))?))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Agent>> {
    Ok(Json(state.store.get_agent(&id)?))
}

/// Operator-editable fields; identity fields stay agent-reported.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentUpdateRequest {
    pub name: Option<String>,
    pub location: Option<String>,
    pub tags: Option<Vec<String>>,
    pub visibility: Option<Visibility>,
    pub expire_time: Option<i64>,
    pub traffic_limit: Option<u64>,
    pub traffic_reset_day: Option<u32>,
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AgentUpdateRequest>,
) -> ApiResult<Json<Agent>> {
    if let Some(day) = req.traffic_reset_day {
        if day > 31 {
            return Err(ApiError::BadRequest(
                "trafficResetDay must be in [0, 31]".into(),
            ));
        }
    }

    let mut agent = state.store.get_agent(&id)?;
    if let Some(name) = req.name {
        agent.name = name;
    }
    if let Some(location) = req.location {
        agent.location = location;
    }
    if let Some(tags) = req.tags {
        agent.tags = tags;
    }
    if let Some(visibility) = req.visibility {
        agent.visibility = visibility;
    }
    if let Some(expire_time) = req.expire_time {
        agent.expire_time = expire_time;
    }
    if let Some(limit) = req.traffic_limit {
        agent.traffic_limit = limit;
    }
    if let Some(day) = req.traffic_reset_day {
        agent.traffic_reset_day = day;
    }
    agent.updated_at = now_millis();

    state.store.update_agent(&agent)?;
    Ok(Json(agent))
}
