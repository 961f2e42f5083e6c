use crate::api;
use crate::session;
use crate::state::AppState;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use vigil_common::id::now_millis;

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "uptimeMs": now_millis() - state.start_time,
        "onlineAgents": state.registry.session_count(),
    }))
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/agent/ws", get(session::agent_ws_handler))
        .route("/api/agents", get(api::agents::list))
        .route(
            "/api/agents/:id",
            get(api::agents::get).put(api::agents::update),
        )
        .route(
            "/api/monitors",
            get(api::monitors::list).post(api::monitors::create),
        )
        .route(
            "/api/monitors/:id",
            get(api::monitors::get)
                .put(api::monitors::update)
                .delete(api::monitors::delete),
        )
        .route("/api/monitors/:id/stats", get(api::monitors::stats))
        .route(
            "/api/alert-configs",
            get(api::alerts::list_configs).post(api::alerts::create_config),
        )
        .route(
            "/api/alert-configs/:id",
            axum::routing::put(api::alerts::update_config).delete(api::alerts::delete_config),
        )
        .route("/api/alert-records", get(api::alerts::list_records))
        .route("/api/public/agents", get(api::agents::list_public))
        .route("/api/public/monitors", get(api::monitors::list_public))
        .with_state(state)
        .layer(cors)
}
