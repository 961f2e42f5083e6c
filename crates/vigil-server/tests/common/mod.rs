#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;
use vigil_common::types::Agent;
use vigil_server::app;
use vigil_server::config::ServerConfig;
use vigil_server::state::AppState;
use vigil_storage::sqlite::SqliteStore;
use vigil_storage::Store;

pub struct TestContext {
    pub temp_dir: TempDir,
    pub state: AppState,
    pub app: axum::Router,
}

pub fn build_test_context() -> TestContext {
    let temp_dir = tempfile::tempdir().expect("create temp dir");
    let store: Arc<dyn Store> =
        Arc::new(SqliteStore::open(temp_dir.path()).expect("open store"));
    let state = AppState::build(Arc::new(ServerConfig::default()), store);
    let app = app::build_router(state.clone());
    TestContext {
        temp_dir,
        state,
        app,
    }
}

impl TestContext {
    pub fn seed_agent(&self, id: &str, name: &str) -> Agent {
        let agent = Agent {
            id: id.to_string(),
            name: name.to_string(),
            os: "linux".into(),
            arch: "x86_64".into(),
            ..Agent::default()
        };
        self.state
            .store
            .register_agent(&agent)
            .expect("seed agent");
        agent
    }

    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let request = match body {
            Some(json) => Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .expect("build request"),
            None => Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .expect("build request"),
        };

        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("send request");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("parse body as JSON")
        };
        (status, json)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, uri: &str) -> T {
        let (status, json) = self.request("GET", uri, None).await;
        assert_eq!(status, StatusCode::OK, "GET {uri} failed: {json}");
        serde_json::from_value(json).expect("decode response")
    }
}
