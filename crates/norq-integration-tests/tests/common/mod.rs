//! Common test utilities for norq-api integration tests
//!
//! This module provides:
//! - An application state over a fresh in-memory store
//! - A small client that drives the router with `oneshot`

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use bytes::Bytes;
use norq_api::{create_router, AppState, ServiceConfig};
use norq_core::{ModelRegistry, QueueDefinition, QueueEngine};
use norq_store::StoreFactory;
use serde_json::{json, Value};
use tower::ServiceExt;

/// Queues served by every test application
///
/// `work` requires a string `description` and a numeric `quantity`.
pub fn test_registry() -> ModelRegistry {
    ModelRegistry::new(vec![
        QueueDefinition::new("q"),
        QueueDefinition::new("other"),
        QueueDefinition::new("work").with_schema(json!({
            "type": "object",
            "properties": {
                "description": {"type": "string"},
                "quantity": {"type": "number"}
            },
            "required": ["description", "quantity"]
        })),
    ])
    .expect("test registry is valid")
}

pub fn create_test_app_state() -> AppState {
    let engine = QueueEngine::new(test_registry(), StoreFactory::create_test_store());
    AppState::new(ServiceConfig::default(), engine)
}

/// Response captured by [`TestClient`]
#[allow(dead_code)]
pub struct TestResponse {
    pub status: StatusCode,
    pub bytes: Bytes,
}

#[allow(dead_code)]
impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.bytes).expect("response body is JSON")
    }
}

/// Drives a router built over one shared application state
#[derive(Clone)]
pub struct TestClient {
    state: AppState,
}

#[allow(dead_code)]
impl TestClient {
    pub fn new() -> Self {
        Self {
            state: create_test_app_state(),
        }
    }

    pub fn engine(&self) -> &QueueEngine {
        &self.state.engine
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        content_type: Option<&str>,
        body: &str,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        let request = builder
            .body(Body::from(body.to_string()))
            .expect("request is valid");

        let response = create_router(self.state.clone())
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body is readable");

        TestResponse { status, bytes }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(Method::GET, uri, None, "").await
    }

    pub async fn delete(&self, uri: &str) -> TestResponse {
        self.send(Method::DELETE, uri, None, "").await
    }

    pub async fn post_json(&self, uri: &str, body: &Value) -> TestResponse {
        self.send(
            Method::POST,
            uri,
            Some("application/json"),
            &body.to_string(),
        )
        .await
    }

    pub async fn put_json(&self, uri: &str, body: &Value) -> TestResponse {
        self.send(
            Method::PUT,
            uri,
            Some("application/json"),
            &body.to_string(),
        )
        .await
    }

    /// Push documents with the given ids, in order
    pub async fn seed(&self, queue: &str, ids: &[&str]) {
        for id in ids {
            let response = self
                .post_json(&format!("/{queue}"), &json!({ "_id": id }))
                .await;
            assert_eq!(response.status, StatusCode::CREATED);
        }
    }
}

/// The `_id` of every document in a JSON array body
#[allow(dead_code)]
pub fn ids_of(body: &Value) -> Vec<String> {
    body.as_array()
        .expect("body is an array")
        .iter()
        .map(|document| document["_id"].as_str().unwrap_or_default().to_string())
        .collect()
}
