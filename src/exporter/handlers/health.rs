use crate::exporter::{EndpointNames, GIT_COMMIT_HASH};
use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    endpoints: Vec<String>,
}

// Create health struct from the build info and configured endpoints
fn create_health_response(endpoints: &EndpointNames) -> Health {
    Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints: endpoints.0.iter().map(|e| format!("/{e}")).collect(),
    }
}

// Create response body based on method
fn create_response_body(method: Method, health: &Health) -> Body {
    if method == Method::GET {
        Json(health).into_response().into_body()
    } else {
        Body::empty()
    }
}

// Create X-App header
fn create_app_headers(health: &Health) -> HeaderMap {
    let short_hash = if health.commit.len() > 7 {
        health.commit.get(..7).unwrap_or_default()
    } else {
        ""
    };

    let header_value = format!("{}:{}:{}", health.name, health.version, short_hash);

    match header_value.parse::<HeaderValue>() {
        Ok(x_app_header_value) => {
            debug!("X-App header: {x_app_header_value:?}");
            let mut headers = HeaderMap::new();
            headers.insert("X-App", x_app_header_value);
            headers
        }
        Err(err) => {
            debug!("Failed to parse X-App header: {err}");
            HeaderMap::new()
        }
    }
}

// Main axum handler for health
pub async fn health(method: Method, endpoints: Extension<EndpointNames>) -> impl IntoResponse {
    let health = create_health_response(&endpoints.0);
    let body = create_response_body(method, &health);
    let headers = create_app_headers(&health);

    debug!(endpoints = health.endpoints.len(), "health check");

    (StatusCode::OK, headers, body)
}
