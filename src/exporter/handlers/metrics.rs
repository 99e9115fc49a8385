use crate::collectors::{Endpoint, encode};
use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::{debug, error};

pub async fn metrics(Extension(endpoint): Extension<Arc<Endpoint>>) -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    headers.insert(
        "content-type",
        HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
    );

    match endpoint.gather().await.and_then(|families| encode(&families)) {
        Ok(metrics) => {
            debug!(endpoint = %endpoint.name(), "Successfully collected metrics");
            (StatusCode::OK, headers, metrics)
        }
        Err(e) => {
            error!(endpoint = %endpoint.name(), "Failed to collect metrics: {e:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                headers,
                format!("Error collecting metrics: {e}"),
            )
        }
    }
}
