//! Liveness listener: `GET {path}` answers 200 `OK`

use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};

pub const DEFAULT_HEALTH_PATH: &str = "/healthz";

/// Router serving only the health path
pub fn health_router(path: &str) -> Router {
    let path = if path.is_empty() {
        DEFAULT_HEALTH_PATH.to_string()
    } else if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    Router::new().route(&path, any(health_check))
}

async fn health_check(method: Method) -> Response {
    if method != Method::GET {
        return StatusCode::OK.into_response();
    }
    let mut response = (StatusCode::OK, "OK").into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain;charset=UTF-8"),
    );
    response
}
