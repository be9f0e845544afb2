//! JSON responses that can be wrapped as JSONP when the caller passes a
//! `callback` (or `jsonp`) query parameter.

use std::sync::OnceLock;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use regex::Regex;
use serde::Serialize;
use serde_json::json;

const JAVASCRIPT: &str = "application/javascript; charset=utf-8";

fn callback_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_$][\w$.]*$").unwrap_or_else(|e| panic!("invalid callback regex: {e}")))
}

pub fn is_valid_callback(name: &str) -> bool {
    callback_pattern().is_match(name)
}

/// Serializes `body` as JSON, or as `callback(json);` when a callback is
/// given. An unusable callback name is a 400.
pub fn respond<T: Serialize>(status: StatusCode, body: &T, callback: Option<&str>) -> Response {
    let payload = match serde_json::to_string(body) {
        Ok(p) => p,
        Err(e) => {
            log::error!("Failed to serialize response: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(json!({ "error": "serialization failed" })))
                .into_response();
        }
    };

    match callback {
        None => (status, [(header::CONTENT_TYPE, "application/json")], payload).into_response(),
        Some(name) if is_valid_callback(name) => {
            (status, [(header::CONTENT_TYPE, JAVASCRIPT)], format!("{}({});", name, payload)).into_response()
        }
        Some(_) => (StatusCode::BAD_REQUEST, axum::Json(json!({ "error": "invalid callback name" }))).into_response(),
    }
}
