use crate::api::storage::ApiStorage;
use axum::http::StatusCode;
use serde::Serialize;
use serde_json::Value;

/// Largest event page served in one response.
pub const MAX_EVENT_PAGE: usize = 1000;
pub const DEFAULT_EVENT_PAGE: usize = 100;

#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ApiHttpResponse {
    pub status: u16,
    pub body: String,
    pub content_type: &'static str,
}

impl ApiHttpResponse {
    pub fn json<T: Serialize>(status: StatusCode, payload: &T) -> Self {
        match serde_json::to_string(payload) {
            Ok(body) => Self {
                status: status.as_u16(),
                body,
                content_type: "application/json",
            },
            Err(err) => Self::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to serialize response: {err}"),
            ),
        }
    }

    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        let error = ErrorResponse {
            error: message.into(),
        };
        let body = serde_json::to_string(&error)
            .unwrap_or_else(|_| "{\"error\":\"Internal server error\"}".to_string());
        Self {
            status: status.as_u16(),
            body,
            content_type: "application/json",
        }
    }
}

pub fn get_key_value(key: &str, storage: &ApiStorage) -> ApiHttpResponse {
    match storage.read_raw(key) {
        Ok(Some(stored)) => {
            let parsed_value = match serde_json::from_str::<Value>(&stored) {
                Ok(json) => json,
                Err(_) => Value::String(stored),
            };
            let payload = serde_json::json!({
                "key": key,
                "value": parsed_value,
            });
            ApiHttpResponse::json(StatusCode::OK, &payload)
        }
        Ok(None) => ApiHttpResponse::error(StatusCode::NOT_FOUND, format!("Key '{key}' not found")),
        Err(err) => ApiHttpResponse::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to read key '{key}': {err}"),
        ),
    }
}

pub fn get_state(storage: &ApiStorage) -> ApiHttpResponse {
    match storage.read_state() {
        Ok(Some(state)) => ApiHttpResponse::json(StatusCode::OK, &state),
        Ok(None) => ApiHttpResponse::error(
            StatusCode::NOT_FOUND,
            format!("No crawler state for chain '{}'", storage.chain()),
        ),
        Err(err) => ApiHttpResponse::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to read crawler state: {err}"),
        ),
    }
}

pub fn get_block(number: u64, storage: &ApiStorage) -> ApiHttpResponse {
    match storage.read_block(number) {
        Ok(Some((index, block))) => {
            let payload = serde_json::json!({
                "number": number,
                "index": index,
                "block": block,
            });
            ApiHttpResponse::json(StatusCode::OK, &payload)
        }
        Ok(None) => ApiHttpResponse::error(
            StatusCode::NOT_FOUND,
            format!("Block {number} not indexed"),
        ),
        Err(err) => ApiHttpResponse::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to read block {number}: {err}"),
        ),
    }
}

/// Page of the event log starting at sequence `from`. `limit` is capped at [`MAX_EVENT_PAGE`].
pub fn get_events(from: u64, limit: Option<usize>, storage: &ApiStorage) -> ApiHttpResponse {
    let limit = limit.unwrap_or(DEFAULT_EVENT_PAGE).clamp(1, MAX_EVENT_PAGE);
    match storage.read_events(from, limit) {
        Ok(events) => {
            let next = events.last().map(|e| e.seq + 1);
            let payload = serde_json::json!({
                "from": from,
                "next": next,
                "events": events,
            });
            ApiHttpResponse::json(StatusCode::OK, &payload)
        }
        Err(err) => ApiHttpResponse::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to read events: {err}"),
        ),
    }
}
