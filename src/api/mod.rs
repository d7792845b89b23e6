pub mod handlers;
pub mod storage;

use axum::http::StatusCode;
use handlers::{ApiHttpResponse, get_block, get_key_value, get_state};
use serde::Deserialize;
use storage::ApiStorage;

/// Query parameters of `GET /events`, decoded by axum's `Query` extractor.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
pub struct EventsParams {
    #[serde(default)]
    pub from: u64,
    pub limit: Option<usize>,
}

/// Path-routed lookups served by the fallback handler.
pub fn handle_request(path: &str, storage: &ApiStorage) -> ApiHttpResponse {
    if let Some(key) = path.strip_prefix("/kv/") {
        if key.is_empty() {
            return ApiHttpResponse::error(StatusCode::BAD_REQUEST, "Key cannot be empty");
        }
        return get_key_value(key, storage);
    }

    if let Some(number) = path.strip_prefix("/blocks/") {
        return match number.parse::<u64>() {
            Ok(number) => get_block(number, storage),
            Err(_) => ApiHttpResponse::error(
                StatusCode::BAD_REQUEST,
                format!("Invalid block number: {number}"),
            ),
        };
    }

    match path {
        "/state" => get_state(storage),
        _ => ApiHttpResponse::error(StatusCode::NOT_FOUND, "Unknown endpoint"),
    }
}
