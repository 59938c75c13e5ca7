// reqwest errors and non-2xx responses -> TransportError

use noxtools_core::port::TransportError;
use reqwest::Response;
use serde_json::Value;

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_decode() {
        TransportError::Decode(err.to_string())
    } else if err.is_builder() {
        TransportError::InvalidUrl(err.to_string())
    } else {
        // Connect, timeout, request and body errors
        TransportError::Connection(err.to_string())
    }
}

/// Build a `Status` error from a failed response
///
/// `fallback` is used when the body carries no message.
pub(crate) async fn status_error(response: Response, fallback: String) -> TransportError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    TransportError::Status {
        status,
        message: error_message(&body).unwrap_or(fallback),
    }
}

/// Server message from an error body
///
/// FastAPI answers `{"detail": "..."}` (or a list of validation errors);
/// anything else is returned as the raw text.
pub(crate) fn error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => match map.get("detail") {
            Some(Value::String(detail)) if !detail.is_empty() => Some(detail.clone()),
            Some(Value::Null) | None => Some(trimmed.to_string()),
            Some(detail) => Some(detail.to_string()),
        },
        Ok(Value::String(text)) if !text.is_empty() => Some(text),
        _ => Some(trimmed.to_string()),
    }
}
