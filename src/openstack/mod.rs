/// OpenStack identity and compute clients
pub mod compute;
pub mod identity;

pub use compute::ComputeClient;
pub use identity::{KeystoneAuth, StaticToken, TokenProvider};

use reqwest::StatusCode;
use serde_json::Value;

/// Extract the human readable message from an OpenStack error body
///
/// Services wrap it differently (`{"error": {...}}`, `{"itemNotFound": {...}}`),
/// so the first nested `message` wins. Falls back to the raw body.
pub(crate) fn error_message(status: StatusCode, body: &str) -> String {
    let message = serde_json::from_str::<Value>(body).ok().and_then(|value| {
        value
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| {
                value.as_object().and_then(|object| {
                    object
                        .values()
                        .find_map(|v| v.get("message").and_then(Value::as_str))
                        .map(str::to_string)
                })
            })
    });

    match message {
        Some(message) => message,
        None if body.trim().is_empty() => format!("request failed with status {}", status),
        None => format!("request failed with status {}: {}", status, body.trim()),
    }
}
