//! Helpers for reading controller reply payloads.
//!
//! Controller replies wrap results in an `imdata` array. Errors come back as
//! `imdata[0].error.attributes.text`, often alongside a 4xx status.

use serde_json::Value;

/// Parse a reply body, returning `None` for anything that is not JSON.
pub(crate) fn parse(body: &str) -> Option<Value> {
    serde_json::from_str(body).ok()
}

/// The non-empty error text of a reply, if any.
pub(crate) fn error_text(payload: &Value) -> Option<String> {
    non_empty_str(payload.pointer("/imdata/0/error/attributes/text"))
}

/// The token inside a login or refresh reply body, if any.
pub(crate) fn login_token(payload: &Value) -> Option<String> {
    non_empty_str(payload.pointer("/imdata/0/aaaLogin/attributes/token"))
}

/// The top-level `subscriptionId`, if present and non-empty.
pub(crate) fn subscription_id(payload: &Value) -> Option<String> {
    non_empty_str(payload.get("subscriptionId"))
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
