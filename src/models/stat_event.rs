//! Storefront telemetry event payload.

use serde::{Deserialize, Serialize};

/// Event types counted in `stat_events_daily`.
pub const ALLOWED_EVENT_TYPES: [&str; 5] = ["view", "add_to_cart", "buy", "open", "share"];

/// Request body for `POST /api/stats`.
///
/// ```json
/// { "perfumeId": "p1", "type": "add_to_cart" }
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatEventRequest {
    #[serde(default)]
    pub perfume_id: String,

    #[serde(default, rename = "type")]
    pub event_type: String,
}

/// Outcome reported back to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatStatus {
    Ok,
    Ignored,
    Deduped,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatEventResponse {
    pub status: StatStatus,
}

/// Normalize an event type: trimmed, lowercased, `view` when empty.
///
/// Returns `None` for types outside [`ALLOWED_EVENT_TYPES`].
pub fn normalize_event_type(raw: &str) -> Option<String> {
    let normalized = raw.trim().to_lowercase();
    if normalized.is_empty() {
        return Some("view".to_string());
    }
    ALLOWED_EVENT_TYPES
        .contains(&normalized.as_str())
        .then_some(normalized)
}
