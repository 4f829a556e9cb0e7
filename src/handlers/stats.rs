//! Telemetry handler.

use axum::extract::State;

use crate::{
    error::AppError,
    extract::Json,
    middleware::client_ip::ClientId,
    models::stat_event::{StatEventRequest, StatEventResponse},
    state::AppState,
};

/// Count a storefront event.
///
/// # Endpoint
///
/// `POST /api/stats` with `{ "perfumeId": "p1", "type": "view" }`
///
/// # Response
///
/// - **200 OK**: `{"status": "ok" | "ignored" | "deduped"}`
/// - **429**: too many events from this client
pub async fn log_event(
    State(state): State<AppState>,
    client: ClientId,
    Json(request): Json<StatEventRequest>,
) -> Result<Json<StatEventResponse>, AppError> {
    let status = state.stats.record(client.as_str(), request).await?;
    Ok(Json(StatEventResponse { status }))
}
