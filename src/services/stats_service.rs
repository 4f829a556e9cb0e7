//! Storefront telemetry: per-perfume daily event counters.

use std::sync::Arc;

use chrono::Utc;

use crate::error::AppError;
use crate::models::stat_event::{StatEventRequest, StatStatus, normalize_event_type};
use crate::services::rate_limiter::{EventDeduper, RateLimitPolicy};
use crate::store::CatalogStore;

#[derive(Clone)]
pub struct StatsRecorder {
    catalog: Arc<dyn CatalogStore>,
    limit: RateLimitPolicy,
    deduper: Arc<EventDeduper>,
}

impl StatsRecorder {
    pub fn new(catalog: Arc<dyn CatalogStore>, limit: RateLimitPolicy) -> Self {
        Self {
            catalog,
            limit,
            deduper: Arc::new(EventDeduper::new()),
        }
    }

    /// Count one event from `client_id`.
    ///
    /// Empty perfume ids and unknown event types are `Ignored`; a repeat of the
    /// same `(client, perfume, type)` within the dedup window is `Deduped`.
    ///
    /// # Errors
    ///
    /// - `RateLimited`: client exceeded the telemetry budget
    /// - `Store`: counter upsert failed
    pub async fn record(
        &self,
        client_id: &str,
        request: StatEventRequest,
    ) -> Result<StatStatus, AppError> {
        self.limit.check(client_id)?;

        let perfume_id = request.perfume_id.trim();
        if perfume_id.is_empty() {
            return Ok(StatStatus::Ignored);
        }
        let Some(event_type) = normalize_event_type(&request.event_type) else {
            return Ok(StatStatus::Ignored);
        };

        if self
            .deduper
            .is_duplicate(&format!("{client_id}|{perfume_id}|{event_type}"))
        {
            return Ok(StatStatus::Deduped);
        }

        self.catalog
            .record_stat_event(Utc::now().date_naive(), perfume_id, &event_type)
            .await?;

        Ok(StatStatus::Ok)
    }
}
