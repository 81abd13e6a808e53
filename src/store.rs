//! Persistence collaborator contracts consumed by the check run.
//!
//! Only the operations the price-tracking core needs are modeled here; the
//! web app owns the rest of the schema. Store handles are constructed
//! explicitly and passed in (no process-wide singletons) so repeated runs
//! and tests never leak state between them.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tracking::TrackingRecord;
use crate::watches::Watch;

/// The notification recipient; only what the alert path needs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
}

/// Trait for the watch/tracking record store
#[async_trait]
pub trait WatchStore: Send + Sync {
    /// Enumerate watches eligible for checking. The active-watch policy
    /// (departure date not yet passed) lives with the implementation.
    async fn list_active_watches(&self) -> Result<Vec<Watch>>;

    /// Read the tracking record for a watch, if one exists
    async fn get_tracking(&self, watch_id: Uuid) -> Result<Option<TrackingRecord>>;

    /// Persist the post-cycle tracking record. Never writes
    /// `last_notified_price`; that field moves only via `mark_notified`.
    async fn save_tracking(&self, watch_id: Uuid, record: &TrackingRecord) -> Result<()>;

    /// Record that the user was notified at `price`. Called only after a
    /// confirmed successful send; idempotent.
    async fn mark_notified(&self, watch_id: Uuid, price: f64) -> Result<()>;
}

/// Trait for resolving notification recipients
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>>;
}
