use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Trip type for a price watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripType {
    OneWay,
    RoundTrip,
}

/// A user's saved route/date/passenger query, re-checked on every scheduled run.
///
/// Watches are created and edited by their owner through the web app; the
/// price checker only ever reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Watch {
    pub id: Uuid,
    pub user_id: Uuid,
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub passenger_count: u32,
    pub trip_type: TripType,
    #[serde(default)]
    pub preferred_airlines: Vec<String>,
    /// None means any number of stops is acceptable
    pub max_stops: Option<u32>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Watch {
    /// Human-readable route, used in logs, run reports, and alert emails
    pub fn route(&self) -> String {
        format!("{} -> {}", self.origin, self.destination)
    }
}
