//! In-memory fakes for the store, search, and mailer collaborators.
//!
//! These let the full check cycle run without a database, a search
//! provider, or an SMTP relay.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use farewatch::email_alerts::AlertMailer;
use farewatch::flight_quotes::FlightQuote;
use farewatch::flight_search::{SearchAdapter, SearchOutcome};
use farewatch::store::{User, UserStore, WatchStore};
use farewatch::tracking::TrackingRecord;
use farewatch::watches::{TripType, Watch};

pub fn watch(origin: &str, destination: &str) -> Watch {
    Watch {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        origin: origin.to_string(),
        destination: destination.to_string(),
        departure_date: NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
        return_date: None,
        passenger_count: 1,
        trip_type: TripType::OneWay,
        preferred_airlines: Vec::new(),
        max_stops: None,
        created_at: None,
    }
}

pub fn priced_quote(price: f64) -> FlightQuote {
    FlightQuote {
        price: Some(price),
        booking_link: Some("https://book.example/x".to_string()),
        ..FlightQuote::default()
    }
}

pub fn record_with(minimum: Option<f64>, notified: Option<f64>) -> TrackingRecord {
    TrackingRecord {
        minimum_price_ever: minimum,
        last_notified_price: notified,
        ..TrackingRecord::new()
    }
}

pub struct InMemoryStore {
    pub watches: Vec<Watch>,
    pub tracking: Mutex<HashMap<Uuid, TrackingRecord>>,
    pub users: HashMap<Uuid, User>,
    pub fail_listing: bool,
}

impl InMemoryStore {
    pub fn new(watches: Vec<Watch>) -> Self {
        let users = watches
            .iter()
            .map(|w| {
                (
                    w.user_id,
                    User {
                        id: w.user_id,
                        email: format!("{}@example.com", w.user_id.simple()),
                    },
                )
            })
            .collect();
        let tracking = watches
            .iter()
            .map(|w| (w.id, TrackingRecord::new()))
            .collect();
        Self {
            watches,
            tracking: Mutex::new(tracking),
            users,
            fail_listing: false,
        }
    }

    pub fn set_tracking(&self, watch_id: Uuid, record: TrackingRecord) {
        self.tracking.lock().unwrap().insert(watch_id, record);
    }

    pub fn tracking_for(&self, watch_id: Uuid) -> TrackingRecord {
        self.tracking
            .lock()
            .unwrap()
            .get(&watch_id)
            .cloned()
            .expect("no tracking record for watch")
    }
}

#[async_trait]
impl WatchStore for InMemoryStore {
    async fn list_active_watches(&self) -> Result<Vec<Watch>> {
        if self.fail_listing {
            return Err(anyhow!("store unreachable"));
        }
        Ok(self.watches.clone())
    }

    async fn get_tracking(&self, watch_id: Uuid) -> Result<Option<TrackingRecord>> {
        Ok(self.tracking.lock().unwrap().get(&watch_id).cloned())
    }

    async fn save_tracking(&self, watch_id: Uuid, record: &TrackingRecord) -> Result<()> {
        let mut tracking = self.tracking.lock().unwrap();
        // last_notified_price only moves via mark_notified
        let notified = tracking
            .get(&watch_id)
            .and_then(|existing| existing.last_notified_price);
        let mut next = record.clone();
        next.last_notified_price = notified;
        tracking.insert(watch_id, next);
        Ok(())
    }

    async fn mark_notified(&self, watch_id: Uuid, price: f64) -> Result<()> {
        let mut tracking = self.tracking.lock().unwrap();
        let record = tracking
            .get_mut(&watch_id)
            .ok_or_else(|| anyhow!("no tracking record for watch"))?;
        record.last_notified_price = Some(price);
        Ok(())
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        Ok(self.users.get(&user_id).cloned())
    }
}

/// Search adapter scripted with a fixed outcome per watch id
pub struct ScriptedSearch {
    pub outcomes: HashMap<Uuid, SearchOutcome>,
}

impl ScriptedSearch {
    pub fn new() -> Self {
        Self {
            outcomes: HashMap::new(),
        }
    }

    pub fn with_outcome(mut self, watch_id: Uuid, outcome: SearchOutcome) -> Self {
        self.outcomes.insert(watch_id, outcome);
        self
    }
}

#[async_trait]
impl SearchAdapter for ScriptedSearch {
    async fn search(&self, watch: &Watch) -> SearchOutcome {
        self.outcomes
            .get(&watch.id)
            .cloned()
            .unwrap_or_else(|| SearchOutcome::failure("no scripted outcome".to_string()))
    }
}

/// Mailer that records what it was asked to send
pub struct RecordingMailer {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail: bool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl AlertMailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, _text: &str, _html: Option<&str>) -> Result<()> {
        if self.fail {
            return Err(anyhow!("smtp relay rejected the message"));
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string()));
        Ok(())
    }
}
