//! farewatch - flight price tracking and alerting engine
//!
//! This library powers the scheduled price-check job: it re-queries a
//! flight-search provider for every active watch, normalizes the response
//! into a canonical quote, updates per-watch minimum-price bookkeeping, and
//! emails the owner when a price drop beats the notification baseline.

pub mod check_run;
pub mod email_alerts;
pub mod flight_quotes;
pub mod flight_search;
pub mod store;
pub mod supabase;
pub mod tracking;
pub mod watches;

pub use check_run::{run_price_checks, CheckFailure, RunReport};
pub use flight_quotes::{extract_cheapest_quote, FlightQuote, FlightSegment};
pub use flight_search::{SearchAdapter, SearchOutcome, SerpApiClient};
pub use store::{User, UserStore, WatchStore};
pub use tracking::{evaluate, should_send_price_alert, TrackingRecord};
pub use watches::{TripType, Watch};
