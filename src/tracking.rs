//! Per-watch price bookkeeping and the alert decision.
//!
//! `evaluate` is a pure function over values passed in; all I/O (search,
//! persistence, email) lives with the caller. The alert decision always
//! compares against the state *before* this cycle's update, otherwise a new
//! minimum would compare against itself and never trigger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::flight_quotes::{FlightQuote, DEFAULT_CURRENCY};

/// Mutable per-watch state: best-known and most-recent price observations.
///
/// Created alongside its watch with all price fields null, updated only by
/// the check run. `minimum_price_ever` is monotonically non-increasing once
/// set; `last_notified_price` moves only after a confirmed email send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingRecord {
    pub latest_price: Option<f64>,
    pub latest_currency: String,
    pub latest_airlines: Vec<String>,
    pub latest_quote_details: Option<Value>,
    pub latest_link: Option<String>,
    pub minimum_price_ever: Option<f64>,
    pub last_notified_price: Option<f64>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl Default for TrackingRecord {
    fn default() -> Self {
        Self {
            latest_price: None,
            latest_currency: DEFAULT_CURRENCY.to_string(),
            latest_airlines: Vec::new(),
            latest_quote_details: None,
            latest_link: None,
            minimum_price_ever: None,
            last_notified_price: None,
            last_checked_at: None,
        }
    }
}

impl TrackingRecord {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Apply one check cycle's quote to the tracking record.
///
/// Returns the updated record and whether a price-drop alert should be
/// sent. The returned record never has `last_notified_price` changed; the
/// caller sets it via the store only after the email actually went out, so
/// the "notified" marker reflects reality even when delivery fails.
pub fn evaluate(
    previous: &TrackingRecord,
    quote: &FlightQuote,
    now: DateTime<Utc>,
) -> (TrackingRecord, bool) {
    // A failed or empty search must never erase a known floor
    let minimum_price_ever = match (quote.price, previous.minimum_price_ever) {
        (None, floor) => floor,
        (Some(price), None) => Some(price),
        (Some(price), Some(floor)) => Some(floor.min(price)),
    };

    // Decided against the pre-update floor and marker
    let should_alert = should_send_price_alert(
        quote.price,
        previous.minimum_price_ever,
        previous.last_notified_price,
    );

    let next = TrackingRecord {
        // The "latest" fields always reflect the most recent check; a null
        // latest price means "last check found nothing"
        latest_price: quote.price,
        latest_currency: quote.currency.clone(),
        latest_airlines: quote.airlines.clone(),
        latest_quote_details: serde_json::to_value(quote).ok(),
        latest_link: quote.booking_link.clone(),
        minimum_price_ever,
        last_notified_price: previous.last_notified_price,
        last_checked_at: Some(now),
    };

    (next, should_alert)
}

/// Decide whether a newly observed price warrants an alert.
///
/// The baseline is the last price the user was told about, falling back to
/// the historical minimum when no alert has ever been sent. Once a user has
/// heard about price X, the next alert must beat X, not merely an older
/// minimum they were never told about. The very first priced observation
/// sets the floor silently: there is nothing to call a "drop" yet.
pub fn should_send_price_alert(
    latest_price: Option<f64>,
    old_minimum_price: Option<f64>,
    old_last_notified_price: Option<f64>,
) -> bool {
    let latest = match latest_price {
        Some(latest) => latest,
        None => return false,
    };
    let baseline = match old_last_notified_price.or(old_minimum_price) {
        Some(baseline) => baseline,
        None => return false,
    };
    latest < baseline
}

/// The price a new quote must beat to be alert-worthy, from the pre-update
/// record. Used when composing the alert email.
pub fn alert_baseline(previous: &TrackingRecord) -> Option<f64> {
    previous.last_notified_price.or(previous.minimum_price_ever)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn priced_quote(price: f64) -> FlightQuote {
        FlightQuote {
            price: Some(price),
            ..FlightQuote::default()
        }
    }

    fn record_with(minimum: Option<f64>, notified: Option<f64>) -> TrackingRecord {
        TrackingRecord {
            minimum_price_ever: minimum,
            last_notified_price: notified,
            ..TrackingRecord::new()
        }
    }

    #[test]
    fn test_minimum_is_monotonic_floor() {
        // Whatever the order of observations, the floor ends at the minimum
        for prices in [
            vec![300.0, 280.0, 350.0, 290.0],
            vec![290.0, 350.0, 280.0, 300.0],
            vec![280.0, 290.0, 300.0, 350.0],
        ] {
            let mut record = TrackingRecord::new();
            for price in &prices {
                let (next, _) = evaluate(&record, &priced_quote(*price), Utc::now());
                record = next;
            }
            assert_eq!(record.minimum_price_ever, Some(280.0));
        }
    }

    #[test]
    fn test_null_price_keeps_floor() {
        let previous = record_with(Some(300.0), None);
        let empty = FlightQuote::default();

        let (next, should_alert) = evaluate(&previous, &empty, Utc::now());
        assert_eq!(next.minimum_price_ever, Some(300.0));
        assert_eq!(next.latest_price, None);
        assert!(!should_alert);
        assert!(next.last_checked_at.is_some());
    }

    #[test]
    fn test_first_priced_observation_is_silent() {
        let previous = record_with(None, None);

        let (next, should_alert) = evaluate(&previous, &priced_quote(250.0), Utc::now());
        assert!(!should_alert);
        assert_eq!(next.minimum_price_ever, Some(250.0));
        assert_eq!(next.latest_price, Some(250.0));
    }

    #[test]
    fn test_strict_drop_rule() {
        // Equal price is not a drop
        assert!(!should_send_price_alert(Some(300.0), Some(300.0), None));
        assert!(should_send_price_alert(Some(299.99), Some(300.0), None));
        assert!(!should_send_price_alert(Some(300.01), Some(300.0), None));
    }

    #[test]
    fn test_notified_price_is_preferred_baseline() {
        // User already heard about 250; beating the old minimum of 300 is
        // not news
        assert!(!should_send_price_alert(Some(280.0), Some(300.0), Some(250.0)));
        assert!(should_send_price_alert(Some(240.0), Some(300.0), Some(250.0)));
    }

    #[test]
    fn test_drop_below_minimum_alerts_and_lowers_floor() {
        let previous = record_with(Some(300.0), Some(300.0));

        let (next, should_alert) = evaluate(&previous, &priced_quote(280.0), Utc::now());
        assert!(should_alert);
        assert_eq!(next.minimum_price_ever, Some(280.0));
        // The marker only moves after a confirmed send
        assert_eq!(next.last_notified_price, Some(300.0));
    }

    #[test]
    fn test_higher_price_never_alerts_or_raises_floor() {
        let previous = record_with(Some(300.0), None);

        let (next, should_alert) = evaluate(&previous, &priced_quote(310.0), Utc::now());
        assert!(!should_alert);
        assert_eq!(next.minimum_price_ever, Some(300.0));
        assert_eq!(next.latest_price, Some(310.0));
    }

    #[test]
    fn test_latest_fields_reflect_quote() {
        let previous = record_with(Some(500.0), None);
        let quote = FlightQuote {
            price: Some(420.0),
            currency: "EUR".to_string(),
            airlines: vec!["KLM".to_string()],
            booking_link: Some("https://book.example/x".to_string()),
            ..FlightQuote::default()
        };

        let (next, _) = evaluate(&previous, &quote, Utc::now());
        assert_eq!(next.latest_currency, "EUR");
        assert_eq!(next.latest_airlines, vec!["KLM"]);
        assert_eq!(next.latest_link.as_deref(), Some("https://book.example/x"));
        assert!(next.latest_quote_details.is_some());
    }

    #[test]
    fn test_alert_baseline_prefers_notified() {
        assert_eq!(alert_baseline(&record_with(Some(300.0), Some(250.0))), Some(250.0));
        assert_eq!(alert_baseline(&record_with(Some(300.0), None)), Some(300.0));
        assert_eq!(alert_baseline(&record_with(None, None)), None);
    }
}
