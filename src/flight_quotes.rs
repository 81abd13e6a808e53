//! Normalization of flight-search provider responses.
//!
//! The provider's response schema varies: the candidate flight list may live
//! under any of several top-level keys, prices may be objects or bare
//! numbers, and individual legs are frequently incomplete. Everything here
//! is best-effort: a leg that fails to parse is dropped, a candidate that
//! fails to parse yields an error-tagged empty quote, and "no flights found"
//! is a normal outcome, not an error.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

pub const DEFAULT_CURRENCY: &str = "USD";

/// Response keys that may hold the candidate flight list, in priority order.
/// `best_flights` is already ranked by the provider, so its first element is
/// taken as-is; the other lists are unranked and searched for the cheapest
/// entry.
const CANDIDATE_SOURCE_KEYS: [&str; 3] = ["best_flights", "other_flights", "flights"];

/// One leg of an itinerary, parsed best-effort from the provider payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlightSegment {
    pub departure_airport: String,
    pub departure_time: String,
    pub arrival_airport: String,
    pub arrival_time: String,
    pub airline: String,
    pub flight_number: String,
    /// Leg duration in minutes, when the provider supplies one
    pub duration: Option<i64>,
}

/// Normalized single best-candidate result of one search.
///
/// `price` is nullable because a search can legitimately find nothing.
/// `parse_error` is set only when the selected candidate could not be parsed
/// at all; callers can use it to tell "parse failure" from "no data".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightQuote {
    pub price: Option<f64>,
    pub currency: String,
    pub airlines: Vec<String>,
    pub outbound_segments: Vec<FlightSegment>,
    pub return_segments: Vec<FlightSegment>,
    /// Total itinerary duration in minutes
    pub total_duration: Option<i64>,
    pub stop_count: u32,
    pub booking_link: Option<String>,
    pub parse_error: Option<String>,
}

impl Default for FlightQuote {
    fn default() -> Self {
        Self {
            price: None,
            currency: DEFAULT_CURRENCY.to_string(),
            airlines: Vec::new(),
            outbound_segments: Vec::new(),
            return_segments: Vec::new(),
            total_duration: None,
            stop_count: 0,
            booking_link: None,
            parse_error: None,
        }
    }
}

impl FlightQuote {
    /// Empty quote tagged with the reason the candidate could not be parsed
    pub fn with_parse_error(error: String) -> Self {
        Self {
            parse_error: Some(error),
            ..Self::default()
        }
    }
}

/// Extract the cheapest flight from a raw provider response.
///
/// Returns `None` when no known source key holds any flights, or when the
/// selected list contains no entry with a usable price. A candidate that is
/// found but cannot be parsed still returns `Some` with `parse_error` set,
/// so the caller can count it for telemetry.
pub fn extract_cheapest_quote(data: &Value) -> Option<FlightQuote> {
    let fallback_link = response_level_link(data);

    for key in CANDIDATE_SOURCE_KEYS {
        let list = match data.get(key).and_then(Value::as_array) {
            Some(list) if !list.is_empty() => list,
            _ => continue,
        };

        let candidate = if key == "best_flights" {
            &list[0]
        } else {
            match cheapest_by_price(list) {
                Some(candidate) => candidate,
                None => {
                    debug!("no entry under '{}' has a usable price", key);
                    return None;
                }
            }
        };

        let mut quote = parse_candidate(candidate);
        if quote.booking_link.is_none() {
            quote.booking_link = fallback_link.map(str::to_string);
        }
        return Some(quote);
    }

    debug!("no flights found in search response");
    None
}

/// Select the entry with the lowest total price. Entries whose price is
/// missing or unparseable are never selected; if that leaves nothing, the
/// list has no usable price and `None` is returned.
fn cheapest_by_price(list: &[Value]) -> Option<&Value> {
    let mut best: Option<(&Value, f64)> = None;
    for entry in list {
        let price = match candidate_price(entry) {
            Some(price) => price,
            None => continue,
        };
        match best {
            Some((_, lowest)) if lowest <= price => {}
            _ => best = Some((entry, price)),
        }
    }
    best.map(|(entry, _)| entry)
}

/// Parse one candidate into a normalized quote. Never fails: a malformed
/// candidate yields an error-tagged empty quote instead.
pub fn parse_candidate(candidate: &Value) -> FlightQuote {
    match try_parse_candidate(candidate) {
        Ok(quote) => quote,
        Err(e) => {
            warn!("failed to parse flight candidate: {}", e);
            FlightQuote::with_parse_error(e.to_string())
        }
    }
}

fn try_parse_candidate(candidate: &Value) -> Result<FlightQuote> {
    let (price, currency) = parse_price(candidate)?;

    let outbound_segments = candidate
        .get("flights")
        .map(parse_segments)
        .unwrap_or_default();
    let return_segments = candidate
        .get("return_flights")
        .map(parse_segments)
        .unwrap_or_default();

    // Dedup by first occurrence, outbound legs first
    let mut airlines: Vec<String> = Vec::new();
    for segment in outbound_segments.iter().chain(return_segments.iter()) {
        if !segment.airline.is_empty() && !airlines.contains(&segment.airline) {
            airlines.push(segment.airline.clone());
        }
    }

    let total_duration = match candidate.get("duration") {
        Some(Value::Object(duration)) => duration.get("total").and_then(Value::as_i64),
        Some(duration) => duration.as_i64(),
        None => None,
    };

    let stop_count = candidate
        .get("stops")
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;

    let booking_link = candidate
        .get("link")
        .and_then(Value::as_str)
        .filter(|link| !link.is_empty())
        .map(str::to_string);

    Ok(FlightQuote {
        price,
        currency,
        airlines,
        outbound_segments,
        return_segments,
        total_duration,
        stop_count,
        booking_link,
        parse_error: None,
    })
}

/// Price must coerce to a positive float; everything else is null. The
/// currency comes from the price object when there is one, otherwise a bare
/// numeric price defaults to USD.
fn parse_price(candidate: &Value) -> Result<(Option<f64>, String)> {
    match candidate.get("price") {
        Some(Value::Object(price_info)) => {
            let price = price_info.get("total").and_then(coerce_price);
            let currency = price_info
                .get("currency")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_CURRENCY)
                .to_string();
            Ok((price, currency))
        }
        Some(value @ (Value::Number(_) | Value::String(_))) => {
            Ok((coerce_price(value), DEFAULT_CURRENCY.to_string()))
        }
        None | Some(Value::Null) => Ok((None, DEFAULT_CURRENCY.to_string())),
        Some(other) => bail!("malformed price field: {}", other),
    }
}

fn candidate_price(entry: &Value) -> Option<f64> {
    match entry.get("price") {
        Some(Value::Object(price_info)) => price_info.get("total").and_then(coerce_price),
        Some(value) => coerce_price(value),
        None => None,
    }
}

fn coerce_price(value: &Value) -> Option<f64> {
    let price = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    price.filter(|p| p.is_finite() && *p > 0.0)
}

/// Parse each leg independently; a leg that fails to parse is dropped
fn parse_segments(legs: &Value) -> Vec<FlightSegment> {
    let legs = match legs.as_array() {
        Some(legs) => legs,
        None => return Vec::new(),
    };
    legs.iter().filter_map(parse_segment).collect()
}

fn parse_segment(leg: &Value) -> Option<FlightSegment> {
    if !leg.is_object() {
        debug!("dropping non-object flight leg");
        return None;
    }

    let departure_airport = airport_field(leg, "departure_airport", "id");
    let arrival_airport = airport_field(leg, "arrival_airport", "id");
    if departure_airport.is_empty() && arrival_airport.is_empty() {
        debug!("dropping flight leg with no airports");
        return None;
    }

    Some(FlightSegment {
        departure_airport,
        departure_time: airport_field(leg, "departure_airport", "time"),
        arrival_airport,
        arrival_time: airport_field(leg, "arrival_airport", "time"),
        airline: string_field(leg, "airline"),
        flight_number: string_field(leg, "flight_number"),
        duration: leg.get("duration").and_then(Value::as_i64),
    })
}

fn airport_field(leg: &Value, airport: &str, field: &str) -> String {
    leg.get(airport)
        .and_then(|a| a.get(field))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn string_field(leg: &Value, field: &str) -> String {
    leg.get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Shareable search URL from the response metadata, used as a booking-link
/// fallback when the candidate has no link of its own
fn response_level_link(data: &Value) -> Option<&str> {
    let meta = data.get("search_metadata")?.as_object()?;
    meta.get("google_flights_url")
        .or_else(|| meta.get("serpapi_url"))
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
}
