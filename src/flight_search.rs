//! Flight-search provider adapter.
//!
//! The concrete implementation talks to the SerpApi Google Flights engine.
//! Provider failures never panic or propagate: every search resolves to a
//! `SearchOutcome`, and retry policy (if any) lives with the invoking
//! harness, not here.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

use crate::flight_quotes::{extract_cheapest_quote, FlightQuote};
use crate::watches::Watch;

const SERPAPI_BASE_URL: &str = "https://serpapi.com";

// Provider trip type codes; return_date is required for round trips
const SERPAPI_TRIP_TYPE_ROUND_TRIP: &str = "1";
const SERPAPI_TRIP_TYPE_ONE_WAY: &str = "2";

/// Airline display names (the internal vocabulary watches are stored with)
/// mapped to the IATA codes the provider expects
static AIRLINE_NAME_TO_IATA: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("Delta", "DL"),
        ("United", "UA"),
        ("American", "AA"),
        ("Southwest", "WN"),
        ("JetBlue", "B6"),
        ("Alaska", "AS"),
        ("Hawaiian", "HA"),
        ("Frontier", "F9"),
        ("Spirit", "NK"),
        ("Allegiant", "G4"),
        ("Lufthansa", "LH"),
        ("British Airways", "BA"),
        ("Air France", "AF"),
        ("KLM", "KL"),
        ("Emirates", "EK"),
        ("Qatar Airways", "QR"),
        ("Etihad", "EY"),
        ("Turkish Airlines", "TK"),
        ("Singapore Airlines", "SQ"),
        ("Cathay Pacific", "CX"),
        ("Japan Airlines", "JL"),
        ("ANA", "NH"),
        ("Korean Air", "KE"),
        ("Qantas", "QF"),
        ("Air Canada", "AC"),
        ("Aeromexico", "AM"),
        ("LATAM", "LA"),
        ("Virgin Atlantic", "VS"),
        ("Iberia", "IB"),
        ("Swiss", "LX"),
        ("Austrian", "OS"),
        ("Scandinavian", "SK"),
    ])
});

/// Alliance keywords the provider accepts alongside IATA codes
const ALLIANCE_CODES: [&str; 3] = ["STAR_ALLIANCE", "SKYTEAM", "ONEWORLD"];

/// IATA code: two uppercase letters, or one uppercase letter + one digit
static VALID_AIRLINE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{2}$|^[A-Z][0-9]$").unwrap());

/// Result of one provider search. `success=false` carries a human-readable
/// error; `success=true` with a `None` quote means "no flights found".
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub success: bool,
    pub quote: Option<FlightQuote>,
    pub error: Option<String>,
}

impl SearchOutcome {
    pub fn completed(quote: Option<FlightQuote>) -> Self {
        Self {
            success: true,
            quote,
            error: None,
        }
    }

    pub fn failure(error: String) -> Self {
        Self {
            success: false,
            quote: None,
            error: Some(error),
        }
    }
}

/// Trait for flight-search providers
///
/// Implementors run one search for a watch's route and dates and normalize
/// the response into a `SearchOutcome`. Implementations must carry their own
/// request timeout so no search blocks a check run indefinitely.
#[async_trait]
pub trait SearchAdapter: Send + Sync {
    async fn search(&self, watch: &Watch) -> SearchOutcome;
}

/// Convert airline names to valid provider `include_airlines` codes.
///
/// Unknown names pass through (the user may have entered a raw code), get
/// upper-cased, and are validated; values that still don't look like an IATA
/// code or alliance keyword are returned separately so the caller can log
/// them; one bad name never fails the whole search. Valid codes are
/// dedup'd preserving order.
pub fn convert_airline_names_to_codes(names: &[String]) -> (Vec<String>, Vec<String>) {
    let mut codes: Vec<String> = Vec::new();
    let mut invalid: Vec<String> = Vec::new();

    for name in names {
        let raw = AIRLINE_NAME_TO_IATA
            .get(name.as_str())
            .copied()
            .unwrap_or(name.as_str());
        let code = raw.trim().to_uppercase();
        if code.is_empty() {
            continue;
        }

        if ALLIANCE_CODES.contains(&code.as_str()) || VALID_AIRLINE_CODE.is_match(&code) {
            if !codes.contains(&code) {
                codes.push(code);
            }
        } else {
            invalid.push(code);
        }
    }

    (codes, invalid)
}

/// SerpApi Google Flights client
pub struct SerpApiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SerpApiClient {
    /// Create a client with a caller-specified per-request timeout
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: SERPAPI_BASE_URL.to_string(),
            api_key,
        })
    }

    /// Create a client against a custom endpoint (used in tests)
    pub fn with_base_url(api_key: String, timeout: Duration, base_url: String) -> Result<Self> {
        let mut client = Self::new(api_key, timeout)?;
        client.base_url = base_url;
        Ok(client)
    }

    fn build_params(&self, watch: &Watch) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("engine", "google_flights".to_string()),
            ("api_key", self.api_key.clone()),
            ("departure_id", watch.origin.clone()),
            ("arrival_id", watch.destination.clone()),
            ("outbound_date", watch.departure_date.format("%Y-%m-%d").to_string()),
            ("adults", watch.passenger_count.to_string()),
        ];

        // Absence of a return date always means one-way, regardless of the
        // watch's declared trip type
        match watch.return_date {
            Some(return_date) => {
                params.push(("type", SERPAPI_TRIP_TYPE_ROUND_TRIP.to_string()));
                params.push(("return_date", return_date.format("%Y-%m-%d").to_string()));
            }
            None => params.push(("type", SERPAPI_TRIP_TYPE_ONE_WAY.to_string())),
        }

        if !watch.preferred_airlines.is_empty() {
            let (codes, invalid) = convert_airline_names_to_codes(&watch.preferred_airlines);
            if !codes.is_empty() {
                params.push(("include_airlines", codes.join(",")));
            }
            if !invalid.is_empty() {
                warn!(
                    "skipping airline values with no valid provider code: {:?}",
                    invalid
                );
            }
        }

        if let Some(max_stops) = watch.max_stops {
            params.push(("stops", max_stops.to_string()));
        }

        params
    }
}

#[async_trait]
impl SearchAdapter for SerpApiClient {
    async fn search(&self, watch: &Watch) -> SearchOutcome {
        let url = format!("{}/search", self.base_url);
        let params = self.build_params(watch);

        debug!("searching flights for {}", watch.route());

        let response = match self.client.get(&url).query(&params).send().await {
            Ok(response) => response,
            Err(e) => {
                return SearchOutcome::failure(format!("flight search request failed: {}", e));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return SearchOutcome::failure(http_error_message(status, &body));
        }

        let data: Value = match response.json().await {
            Ok(data) => data,
            Err(e) => {
                return SearchOutcome::failure(format!(
                    "failed to decode flight search response: {}",
                    e
                ));
            }
        };

        SearchOutcome::completed(extract_cheapest_quote(&data))
    }
}

/// Mine the error body for a provider-supplied message, falling back to a
/// truncated body snippet
fn http_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(detail) = serde_json::from_str::<Value>(body) {
        let message = detail
            .get("error")
            .or_else(|| detail.get("message"))
            .and_then(Value::as_str);
        if let Some(message) = message {
            return format!("flight search provider returned {}: {}", status, message);
        }
    }

    let snippet: String = body.chars().take(200).collect();
    if snippet.is_empty() {
        format!("flight search provider returned {}", status)
    } else {
        format!("flight search provider returned {}: {}", status, snippet)
    }
}
