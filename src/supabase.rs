//! Supabase (PostgREST) implementation of the store traits.
//!
//! The web app owns the `search_requests`, `price_tracking`, and `users`
//! tables; this client only reads watches/users and updates tracking rows
//! by primary key, so no cross-watch locking is needed.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::store::{User, UserStore, WatchStore};
use crate::tracking::TrackingRecord;
use crate::watches::{TripType, Watch};

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_key: String,
}

impl SupabaseConfig {
    /// Load Supabase connection settings from environment variables
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("SUPABASE_URL")
            .map_err(|_| anyhow!("SUPABASE_URL not set"))?;
        let service_key = std::env::var("SUPABASE_SERVICE_KEY")
            .or_else(|_| std::env::var("SUPABASE_KEY"))
            .map_err(|_| anyhow!("SUPABASE_SERVICE_KEY or SUPABASE_KEY not set"))?;

        // Keys pasted into .env files routinely pick up stray whitespace
        Ok(Self {
            url: url.trim().trim_end_matches('/').to_string(),
            service_key: service_key.trim().to_string(),
        })
    }
}

/// Watch row as stored by the web app
#[derive(Debug, Deserialize)]
struct WatchRow {
    id: Uuid,
    user_id: Uuid,
    depart_from: String,
    arrive_at: String,
    departure_date: NaiveDate,
    return_date: Option<NaiveDate>,
    #[serde(default = "default_passengers")]
    passengers: u32,
    trip_type: TripType,
    #[serde(default)]
    preferred_airlines: Option<Vec<String>>,
    #[serde(default)]
    stops: Option<u32>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

fn default_passengers() -> u32 {
    1
}

impl From<WatchRow> for Watch {
    fn from(row: WatchRow) -> Self {
        Watch {
            id: row.id,
            user_id: row.user_id,
            origin: row.depart_from,
            destination: row.arrive_at,
            departure_date: row.departure_date,
            return_date: row.return_date,
            passenger_count: row.passengers.max(1),
            trip_type: row.trip_type,
            preferred_airlines: row.preferred_airlines.unwrap_or_default(),
            max_stops: row.stops,
            created_at: row.created_at,
        }
    }
}

/// Tracking row column names predate this checker, hence the mapping
#[derive(Debug, Deserialize)]
struct TrackingRow {
    #[serde(default)]
    latest_price: Option<f64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    airlines: Option<Vec<String>>,
    #[serde(default)]
    flight_details: Option<Value>,
    #[serde(default)]
    flight_link: Option<String>,
    #[serde(default)]
    minimum_price: Option<f64>,
    #[serde(default)]
    last_notified_price: Option<f64>,
    #[serde(default)]
    last_checked: Option<DateTime<Utc>>,
}

impl From<TrackingRow> for TrackingRecord {
    fn from(row: TrackingRow) -> Self {
        TrackingRecord {
            latest_price: row.latest_price,
            latest_currency: row.currency.unwrap_or_else(|| "USD".to_string()),
            latest_airlines: row.airlines.unwrap_or_default(),
            latest_quote_details: row.flight_details,
            latest_link: row.flight_link,
            minimum_price_ever: row.minimum_price,
            last_notified_price: row.last_notified_price,
            last_checked_at: row.last_checked,
        }
    }
}

#[derive(Debug, Serialize)]
struct TrackingUpdate<'a> {
    latest_price: Option<f64>,
    currency: &'a str,
    airlines: &'a [String],
    flight_details: Option<&'a Value>,
    flight_link: Option<&'a str>,
    minimum_price: Option<f64>,
    last_checked: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct UserRow {
    id: Uuid,
    email: String,
}

/// Explicitly constructed store handle over the Supabase REST API.
/// Opened once per run and passed to the check loop.
pub struct SupabaseStore {
    client: reqwest::Client,
    base_url: String,
}

impl SupabaseStore {
    pub fn new(config: SupabaseConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut api_key = HeaderValue::from_str(&config.service_key)
            .context("Supabase key contains invalid header characters")?;
        api_key.set_sensitive(true);
        headers.insert("apikey", api_key);
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", config.service_key))
            .context("Supabase key contains invalid header characters")?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .build()
            .context("failed to create Supabase HTTP client")?;

        Ok(Self {
            client,
            base_url: config.url,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    async fn fetch_rows<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let response = self
            .client
            .get(self.table_url(table))
            .query(query)
            .send()
            .await
            .with_context(|| format!("request to Supabase table '{}' failed", table))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Supabase returned {} for table '{}': {}",
                status,
                table,
                body.chars().take(200).collect::<String>()
            ));
        }

        response
            .json()
            .await
            .with_context(|| format!("failed to decode Supabase rows from '{}'", table))
    }

    async fn patch_row(&self, table: &str, id_filter: (&str, String), body: Value) -> Result<()> {
        let response = self
            .client
            .patch(self.table_url(table))
            .query(&[id_filter])
            .json(&body)
            .send()
            .await
            .with_context(|| format!("update of Supabase table '{}' failed", table))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Supabase rejected update to '{}': {} {}",
                table,
                status,
                text.chars().take(200).collect::<String>()
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl WatchStore for SupabaseStore {
    async fn list_active_watches(&self) -> Result<Vec<Watch>> {
        // Active means the departure date has not yet passed
        let today = Utc::now().date_naive();
        let rows: Vec<WatchRow> = self
            .fetch_rows(
                "search_requests",
                &[
                    ("select", "*".to_string()),
                    ("departure_date", format!("gte.{}", today)),
                    ("order", "created_at.desc".to_string()),
                ],
            )
            .await
            .context("failed to enumerate active watches")?;

        Ok(rows.into_iter().map(Watch::from).collect())
    }

    async fn get_tracking(&self, watch_id: Uuid) -> Result<Option<TrackingRecord>> {
        let rows: Vec<TrackingRow> = self
            .fetch_rows(
                "price_tracking",
                &[
                    ("select", "*".to_string()),
                    ("search_request_id", format!("eq.{}", watch_id)),
                ],
            )
            .await?;

        Ok(rows.into_iter().next().map(TrackingRecord::from))
    }

    async fn save_tracking(&self, watch_id: Uuid, record: &TrackingRecord) -> Result<()> {
        let update = TrackingUpdate {
            latest_price: record.latest_price,
            currency: &record.latest_currency,
            airlines: &record.latest_airlines,
            flight_details: record.latest_quote_details.as_ref(),
            flight_link: record.latest_link.as_deref(),
            minimum_price: record.minimum_price_ever,
            last_checked: record.last_checked_at,
        };

        self.patch_row(
            "price_tracking",
            ("search_request_id", format!("eq.{}", watch_id)),
            serde_json::to_value(update)?,
        )
        .await
    }

    async fn mark_notified(&self, watch_id: Uuid, price: f64) -> Result<()> {
        self.patch_row(
            "price_tracking",
            ("search_request_id", format!("eq.{}", watch_id)),
            serde_json::json!({ "last_notified_price": price }),
        )
        .await
    }
}

#[async_trait]
impl UserStore for SupabaseStore {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let rows: Vec<UserRow> = self
            .fetch_rows(
                "users",
                &[
                    ("select", "id,email".to_string()),
                    ("id", format!("eq.{}", user_id)),
                ],
            )
            .await?;

        Ok(rows
            .into_iter()
            .next()
            .map(|row| User {
                id: row.id,
                email: row.email,
            }))
    }
}
