//! The scheduled check run: search, evaluate, persist, and notify for every
//! active watch.
//!
//! Watches are processed sequentially and independently; no failure inside
//! one watch's cycle may abort the run. Only an environment fault (the
//! store cannot enumerate watches at all) is fatal.

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::email_alerts::{AlertMailer, PriceDropAlert};
use crate::flight_quotes::FlightQuote;
use crate::flight_search::SearchAdapter;
use crate::store::{UserStore, WatchStore};
use crate::tracking::{alert_baseline, evaluate, TrackingRecord};
use crate::watches::Watch;

/// One watch that could not be checked this run
#[derive(Debug, Clone)]
pub struct CheckFailure {
    pub watch_id: Uuid,
    pub route: String,
    pub error: String,
}

/// Aggregate result of one check run. A non-zero `failure_count` maps to a
/// non-zero process exit in the invoking harness.
#[derive(Debug, Default)]
pub struct RunReport {
    pub success_count: usize,
    pub failure_count: usize,
    pub errors: Vec<CheckFailure>,
}

impl RunReport {
    fn record_failure(&mut self, watch: &Watch, error: String) {
        warn!("check failed for {}: {}", watch.route(), error);
        self.failure_count += 1;
        self.errors.push(CheckFailure {
            watch_id: watch.id,
            route: watch.route(),
            error,
        });
    }
}

enum CheckOutcome {
    /// A priced quote was recorded
    Priced,
    /// The search completed but produced no usable price
    NoPrice(String),
    /// The provider call itself failed
    SearchFailed(String),
}

/// Check flight prices for all active watches.
///
/// Returns the per-run counters; errors only when the watch list itself
/// cannot be read.
pub async fn run_price_checks(
    store: &dyn WatchStore,
    users: &dyn UserStore,
    search: &dyn SearchAdapter,
    mailer: &dyn AlertMailer,
) -> Result<RunReport> {
    let watches = store
        .list_active_watches()
        .await
        .context("failed to enumerate active watches")?;

    info!("checking {} active watch(es)", watches.len());
    let mut report = RunReport::default();

    for (idx, watch) in watches.iter().enumerate() {
        info!(
            "[{}/{}] checking {} on {}",
            idx + 1,
            watches.len(),
            watch.route(),
            watch.departure_date
        );

        match check_watch(store, users, search, mailer, watch).await {
            Ok(CheckOutcome::Priced) => report.success_count += 1,
            Ok(CheckOutcome::NoPrice(error)) | Ok(CheckOutcome::SearchFailed(error)) => {
                report.record_failure(watch, error);
            }
            Err(e) => report.record_failure(watch, format!("{:#}", e)),
        }
    }

    Ok(report)
}

/// One check cycle for a single watch. Errors returned here are caught by
/// the run loop and recorded, never propagated further.
async fn check_watch(
    store: &dyn WatchStore,
    users: &dyn UserStore,
    search: &dyn SearchAdapter,
    mailer: &dyn AlertMailer,
    watch: &Watch,
) -> Result<CheckOutcome> {
    // Baselines must be captured before any write this cycle
    let old = store
        .get_tracking(watch.id)
        .await
        .context("failed to read tracking record")?
        .unwrap_or_else(TrackingRecord::new);

    let outcome = search.search(watch).await;
    if !outcome.success {
        return Ok(CheckOutcome::SearchFailed(
            outcome
                .error
                .unwrap_or_else(|| "unknown provider error".to_string()),
        ));
    }

    // "No flights found" still counts as a check attempt: the empty quote
    // updates last_checked_at without touching the price floor
    let quote = outcome.quote.unwrap_or_else(FlightQuote::default);

    let (next, should_alert) = evaluate(&old, &quote, Utc::now());
    let baseline = alert_baseline(&old);

    if let Err(e) = store.save_tracking(watch.id, &next).await {
        // The decision is derived from persisted state, so losing this
        // write is safe to recompute next cycle
        warn!(
            "failed to persist tracking update for {}: {:#}",
            watch.route(),
            e
        );
    }

    if should_alert {
        // should_alert implies a priced quote and an established baseline
        if let (Some(latest_price), Some(baseline_price)) = (quote.price, baseline) {
            send_alert(store, users, mailer, watch, &quote, latest_price, baseline_price).await;
        }
    }

    match quote.price {
        Some(price) => {
            info!("cheapest fare for {}: {:.2} {}", watch.route(), price, quote.currency);
            Ok(CheckOutcome::Priced)
        }
        None => match &quote.parse_error {
            Some(error) => Ok(CheckOutcome::NoPrice(format!(
                "search result could not be parsed: {}",
                error
            ))),
            None => Ok(CheckOutcome::NoPrice(
                "flight search completed but no price found".to_string(),
            )),
        },
    }
}

/// Compose and deliver the price-drop alert, then record the notified
/// marker. The marker moves only after a confirmed send; on failure the
/// alert stays owed and re-fires against the same baseline next cycle.
async fn send_alert(
    store: &dyn WatchStore,
    users: &dyn UserStore,
    mailer: &dyn AlertMailer,
    watch: &Watch,
    quote: &FlightQuote,
    latest_price: f64,
    baseline_price: f64,
) {
    let user = match users.get_user(watch.user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            warn!("skipping alert for {}: owner not found", watch.route());
            return;
        }
        Err(e) => {
            warn!("skipping alert for {}: user lookup failed: {:#}", watch.route(), e);
            return;
        }
    };

    if user.email.is_empty() {
        warn!("skipping alert for {}: user has no email on file", watch.route());
        return;
    }

    let alert = PriceDropAlert {
        origin: watch.origin.clone(),
        destination: watch.destination.clone(),
        departure_date: watch.departure_date,
        return_date: watch.return_date,
        latest_price,
        baseline_price,
        currency: quote.currency.clone(),
        booking_link: quote.booking_link.clone(),
    };

    info!(
        "price drop for {}: {:.2} beats baseline {:.2}, alerting {}",
        watch.route(),
        latest_price,
        baseline_price,
        user.email
    );

    match mailer
        .send(
            &user.email,
            &alert.subject(),
            &alert.to_text(),
            Some(&alert.to_html()),
        )
        .await
    {
        Ok(()) => {
            if let Err(e) = store.mark_notified(watch.id, latest_price).await {
                warn!(
                    "failed to record notified price for {}: {:#}",
                    watch.route(),
                    e
                );
            }
        }
        Err(e) => {
            warn!(
                "alert for {} not delivered, will retry on next drop: {:#}",
                watch.route(),
                e
            );
        }
    }
}
