use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use farewatch::check_run::run_price_checks;
use farewatch::email_alerts::{EmailConfig, SmtpMailer};
use farewatch::flight_search::SerpApiClient;
use farewatch::supabase::{SupabaseConfig, SupabaseStore};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Check flight prices for all active watches and send price-drop alerts"
)]
struct Args {
    /// Report email sends as successful without transmitting anything
    #[arg(long)]
    dry_run: bool,

    /// Timeout for each flight search request, in seconds
    #[arg(long, default_value = "30")]
    search_timeout_secs: u64,
}

fn dry_run_from_env() -> bool {
    std::env::var("PRICE_ALERT_DRY_RUN")
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let dry_run = args.dry_run || dry_run_from_env();

    let store = match SupabaseConfig::from_env().and_then(SupabaseStore::new) {
        Ok(store) => store,
        Err(e) => {
            error!("store configuration error: {:#}", e);
            std::process::exit(2);
        }
    };

    let api_key = match std::env::var("SERPAPI_KEY") {
        Ok(key) if !key.trim().is_empty() => key.trim().to_string(),
        _ => {
            error!("SERPAPI_KEY not set");
            std::process::exit(2);
        }
    };
    let search = match SerpApiClient::new(api_key, Duration::from_secs(args.search_timeout_secs)) {
        Ok(client) => client,
        Err(e) => {
            error!("failed to create flight search client: {:#}", e);
            std::process::exit(2);
        }
    };

    let mailer = if dry_run {
        info!("dry run: price alerts will not actually be sent");
        SmtpMailer::dry_run()
    } else {
        match EmailConfig::from_env() {
            Ok(config) => SmtpMailer::new(config),
            Err(e) => {
                error!("email configuration error: {:#}", e);
                std::process::exit(2);
            }
        }
    };

    // An environment fault (the store cannot be reached at all) is fatal;
    // ordinary per-watch failures only affect the exit code below
    let report = match run_price_checks(&store, &store, &search, &mailer).await {
        Ok(report) => report,
        Err(e) => {
            error!("price check run aborted: {:#}", e);
            std::process::exit(2);
        }
    };

    info!(
        "run complete: {} succeeded, {} failed",
        report.success_count, report.failure_count
    );
    for failure in &report.errors {
        warn!("  {}: {}", failure.route, failure.error);
    }

    if report.failure_count > 0 {
        std::process::exit(1);
    }
}
