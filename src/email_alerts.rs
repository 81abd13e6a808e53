//! Price-drop alert composition and SMTP delivery.
//!
//! Delivery is a collaborator boundary: the check run only needs "did the
//! message go out". Dry-run mode reports success without transmitting so
//! the notified-marker bookkeeping can be exercised without sending real
//! mail.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use lettre::message::header::ContentType;
use lettre::message::MultiPart;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_address: String,
}

impl EmailConfig {
    /// Load SMTP configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(EmailConfig {
            smtp_server: std::env::var("SMTP_SERVER")
                .unwrap_or_else(|_| "smtp.gmail.com".to_string()),
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(587),
            smtp_username: std::env::var("SMTP_USERNAME")
                .map_err(|_| anyhow!("SMTP_USERNAME not set"))?,
            smtp_password: std::env::var("SMTP_PASSWORD")
                .map_err(|_| anyhow!("SMTP_PASSWORD not set"))?,
            from_address: std::env::var("FROM_EMAIL")
                .or_else(|_| std::env::var("EMAIL_FROM"))
                .map_err(|_| anyhow!("FROM_EMAIL or EMAIL_FROM not set"))?,
        })
    }
}

/// Everything the alert message needs; composed by the check run from the
/// watch and the pre-update baseline
#[derive(Debug, Clone)]
pub struct PriceDropAlert {
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub latest_price: f64,
    pub baseline_price: f64,
    pub currency: String,
    pub booking_link: Option<String>,
}

impl PriceDropAlert {
    pub fn subject(&self) -> String {
        "Cheaper flight found for your tracked route".to_string()
    }

    pub fn to_text(&self) -> String {
        let mut text = format!(
            "Good news!\n\n\
             We found a cheaper flight for your tracked route {} -> {} on {}{}.\n\n\
             Latest price: {:.2} {}\n\
             Previous best: {:.2} {}\n",
            self.origin,
            self.destination,
            self.departure_date,
            self.return_dates_suffix(),
            self.latest_price,
            self.currency,
            self.baseline_price,
            self.currency,
        );
        if let Some(link) = &self.booking_link {
            text.push_str(&format!("\nBook this flight: {}\n", link));
        }
        text.push_str("\nPrices can change at any time, so if this works for you, consider booking soon.\n");
        text
    }

    pub fn to_html(&self) -> String {
        let link_row = match &self.booking_link {
            Some(link) => format!(r#"<p><a href="{}">Book this flight</a></p>"#, link),
            None => String::new(),
        };

        format!(
            r#"<html>
    <body>
        <p>Good news!</p>
        <p>We found a cheaper flight for your tracked route
        {} &rarr; {} on {}{}.</p>
        <p>
            Latest price: <strong>{:.2} {}</strong><br/>
            Previous best: <strong>{:.2} {}</strong>
        </p>
        {}
        <p>Prices can change at any time, so if this works for you, consider booking soon.</p>
    </body>
</html>"#,
            self.origin,
            self.destination,
            self.departure_date,
            self.return_dates_suffix(),
            self.latest_price,
            self.currency,
            self.baseline_price,
            self.currency,
            link_row,
        )
    }

    fn return_dates_suffix(&self) -> String {
        match self.return_date {
            Some(return_date) => format!(" (returning {})", return_date),
            None => String::new(),
        }
    }
}

/// Trait for outbound alert delivery
///
/// `Ok(())` means the message was handed off (or dry-run accepted); any
/// error means the alert is still owed and the notified marker must not
/// move.
#[async_trait]
pub trait AlertMailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, text: &str, html: Option<&str>) -> Result<()>;
}

/// SMTP mailer over a STARTTLS relay
pub struct SmtpMailer {
    config: Option<EmailConfig>,
    dry_run: bool,
}

impl SmtpMailer {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            config: Some(config),
            dry_run: false,
        }
    }

    /// A mailer that reports success without transmitting anything
    pub fn dry_run() -> Self {
        Self {
            config: None,
            dry_run: true,
        }
    }
}

#[async_trait]
impl AlertMailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, text: &str, html: Option<&str>) -> Result<()> {
        if self.dry_run {
            info!("[dry run] would send '{}' to {}", subject, to);
            return Ok(());
        }

        let config = self
            .config
            .as_ref()
            .ok_or_else(|| anyhow!("SMTP mailer not configured"))?
            .clone();

        let builder = Message::builder()
            .from(config.from_address.parse()?)
            .to(to.parse()?)
            .subject(subject);

        let email = match html {
            Some(html) => builder.multipart(MultiPart::alternative_plain_html(
                text.to_string(),
                html.to_string(),
            ))?,
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(text.to_string())?,
        };

        let creds = Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());
        let mailer = SmtpTransport::relay(&config.smtp_server)?
            .port(config.smtp_port)
            .credentials(creds)
            .timeout(Some(Duration::from_secs(30)))
            .build();

        let to_address = to.to_string();
        // lettre's SMTP transport is blocking
        let result = tokio::task::spawn_blocking(move || mailer.send(&email)).await?;

        match result {
            Ok(_) => {
                info!("sent price alert to {}", to_address);
                Ok(())
            }
            Err(e) => {
                warn!("failed to send price alert to {}: {}", to_address, e);
                Err(anyhow!("failed to send email: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(booking_link: Option<&str>) -> PriceDropAlert {
        PriceDropAlert {
            origin: "JFK".to_string(),
            destination: "LAX".to_string(),
            departure_date: NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
            return_date: Some(NaiveDate::from_ymd_opt(2025, 10, 8).unwrap()),
            latest_price: 280.0,
            baseline_price: 300.0,
            currency: "USD".to_string(),
            booking_link: booking_link.map(str::to_string),
        }
    }

    #[test]
    fn test_bodies_carry_route_and_prices() {
        let alert = alert(Some("https://book.example/x"));

        let text = alert.to_text();
        assert!(text.contains("JFK -> LAX"));
        assert!(text.contains("280.00 USD"));
        assert!(text.contains("300.00 USD"));
        assert!(text.contains("returning 2025-10-08"));
        assert!(text.contains("https://book.example/x"));

        let html = alert.to_html();
        assert!(html.contains("<strong>280.00 USD</strong>"));
        assert!(html.contains(r#"<a href="https://book.example/x">"#));
    }

    #[test]
    fn test_link_omitted_when_absent() {
        let alert = alert(None);
        assert!(!alert.to_text().contains("Book this flight"));
        assert!(!alert.to_html().contains("<a href"));
    }

    #[tokio::test]
    async fn test_dry_run_reports_success() {
        let mailer = SmtpMailer::dry_run();
        let result = mailer
            .send("user@example.com", "subject", "body", None)
            .await;
        assert!(result.is_ok());
    }
}
