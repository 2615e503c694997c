//! Notification channels for alert delivery.
//!
//! This module provides the [`NotificationChannel`] trait and the built-in
//! transports:
//! - [`ConsoleChannel`]: a framed, optionally colored block on stdout
//! - [`EmailChannel`]: an HTML message over SMTP with STARTTLS
//! - [`ChatWebhookChannel`]: a severity-colored JSON attachment posted to a webhook

use std::fmt;
use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use vigil_metrics::MetricValue;

use crate::error::{AlertError, Result};
use crate::types::{Alert, AlertSeverity};

/// Metrics listed by the console and chat channels.
const SHORT_METRIC_LIMIT: usize = 5;

/// Metrics listed in the email table.
const EMAIL_METRIC_LIMIT: usize = 10;

/// The future returned by [`NotificationChannel::send`].
pub type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Trait for notification channels.
///
/// Implement this trait to deliver alerts through a new transport. The
/// dispatcher bounds every call with a timeout.
pub trait NotificationChannel: Send + Sync + fmt::Debug {
    /// Returns the name of this channel, as used in rule actions.
    fn name(&self) -> &str;

    /// Delivers one alert.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::NotificationFailed` if the alert cannot be delivered.
    fn send<'a>(&'a self, alert: &'a Alert) -> SendFuture<'a>;
}

fn render_value(value: &MetricValue) -> String {
    match value {
        MetricValue::Scalar(v) => format!("{v}"),
        other => serde_json::to_string(other).unwrap_or_else(|_| other.kind().to_string()),
    }
}

// ============ Console ============

const ANSI_RESET: &str = "\x1b[0m";

const fn ansi_color(severity: AlertSeverity) -> &'static str {
    match severity {
        AlertSeverity::Info => "\x1b[94m",
        AlertSeverity::Warning => "\x1b[93m",
        AlertSeverity::Critical => "\x1b[91m",
    }
}

/// Prints alerts to standard output.
#[derive(Debug, Clone)]
pub struct ConsoleChannel {
    name: String,
    colored: bool,
}

impl ConsoleChannel {
    /// Creates a console channel named `console`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: "console".to_string(),
            colored: true,
        }
    }

    /// Sets whether ANSI colors are emitted.
    #[must_use]
    pub const fn colored(mut self, colored: bool) -> Self {
        self.colored = colored;
        self
    }

    /// Renders an alert as the block printed to the console.
    #[must_use]
    pub fn format_alert(&self, alert: &Alert) -> String {
        let rule = "=".repeat(60);
        let (color, reset) = if self.colored {
            (ansi_color(alert.severity), ANSI_RESET)
        } else {
            ("", "")
        };

        let mut out = String::new();
        out.push_str(&format!("\n{color}{rule}\n"));
        out.push_str(&format!("ALERT: {}\n", alert.title));
        out.push_str(&format!("{rule}{reset}\n"));
        out.push_str(&format!("Severity: {}\n", alert.severity.as_str().to_uppercase()));
        out.push_str(&format!("Time: {}\n", alert.timestamp.format("%Y-%m-%d %H:%M:%S UTC")));
        out.push_str(&format!("Message: {}\n", alert.message));

        if !alert.metrics.is_empty() {
            out.push_str("\nRelevant Metrics:\n");
            for (key, value) in alert.metrics.iter().take(SHORT_METRIC_LIMIT) {
                out.push_str(&format!("  {key}: {}\n", render_value(value)));
            }
        }

        out.push_str(&format!("{color}{rule}{reset}\n"));
        out
    }
}

impl Default for ConsoleChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationChannel for ConsoleChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn send<'a>(&'a self, alert: &'a Alert) -> SendFuture<'a> {
        Box::pin(async move {
            let text = self.format_alert(alert);
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            stdout.flush()?;
            Ok(())
        })
    }
}

// ============ Email ============

const fn html_color(severity: AlertSeverity) -> &'static str {
    match severity {
        AlertSeverity::Info => "blue",
        AlertSeverity::Warning => "orange",
        AlertSeverity::Critical => "red",
    }
}

fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Connection parameters for [`EmailChannel`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    /// SMTP relay host.
    pub smtp_server: String,
    /// SMTP submission port.
    pub smtp_port: u16,
    /// Login user; no authentication when empty.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Sender address.
    pub from_address: String,
    /// Recipient addresses.
    pub to_addresses: Vec<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_server: "smtp.example.com".to_string(),
            smtp_port: 587,
            username: String::new(),
            password: String::new(),
            from_address: "alerts@vigil.local".to_string(),
            to_addresses: vec!["admin@vigil.local".to_string()],
        }
    }
}

/// Sends alerts as HTML email through an SMTP relay.
#[derive(Clone)]
pub struct EmailChannel {
    name: String,
    from: Mailbox,
    to: Vec<Mailbox>,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl fmt::Debug for EmailChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailChannel")
            .field("name", &self.name)
            .field("from", &self.from.to_string())
            .field("to", &self.to.len())
            .finish_non_exhaustive()
    }
}

impl EmailChannel {
    /// Creates an email channel named `email`.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::NotificationFailed` if an address does not
    /// parse, there are no recipients, or the relay cannot be configured.
    pub fn new(config: &EmailConfig, timeout: Duration) -> Result<Self> {
        let name = "email";
        let from: Mailbox = config
            .from_address
            .parse()
            .map_err(|e| AlertError::notification(name, format!("bad sender address: {e}")))?;
        let to = config
            .to_addresses
            .iter()
            .map(|addr| {
                addr.parse::<Mailbox>().map_err(|e| {
                    AlertError::notification(name, format!("bad recipient '{addr}': {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        if to.is_empty() {
            return Err(AlertError::notification(name, "no recipients configured"));
        }

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_server)
            .map_err(|e| AlertError::notification(name, e))?
            .port(config.smtp_port)
            .timeout(Some(timeout));
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            name: name.to_string(),
            from,
            to,
            transport: builder.build(),
        })
    }

    /// Returns the subject line for an alert.
    #[must_use]
    pub fn subject(alert: &Alert) -> String {
        format!("[{}] {}", alert.severity.as_str().to_uppercase(), alert.title)
    }

    /// Renders the HTML body for an alert.
    #[must_use]
    pub fn render_html(alert: &Alert) -> String {
        let mut rows = String::new();
        for (key, value) in alert.metrics.iter().take(EMAIL_METRIC_LIMIT) {
            rows.push_str(&format!(
                "<tr><td>{}</td><td>{}</td></tr>\n",
                html_escape(key),
                html_escape(&render_value(value))
            ));
        }

        format!(
            "<html>\n<body>\n\
             <h2 style=\"color: {color}\">{severity} ALERT: {title}</h2>\n\
             <p><strong>Time:</strong> {time}</p>\n\
             <p><strong>Message:</strong> {message}</p>\n\
             <h3>Metrics:</h3>\n\
             <table border=\"1\" style=\"border-collapse: collapse;\">\n\
             <tr><th>Metric</th><th>Value</th></tr>\n\
             {rows}</table>\n\
             <p><em>This is an automated alert from Vigil.</em></p>\n\
             </body>\n</html>\n",
            color = html_color(alert.severity),
            severity = alert.severity.as_str().to_uppercase(),
            title = html_escape(&alert.title),
            time = alert.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            message = html_escape(&alert.message).replace('\n', "<br>"),
        )
    }

    /// Returns the recipient count.
    #[must_use]
    pub fn recipient_count(&self) -> usize {
        self.to.len()
    }

    fn build_message(&self, alert: &Alert) -> Result<Message> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(Self::subject(alert))
            .header(ContentType::TEXT_HTML);
        for to in &self.to {
            builder = builder.to(to.clone());
        }
        builder
            .body(Self::render_html(alert))
            .map_err(|e| AlertError::notification(&self.name, e))
    }
}

impl NotificationChannel for EmailChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn send<'a>(&'a self, alert: &'a Alert) -> SendFuture<'a> {
        Box::pin(async move {
            let message = self.build_message(alert)?;
            self.transport
                .send(message)
                .await
                .map_err(|e| AlertError::notification(&self.name, e))?;
            info!(channel = %self.name, alert_id = %alert.id, recipients = self.to.len(), "email sent");
            Ok(())
        })
    }
}

// ============ Chat webhook ============

const fn hex_color(severity: AlertSeverity) -> &'static str {
    match severity {
        AlertSeverity::Info => "#0000FF",
        AlertSeverity::Warning => "#FFA500",
        AlertSeverity::Critical => "#FF0000",
    }
}

/// The JSON body posted by [`ChatWebhookChannel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatPayload {
    /// Target channel.
    pub channel: String,
    /// Display name of the poster.
    pub username: String,
    /// Emoji shown next to the message.
    pub icon_emoji: String,
    /// A single attachment describing the alert.
    pub attachments: Vec<ChatAttachment>,
}

/// A colored message attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatAttachment {
    /// Hex color of the side bar.
    pub color: String,
    /// Attachment headline.
    pub title: String,
    /// Attachment body.
    pub text: String,
    /// Short metric fields.
    pub fields: Vec<ChatField>,
    /// Footer text.
    pub footer: String,
    /// Unix timestamp of the alert.
    pub ts: i64,
}

/// One metric shown in an attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatField {
    /// Metric key.
    pub title: String,
    /// Rendered value.
    pub value: String,
    /// Whether the field fits side by side with another.
    pub short: bool,
}

impl ChatPayload {
    /// Builds the payload for an alert.
    #[must_use]
    pub fn from_alert(alert: &Alert, channel: &str) -> Self {
        let icon = match alert.severity {
            AlertSeverity::Warning | AlertSeverity::Critical => ":warning:",
            AlertSeverity::Info => ":information_source:",
        };

        let fields = alert
            .metrics
            .iter()
            .take(SHORT_METRIC_LIMIT)
            .map(|(key, value)| ChatField {
                title: key.clone(),
                value: render_value(value),
                short: true,
            })
            .collect();

        Self {
            channel: channel.to_string(),
            username: "Vigil Alert Bot".to_string(),
            icon_emoji: icon.to_string(),
            attachments: vec![ChatAttachment {
                color: hex_color(alert.severity).to_string(),
                title: format!("{}: {}", alert.severity.as_str().to_uppercase(), alert.title),
                text: alert.message.clone(),
                fields,
                footer: "Vigil Monitoring".to_string(),
                ts: alert.timestamp.timestamp(),
            }],
        }
    }
}

/// Posts alerts to a chat incoming-webhook URL.
#[derive(Debug, Clone)]
pub struct ChatWebhookChannel {
    name: String,
    url: String,
    channel: String,
    client: reqwest::Client,
}

impl ChatWebhookChannel {
    /// Creates a webhook channel named `chat`.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::NotificationFailed` if the URL is empty or the
    /// HTTP client cannot be built.
    pub fn new(url: impl Into<String>, channel: impl Into<String>, timeout: Duration) -> Result<Self> {
        let name = "chat";
        let url = url.into();
        if url.is_empty() {
            return Err(AlertError::notification(name, "webhook URL cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AlertError::notification(name, e))?;

        Ok(Self {
            name: name.to_string(),
            url,
            channel: channel.into(),
            client,
        })
    }

    /// Returns the webhook URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl NotificationChannel for ChatWebhookChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn send<'a>(&'a self, alert: &'a Alert) -> SendFuture<'a> {
        Box::pin(async move {
            let payload = ChatPayload::from_alert(alert, &self.channel);
            let response = self
                .client
                .post(&self.url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| AlertError::notification(&self.name, e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(AlertError::notification(
                    &self.name,
                    format!("webhook returned status {status}"),
                ));
            }

            debug!(channel = %self.name, alert_id = %alert.id, status = %status, "webhook delivered");
            Ok(())
        })
    }
}
