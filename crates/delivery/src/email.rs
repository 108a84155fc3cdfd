//! Email delivery via SMTP.
//!
//! [`SmtpMailer`] wraps a pooled `lettre` async SMTP transport (STARTTLS,
//! optional credentials) built once at startup. Messages are sent as
//! `multipart/alternative` with the rendered text and an escaped HTML copy.
//! If `SMTP_HOST` is not set, [`EmailConfig::from_env`] returns `None` and no
//! mailer should be constructed.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::channel::{EmailMessage, EmailSender};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for email delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    /// SMTP transport-level failure (authentication, connection, etc.).
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    /// The recipient or sender address could not be parsed.
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The MIME message could not be assembled.
    #[error("Email build error: {0}")]
    Build(String),

    /// The whole SMTP exchange did not finish within the deadline.
    #[error("SMTP send timed out after {0:?}")]
    Timeout(Duration),
}

impl EmailError {
    /// Permanent SMTP replies (5xx) and malformed messages are not retried.
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_permanent(),
            Self::Address(_) | Self::Build(_) => true,
            Self::Timeout(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// EmailConfig
// ---------------------------------------------------------------------------

/// Default SMTP port (STARTTLS).
const DEFAULT_SMTP_PORT: u16 = 587;

/// Default sender address when `EMAILS_FROM_EMAIL` is not set.
const DEFAULT_FROM_ADDRESS: &str = "noreply@clinica.local";

/// Default display name when `EMAILS_FROM_NAME` is not set.
const DEFAULT_FROM_NAME: &str = "Clinica";

/// Per-command SMTP timeout, also the deadline for one whole send.
const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the SMTP email delivery service.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// SMTP server hostname.
    pub smtp_host: String,
    /// SMTP server port (defaults to 587).
    pub smtp_port: u16,
    /// Sender address.
    pub from_address: String,
    /// Sender display name.
    pub from_name: String,
    /// Optional SMTP username.
    pub smtp_user: Option<String>,
    /// Optional SMTP password.
    pub smtp_password: Option<String>,
}

impl EmailConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` if `SMTP_HOST` is not set, signalling that email
    /// delivery is not configured.
    ///
    /// | Variable            | Required | Default                 |
    /// |---------------------|----------|-------------------------|
    /// | `SMTP_HOST`         | yes      |                         |
    /// | `SMTP_PORT`         | no       | `587`                   |
    /// | `SMTP_USER`         | no       |                         |
    /// | `SMTP_PASSWORD`     | no       |                         |
    /// | `EMAILS_FROM_EMAIL` | no       | `noreply@clinica.local` |
    /// | `EMAILS_FROM_NAME`  | no       | `Clinica`               |
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let smtp_host = lookup("SMTP_HOST").filter(|h| !h.is_empty())?;
        Some(Self {
            smtp_host,
            smtp_port: lookup("SMTP_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            from_address: lookup("EMAILS_FROM_EMAIL")
                .unwrap_or_else(|| DEFAULT_FROM_ADDRESS.to_string()),
            from_name: lookup("EMAILS_FROM_NAME").unwrap_or_else(|| DEFAULT_FROM_NAME.to_string()),
            smtp_user: lookup("SMTP_USER"),
            smtp_password: lookup("SMTP_PASSWORD"),
        })
    }

    fn from_mailbox(&self) -> Result<Mailbox, EmailError> {
        Ok(Mailbox::new(
            Some(self.from_name.clone()),
            self.from_address.parse()?,
        ))
    }
}

// ---------------------------------------------------------------------------
// SmtpMailer
// ---------------------------------------------------------------------------

/// Sends notification emails via SMTP.
pub struct SmtpMailer {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Build the transport. No connection is opened until the first send.
    pub fn new(config: &EmailConfig) -> Result<Self, EmailError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .timeout(Some(SMTP_TIMEOUT));

        if let (Some(user), Some(pass)) = (&config.smtp_user, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            from: config.from_mailbox()?,
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl EmailSender for SmtpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        let email = build_message(self.from.clone(), message)?;
        tokio::time::timeout(SMTP_TIMEOUT, self.transport.send(email))
            .await
            .map_err(|_| EmailError::Timeout(SMTP_TIMEOUT))??;
        tracing::info!(to = %message.to, subject = %message.subject, "Notification email sent");
        Ok(())
    }
}

/// Assemble the MIME message for `message`.
pub fn build_message(from: Mailbox, message: &EmailMessage) -> Result<Message, EmailError> {
    Message::builder()
        .from(from)
        .to(message.to.parse()?)
        .subject(message.subject.clone())
        .multipart(MultiPart::alternative_plain_html(
            message.body.clone(),
            html_body(&message.body),
        ))
        .map_err(|e| EmailError::Build(e.to_string()))
}

/// Escaped HTML rendering of a plain-text body. Line breaks become `<br>`.
pub fn html_body(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 32);
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            '\n' => escaped.push_str("<br>\n"),
            _ => escaped.push(ch),
        }
    }
    format!("<!DOCTYPE html><html><body><p>{escaped}</p></body></html>")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn message(to: &str) -> EmailMessage {
        EmailMessage {
            to: to.to_string(),
            subject: "Your period is coming soon".to_string(),
            body: "Hi <Ana>,\nsee you soon & take care".to_string(),
        }
    }

    #[test]
    fn config_none_without_smtp_host() {
        assert!(EmailConfig::from_lookup(lookup(&[])).is_none());
        assert!(EmailConfig::from_lookup(lookup(&[("SMTP_HOST", "")])).is_none());
    }

    #[test]
    fn config_defaults() {
        let cfg = EmailConfig::from_lookup(lookup(&[("SMTP_HOST", "smtp.example.com")])).unwrap();
        assert_eq!(cfg.smtp_port, 587);
        assert_eq!(cfg.from_address, DEFAULT_FROM_ADDRESS);
        assert_eq!(cfg.from_name, DEFAULT_FROM_NAME);
        assert!(cfg.smtp_user.is_none());
    }

    #[test]
    fn config_reads_sender_identity() {
        let cfg = EmailConfig::from_lookup(lookup(&[
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_PORT", "2525"),
            ("EMAILS_FROM_EMAIL", "avisos@clinica.example"),
            ("EMAILS_FROM_NAME", "Consultorio"),
        ]))
        .unwrap();
        assert_eq!(cfg.smtp_port, 2525);
        let mailbox = cfg.from_mailbox().unwrap();
        assert_eq!(mailbox.email.to_string(), "avisos@clinica.example");
        assert_eq!(mailbox.name.as_deref(), Some("Consultorio"));
    }

    #[test]
    fn html_body_is_escaped() {
        let html = html_body("a < b & \"c\"\nnext");
        assert!(html.contains("a &lt; b &amp; &quot;c&quot;<br>\nnext"));
        assert!(!html.contains("<b"));
    }

    #[test]
    fn builds_multipart_message() {
        let from: Mailbox = "Clinica <noreply@clinica.local>".parse().unwrap();
        let email = build_message(from, &message("ana@example.com")).unwrap();
        let raw = String::from_utf8(email.formatted()).unwrap();
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("Subject: Your period is coming soon"));
        assert!(raw.contains("&lt;Ana&gt;"));
    }

    #[test]
    fn invalid_recipient_is_permanent() {
        let from: Mailbox = "noreply@clinica.local".parse().unwrap();
        let err = build_message(from, &message("not-an-email")).unwrap_err();
        assert_matches!(err, EmailError::Address(_));
        assert!(err.is_permanent());
    }

    #[test]
    fn timeout_is_transient() {
        let err = EmailError::Timeout(SMTP_TIMEOUT);
        assert!(!err.is_permanent());
        assert_eq!(err.to_string(), "SMTP send timed out after 30s");
    }

    #[test]
    fn email_error_display_build() {
        let err = EmailError::Build("missing body".to_string());
        assert_eq!(err.to_string(), "Email build error: missing body");
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn mailer_builds_without_connecting() {
        let cfg = EmailConfig::from_lookup(lookup(&[
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_USER", "user"),
            ("SMTP_PASSWORD", "secret"),
        ]))
        .unwrap();
        assert!(SmtpMailer::new(&cfg).is_ok());
    }
}
