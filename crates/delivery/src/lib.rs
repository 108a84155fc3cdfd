//! Outbound delivery channels for patient notifications.
//!
//! - [`email`]: SMTP submission over STARTTLS via `lettre`.
//! - [`push`]: Web Push with VAPID authentication (RFC 8292) and
//!   `aes128gcm` payload encryption (RFC 8291).
//! - [`channel`]: the [`PushSender`] / [`EmailSender`] seams the dispatcher
//!   talks to, so tests can substitute in-memory fakes.

pub mod channel;
pub mod email;
pub mod error;
pub mod push;

pub use channel::{EmailMessage, EmailSender, PushMessage, PushSender, PushTarget};
pub use email::{EmailConfig, EmailError, SmtpMailer};
pub use error::DeliveryError;
pub use push::{PushError, VapidConfig, VapidKeys, WebPushSender};
