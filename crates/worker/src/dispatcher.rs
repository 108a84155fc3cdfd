//! Delivery worker: drains `pending_notifications`.
//!
//! One call to [`Dispatcher::dispatch_next`] claims at most one due row,
//! runs the channel policy through the [`Courier`] and finishes the row:
//!
//! - success: `sent` plus a `sent` log row, atomically
//! - transient failure: back to `pending` with exponential backoff, until
//!   the retry budget is spent
//! - permanent failure, exhausted retries or an inactive recipient: `dead`
//!   plus a `failed` log row
//!
//! Push endpoints that answer 404/410 are deleted during the attempt.

use std::sync::Arc;

use chrono::Utc;
use clinica_core::channels::{ChannelPreference, CHANNEL_EMAIL, CHANNEL_PUSH};
use clinica_core::retry;
use clinica_core::types::DbId;
use clinica_db::models::pending::PendingNotification;
use clinica_db::repositories::{PendingNotificationRepo, PushSubscriptionRepo, SubscriberRepo};
use clinica_delivery::{
    DeliveryError, EmailMessage, EmailSender, PushMessage, PushSender, PushTarget,
};
use sqlx::PgPool;

use crate::error::EngineError;

// ---------------------------------------------------------------------------
// Courier
// ---------------------------------------------------------------------------

/// Configured delivery backends. `None` means the channel is disabled.
#[derive(Clone, Default)]
pub struct Channels {
    pub push: Option<Arc<dyn PushSender>>,
    pub email: Option<Arc<dyn EmailSender>>,
}

/// A rendered notification ready to leave the building.
#[derive(Debug, Clone)]
pub struct Outgoing<'a> {
    pub email: &'a str,
    pub subject: &'a str,
    pub body: &'a str,
    pub endpoints: &'a [PushTarget],
}

/// Why an attempt failed, flattened for the queue row and the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub error: String,
    pub permanent: bool,
    /// Last channel tried.
    pub channel: Option<&'static str>,
}

impl Failure {
    fn from_error(error: &DeliveryError, channel: &'static str) -> Self {
        Self {
            error: error.to_string(),
            permanent: error.is_permanent(),
            channel: Some(channel),
        }
    }
}

/// Outcome of running the channel policy once.
#[derive(Debug)]
pub struct Attempt {
    /// The channel that delivered, or why nothing did.
    pub result: Result<&'static str, Failure>,
    /// Endpoints that answered 404/410 and must be deleted.
    pub gone_endpoints: Vec<String>,
}

/// Applies the channel policy: push only, email only, or push with email
/// fallback. Holds no database handle.
pub struct Courier {
    channels: Channels,
    click_url: String,
}

impl Courier {
    pub fn new(channels: Channels, click_url: impl Into<String>) -> Self {
        Self {
            channels,
            click_url: click_url.into(),
        }
    }

    pub async fn deliver(&self, preference: ChannelPreference, outgoing: &Outgoing<'_>) -> Attempt {
        let mut gone_endpoints = Vec::new();

        let result = match preference {
            ChannelPreference::Push => self
                .push(outgoing, &mut gone_endpoints)
                .await
                .map(|()| CHANNEL_PUSH)
                .map_err(|e| Failure::from_error(&e, CHANNEL_PUSH)),
            ChannelPreference::Email => self
                .email(outgoing)
                .await
                .map(|()| CHANNEL_EMAIL)
                .map_err(|e| Failure::from_error(&e, CHANNEL_EMAIL)),
            ChannelPreference::Dual => match self.push(outgoing, &mut gone_endpoints).await {
                Ok(()) => Ok(CHANNEL_PUSH),
                Err(push_err) => {
                    tracing::debug!(error = %push_err, "Push failed, falling back to email");
                    match self.email(outgoing).await {
                        Ok(()) => Ok(CHANNEL_EMAIL),
                        Err(email_err) => Err(Failure {
                            error: format!("{push_err}; {email_err}"),
                            permanent: push_err.is_permanent() && email_err.is_permanent(),
                            channel: Some(CHANNEL_EMAIL),
                        }),
                    }
                }
            },
        };

        Attempt {
            result,
            gone_endpoints,
        }
    }

    /// Send to every endpoint; succeed if at least one accepted.
    async fn push(
        &self,
        outgoing: &Outgoing<'_>,
        gone: &mut Vec<String>,
    ) -> Result<(), DeliveryError> {
        let Some(sender) = &self.channels.push else {
            return Err(DeliveryError::PushNotConfigured);
        };
        if outgoing.endpoints.is_empty() {
            return Err(DeliveryError::NoPushEndpoints);
        }

        let message = PushMessage {
            title: outgoing.subject.to_string(),
            body: outgoing.body.to_string(),
            url: self.click_url.clone(),
        };

        let mut delivered = false;
        let mut error: Option<DeliveryError> = None;
        for target in outgoing.endpoints {
            match sender.send(target, &message).await {
                Ok(()) => delivered = true,
                Err(e) if e.is_gone() => {
                    tracing::info!(endpoint = %target.endpoint, "Push endpoint gone, removing");
                    gone.push(target.endpoint.clone());
                }
                Err(e) => {
                    tracing::warn!(endpoint = %target.endpoint, error = %e, "Push attempt failed");
                    // Keep a transient error over a permanent one so the row is retried.
                    let replace = match &error {
                        None => true,
                        Some(prev) => prev.is_permanent() && !e.is_permanent(),
                    };
                    if replace {
                        error = Some(e.into());
                    }
                }
            }
        }

        match (delivered, error) {
            (true, _) => Ok(()),
            (false, Some(e)) => Err(e),
            (false, None) => Err(DeliveryError::NoPushEndpoints),
        }
    }

    async fn email(&self, outgoing: &Outgoing<'_>) -> Result<(), DeliveryError> {
        let Some(sender) = &self.channels.email else {
            return Err(DeliveryError::EmailNotConfigured);
        };
        sender
            .send(&EmailMessage {
                to: outgoing.email.to_string(),
                subject: outgoing.subject.to_string(),
                body: outgoing.body.to_string(),
            })
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// What [`Dispatcher::dispatch_next`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Nothing was due.
    Idle,
    Sent { id: DbId, channel: &'static str },
    Retrying { id: DbId, retry_count: i32 },
    Dead { id: DbId },
    /// The row left `sending` before this worker could finish it.
    Lost { id: DbId },
}

/// Claims and delivers queued notifications.
pub struct Dispatcher {
    pool: PgPool,
    courier: Courier,
}

impl Dispatcher {
    pub fn new(pool: PgPool, courier: Courier) -> Self {
        Self { pool, courier }
    }

    /// Claim and process one due row.
    pub async fn dispatch_next(&self) -> Result<DispatchOutcome, EngineError> {
        let Some(row) = PendingNotificationRepo::claim_next(&self.pool).await? else {
            return Ok(DispatchOutcome::Idle);
        };
        tracing::debug!(pending_id = row.id, recipient_id = row.recipient_id, "Claimed notification");
        self.process(row).await
    }

    /// Return rows abandoned in `sending` to the queue.
    pub async fn release_stale(&self, stale_after_secs: i64) -> Result<u64, EngineError> {
        let released = PendingNotificationRepo::release_stale(&self.pool, stale_after_secs).await?;
        if released > 0 {
            tracing::warn!(released, "Released stale notification claims");
        }
        Ok(released)
    }

    async fn process(&self, row: PendingNotification) -> Result<DispatchOutcome, EngineError> {
        let subscriber = SubscriberRepo::find_by_id(&self.pool, row.recipient_id)
            .await?
            .filter(|s| s.is_active);
        let Some(subscriber) = subscriber else {
            return self
                .dead_letter(&row, row.retry_count, "Recipient is inactive or no longer exists", None)
                .await;
        };

        let preference = match ChannelPreference::parse(&row.channel) {
            Ok(p) => p,
            Err(e) => {
                return self
                    .dead_letter(&row, row.retry_count, &e.to_string(), None)
                    .await
            }
        };

        let endpoints: Vec<PushTarget> = if preference.includes_push() {
            PushSubscriptionRepo::list_for_subscriber(&self.pool, subscriber.id)
                .await?
                .into_iter()
                .map(|s| PushTarget {
                    endpoint: s.endpoint,
                    p256dh: s.p256dh,
                    auth: s.auth,
                })
                .collect()
        } else {
            Vec::new()
        };

        let attempt = self
            .courier
            .deliver(
                preference,
                &Outgoing {
                    email: &subscriber.email,
                    subject: &row.subject,
                    body: &row.body,
                    endpoints: &endpoints,
                },
            )
            .await;

        for endpoint in &attempt.gone_endpoints {
            PushSubscriptionRepo::delete_by_endpoint(&self.pool, endpoint).await?;
        }

        match attempt.result {
            Ok(channel) => {
                if PendingNotificationRepo::mark_sent(&self.pool, row.id, channel).await? {
                    tracing::info!(pending_id = row.id, channel, "Notification sent");
                    Ok(DispatchOutcome::Sent { id: row.id, channel })
                } else {
                    tracing::warn!(pending_id = row.id, "Claim lost before marking sent");
                    Ok(DispatchOutcome::Lost { id: row.id })
                }
            }
            Err(failure) => {
                let retry_count = row.retry_count + 1;
                if failure.permanent || retry::is_exhausted(retry_count) {
                    return self
                        .dead_letter(&row, retry_count, &failure.error, failure.channel)
                        .await;
                }

                let delay = retry::backoff(retry_count);
                let next_attempt_at = Utc::now()
                    + chrono::Duration::from_std(delay)
                        .unwrap_or_else(|_| chrono::Duration::seconds(retry::MAX_DELAY_SECS as i64));
                let rescheduled = PendingNotificationRepo::schedule_retry(
                    &self.pool,
                    row.id,
                    retry_count,
                    &failure.error,
                    next_attempt_at,
                )
                .await?;
                if !rescheduled {
                    return Ok(DispatchOutcome::Lost { id: row.id });
                }
                tracing::warn!(
                    pending_id = row.id,
                    retry_count,
                    delay_secs = delay.as_secs(),
                    error = %failure.error,
                    "Delivery failed, retry scheduled",
                );
                Ok(DispatchOutcome::Retrying {
                    id: row.id,
                    retry_count,
                })
            }
        }
    }

    async fn dead_letter(
        &self,
        row: &PendingNotification,
        retry_count: i32,
        error: &str,
        channel: Option<&str>,
    ) -> Result<DispatchOutcome, EngineError> {
        if PendingNotificationRepo::mark_dead(&self.pool, row.id, retry_count, error, channel).await? {
            tracing::error!(pending_id = row.id, retry_count, error, "Notification dead-lettered");
            Ok(DispatchOutcome::Dead { id: row.id })
        } else {
            Ok(DispatchOutcome::Lost { id: row.id })
        }
    }
}
