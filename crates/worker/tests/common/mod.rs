//! Shared fixtures and in-memory delivery channels for worker tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use clinica_core::rules::TriggerCondition;
use clinica_delivery::{
    EmailError, EmailMessage, EmailSender, PushError, PushMessage, PushSender, PushTarget,
};
use clinica_db::models::push_subscription::RegisterPushSubscription;
use clinica_db::models::rule::NotificationRule;
use clinica_db::models::subscriber::CreateSubscriber;
use clinica_db::models::tenant::CreateTenant;
use clinica_db::repositories::{PushSubscriptionRepo, RuleRepo, SubscriberRepo, TenantRepo};
use clinica_worker::dispatcher::{Channels, Courier, Dispatcher};
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

/// A cycle-predictor tenant with the default catalogue seeded.
pub async fn seeded_tenant(pool: &PgPool) -> i64 {
    let tenant = TenantRepo::create(
        pool,
        &CreateTenant {
            name: "Clínica Sol".to_string(),
            cycle_predictor_enabled: Some(true),
        },
    )
    .await
    .unwrap()
    .id;
    RuleRepo::upsert_default_rules(pool, tenant).await.unwrap();
    tenant
}

pub async fn subscriber(pool: &PgPool, tenant_id: i64, name: &str) -> i64 {
    SubscriberRepo::create(
        pool,
        &CreateSubscriber {
            tenant_id,
            email: format!("{}@example.com", name.to_lowercase()),
            display_name: name.to_string(),
        },
    )
    .await
    .unwrap()
    .id
}

pub async fn push_endpoint(pool: &PgPool, subscriber_id: i64, endpoint: &str) {
    PushSubscriptionRepo::register(
        pool,
        subscriber_id,
        &RegisterPushSubscription {
            endpoint: endpoint.to_string(),
            p256dh: "BPubKey".to_string(),
            auth: "AuthSecret".to_string(),
        },
    )
    .await
    .unwrap();
}

/// The tenant's rule with exactly this trigger.
pub async fn rule_with(pool: &PgPool, tenant_id: i64, trigger: &TriggerCondition) -> NotificationRule {
    RuleRepo::list_rules(pool, tenant_id)
        .await
        .unwrap()
        .into_iter()
        .find(|r| matches!(r.trigger(), Ok(t) if &t == trigger))
        .unwrap_or_else(|| panic!("no rule with trigger {trigger:?}"))
}

/// Make every queued row due now.
pub async fn make_all_due(pool: &PgPool) {
    sqlx::query("UPDATE pending_notifications SET scheduled_for = NOW() WHERE status_id = 1")
        .execute(pool)
        .await
        .unwrap();
}

// ---------------------------------------------------------------------------
// Fake channels
// ---------------------------------------------------------------------------

/// Push service that answers each endpoint with a fixed HTTP status.
#[derive(Default)]
pub struct FakePush {
    statuses: HashMap<String, u16>,
    pub sent: Mutex<Vec<(String, PushMessage)>>,
}

impl FakePush {
    pub fn answering(endpoint: &str, status: u16) -> Self {
        Self {
            statuses: HashMap::from([(endpoint.to_string(), status)]),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl PushSender for FakePush {
    async fn send(&self, target: &PushTarget, message: &PushMessage) -> Result<(), PushError> {
        self.sent
            .lock()
            .unwrap()
            .push((target.endpoint.clone(), message.clone()));
        match self.statuses.get(&target.endpoint).copied().unwrap_or(201) {
            s @ (404 | 410) => Err(PushError::Gone(s)),
            s @ (429 | 500..=599) => Err(PushError::Unavailable(s)),
            s @ 400..=499 => Err(PushError::Rejected(s)),
            _ => Ok(()),
        }
    }
}

/// SMTP stand-in that records messages or times out on every send.
#[derive(Default)]
pub struct FakeEmail {
    unreachable: bool,
    pub sent: Mutex<Vec<EmailMessage>>,
    pub attempts: Mutex<usize>,
}

impl FakeEmail {
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Default::default()
        }
    }

    pub fn delivered(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailSender for FakeEmail {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        *self.attempts.lock().unwrap() += 1;
        if self.unreachable {
            return Err(EmailError::Timeout(std::time::Duration::from_secs(30)));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

pub fn dispatcher(pool: &PgPool, push: Arc<FakePush>, email: Arc<FakeEmail>) -> Dispatcher {
    let channels = Channels {
        push: Some(push),
        email: Some(email),
    };
    Dispatcher::new(pool.clone(), Courier::new(channels, "/app/calendar"))
}
