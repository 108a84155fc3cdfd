//! Repository for the `push_subscriptions` table.
//!
//! An endpoint URL identifies a subscription: registering a known URL again
//! moves it to the new subscriber and replaces its keys.

use clinica_core::types::DbId;
use sqlx::PgPool;

use crate::models::push_subscription::{PushSubscription, RegisterPushSubscription};

/// Column list for `push_subscriptions` queries.
const COLUMNS: &str = "id, subscriber_id, endpoint, p256dh, auth, created_at, updated_at";

/// Provides CRUD operations for Web Push endpoints.
pub struct PushSubscriptionRepo;

impl PushSubscriptionRepo {
    /// Register (or re-register) an endpoint for a subscriber.
    pub async fn register(
        pool: &PgPool,
        subscriber_id: DbId,
        input: &RegisterPushSubscription,
    ) -> Result<PushSubscription, sqlx::Error> {
        let query = format!(
            "INSERT INTO push_subscriptions (subscriber_id, endpoint, p256dh, auth) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (endpoint) DO UPDATE SET \
                 subscriber_id = EXCLUDED.subscriber_id, \
                 p256dh = EXCLUDED.p256dh, \
                 auth = EXCLUDED.auth \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PushSubscription>(&query)
            .bind(subscriber_id)
            .bind(&input.endpoint)
            .bind(&input.p256dh)
            .bind(&input.auth)
            .fetch_one(pool)
            .await
    }

    /// Remove an endpoint. Returns `true` if a row was deleted.
    pub async fn delete_by_endpoint(pool: &PgPool, endpoint: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM push_subscriptions WHERE endpoint = $1")
            .bind(endpoint)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_for_subscriber(
        pool: &PgPool,
        subscriber_id: DbId,
    ) -> Result<Vec<PushSubscription>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM push_subscriptions \
             WHERE subscriber_id = $1 \
             ORDER BY id"
        );
        sqlx::query_as::<_, PushSubscription>(&query)
            .bind(subscriber_id)
            .fetch_all(pool)
            .await
    }
}
