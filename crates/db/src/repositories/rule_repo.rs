//! Repository for the `notification_rules` table.
//!
//! Rules are unique per `(tenant_id, notification_type, trigger_discriminator)`.
//! Callers validate templates and triggers before writing; this layer only
//! persists what it is given.

use clinica_core::default_rules::default_rules;
use clinica_core::rules::NotificationType;
use clinica_core::types::DbId;
use sqlx::PgPool;

use crate::models::rule::{CreateNotificationRule, NotificationRule, UpdateNotificationRule};

/// Column list for `notification_rules` queries.
const COLUMNS: &str = "\
    id, tenant_id, name, notification_type, trigger_condition, trigger_discriminator, \
    channel, message_template, is_active, is_edited, \
    last_evaluated_at, last_send_count, last_error, \
    created_at, updated_at";

/// Provides CRUD operations for notification rules.
pub struct RuleRepo;

impl RuleRepo {
    /// All rules of a tenant, active or not, by id.
    pub async fn list_rules(
        pool: &PgPool,
        tenant_id: DbId,
    ) -> Result<Vec<NotificationRule>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notification_rules \
             WHERE tenant_id = $1 \
             ORDER BY id"
        );
        sqlx::query_as::<_, NotificationRule>(&query)
            .bind(tenant_id)
            .fetch_all(pool)
            .await
    }

    /// Active rules of a tenant in evaluation order: type priority, then id.
    ///
    /// Rows with an unrecognised type sort last; the evaluator reports them.
    pub async fn list_active_rules(
        pool: &PgPool,
        tenant_id: DbId,
    ) -> Result<Vec<NotificationRule>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notification_rules \
             WHERE tenant_id = $1 AND is_active = true \
             ORDER BY id"
        );
        let mut rules = sqlx::query_as::<_, NotificationRule>(&query)
            .bind(tenant_id)
            .fetch_all(pool)
            .await?;
        rules.sort_by_key(|r| (r.kind().map(|k| k.priority()).unwrap_or(i16::MAX), r.id));
        Ok(rules)
    }

    /// First rule of the given type for a tenant (lowest id).
    pub async fn get_rule(
        pool: &PgPool,
        tenant_id: DbId,
        notification_type: NotificationType,
    ) -> Result<Option<NotificationRule>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notification_rules \
             WHERE tenant_id = $1 AND notification_type = $2 \
             ORDER BY id \
             LIMIT 1"
        );
        sqlx::query_as::<_, NotificationRule>(&query)
            .bind(tenant_id)
            .bind(notification_type.as_str())
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<NotificationRule>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM notification_rules WHERE id = $1");
        sqlx::query_as::<_, NotificationRule>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Insert a tenant-authored rule. The rule starts out edited so the
    /// default seeding never touches it.
    pub async fn create(
        pool: &PgPool,
        tenant_id: DbId,
        input: &CreateNotificationRule,
        trigger_discriminator: &str,
    ) -> Result<NotificationRule, sqlx::Error> {
        let query = format!(
            "INSERT INTO notification_rules \
                 (tenant_id, name, notification_type, trigger_condition, \
                  trigger_discriminator, channel, message_template, is_edited) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, true) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, NotificationRule>(&query)
            .bind(tenant_id)
            .bind(&input.name)
            .bind(input.notification_type.as_str())
            .bind(&input.trigger_condition)
            .bind(trigger_discriminator)
            .bind(input.channel.as_str())
            .bind(&input.message_template)
            .fetch_one(pool)
            .await
    }

    /// Seed the built-in catalogue for a tenant.
    ///
    /// Missing rules are inserted; existing rules the tenant never edited are
    /// refreshed to the current defaults; edited rules are left untouched.
    /// Returns the number of rows inserted or refreshed.
    pub async fn upsert_default_rules(pool: &PgPool, tenant_id: DbId) -> Result<u64, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let mut affected = 0;

        for rule in default_rules() {
            let result = sqlx::query(
                "INSERT INTO notification_rules \
                     (tenant_id, name, notification_type, trigger_condition, \
                      trigger_discriminator, channel, message_template) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 ON CONFLICT (tenant_id, notification_type, trigger_discriminator) \
                 DO UPDATE SET \
                     name = EXCLUDED.name, \
                     trigger_condition = EXCLUDED.trigger_condition, \
                     channel = EXCLUDED.channel, \
                     message_template = EXCLUDED.message_template \
                 WHERE notification_rules.is_edited = false",
            )
            .bind(tenant_id)
            .bind(&rule.name)
            .bind(rule.notification_type.as_str())
            .bind(rule.trigger.to_json())
            .bind(rule.trigger.discriminator())
            .bind(rule.channel.as_str())
            .bind(&rule.template)
            .execute(&mut *tx)
            .await?;
            affected += result.rows_affected();
        }

        tx.commit().await?;
        Ok(affected)
    }

    /// Apply a patch and mark the rule as edited.
    ///
    /// `trigger_discriminator` must be supplied whenever the patch replaces
    /// `trigger_condition`. Returns `None` if the rule does not exist.
    pub async fn update_rule(
        pool: &PgPool,
        id: DbId,
        patch: &UpdateNotificationRule,
        trigger_discriminator: Option<&str>,
    ) -> Result<Option<NotificationRule>, sqlx::Error> {
        let query = format!(
            "UPDATE notification_rules SET \
                 name = COALESCE($2, name), \
                 trigger_condition = COALESCE($3, trigger_condition), \
                 trigger_discriminator = COALESCE($4, trigger_discriminator), \
                 channel = COALESCE($5, channel), \
                 message_template = COALESCE($6, message_template), \
                 is_active = COALESCE($7, is_active), \
                 is_edited = true \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, NotificationRule>(&query)
            .bind(id)
            .bind(&patch.name)
            .bind(&patch.trigger_condition)
            .bind(trigger_discriminator)
            .bind(patch.channel.map(|c| c.as_str()))
            .bind(&patch.message_template)
            .bind(patch.is_active)
            .fetch_optional(pool)
            .await
    }

    /// Store a clean evaluation: stamp the time, set the count and clear any
    /// previous error.
    pub async fn record_evaluation(
        pool: &PgPool,
        id: DbId,
        send_count: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE notification_rules \
             SET last_evaluated_at = NOW(), last_send_count = $2, last_error = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .bind(send_count)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Flag a rule that could not be evaluated. `last_evaluated_at` keeps
    /// pointing at the last clean run.
    pub async fn record_failure(pool: &PgPool, id: DbId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE notification_rules SET last_error = $2 WHERE id = $1")
            .bind(id)
            .bind(error)
            .execute(pool)
            .await?;
        Ok(())
    }
}
