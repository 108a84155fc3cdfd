//! Integration tests for the rule store.
//!
//! - Default seeding is idempotent and never overwrites edited rules
//! - Active rules come back in type-priority order
//! - Patches mark rules as edited and evaluation stats are recorded

use clinica_core::channels::ChannelPreference;
use clinica_core::default_rules::default_rules;
use clinica_core::rules::{NotificationType, TriggerCondition};
use clinica_db::models::rule::{CreateNotificationRule, UpdateNotificationRule};
use clinica_db::models::tenant::CreateTenant;
use clinica_db::repositories::{RuleRepo, TenantRepo};
use serde_json::json;
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn new_tenant(pool: &PgPool) -> i64 {
    TenantRepo::create(
        pool,
        &CreateTenant {
            name: "Dra. Pérez".to_string(),
            cycle_predictor_enabled: Some(true),
        },
    )
    .await
    .unwrap()
    .id
}

// ---------------------------------------------------------------------------
// Seeding
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_upsert_default_rules_seeds_catalogue(pool: PgPool) {
    let tenant = new_tenant(&pool).await;

    let affected = RuleRepo::upsert_default_rules(&pool, tenant).await.unwrap();
    assert_eq!(affected as usize, default_rules().len());

    let rules = RuleRepo::list_rules(&pool, tenant).await.unwrap();
    assert_eq!(rules.len(), default_rules().len());
    assert!(rules.iter().all(|r| r.is_active && !r.is_edited));
    for rule in &rules {
        let trigger = rule.trigger().unwrap();
        assert_eq!(trigger.discriminator(), rule.trigger_discriminator);
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_upsert_default_rules_is_idempotent(pool: PgPool) {
    let tenant = new_tenant(&pool).await;

    RuleRepo::upsert_default_rules(&pool, tenant).await.unwrap();
    let first = RuleRepo::list_rules(&pool, tenant).await.unwrap();
    RuleRepo::upsert_default_rules(&pool, tenant).await.unwrap();
    let second = RuleRepo::list_rules(&pool, tenant).await.unwrap();

    assert_eq!(first.len(), second.len());
    let first_ids: Vec<_> = first.iter().map(|r| r.id).collect();
    let second_ids: Vec<_> = second.iter().map(|r| r.id).collect();
    assert_eq!(first_ids, second_ids);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_upsert_default_rules_preserves_edited(pool: PgPool) {
    let tenant = new_tenant(&pool).await;
    RuleRepo::upsert_default_rules(&pool, tenant).await.unwrap();

    let rule = RuleRepo::get_rule(&pool, tenant, NotificationType::PrenatalWeekly)
        .await
        .unwrap()
        .unwrap();
    let patch = UpdateNotificationRule {
        message_template: Some("Semana {week_number}".to_string()),
        ..Default::default()
    };
    let updated = RuleRepo::update_rule(&pool, rule.id, &patch, None)
        .await
        .unwrap()
        .unwrap();
    assert!(updated.is_edited);

    RuleRepo::upsert_default_rules(&pool, tenant).await.unwrap();

    let after = RuleRepo::find_by_id(&pool, rule.id).await.unwrap().unwrap();
    assert_eq!(after.message_template, "Semana {week_number}");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_upsert_default_rules_refreshes_unedited(pool: PgPool) {
    let tenant = new_tenant(&pool).await;
    RuleRepo::upsert_default_rules(&pool, tenant).await.unwrap();

    let rule = RuleRepo::get_rule(&pool, tenant, NotificationType::CyclePhase)
        .await
        .unwrap()
        .unwrap();
    sqlx::query("UPDATE notification_rules SET message_template = 'stale' WHERE id = $1")
        .bind(rule.id)
        .execute(&pool)
        .await
        .unwrap();

    RuleRepo::upsert_default_rules(&pool, tenant).await.unwrap();

    let after = RuleRepo::find_by_id(&pool, rule.id).await.unwrap().unwrap();
    assert_ne!(after.message_template, "stale");
}

// ---------------------------------------------------------------------------
// Ordering and lookup
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_list_active_rules_priority_order(pool: PgPool) {
    let tenant = new_tenant(&pool).await;
    RuleRepo::upsert_default_rules(&pool, tenant).await.unwrap();

    let rules = RuleRepo::list_active_rules(&pool, tenant).await.unwrap();
    let keys: Vec<(i16, i64)> = rules
        .iter()
        .map(|r| (r.kind().unwrap().priority(), r.id))
        .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
    assert_eq!(rules[0].kind().unwrap(), NotificationType::System);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_inactive_rules_not_listed_as_active(pool: PgPool) {
    let tenant = new_tenant(&pool).await;
    RuleRepo::upsert_default_rules(&pool, tenant).await.unwrap();
    let total = RuleRepo::list_active_rules(&pool, tenant).await.unwrap().len();

    let rule = RuleRepo::get_rule(&pool, tenant, NotificationType::SymptomAlert)
        .await
        .unwrap()
        .unwrap();
    let patch = UpdateNotificationRule {
        is_active: Some(false),
        ..Default::default()
    };
    RuleRepo::update_rule(&pool, rule.id, &patch, None).await.unwrap();

    let active = RuleRepo::list_active_rules(&pool, tenant).await.unwrap();
    assert_eq!(active.len(), total - 1);
    assert!(active.iter().all(|r| r.id != rule.id));
    assert_eq!(RuleRepo::list_rules(&pool, tenant).await.unwrap().len(), total);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_update_rule_replaces_trigger(pool: PgPool) {
    let tenant = new_tenant(&pool).await;
    RuleRepo::upsert_default_rules(&pool, tenant).await.unwrap();
    let rule = RuleRepo::get_rule(&pool, tenant, NotificationType::CyclePhase)
        .await
        .unwrap()
        .unwrap();

    let trigger = TriggerCondition::DaysBeforePeriod(5);
    let patch = UpdateNotificationRule {
        trigger_condition: Some(trigger.to_json()),
        ..Default::default()
    };
    let updated = RuleRepo::update_rule(&pool, rule.id, &patch, Some(&trigger.discriminator()))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated.trigger().unwrap(), trigger);
    assert_eq!(updated.trigger_discriminator, "days_before_period:5");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_update_missing_rule_returns_none(pool: PgPool) {
    let result = RuleRepo::update_rule(&pool, 999_999, &UpdateNotificationRule::default(), None)
        .await
        .unwrap();
    assert!(result.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_duplicate_discriminator_rejected(pool: PgPool) {
    let tenant = new_tenant(&pool).await;
    let input = CreateNotificationRule {
        name: "Labs".to_string(),
        notification_type: NotificationType::Custom,
        trigger_condition: json!({ "handler": "lab_results" }),
        channel: ChannelPreference::Email,
        message_template: "Your results are ready".to_string(),
    };

    RuleRepo::create(&pool, tenant, &input, "custom:lab_results")
        .await
        .unwrap();
    let err = RuleRepo::create(&pool, tenant, &input, "custom:lab_results")
        .await
        .unwrap_err();

    match err {
        sqlx::Error::Database(db_err) => assert_eq!(db_err.code().as_deref(), Some("23505")),
        other => panic!("expected unique violation, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Evaluation stats
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_record_evaluation_sets_and_clears_error(pool: PgPool) {
    let tenant = new_tenant(&pool).await;
    RuleRepo::upsert_default_rules(&pool, tenant).await.unwrap();
    let rule = RuleRepo::get_rule(&pool, tenant, NotificationType::CyclePhase)
        .await
        .unwrap()
        .unwrap();
    assert!(rule.last_evaluated_at.is_none());

    RuleRepo::record_failure(&pool, rule.id, "unknown placeholder")
        .await
        .unwrap();
    let failed = RuleRepo::find_by_id(&pool, rule.id).await.unwrap().unwrap();
    assert_eq!(failed.last_error.as_deref(), Some("unknown placeholder"));
    assert!(failed.last_evaluated_at.is_none());

    RuleRepo::record_evaluation(&pool, rule.id, 7).await.unwrap();
    let ok = RuleRepo::find_by_id(&pool, rule.id).await.unwrap().unwrap();
    assert_eq!(ok.last_send_count, 7);
    assert!(ok.last_error.is_none());
    assert!(!ok.is_edited);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_failure_keeps_last_clean_evaluation(pool: PgPool) {
    let tenant = new_tenant(&pool).await;
    RuleRepo::upsert_default_rules(&pool, tenant).await.unwrap();
    let rule = RuleRepo::get_rule(&pool, tenant, NotificationType::CyclePhase)
        .await
        .unwrap()
        .unwrap();

    RuleRepo::record_evaluation(&pool, rule.id, 3).await.unwrap();
    let clean = RuleRepo::find_by_id(&pool, rule.id).await.unwrap().unwrap();

    RuleRepo::record_failure(&pool, rule.id, "template broke")
        .await
        .unwrap();
    let failed = RuleRepo::find_by_id(&pool, rule.id).await.unwrap().unwrap();
    assert_eq!(failed.last_evaluated_at, clean.last_evaluated_at);
    assert_eq!(failed.last_send_count, 3);
    assert_eq!(failed.last_error.as_deref(), Some("template broke"));
}
