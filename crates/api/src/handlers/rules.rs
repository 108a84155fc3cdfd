//! Handlers for per-tenant notification rules.
//!
//! Every write re-validates the message template and trigger so the
//! evaluator only ever sees rules it can render.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use clinica_core::channels::ChannelPreference;
use clinica_core::error::CoreError;
use clinica_core::rules::{NotificationType, TriggerCondition};
use clinica_core::template::validate_template;
use clinica_core::types::DbId;
use clinica_db::models::rule::{CreateNotificationRule, NotificationRule, UpdateNotificationRule};
use clinica_db::repositories::{RuleRepo, TenantRepo};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRuleRequest {
    /// Rendered as the message subject.
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub notification_type: NotificationType,
    pub trigger_condition: serde_json::Value,
    pub channel: ChannelPreference,
    pub message_template: String,
}

/// Body of `PATCH /notification-rules/{id}`. Absent fields are left as is.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateRuleRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub trigger_condition: Option<serde_json::Value>,
    pub channel: Option<ChannelPreference>,
    pub message_template: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct SeedResult {
    /// Rules inserted or refreshed by this call.
    pub affected: u64,
    pub rules: Vec<NotificationRule>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/v1/tenants/{id}/notification-rules
///
/// All rules of the tenant with their last evaluation stats.
pub async fn list_rules(
    State(state): State<AppState>,
    Path(tenant_id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<NotificationRule>>>> {
    ensure_tenant_exists(&state, tenant_id).await?;
    let rules = RuleRepo::list_rules(&state.pool, tenant_id).await?;
    Ok(Json(DataResponse { data: rules }))
}

/// POST /api/v1/tenants/{id}/notification-rules
///
/// Create a tenant-authored rule. 409 if the tenant already has a rule of
/// the same type and trigger.
pub async fn create_rule(
    State(state): State<AppState>,
    Path(tenant_id): Path<DbId>,
    Json(input): Json<CreateRuleRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    validate_template(&input.name)?;
    validate_template(&input.message_template)?;
    let trigger = TriggerCondition::parse(input.notification_type, &input.trigger_condition)?;

    ensure_tenant_exists(&state, tenant_id).await?;

    let create = CreateNotificationRule {
        name: input.name,
        notification_type: input.notification_type,
        trigger_condition: trigger.to_json(),
        channel: input.channel,
        message_template: input.message_template,
    };
    let rule = RuleRepo::create(&state.pool, tenant_id, &create, &trigger.discriminator()).await?;

    tracing::info!(
        tenant_id,
        rule_id = rule.id,
        notification_type = %rule.notification_type,
        "Notification rule created"
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: rule })))
}

/// POST /api/v1/tenants/{id}/notification-rules/defaults
///
/// Seed the built-in catalogue. Rules the tenant has edited are kept.
pub async fn seed_default_rules(
    State(state): State<AppState>,
    Path(tenant_id): Path<DbId>,
) -> AppResult<Json<DataResponse<SeedResult>>> {
    ensure_tenant_exists(&state, tenant_id).await?;

    let affected = RuleRepo::upsert_default_rules(&state.pool, tenant_id).await?;
    let rules = RuleRepo::list_rules(&state.pool, tenant_id).await?;

    tracing::info!(tenant_id, affected, "Default notification rules seeded");

    Ok(Json(DataResponse {
        data: SeedResult { affected, rules },
    }))
}

/// GET /api/v1/notification-rules/{id}
pub async fn get_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<DbId>,
) -> AppResult<Json<DataResponse<NotificationRule>>> {
    let rule = RuleRepo::find_by_id(&state.pool, rule_id)
        .await?
        .ok_or_else(|| rule_not_found(rule_id))?;
    Ok(Json(DataResponse { data: rule }))
}

/// PATCH /api/v1/notification-rules/{id}
///
/// Partially update a rule and mark it edited, so default seeding no
/// longer overwrites it. A new trigger must fit the rule's type.
pub async fn update_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<DbId>,
    Json(input): Json<UpdateRuleRequest>,
) -> AppResult<Json<DataResponse<NotificationRule>>> {
    input.validate()?;
    if let Some(name) = &input.name {
        validate_template(name)?;
    }
    if let Some(template) = &input.message_template {
        validate_template(template)?;
    }

    let existing = RuleRepo::find_by_id(&state.pool, rule_id)
        .await?
        .ok_or_else(|| rule_not_found(rule_id))?;

    let trigger = match &input.trigger_condition {
        Some(value) => Some(TriggerCondition::parse(existing.kind()?, value)?),
        None => None,
    };
    let discriminator = trigger.as_ref().map(TriggerCondition::discriminator);

    let patch = UpdateNotificationRule {
        name: input.name,
        trigger_condition: trigger.as_ref().map(TriggerCondition::to_json),
        channel: input.channel,
        message_template: input.message_template,
        is_active: input.is_active,
    };

    let rule = RuleRepo::update_rule(&state.pool, rule_id, &patch, discriminator.as_deref())
        .await?
        .ok_or_else(|| rule_not_found(rule_id))?;

    tracing::info!(rule_id, is_active = rule.is_active, "Notification rule updated");

    Ok(Json(DataResponse { data: rule }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn ensure_tenant_exists(state: &AppState, tenant_id: DbId) -> AppResult<()> {
    TenantRepo::find_by_id(&state.pool, tenant_id)
        .await?
        .map(|_| ())
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Tenant",
            id: tenant_id,
        }))
}

fn rule_not_found(id: DbId) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "NotificationRule",
        id,
    })
}
