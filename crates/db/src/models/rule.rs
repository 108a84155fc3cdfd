//! Notification rule entity models and DTOs.

use clinica_core::channels::ChannelPreference;
use clinica_core::error::CoreError;
use clinica_core::rules::{NotificationType, TriggerCondition};
use clinica_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `notification_rules` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct NotificationRule {
    pub id: DbId,
    pub tenant_id: DbId,
    pub name: String,
    pub notification_type: String,
    pub trigger_condition: serde_json::Value,
    pub trigger_discriminator: String,
    pub channel: String,
    pub message_template: String,
    pub is_active: bool,
    pub is_edited: bool,
    pub last_evaluated_at: Option<Timestamp>,
    pub last_send_count: i32,
    pub last_error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl NotificationRule {
    pub fn kind(&self) -> Result<NotificationType, CoreError> {
        NotificationType::parse(&self.notification_type)
    }

    /// Parse the stored trigger against the rule's type.
    pub fn trigger(&self) -> Result<TriggerCondition, CoreError> {
        TriggerCondition::parse(self.kind()?, &self.trigger_condition)
    }

    pub fn channel_preference(&self) -> Result<ChannelPreference, CoreError> {
        ChannelPreference::parse(&self.channel)
    }
}

/// DTO for creating a tenant-authored rule.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateNotificationRule {
    pub name: String,
    pub notification_type: NotificationType,
    pub trigger_condition: serde_json::Value,
    pub channel: ChannelPreference,
    pub message_template: String,
}

/// DTO for `PATCH /api/v1/notification-rules/{id}`. All fields optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateNotificationRule {
    pub name: Option<String>,
    pub trigger_condition: Option<serde_json::Value>,
    pub channel: Option<ChannelPreference>,
    pub message_template: Option<String>,
    pub is_active: Option<bool>,
}
