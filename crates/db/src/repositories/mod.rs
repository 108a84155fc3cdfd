//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod advisory_lock;
pub mod cycle_repo;
pub mod delivery_log_repo;
pub mod pending_notification_repo;
pub mod push_subscription_repo;
pub mod rule_repo;
pub mod subscriber_repo;
pub mod tenant_repo;

pub use advisory_lock::AdvisoryLock;
pub use cycle_repo::CycleRepo;
pub use delivery_log_repo::DeliveryLogRepo;
pub use pending_notification_repo::PendingNotificationRepo;
pub use push_subscription_repo::PushSubscriptionRepo;
pub use rule_repo::RuleRepo;
pub use subscriber_repo::SubscriberRepo;
pub use tenant_repo::TenantRepo;
