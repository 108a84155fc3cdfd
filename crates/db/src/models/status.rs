//! Status helper enums mapping to SMALLSERIAL/SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` database table.

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Return the `name` column of the lookup row.
            pub fn label(self) -> &'static str {
                match self {
                    $( Self::$variant => $label ),+
                }
            }

            /// Map a database status ID back to the enum.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some(Self::$variant), )+
                    _ => None,
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }
    };
}

define_status_enum! {
    /// Lifecycle of a queued notification.
    ///
    /// `pending -> sending -> sent` on success, `sending -> pending` on a
    /// retryable failure, `sending -> dead` once retries are exhausted or the
    /// failure is permanent. `sent` and `dead` are terminal.
    PendingNotificationStatus {
        Pending = 1 => "pending",
        Sending = 2 => "sending",
        Sent = 3 => "sent",
        Dead = 4 => "dead",
    }
}

impl PendingNotificationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Dead)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_match_seed_order() {
        assert_eq!(PendingNotificationStatus::Pending.id(), 1);
        assert_eq!(PendingNotificationStatus::Sending.id(), 2);
        assert_eq!(PendingNotificationStatus::Sent.id(), 3);
        assert_eq!(PendingNotificationStatus::Dead.id(), 4);
    }

    #[test]
    fn from_id_round_trips() {
        for status in [
            PendingNotificationStatus::Pending,
            PendingNotificationStatus::Sending,
            PendingNotificationStatus::Sent,
            PendingNotificationStatus::Dead,
        ] {
            assert_eq!(PendingNotificationStatus::from_id(status.id()), Some(status));
        }
        assert_eq!(PendingNotificationStatus::from_id(9), None);
    }

    #[test]
    fn only_sent_and_dead_are_terminal() {
        assert!(!PendingNotificationStatus::Pending.is_terminal());
        assert!(!PendingNotificationStatus::Sending.is_terminal());
        assert!(PendingNotificationStatus::Sent.is_terminal());
        assert!(PendingNotificationStatus::Dead.is_terminal());
    }
}
