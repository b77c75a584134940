//! # Permission events
//!
//! The issuer publishes two streams on a shared bus:
//!
//! ```text
//! auth.user.{user_id}.{created|updated|deleted}
//! auth.identity.{service_account_id}.{updated|deleted}
//! ```
//!
//! Payloads are JSON. Identity events carry a per-account `version` that
//! consumers use to discard stale or duplicate deliveries.

mod payload;
mod subject;

pub use payload::{IdentityDeleted, IdentityPermission, IdentityPermissionList, UserEvent};
pub use subject::{IdentityAction, Subject, UserAction};

pub const USER_STREAM_FILTER: &str = "auth.user.>";
pub const IDENTITY_STREAM_FILTER: &str = "auth.identity.>";

/// Prefix under which consumers park messages that exhausted their deliveries.
pub const DEAD_LETTER_PREFIX: &str = "deadletter";
