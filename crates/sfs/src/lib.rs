//! ecloud storage service: the consuming side of the authorization pipeline.
//!
//! Every request bearer is verified locally, then:
//! - session tokens act for their user on that user's own scopes
//! - API tokens are checked for revocation with the issuer (cached, failing
//!   open when the issuer is down) and use the scopes the issuer reports
//! - service account tokens are checked the same way, and resolve their
//!   scopes from a local replica of service account grants
//!
//! The replica is seeded by a bulk sync at startup and kept current by
//! durable consumers of the issuer's identity and user event streams.

pub mod bulk_sync;
pub mod config;
pub mod consumer;
pub mod database;
pub mod http_server;
pub mod issuer_client;
pub mod permissions;
pub mod principal;
pub mod process;
pub mod revocation;
pub mod state;
pub mod users;

pub use config::Config;
pub use permissions::{ApplyOutcome, PermissionStore};
pub use principal::{Authenticator, Principal};
pub use revocation::{RevocationCache, RevocationStatus, TokenCheck};
pub use state::{SfsState, StateSetupError};
