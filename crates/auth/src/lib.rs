//! The ecloud identity issuer.
//!
//! Owns users, sessions, API tokens and service accounts, signs every bearer
//! token, and publishes permission changes for the consuming services:
//! - users register and log in, receiving short-lived session tokens
//! - standalone API tokens embed their scopes in the signed claims
//! - service-account tokens reference an account whose scopes can change
//!   after issuance; every change is versioned and published
//! - consuming services check tokens for revocation and bulk sync the full
//!   permission set over a shared service key

pub mod config;
pub mod database;
pub mod http_server;
pub mod password;
pub mod process;
pub mod publisher;
pub mod state;

pub use config::Config;
pub use publisher::EventPublisher;
pub use state::{AuthState, StateSetupError};
