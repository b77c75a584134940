mod api_token;
mod service_account;
mod session;
mod user;

pub use api_token::{ApiToken, ApiTokenInfo};
pub use service_account::{ServiceAccount, ServiceAccountInfo};
pub use session::Session;
pub use user::User;

/// A fresh random identifier for a new row.
pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
