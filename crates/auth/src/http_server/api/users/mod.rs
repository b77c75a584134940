use axum::routing::{patch, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub mod delete;
pub mod register;
pub mod update;

use crate::database::models::User;
use crate::AuthState;

pub fn router(state: AuthState) -> Router<AuthState> {
    Router::new()
        .route("/", post(register::handler))
        .route("/me", patch(update::handler).delete(delete::handler))
        .with_state(state)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            created_at: user.created_at,
        }
    }
}
