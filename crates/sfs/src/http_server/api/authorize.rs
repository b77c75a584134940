//! Forward-auth check: may the caller perform `action` on `scope`?

use axum::extract::Json;
use serde::{Deserialize, Serialize};

use common::prelude::Action;

use crate::http_server::{ApiError, Caller};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizeRequest {
    pub scope: String,
    pub action: Action,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizeResponse {
    pub allowed: bool,
    pub user_id: String,
}

pub async fn handler(
    Caller(principal): Caller,
    Json(req): Json<AuthorizeRequest>,
) -> Result<Json<AuthorizeResponse>, ApiError> {
    if !principal.authorize(&req.scope, req.action) {
        return Err(ApiError::Forbidden {
            scope: req.scope,
            action: req.action.to_string(),
        });
    }
    tracing::debug!(user_id = %principal.user_id(), scope = %req.scope, action = %req.action, "authorized");
    Ok(Json(AuthorizeResponse {
        allowed: true,
        user_id: principal.user_id().to_string(),
    }))
}
