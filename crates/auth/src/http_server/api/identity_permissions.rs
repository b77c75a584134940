//! Bulk sync source for consuming services.

use axum::extract::{Json, State};
use axum::response::{IntoResponse, Response};

use common::prelude::IdentityPermissionList;

use crate::database::models::ServiceAccount;
use crate::http_server::ServiceCaller;
use crate::AuthState;

pub async fn handler(
    _caller: ServiceCaller,
    State(state): State<AuthState>,
) -> Result<Json<IdentityPermissionList>, IdentityPermissionsError> {
    let accounts = ServiceAccount::list_all(state.database()).await?;
    tracing::info!(count = accounts.len(), "serving identity permissions for bulk sync");

    Ok(Json(IdentityPermissionList {
        permissions: accounts.iter().map(ServiceAccount::permission).collect(),
    }))
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityPermissionsError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for IdentityPermissionsError {
    fn into_response(self) -> Response {
        tracing::error!("IDENTITY PERMISSIONS ERROR: {:?}", self);
        (http::StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
    }
}
