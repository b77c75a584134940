use axum::extract::{Json, State};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::http_server::Caller;
use crate::permissions::StoreError;
use crate::principal::Principal;
use crate::users::DirectoryUser;
use crate::SfsState;

#[derive(Debug, Clone, Serialize)]
pub struct WhoamiResponse {
    pub principal: Principal,
    /// Directory entry of the owning user, once the user event has arrived
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<DirectoryUser>,
}

pub async fn handler(
    State(state): State<SfsState>,
    Caller(principal): Caller,
) -> Result<Json<WhoamiResponse>, WhoamiError> {
    let user = state.users().get(principal.user_id()).await?;
    Ok(Json(WhoamiResponse { principal, user }))
}

#[derive(Debug, thiserror::Error)]
pub enum WhoamiError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for WhoamiError {
    fn into_response(self) -> Response {
        tracing::error!("WHOAMI ERROR: {:?}", self);
        (http::StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
    }
}
