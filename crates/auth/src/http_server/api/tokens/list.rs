use axum::extract::{Json, State};
use axum::response::{IntoResponse, Response};

use crate::database::models::{ApiToken, ApiTokenInfo};
use crate::http_server::SessionUser;
use crate::AuthState;

pub async fn handler(
    State(state): State<AuthState>,
    caller: SessionUser,
) -> Result<Json<Vec<ApiTokenInfo>>, ListTokensError> {
    let tokens = ApiToken::list_for_user(&caller.user.id, state.database()).await?;
    Ok(Json(tokens.iter().map(ApiToken::info).collect()))
}

#[derive(Debug, thiserror::Error)]
pub enum ListTokensError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for ListTokensError {
    fn into_response(self) -> Response {
        tracing::error!("LIST TOKENS ERROR: {:?}", self);
        (http::StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
    }
}
