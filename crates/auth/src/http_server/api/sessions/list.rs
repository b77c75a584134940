use axum::extract::{Json, State};
use axum::response::{IntoResponse, Response};

use crate::database::models::Session;
use crate::http_server::SessionUser;
use crate::AuthState;

pub async fn handler(
    State(state): State<AuthState>,
    caller: SessionUser,
) -> Result<Json<Vec<Session>>, ListSessionsError> {
    let sessions = Session::list_for_user(&caller.user.id, state.database()).await?;
    Ok(Json(sessions))
}

#[derive(Debug, thiserror::Error)]
pub enum ListSessionsError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for ListSessionsError {
    fn into_response(self) -> Response {
        tracing::error!("LIST SESSIONS ERROR: {:?}", self);
        (http::StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
    }
}
