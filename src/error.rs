use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Session token error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

/// The HTTP surfaces here are browser-facing (admin dashboard, mini-app), so
/// failures render as short generic pages. Internal causes are logged, never
/// leaked to the client.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong")
            }
            AppError::Jwt(e) => {
                tracing::warn!("Session token error: {:?}", e);
                (StatusCode::UNAUTHORIZED, "Session invalid")
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong")
            }
        };

        let body = format!(
            "<!DOCTYPE html><html><body><h1>{}</h1><p><a href=\"/admin\">Back</a></p></body></html>",
            message
        );

        (status, Html(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
