use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

/// Failures a protocol handler can end a request with. Every variant renders
/// a complete response, so a handler that returns one has answered the client.
#[derive(Debug)]
pub enum GitHttpError {
    /// The repository name did not resolve to a path under the root.
    InvalidPath,
    NotFound,
    /// No usable basic-auth credentials were sent.
    Unauthorized,
    Forbidden,
    PayloadTooLarge,
    BadRequest(String),
    Internal(String),
}

impl GitHttpError {
    pub fn status(&self) -> StatusCode {
        match self {
            GitHttpError::InvalidPath | GitHttpError::NotFound => StatusCode::NOT_FOUND,
            GitHttpError::Unauthorized => StatusCode::UNAUTHORIZED,
            GitHttpError::Forbidden => StatusCode::FORBIDDEN,
            GitHttpError::PayloadTooLarge | GitHttpError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GitHttpError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for GitHttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GitHttpError::InvalidPath => f.write_str("invalid repository path"),
            GitHttpError::NotFound => f.write_str("repository not found"),
            GitHttpError::Unauthorized => f.write_str("authentication required"),
            GitHttpError::Forbidden => f.write_str("access denied"),
            GitHttpError::PayloadTooLarge => f.write_str("request body too large"),
            GitHttpError::BadRequest(msg) => write!(f, "bad request: {msg}"),
            GitHttpError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for GitHttpError {}

impl IntoResponse for GitHttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            // Both path failures look identical to the client.
            GitHttpError::InvalidPath | GitHttpError::NotFound => {
                (status, "repository not found").into_response()
            }
            GitHttpError::Unauthorized => (
                status,
                [(header::WWW_AUTHENTICATE, "Basic realm=\"git\"")],
                "Access denied",
            )
                .into_response(),
            GitHttpError::Forbidden => (status, "Access denied").into_response(),
            GitHttpError::PayloadTooLarge => (status, "request body too large").into_response(),
            GitHttpError::BadRequest(msg) => (status, msg).into_response(),
            GitHttpError::Internal(msg) => {
                tracing::error!(error = %msg, "git http internal error");
                (status, "internal server error").into_response()
            }
        }
    }
}
