use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

pub type AppResult<T = ()> = Result<T, AppError>;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Internal SQL error: {0}")]
    Sql(#[from] sqlx::Error),
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Not logged in")]
    NotLoggedIn,
    #[error("Insufficient privileges")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    InvalidInput(String),
    #[error("Username is already taken")]
    UsernameTaken,

    #[error("Submission window is closed")]
    NotOpen,
    #[error("A phrase has already been submitted for this window")]
    AlreadySubmitted,
    #[error("User has already been verified in this window")]
    AlreadyVerified,
    #[error("Users cannot verify themselves")]
    SelfVerification,
    #[error("Cannot cancel a window that has already opened")]
    WindowAlreadyOpen,
    #[error("Cannot demote the only admin")]
    LastAdmin,

    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Stable machine-readable name of the error.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sql(_) => "persistence_error",
            Self::Configuration(_) => "configuration_error",
            Self::NotLoggedIn => "not_logged_in",
            Self::Forbidden => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::InvalidInput(_) => "invalid_input",
            Self::UsernameTaken => "username_taken",
            Self::NotOpen => "not_open",
            Self::AlreadySubmitted => "already_submitted",
            Self::AlreadyVerified => "already_verified",
            Self::SelfVerification => "self_verification",
            Self::WindowAlreadyOpen => "window_already_open",
            Self::LastAdmin => "last_admin",
            Self::Other(_) => "internal_error",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::Sql(_) | Self::Configuration(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::NotLoggedIn => StatusCode::UNAUTHORIZED,
            Self::Forbidden | Self::NotOpen | Self::WindowAlreadyOpen | Self::LastAdmin => {
                StatusCode::FORBIDDEN
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidInput(_) | Self::SelfVerification => StatusCode::BAD_REQUEST,
            Self::UsernameTaken | Self::AlreadySubmitted | Self::AlreadyVerified => {
                StatusCode::CONFLICT
            }
        }
    }

    /// Whether the error is an internal failure rather than an expected
    /// business outcome.
    pub fn is_internal(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Message shown to clients. Internal failures are not described.
    fn public_message(&self) -> String {
        if self.is_internal() {
            "Something went wrong, please try again".to_string()
        } else {
            self.to_string()
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.is_internal() {
            tracing::error!(kind = self.kind(), error = %self, "Request failed");
        }
        let body = serde_json::json!({
            "error": self.kind(),
            "message": self.public_message(),
        });
        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_errors_are_not_internal() {
        for err in [
            AppError::NotOpen,
            AppError::AlreadySubmitted,
            AppError::AlreadyVerified,
            AppError::SelfVerification,
            AppError::NotFound("Window"),
            AppError::Forbidden,
        ] {
            assert!(!err.is_internal(), "{err:?}");
        }
        assert!(AppError::Sql(sqlx::Error::RowNotFound).is_internal());
    }

    #[test]
    fn internal_errors_are_rendered_opaquely() {
        let err = AppError::Sql(sqlx::Error::PoolTimedOut);
        assert_eq!(err.kind(), "persistence_error");
        assert!(!err.public_message().contains("pool"));
        assert_eq!(AppError::AlreadySubmitted.status_code(), StatusCode::CONFLICT);
    }
}
