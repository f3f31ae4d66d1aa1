//! Unified error handling with Sentry integration.
//!
//! Every handler returns `Result<T, AppError>`. Server-side failures are
//! captured to Sentry before responding, and clients only ever see a short
//! JSON message: `{"success": false, "message": "..."}`.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::auth::AuthError;
use crate::services::checkout::CheckoutError;
use crate::services::cloudinary::UploadError;
use crate::services::credits::CreditError;
use crate::services::email::EmailError;
use crate::services::generation::GenerationError;
use crate::services::paypal::PaymentError;
use crate::services::tokens::TokenError;

/// Application-level error type for the API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Access token could not be issued or validated.
    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    /// Credit operation failed.
    #[error("Credit error: {0}")]
    Credit(#[from] CreditError),

    /// Checkout or order fulfilment failed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// PayPal API operation failed.
    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    /// Email delivery failed.
    #[error("Email error: {0}")]
    Email(#[from] EmailError),

    /// Image upload failed.
    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    /// Image generation failed.
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User is authenticated but not allowed.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An optional integration is not configured.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Database(err) => repository_status(err),
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                AuthError::UserNotFound => StatusCode::NOT_FOUND,
                AuthError::UserAlreadyExists
                | AuthError::WeakPassword(_)
                | AuthError::InvalidEmail(_)
                | AuthError::InvalidName(_)
                | AuthError::InvalidToken
                | AuthError::TokenExpired => StatusCode::BAD_REQUEST,
                AuthError::Repository(err) => repository_status(err),
                AuthError::PasswordHash => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Token(_) | Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Credit(err) => match err {
                CreditError::Insufficient { .. } => StatusCode::PAYMENT_REQUIRED,
                CreditError::InvalidAmount => StatusCode::BAD_REQUEST,
                CreditError::UserNotFound => StatusCode::NOT_FOUND,
                CreditError::Repository(err) => repository_status(err),
            },
            Self::Checkout(err) => match err {
                CheckoutError::InvalidOrder(_) | CheckoutError::NotPending(_) => {
                    StatusCode::BAD_REQUEST
                }
                CheckoutError::OrderNotFound => StatusCode::NOT_FOUND,
                CheckoutError::NotCompleted(_) => StatusCode::PAYMENT_REQUIRED,
                CheckoutError::Payment(_) => StatusCode::BAD_GATEWAY,
                CheckoutError::Repository(err) => repository_status(err),
            },
            Self::Upload(err) => match err {
                UploadError::UnsupportedType | UploadError::TooLarge | UploadError::Empty => {
                    StatusCode::BAD_REQUEST
                }
                UploadError::Http(_) | UploadError::Api { .. } => StatusCode::BAD_GATEWAY,
            },
            Self::Generation(err) => match err {
                GenerationError::InvalidSource(_) => StatusCode::BAD_REQUEST,
                GenerationError::Http(_)
                | GenerationError::Api { .. }
                | GenerationError::NoImages => StatusCode::BAD_GATEWAY,
            },
            Self::Payment(_) | Self::Email(_) => StatusCode::BAD_GATEWAY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show the client.
    fn public_message(&self) -> String {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            return "Internal server error".to_owned();
        }
        if status == StatusCode::BAD_GATEWAY {
            return "External service error".to_owned();
        }

        match self {
            Self::Database(err) | Self::Auth(AuthError::Repository(err)) => match err {
                RepositoryError::NotFound => "Not found".to_owned(),
                RepositoryError::Conflict(msg) => msg.clone(),
                _ => "Internal server error".to_owned(),
            },
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials => "Invalid email or password".to_owned(),
                AuthError::UserNotFound => "User not found".to_owned(),
                AuthError::UserAlreadyExists => {
                    "An account with this email already exists".to_owned()
                }
                AuthError::WeakPassword(msg) | AuthError::InvalidName(msg) => msg.clone(),
                AuthError::InvalidEmail(_) => "Invalid email address".to_owned(),
                AuthError::InvalidToken => "Invalid or expired token".to_owned(),
                AuthError::TokenExpired => "Token has expired".to_owned(),
                _ => "Authentication error".to_owned(),
            },
            Self::Token(_) => "Invalid or expired token".to_owned(),
            Self::Credit(CreditError::Insufficient { required }) => {
                format!("Insufficient credits: {required} required")
            }
            Self::Credit(err) => err.to_string(),
            Self::Checkout(CheckoutError::OrderNotFound) => "Order not found".to_owned(),
            Self::Checkout(err) => err.to_string(),
            Self::Upload(err) => err.to_string(),
            Self::Generation(GenerationError::InvalidSource(msg)) => msg.clone(),
            Self::NotFound(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::BadRequest(msg)
            | Self::ServiceUnavailable(msg) => msg.clone(),
            Self::RateLimited => "Too many requests".to_owned(),
            _ => self.to_string(),
        }
    }
}

const fn repository_status(err: &RepositoryError) -> StatusCode {
    match err {
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        // Unique-constraint violations are reported as bad input
        RepositoryError::Conflict(_) => StatusCode::BAD_REQUEST,
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let body = Json(json!({
            "success": false,
            "message": self.public_message(),
        }));

        (status, body).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Add a breadcrumb for user actions.
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::to_bytes;

    use super::*;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    async fn body_json(err: AppError) -> serde_json::Value {
        let bytes = to_bytes(err.into_response().into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("order-123".to_string());
        assert_eq!(err.to_string(), "Not found: order-123");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(get_status(AppError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(get_status(AppError::Unauthorized("x".into())), StatusCode::UNAUTHORIZED);
        assert_eq!(get_status(AppError::Forbidden("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(get_status(AppError::BadRequest("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(get_status(AppError::RateLimited), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            get_status(AppError::ServiceUnavailable("x".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            get_status(AppError::Internal("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_domain_error_status_codes() {
        assert_eq!(
            get_status(AuthError::UserAlreadyExists.into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AuthError::InvalidCredentials.into()),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(RepositoryError::Conflict("dup".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(CreditError::Insufficient { required: 1 }.into()),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            get_status(CheckoutError::NotCompleted("DECLINED".into()).into()),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            get_status(UploadError::TooLarge.into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(GenerationError::NoImages.into()),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            get_status(
                PaymentError::Api {
                    status: 500,
                    message: "boom".into()
                }
                .into()
            ),
            StatusCode::BAD_GATEWAY
        );
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let body = body_json(AppError::BadRequest("name is required".into())).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "name is required");
    }

    #[tokio::test]
    async fn test_internal_details_are_hidden() {
        let body = body_json(RepositoryError::DataCorruption("secret detail".into()).into()).await;
        assert_eq!(body["message"], "Internal server error");

        let body = body_json(
            PaymentError::Api {
                status: 401,
                message: "client secret rejected".into(),
            }
            .into(),
        )
        .await;
        assert_eq!(body["message"], "External service error");
    }
}
