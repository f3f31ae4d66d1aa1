//! Server-rendered email verification pages.
//!
//! Email links land here rather than on the SPA so verification works even
//! when the frontend is down. Repeated clicks are harmless.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::db::VerifyOutcome;
use crate::error::Result;
use crate::services::auth::AuthService;
use crate::state::AppState;

/// Verification result page.
#[derive(Template, WebTemplate)]
#[template(path = "pages/verify_result.html")]
pub struct VerifyResultPage {
    heading: &'static str,
    message: &'static str,
    success: bool,
    action_url: String,
    action_label: &'static str,
}

/// Query for `GET /api/auth/verify-email`.
#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    #[serde(default)]
    pub token: String,
}

/// Verify via short link.
///
/// GET /verify/{short_id}
///
/// # Errors
///
/// Returns `AppError` if the database lookup fails.
pub async fn short_link(
    State(state): State<AppState>,
    Path(short_id): Path<String>,
) -> Result<Response> {
    let outcome = AuthService::new(state.pool())
        .verify_short_link(&short_id)
        .await?;
    Ok(render(&outcome, &state.config().frontend_url))
}

/// Verify via the full token link.
///
/// GET /api/auth/verify-email?token=...
///
/// # Errors
///
/// Returns `AppError` if the database lookup fails.
pub async fn token_link(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<Response> {
    let outcome = AuthService::new(state.pool())
        .verify_email(&query.token)
        .await?;
    Ok(render(&outcome, &state.config().frontend_url))
}

/// Render the page for a verification outcome.
fn render(outcome: &VerifyOutcome, frontend_url: &str) -> Response {
    let (status, page) = match outcome {
        VerifyOutcome::Verified(user) => {
            tracing::info!(user_id = %user.id, "Email verified");
            (
                StatusCode::OK,
                VerifyResultPage {
                    heading: "Email verified",
                    message: "Thanks for confirming your email. Your account is ready.",
                    success: true,
                    action_url: format!("{frontend_url}/login"),
                    action_label: "Continue to Pawdia AI",
                },
            )
        }
        VerifyOutcome::AlreadyVerified(_) => (
            StatusCode::OK,
            VerifyResultPage {
                heading: "Already verified",
                message: "This email address has already been confirmed. You can sign in.",
                success: true,
                action_url: format!("{frontend_url}/login"),
                action_label: "Sign in",
            },
        ),
        VerifyOutcome::Expired => (
            StatusCode::BAD_REQUEST,
            VerifyResultPage {
                heading: "Link expired",
                message: "This verification link has expired. Request a new one from your account.",
                success: false,
                action_url: format!("{frontend_url}/resend-verification"),
                action_label: "Send a new link",
            },
        ),
        VerifyOutcome::Invalid => (
            StatusCode::BAD_REQUEST,
            VerifyResultPage {
                heading: "Invalid link",
                message: "This verification link is not valid. It may have been replaced by a newer one.",
                success: false,
                action_url: format!("{frontend_url}/resend-verification"),
                action_label: "Send a new link",
            },
        ),
    };

    (status, page).into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_pages_are_bad_request() {
        let response = render(&VerifyOutcome::Expired, "https://pawdia.ai");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = render(&VerifyOutcome::Invalid, "https://pawdia.ai");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_page_renders_action_link() {
        let html = VerifyResultPage {
            heading: "Link expired",
            message: "expired",
            success: false,
            action_url: "https://pawdia.ai/resend-verification".to_owned(),
            action_label: "Send a new link",
        }
        .render()
        .unwrap();
        assert!(html.contains("https://pawdia.ai/resend-verification"));
        assert!(html.contains("Link expired"));
    }
}
