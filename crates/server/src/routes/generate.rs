//! AI portrait generation.
//!
//! Credits are debited before the upstream call and refunded through the
//! ledger if it fails.

use axum::{
    extract::State,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use pawdia_core::{Credits, UserId};
use sqlx::PgPool;

use crate::db::{CreditReason, UserRepository};
use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::routes::response::{ApiJson, ok};
use crate::services::credits::CreditService;
use crate::services::generation::{
    GenerationClient, GenerationError, MAX_PROMPT_LENGTH, PortraitStyle, UnknownStyle,
};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub image_url: String,
    pub style: String,
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub images: Vec<String>,
    pub style: PortraitStyle,
    pub credits_used: u32,
    pub credits_remaining: Credits,
}

#[derive(Debug, Serialize)]
pub struct StylesResponse {
    pub styles: [PortraitStyle; 6],
}

/// GET /api/generate/styles
pub async fn styles() -> Response {
    ok(StylesResponse {
        styles: PortraitStyle::ALL,
    })
    .into_response()
}

/// Generate portraits from an uploaded photo.
///
/// POST /api/generate
///
/// # Errors
///
/// Returns 400 for an unknown style or bad image URL, 402 when credits run
/// short, 403 for unverified accounts when verification is required, 502 if
/// the AI API fails (credits refunded) and 503 if it isn't configured.
pub async fn generate(
    State(state): State<AppState>,
    RequireAuth(caller): RequireAuth,
    ApiJson(req): ApiJson<GenerateRequest>,
) -> Result<Response> {
    let client = state.generation()?;

    let style: PortraitStyle = req
        .style
        .parse()
        .map_err(|e: UnknownStyle| AppError::BadRequest(e.to_string()))?;
    if req.image_url.trim().is_empty() {
        return Err(AppError::BadRequest("imageUrl is required".to_owned()));
    }
    if req
        .prompt
        .as_deref()
        .is_some_and(|p| p.chars().count() > MAX_PROMPT_LENGTH)
    {
        return Err(AppError::BadRequest(format!(
            "prompt must be at most {MAX_PROMPT_LENGTH} characters"
        )));
    }

    if state.config().credits.require_verified_email {
        let verified = UserRepository::new(state.pool())
            .get_by_id(caller.id)
            .await?
            .is_some_and(|u| u.is_verified);
        if !verified {
            return Err(AppError::Forbidden(
                "Verify your email address to generate portraits".to_owned(),
            ));
        }
    }

    client.check_source(req.image_url.trim())?;

    let cost = state.config().credits.generation_cost;
    let reference = format!("generate:{style}");
    let remaining = CreditService::new(state.pool())
        .spend(caller.id, cost, CreditReason::Generation, Some(&reference))
        .await?;

    // The refund must run even if the client disconnects mid-request
    let job = GenerationJob {
        client: client.clone(),
        pool: state.pool().clone(),
        user_id: caller.id,
        image_url: req.image_url.trim().to_owned(),
        style,
        prompt: req.prompt,
        cost,
        reference,
    };
    let images = tokio::spawn(job.run())
        .await
        .map_err(|e| AppError::Internal(format!("generation task failed: {e}")))??;

    Ok(ok(GenerateResponse {
        images,
        style,
        credits_used: cost,
        credits_remaining: remaining,
    })
    .into_response())
}

/// A paid generation, refunded if the upstream call fails.
struct GenerationJob {
    client: GenerationClient,
    pool: PgPool,
    user_id: UserId,
    image_url: String,
    style: PortraitStyle,
    prompt: Option<String>,
    cost: u32,
    reference: String,
}

impl GenerationJob {
    async fn run(self) -> std::result::Result<Vec<String>, GenerationError> {
        let result = self
            .client
            .generate(&self.image_url, self.style, self.prompt.as_deref())
            .await;

        match &result {
            Ok(images) => {
                tracing::info!(user_id = %self.user_id, style = %self.style, count = images.len(), "Generation succeeded");
            }
            Err(e) => {
                tracing::warn!(user_id = %self.user_id, style = %self.style, error = %e, "Generation failed, refunding");
                if let Err(refund_err) = CreditService::new(&self.pool)
                    .grant(self.user_id, self.cost, CreditReason::Refund, Some(&self.reference))
                    .await
                {
                    tracing::error!(user_id = %self.user_id, error = %refund_err, "Credit refund failed");
                }
            }
        }

        result
    }
}
