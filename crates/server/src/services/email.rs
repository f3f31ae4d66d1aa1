//! Transactional email via the Resend HTTP API.
//!
//! Bodies are rendered from Askama templates (HTML + plain text). When no
//! `RESEND_API_KEY` is configured the service still renders every message but
//! only logs it, so local development never needs real credentials.

use askama::Template;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Serialize;
use thiserror::Error;

use pawdia_core::ShortLinkId;

use crate::config::EmailConfig;
use crate::models::{Order, User};
use crate::services::tokens::{RESET_TOKEN_TTL, VERIFICATION_TOKEN_TTL};

/// Resend send endpoint.
const RESEND_URL: &str = "https://api.resend.com/emails";

/// HTML template for the verification email.
#[derive(Template)]
#[template(path = "email/verification.html")]
struct VerificationEmailHtml<'a> {
    name: &'a str,
    verify_url: &'a str,
    valid_hours: i64,
}

/// Plain text template for the verification email.
#[derive(Template)]
#[template(path = "email/verification.txt")]
struct VerificationEmailText<'a> {
    name: &'a str,
    verify_url: &'a str,
    valid_hours: i64,
}

/// HTML template for the password reset email.
#[derive(Template)]
#[template(path = "email/password_reset.html")]
struct PasswordResetEmailHtml<'a> {
    name: &'a str,
    reset_url: &'a str,
    valid_minutes: i64,
}

/// Plain text template for the password reset email.
#[derive(Template)]
#[template(path = "email/password_reset.txt")]
struct PasswordResetEmailText<'a> {
    name: &'a str,
    reset_url: &'a str,
    valid_minutes: i64,
}

/// One rendered line of an order confirmation.
struct ConfirmationLine {
    name: String,
    quantity: u32,
    amount: String,
}

/// HTML template for the order confirmation email.
#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
struct OrderConfirmationEmailHtml<'a> {
    name: &'a str,
    order_id: i32,
    lines: &'a [ConfirmationLine],
    total: &'a str,
    credits: u32,
    orders_url: &'a str,
}

/// Plain text template for the order confirmation email.
#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationEmailText<'a> {
    name: &'a str,
    order_id: i32,
    lines: &'a [ConfirmationLine],
    total: &'a str,
    credits: u32,
    orders_url: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Resend rejected the message.
    #[error("Resend API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Invalid API key header value.
    #[error("Invalid API key format")]
    InvalidApiKey,

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

#[derive(Clone)]
struct ResendClient {
    client: reqwest::Client,
    from_address: String,
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    resend: Option<ResendClient>,
    public_base_url: String,
    frontend_url: String,
}

impl EmailService {
    /// Create a new email service. `None` config gives a log-only service.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(
        config: Option<&EmailConfig>,
        public_base_url: &str,
        frontend_url: &str,
    ) -> Result<Self, EmailError> {
        let resend = config.map(ResendClient::new).transpose()?;
        if resend.is_none() {
            tracing::warn!("RESEND_API_KEY not set; emails will be logged, not sent");
        }

        Ok(Self {
            resend,
            public_base_url: public_base_url.to_owned(),
            frontend_url: frontend_url.to_owned(),
        })
    }

    /// Whether messages are actually delivered.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.resend.is_some()
    }

    /// Short verification link served by this API.
    #[must_use]
    pub fn verification_url(&self, short_id: &ShortLinkId) -> String {
        format!("{}/verify/{short_id}", self.public_base_url)
    }

    /// Password reset page on the frontend.
    #[must_use]
    pub fn reset_url(&self, token: &str) -> String {
        format!("{}/reset-password?token={token}", self.frontend_url)
    }

    /// Send the email verification message.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    #[tracing::instrument(skip_all, fields(user_id = %user.id))]
    pub async fn send_verification(
        &self,
        user: &User,
        short_id: &ShortLinkId,
    ) -> Result<(), EmailError> {
        let verify_url = self.verification_url(short_id);
        let valid_hours = VERIFICATION_TOKEN_TTL.num_hours();
        let html = VerificationEmailHtml {
            name: &user.name,
            verify_url: &verify_url,
            valid_hours,
        }
        .render()?;
        let text = VerificationEmailText {
            name: &user.name,
            verify_url: &verify_url,
            valid_hours,
        }
        .render()?;

        self.send(user.email.as_str(), "Verify your Pawdia AI email", &text, &html)
            .await
    }

    /// Send the password reset message.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    #[tracing::instrument(skip_all, fields(user_id = %user.id))]
    pub async fn send_password_reset(&self, user: &User, token: &str) -> Result<(), EmailError> {
        let reset_url = self.reset_url(token);
        let valid_minutes = RESET_TOKEN_TTL.num_minutes();
        let html = PasswordResetEmailHtml {
            name: &user.name,
            reset_url: &reset_url,
            valid_minutes,
        }
        .render()?;
        let text = PasswordResetEmailText {
            name: &user.name,
            reset_url: &reset_url,
            valid_minutes,
        }
        .render()?;

        self.send(user.email.as_str(), "Reset your Pawdia AI password", &text, &html)
            .await
    }

    /// Send a confirmation for a completed order.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    #[tracing::instrument(skip_all, fields(user_id = %user.id, order_id = %order.id))]
    pub async fn send_order_confirmation(&self, user: &User, order: &Order) -> Result<(), EmailError> {
        let lines: Vec<ConfirmationLine> = order
            .items
            .iter()
            .map(|item| ConfirmationLine {
                name: item.size.as_ref().map_or_else(
                    || item.name.clone(),
                    |size| format!("{} ({size})", item.name),
                ),
                quantity: item.quantity,
                amount: pawdia_core::Price::new(item.line_total(), order.currency).display(),
            })
            .collect();
        let total = order.total().display();
        let orders_url = format!("{}/account/orders", self.frontend_url);

        let html = OrderConfirmationEmailHtml {
            name: &user.name,
            order_id: order.id.as_i32(),
            lines: &lines,
            total: &total,
            credits: order.credits_granted,
            orders_url: &orders_url,
        }
        .render()?;
        let text = OrderConfirmationEmailText {
            name: &user.name,
            order_id: order.id.as_i32(),
            lines: &lines,
            total: &total,
            credits: order.credits_granted,
            orders_url: &orders_url,
        }
        .render()?;

        let subject = format!("Your Pawdia AI order #{}", order.id);
        self.send(user.email.as_str(), &subject, &text, &html).await
    }

    async fn send(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), EmailError> {
        let Some(resend) = &self.resend else {
            tracing::info!(to = %to, subject = %subject, body = %text_body, "Email delivery disabled, skipping send");
            return Ok(());
        };

        let request = SendRequest {
            from: &resend.from_address,
            to: [to],
            subject,
            html: html_body,
            text: text_body,
        };

        let response = resend.client.post(RESEND_URL).json(&request).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EmailError::Api {
                status: status.as_u16(),
                message,
            });
        }

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

impl ResendClient {
    fn new(config: &EmailConfig) -> Result<Self, EmailError> {
        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", config.api_key.expose_secret());
        let mut auth = HeaderValue::from_str(&auth_value).map_err(|_| EmailError::InvalidApiKey)?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            from_address: config.from_address.clone(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use pawdia_core::{Credits, CurrencyCode, Email, OrderId, OrderKind, OrderStatus, Subscription, UserId};
    use rust_decimal::Decimal;

    use super::*;
    use crate::models::OrderItem;

    fn service() -> EmailService {
        EmailService::new(None, "https://api.pawdia.ai", "https://pawdia.ai").unwrap()
    }

    fn user() -> User {
        User {
            id: UserId::new(1),
            name: "Pepper".to_owned(),
            email: Email::parse("pepper@pawdia.ai").unwrap(),
            credits: Credits::ZERO,
            subscription: Subscription::default(),
            is_admin: false,
            is_verified: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_links() {
        let svc = service();
        let id = ShortLinkId::parse("AbCd1234").unwrap();
        assert_eq!(svc.verification_url(&id), "https://api.pawdia.ai/verify/AbCd1234");
        assert_eq!(
            svc.reset_url("deadbeef"),
            "https://pawdia.ai/reset-password?token=deadbeef"
        );
        assert!(!svc.is_enabled());
    }

    #[test]
    fn test_verification_templates_render_link() {
        let html = VerificationEmailHtml {
            name: "Pepper <script>",
            verify_url: "https://api.pawdia.ai/verify/AbCd1234",
            valid_hours: 24,
        }
        .render()
        .unwrap();
        assert!(html.contains("https://api.pawdia.ai/verify/AbCd1234"));
        assert!(!html.contains("<script>"));

        let text = VerificationEmailText {
            name: "Pepper",
            verify_url: "https://api.pawdia.ai/verify/AbCd1234",
            valid_hours: 24,
        }
        .render()
        .unwrap();
        assert!(text.contains("24 hours"));
    }

    #[tokio::test]
    async fn test_disabled_service_skips_sends() {
        let svc = service();
        let id = ShortLinkId::parse("AbCd1234").unwrap();
        assert!(svc.send_verification(&user(), &id).await.is_ok());
        assert!(svc.send_password_reset(&user(), "deadbeef").await.is_ok());

        let order = Order {
            id: OrderId::new(9),
            user_id: UserId::new(1),
            kind: OrderKind::CreditPack,
            items: vec![OrderItem {
                product_id: None,
                name: "50 credits".to_owned(),
                size: None,
                price: Decimal::new(1999, 2),
                quantity: 1,
            }],
            total_amount: Decimal::new(1999, 2),
            currency: CurrencyCode::USD,
            status: OrderStatus::Completed,
            credits_granted: 50,
            subscription_plan: None,
            paypal_order_id: Some("PP-1".to_owned()),
            paypal_capture_id: Some("CAP-1".to_owned()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: Some(Utc::now()),
        };
        assert!(svc.send_order_confirmation(&user(), &order).await.is_ok());
    }
}
