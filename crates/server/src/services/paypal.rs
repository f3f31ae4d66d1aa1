//! PayPal Orders v2 REST client.
//!
//! Uses OAuth2 client credentials. The access token is cached in memory and
//! refreshed one minute before it expires.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::instrument;

use pawdia_core::Price;

use crate::config::PayPalConfig;

/// Refresh the access token this many seconds before it expires.
const TOKEN_EXPIRY_BUFFER_SECS: i64 = 60;

/// Errors from the PayPal API.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// OAuth token request was rejected.
    #[error("PayPal authentication failed: {0}")]
    Authentication(String),

    /// API returned an error response.
    #[error("PayPal API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The created order has no approval link.
    #[error("PayPal order {0} has no approval link")]
    MissingApprovalLink(String),

    /// The capture response has no capture id.
    #[error("PayPal capture for {0} returned no capture id")]
    MissingCapture(String),
}

/// Cached OAuth access token.
#[derive(Debug, Clone)]
struct AccessToken {
    token: SecretString,
    /// Unix timestamp when the token expires.
    expires_at: i64,
}

impl AccessToken {
    fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at - TOKEN_EXPIRY_BUFFER_SECS
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Token lifetime in seconds.
    expires_in: i64,
}

/// A PayPal order awaiting buyer approval.
#[derive(Debug, Clone)]
pub struct CreatedOrder {
    pub paypal_order_id: String,
    pub approval_url: String,
}

/// Result of capturing an approved order.
#[derive(Debug, Clone)]
pub struct CapturedOrder {
    /// PayPal order status (`COMPLETED` on success).
    pub status: String,
    pub capture_id: Option<String>,
}

impl CapturedOrder {
    /// Whether PayPal reports the payment as complete.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == "COMPLETED"
    }
}

/// Order details passed to [`PayPalClient::create_order`].
#[derive(Debug, Clone)]
pub struct OrderRequest<'a> {
    pub amount: Price,
    /// Local order id, echoed back by PayPal as `reference_id`.
    pub reference: &'a str,
    pub description: &'a str,
    pub return_url: &'a str,
    pub cancel_url: &'a str,
}

#[derive(Serialize)]
struct CreateOrderBody<'a> {
    intent: &'static str,
    purchase_units: [PurchaseUnit<'a>; 1],
    payment_source: PaymentSource<'a>,
}

#[derive(Serialize)]
struct PurchaseUnit<'a> {
    reference_id: &'a str,
    description: &'a str,
    amount: Amount,
}

#[derive(Serialize)]
struct Amount {
    currency_code: &'static str,
    value: String,
}

#[derive(Serialize)]
struct PaymentSource<'a> {
    paypal: PayPalSource<'a>,
}

#[derive(Serialize)]
struct PayPalSource<'a> {
    experience_context: ExperienceContext<'a>,
}

#[derive(Serialize)]
struct ExperienceContext<'a> {
    brand_name: &'static str,
    user_action: &'static str,
    shipping_preference: &'static str,
    return_url: &'a str,
    cancel_url: &'a str,
}

#[derive(Deserialize)]
struct OrderResponse {
    id: String,
    status: String,
    #[serde(default)]
    links: Vec<Link>,
    #[serde(default)]
    purchase_units: Vec<CapturedUnit>,
}

#[derive(Deserialize)]
struct Link {
    href: String,
    rel: String,
}

#[derive(Deserialize)]
struct CapturedUnit {
    #[serde(default)]
    payments: Option<Payments>,
}

#[derive(Deserialize)]
struct Payments {
    #[serde(default)]
    captures: Vec<Capture>,
}

#[derive(Deserialize)]
struct Capture {
    id: String,
}

impl OrderResponse {
    fn approval_url(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|l| l.rel == "approve" || l.rel == "payer-action")
            .map(|l| l.href.as_str())
    }

    fn capture_id(&self) -> Option<&str> {
        self.purchase_units
            .iter()
            .filter_map(|u| u.payments.as_ref())
            .flat_map(|p| p.captures.iter())
            .map(|c| c.id.as_str())
            .next()
    }
}

/// PayPal REST API client.
#[derive(Clone)]
pub struct PayPalClient {
    inner: Arc<PayPalClientInner>,
}

struct PayPalClientInner {
    client: reqwest::Client,
    config: PayPalConfig,
    /// In-memory token cache
    token: RwLock<Option<AccessToken>>,
}

impl PayPalClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &PayPalConfig) -> Result<Self, PaymentError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            inner: Arc::new(PayPalClientInner {
                client,
                config: config.clone(),
                token: RwLock::new(None),
            }),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{path}", self.inner.config.mode.api_base())
    }

    /// Get a valid access token, fetching a new one if needed.
    async fn access_token(&self) -> Result<SecretString, PaymentError> {
        let now = chrono::Utc::now().timestamp();

        if let Some(token) = self.inner.token.read().await.as_ref()
            && !token.is_expired(now)
        {
            return Ok(token.token.clone());
        }

        let mut guard = self.inner.token.write().await;
        // Another task may have refreshed while we waited for the lock
        if let Some(token) = guard.as_ref()
            && !token.is_expired(now)
        {
            return Ok(token.token.clone());
        }

        let token = self.fetch_token(now).await?;
        let secret = token.token.clone();
        *guard = Some(token);
        Ok(secret)
    }

    #[instrument(skip(self))]
    async fn fetch_token(&self, now: i64) -> Result<AccessToken, PaymentError> {
        let config = &self.inner.config;
        let response = self
            .inner
            .client
            .post(self.api_url("/v1/oauth2/token"))
            .basic_auth(&config.client_id, Some(config.client_secret.expose_secret()))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PaymentError::Authentication(format!(
                "HTTP {status}: {message}"
            )));
        }

        let body: TokenResponse = response.json().await?;
        tracing::debug!(expires_in = body.expires_in, "PayPal access token refreshed");

        Ok(AccessToken {
            token: SecretString::from(body.access_token),
            expires_at: now + body.expires_in,
        })
    }

    /// Create a `CAPTURE` intent order.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Api` if PayPal rejects the order.
    #[instrument(skip(self, request), fields(reference = %request.reference, amount = %request.amount))]
    pub async fn create_order(&self, request: &OrderRequest<'_>) -> Result<CreatedOrder, PaymentError> {
        let token = self.access_token().await?;
        let body = CreateOrderBody {
            intent: "CAPTURE",
            purchase_units: [PurchaseUnit {
                reference_id: request.reference,
                description: request.description,
                amount: Amount {
                    currency_code: request.amount.currency_code.code(),
                    value: request.amount.to_paypal_value(),
                },
            }],
            payment_source: PaymentSource {
                paypal: PayPalSource {
                    experience_context: ExperienceContext {
                        brand_name: "Pawdia AI",
                        user_action: "PAY_NOW",
                        shipping_preference: "NO_SHIPPING",
                        return_url: request.return_url,
                        cancel_url: request.cancel_url,
                    },
                },
            },
        };

        let response = self
            .inner
            .client
            .post(self.api_url("/v2/checkout/orders"))
            .bearer_auth(token.expose_secret())
            .json(&body)
            .send()
            .await?;

        let order = parse_order(response).await?;
        let approval_url = order
            .approval_url()
            .ok_or_else(|| PaymentError::MissingApprovalLink(order.id.clone()))?
            .to_owned();

        tracing::info!(paypal_order_id = %order.id, status = %order.status, "PayPal order created");

        Ok(CreatedOrder {
            paypal_order_id: order.id,
            approval_url,
        })
    }

    /// Capture payment for an approved order.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Api` if PayPal rejects the capture.
    #[instrument(skip(self))]
    pub async fn capture_order(&self, paypal_order_id: &str) -> Result<CapturedOrder, PaymentError> {
        let token = self.access_token().await?;
        let response = self
            .inner
            .client
            .post(self.api_url(&format!("/v2/checkout/orders/{paypal_order_id}/capture")))
            .bearer_auth(token.expose_secret())
            .header("PayPal-Request-Id", format!("capture-{paypal_order_id}"))
            .json(&serde_json::json!({}))
            .send()
            .await?;

        let order = parse_order(response).await?;
        let captured = CapturedOrder {
            capture_id: order.capture_id().map(str::to_owned),
            status: order.status,
        };

        if captured.is_completed() && captured.capture_id.is_none() {
            return Err(PaymentError::MissingCapture(paypal_order_id.to_owned()));
        }

        tracing::info!(status = %captured.status, "PayPal order captured");
        Ok(captured)
    }
}

async fn parse_order(response: reqwest::Response) -> Result<OrderResponse, PaymentError> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(PaymentError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response.json().await?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_token_expiry_buffer() {
        let token = AccessToken {
            token: SecretString::from("t"),
            expires_at: 1_000,
        };
        assert!(!token.is_expired(900));
        assert!(token.is_expired(940));
        assert!(token.is_expired(1_000));
    }

    #[test]
    fn test_parse_created_order_links() {
        let json = r#"{
            "id": "5O190127TN364715T",
            "status": "PAYER_ACTION_REQUIRED",
            "links": [
                {"href": "https://api-m.paypal.com/v2/checkout/orders/5O190127TN364715T", "rel": "self", "method": "GET"},
                {"href": "https://www.paypal.com/checkoutnow?token=5O190127TN364715T", "rel": "payer-action", "method": "GET"}
            ]
        }"#;
        let order: OrderResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            order.approval_url(),
            Some("https://www.paypal.com/checkoutnow?token=5O190127TN364715T")
        );
        assert_eq!(order.capture_id(), None);
    }

    #[test]
    fn test_parse_capture_response() {
        let json = r#"{
            "id": "5O190127TN364715T",
            "status": "COMPLETED",
            "purchase_units": [{
                "reference_id": "42",
                "payments": {"captures": [{"id": "3C679366HH908993F", "status": "COMPLETED"}]}
            }]
        }"#;
        let order: OrderResponse = serde_json::from_str(json).unwrap();
        assert_eq!(order.capture_id(), Some("3C679366HH908993F"));

        let captured = CapturedOrder {
            status: order.status.clone(),
            capture_id: order.capture_id().map(str::to_owned),
        };
        assert!(captured.is_completed());
    }

    #[test]
    fn test_create_body_shape() {
        let body = CreateOrderBody {
            intent: "CAPTURE",
            purchase_units: [PurchaseUnit {
                reference_id: "42",
                description: "50 credits",
                amount: Amount {
                    currency_code: "USD",
                    value: "19.99".to_owned(),
                },
            }],
            payment_source: PaymentSource {
                paypal: PayPalSource {
                    experience_context: ExperienceContext {
                        brand_name: "Pawdia AI",
                        user_action: "PAY_NOW",
                        shipping_preference: "NO_SHIPPING",
                        return_url: "https://pawdia.ai/payment/success",
                        cancel_url: "https://pawdia.ai/payment/cancel",
                    },
                },
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["purchase_units"][0]["amount"]["value"], "19.99");
        assert_eq!(
            json["payment_source"]["paypal"]["experience_context"]["user_action"],
            "PAY_NOW"
        );
    }
}
