//! Routing, middleware and error-shape tests through the full router.
//!
//! The database is unreachable and every optional integration is disabled,
//! so these cover the paths that must answer before touching either.
//! Anything behind a valid token needs the account row and lives in
//! `database.rs`.

use axum::{
    body::Body,
    http::{StatusCode, header},
};
use pawdia_integration_tests::{authed, json_request, request, send, send_to, test_app};
use serde_json::json;

// ============================================================================
// Health & Middleware
// ============================================================================

#[tokio::test]
async fn test_health_is_ok() {
    let resp = send(request("GET", "/health").body(Body::empty()).unwrap()).await;
    assert_eq!(resp.status, StatusCode::OK);
}

#[tokio::test]
async fn test_readiness_fails_without_database() {
    let resp = send(request("GET", "/health/ready").body(Body::empty()).unwrap()).await;
    assert_eq!(resp.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_security_headers_and_request_id() {
    let resp = send(
        request("GET", "/health")
            .header("x-request-id", "edge-1234")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(resp.headers.get("x-request-id").unwrap(), "edge-1234");
    assert_eq!(resp.headers.get(header::X_FRAME_OPTIONS).unwrap(), "DENY");
    assert_eq!(
        resp.headers.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(),
        "nosniff"
    );
    assert!(
        resp.headers
            .get(header::CONTENT_SECURITY_POLICY)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("default-src 'none'")
    );
}

#[tokio::test]
async fn test_malformed_request_id_is_replaced() {
    let resp = send(
        request("GET", "/health")
            .header("x-request-id", "not a valid id!")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    let id = resp.headers.get("x-request-id").unwrap().to_str().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());
}

#[tokio::test]
async fn test_cors_preflight_allows_frontend() {
    let resp = send(
        request("OPTIONS", "/api/auth/login")
            .header(header::ORIGIN, "http://localhost:5173")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(
        resp.headers
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "http://localhost:5173"
    );
}

#[tokio::test]
async fn test_cors_rejects_unknown_origin() {
    let resp = send(
        request("OPTIONS", "/api/auth/login")
            .header(header::ORIGIN, "https://evil.example")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert!(
        resp.headers
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none()
    );
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let resp = send(
        request("GET", "/api/users/profile")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.body["success"], false);
    assert!(resp.body["message"].is_string());
}

#[tokio::test]
async fn test_forged_token_is_unauthorized() {
    let resp = send(authed("GET", "/api/users/credits", "eyJhbGciOiJIUzI1NiJ9.e30.bad")).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_rejects_invalid_email() {
    let resp = send(json_request(
        "POST",
        "/api/auth/register",
        None,
        &json!({"name": "Rex", "email": "not-an-email", "password": "correct-horse-battery"}),
    ))
    .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.body["success"], false);
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let req = request("POST", "/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let resp = send(req).await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.body["success"], false);
}

#[tokio::test]
async fn test_auth_routes_are_rate_limited() {
    let app = test_app();
    let mut statuses = Vec::new();
    for _ in 0..8 {
        let resp = send_to(
            app.clone(),
            json_request("POST", "/api/auth/login", None, &json!({})),
        )
        .await;
        statuses.push(resp.status);
    }

    assert!(statuses.contains(&StatusCode::TOO_MANY_REQUESTS));
}

// ============================================================================
// Static Offers
// ============================================================================

#[tokio::test]
async fn test_subscription_plans_are_public() {
    let resp = send(
        request("GET", "/api/subscriptions/plans")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["success"], true);
    let plans = resp.body["plans"].as_array().unwrap();
    assert_eq!(plans.len(), 2);
    assert!(plans.iter().all(|p| p["monthlyCredits"].as_u64().unwrap() > 0));
}

#[tokio::test]
async fn test_credit_packs_are_listed() {
    let resp = send(
        request("GET", "/api/payments/credit-packs")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(resp.status, StatusCode::OK);
    let packs = resp.body["creditPacks"].as_array().unwrap();
    assert_eq!(packs.len(), 3);
    assert_eq!(packs.first().unwrap()["id"], "small");
}

#[tokio::test]
async fn test_generation_styles_are_listed() {
    let resp = send(
        request("GET", "/api/generate/styles")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(resp.status, StatusCode::OK);
    let styles = resp.body["styles"].as_array().unwrap();
    assert!(styles.iter().any(|s| s == "oil-painting"));
}
