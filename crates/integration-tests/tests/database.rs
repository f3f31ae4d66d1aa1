//! Ledger, checkout, verification and authorization against a real database.
//!
//! These tests require a `PostgreSQL` database reachable at `DATABASE_URL`.
//! Migrations are applied on connect and every test works on fresh accounts.
//!
//! Run with: `DATABASE_URL=... cargo test -p pawdia-integration-tests --test database -- --ignored`

use axum::{
    body::Body,
    http::{StatusCode, header},
};
use chrono::{Duration, Utc};
use pawdia_core::{CurrencyCode, OrderKind, OrderStatus, SubscriptionPlan, SubscriptionStatus};
use pawdia_integration_tests::{
    app_with, app_with_config, authed, create_user, database, json_request, request, send_to,
    test_config, token_for, token_for_user,
};
use pawdia_server::{
    config::AiConfig,
    db::{CreditLedger, CreditReason, NewOrder, OrderRepository, UserRepository, VerifyOutcome},
    models::{Order, OrderItem, User},
    services::{
        auth::AuthService,
        checkout::{CheckoutService, CreditPack},
        credits::{CreditError, CreditService},
    },
};
use secrecy::SecretString;
use serde_json::json;
use sqlx::PgPool;

async fn pending_order(pool: &PgPool, user: &User, kind: OrderKind) -> Order {
    let (name, total, credits, plan) = match kind {
        OrderKind::Subscription => {
            let plan = SubscriptionPlan::Basic;
            (
                plan.display_name().to_owned(),
                plan.price().amount,
                plan.monthly_credits(),
                Some(plan),
            )
        }
        _ => {
            let pack = CreditPack::Medium;
            (pack.label(), pack.price().amount, pack.credits(), None)
        }
    };

    OrderRepository::new(pool)
        .create(&NewOrder {
            user_id: user.id,
            kind,
            items: vec![OrderItem {
                product_id: None,
                name,
                size: None,
                price: total,
                quantity: 1,
            }],
            total_amount: total,
            currency: CurrencyCode::USD,
            credits_granted: credits,
            subscription_plan: plan,
        })
        .await
        .unwrap()
}

async fn balance(pool: &PgPool, user: &User) -> i32 {
    UserRepository::new(pool)
        .get_by_id(user.id)
        .await
        .unwrap()
        .unwrap()
        .credits
        .value()
}

// ============================================================================
// Authorization
// ============================================================================

#[tokio::test]
#[ignore = "Requires DATABASE_URL"]
async fn test_demoted_admin_loses_access_immediately() {
    let pool = database().await;
    let admin = create_user(&pool, 0, true).await;
    let token = token_for_user(&admin);

    let resp = send_to(app_with(pool.clone()), authed("GET", "/api/admin/stats", &token)).await;
    assert_eq!(resp.status, StatusCode::OK);

    UserRepository::new(&pool)
        .set_admin(admin.id, false)
        .await
        .unwrap();

    let resp = send_to(app_with(pool), authed("GET", "/api/admin/stats", &token)).await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore = "Requires DATABASE_URL"]
async fn test_deleted_account_token_is_unauthorized() {
    let pool = database().await;
    let user = create_user(&pool, 0, false).await;
    let token = token_for_user(&user);

    UserRepository::new(&pool).delete(user.id).await.unwrap();

    let resp = send_to(app_with(pool), authed("GET", "/api/users/profile", &token)).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore = "Requires DATABASE_URL"]
async fn test_admin_claim_for_unknown_account_is_unauthorized() {
    let pool = database().await;
    let resp = send_to(
        app_with(pool),
        authed("GET", "/api/admin/stats", &token_for(i32::MAX, true)),
    )
    .await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore = "Requires DATABASE_URL"]
async fn test_admin_routes_reject_regular_users() {
    let pool = database().await;
    let user = create_user(&pool, 0, false).await;

    let resp = send_to(
        app_with(pool),
        authed("GET", "/api/admin/stats", &token_for_user(&user)),
    )
    .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
    assert_eq!(resp.body["success"], false);
}

#[tokio::test]
#[ignore = "Requires DATABASE_URL"]
async fn test_admin_cannot_delete_or_demote_self() {
    let pool = database().await;
    let admin = create_user(&pool, 0, true).await;
    let token = token_for_user(&admin);
    let path = format!("/api/admin/users/{}", admin.id);

    let resp = send_to(app_with(pool.clone()), authed("DELETE", &path, &token)).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let resp = send_to(
        app_with(pool.clone()),
        json_request("PUT", &path, Some(&token), &json!({"isAdmin": false})),
    )
    .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let still_admin = UserRepository::new(&pool)
        .get_by_id(admin.id)
        .await
        .unwrap()
        .unwrap();
    assert!(still_admin.is_admin);
}

#[tokio::test]
#[ignore = "Requires DATABASE_URL"]
async fn test_admin_cannot_force_completion() {
    let pool = database().await;
    let admin = create_user(&pool, 0, true).await;
    let buyer = create_user(&pool, 0, false).await;
    let order = pending_order(&pool, &buyer, OrderKind::CreditPack).await;

    let resp = send_to(
        app_with(pool.clone()),
        json_request(
            "PUT",
            &format!("/api/admin/orders/{}/status", order.id),
            Some(&token_for_user(&admin)),
            &json!({"status": "COMPLETED"}),
        ),
    )
    .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(balance(&pool, &buyer).await, 0);
}

// ============================================================================
// Unconfigured Integrations
// ============================================================================

#[tokio::test]
#[ignore = "Requires DATABASE_URL"]
async fn test_unconfigured_integrations_are_unavailable() {
    let pool = database().await;
    let user = create_user(&pool, 5, false).await;
    let token = token_for_user(&user);

    for (path, body) in [
        ("/api/payments/create-order", json!({"creditPack": "small"})),
        ("/api/subscriptions/subscribe", json!({"plan": "pro"})),
        (
            "/api/generate",
            json!({"imageUrl": "https://res.cloudinary.com/demo/rex.jpg", "style": "royal"}),
        ),
    ] {
        let resp = send_to(
            app_with(pool.clone()),
            json_request("POST", path, Some(&token), &body),
        )
        .await;
        assert_eq!(resp.status, StatusCode::SERVICE_UNAVAILABLE, "{path}");
        assert_eq!(resp.body["success"], false);
    }

    let upload = request("POST", "/api/upload")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XBOUNDARY")
        .body(Body::from("--XBOUNDARY--\r\n"))
        .unwrap();
    let resp = send_to(app_with(pool.clone()), upload).await;
    assert_eq!(resp.status, StatusCode::SERVICE_UNAVAILABLE);

    // Nothing was charged on the way
    assert_eq!(balance(&pool, &user).await, 5);
}

// ============================================================================
// Credit Ledger
// ============================================================================

#[tokio::test]
#[ignore = "Requires DATABASE_URL"]
async fn test_concurrent_debits_never_overdraw() {
    let pool = database().await;
    let user = create_user(&pool, 5, false).await;

    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let pool = pool.clone();
            let user_id = user.id;
            tokio::spawn(async move {
                CreditService::new(&pool)
                    .spend(user_id, 1, CreditReason::Usage, None)
                    .await
            })
        })
        .collect();

    let mut spent = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => spent += 1,
            Err(CreditError::Insufficient { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(spent, 5);
    assert_eq!(balance(&pool, &user).await, 0);

    let usage = CreditLedger::new(&pool)
        .history(user.id, 100)
        .await
        .unwrap()
        .into_iter()
        .filter(|t| t.reason == CreditReason::Usage)
        .count();
    assert_eq!(usage, 5);
}

#[tokio::test]
#[ignore = "Requires DATABASE_URL"]
async fn test_failed_generation_is_refunded() {
    let pool = database().await;
    let user = create_user(&pool, 3, false).await;

    let mut config = test_config();
    config.ai = Some(AiConfig {
        base_url: "http://127.0.0.1:1/v1beta".to_owned(),
        api_key: SecretString::from("integration-test-key"),
        model: "test-model".to_owned(),
    });

    let resp = send_to(
        app_with_config(config, pool.clone()),
        json_request(
            "POST",
            "/api/generate",
            Some(&token_for_user(&user)),
            &json!({
                "imageUrl": "https://res.cloudinary.com/pawdia-missing/image/upload/rex.jpg",
                "style": "royal"
            }),
        ),
    )
    .await;
    assert!(
        resp.status == StatusCode::BAD_REQUEST || resp.status == StatusCode::BAD_GATEWAY,
        "unexpected status {}",
        resp.status
    );
    assert_eq!(balance(&pool, &user).await, 3);

    let reasons: Vec<_> = CreditLedger::new(&pool)
        .history(user.id, 100)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.reason)
        .collect();
    assert!(reasons.contains(&CreditReason::Generation));
    assert!(reasons.contains(&CreditReason::Refund));
}

// ============================================================================
// Checkout
// ============================================================================

#[tokio::test]
#[ignore = "Requires DATABASE_URL"]
async fn test_concurrent_fulfilment_grants_once() {
    let pool = database().await;
    let user = create_user(&pool, 0, false).await;
    let order = pending_order(&pool, &user, OrderKind::CreditPack).await;

    let checkout = CheckoutService::new(&pool);
    let (first, second) = tokio::join!(
        checkout.fulfil(order.id, "CAPTURE-1"),
        checkout.fulfil(order.id, "CAPTURE-1"),
    );
    let (first, second) = (first.unwrap(), second.unwrap());
    assert!(first.newly_completed ^ second.newly_completed);

    let again = checkout.fulfil(order.id, "CAPTURE-1").await.unwrap();
    assert!(!again.newly_completed);
    assert_eq!(again.order.status, OrderStatus::Completed);

    let pack = i32::try_from(CreditPack::Medium.credits()).unwrap();
    assert_eq!(balance(&pool, &user).await, pack);

    let reference = order.id.to_string();
    let purchases = CreditLedger::new(&pool)
        .history(user.id, 100)
        .await
        .unwrap()
        .into_iter()
        .filter(|t| t.reason == CreditReason::Purchase && t.reference.as_deref() == Some(&reference))
        .count();
    assert_eq!(purchases, 1);
}

#[tokio::test]
#[ignore = "Requires DATABASE_URL"]
async fn test_renewal_extends_from_current_expiry() {
    let pool = database().await;
    let user = create_user(&pool, 0, false).await;
    let checkout = CheckoutService::new(&pool);

    let before = Utc::now();
    for _ in 0..2 {
        let order = pending_order(&pool, &user, OrderKind::Subscription).await;
        assert!(checkout.fulfil(order.id, "CAPTURE").await.unwrap().newly_completed);
    }
    let after = Utc::now();

    let stored = UserRepository::new(&pool)
        .get_by_id(user.id)
        .await
        .unwrap()
        .unwrap();
    let expires = stored.subscription.expires_at.unwrap();
    assert_eq!(stored.subscription.status, SubscriptionStatus::Active);
    assert!(expires >= before + Duration::days(60));
    assert!(expires <= after + Duration::days(60));

    let monthly = i32::try_from(SubscriptionPlan::Basic.monthly_credits()).unwrap();
    assert_eq!(stored.credits.value(), monthly * 2);
}

#[tokio::test]
#[ignore = "Requires DATABASE_URL"]
async fn test_cancel_keeps_paid_period() {
    let pool = database().await;
    let user = create_user(&pool, 0, false).await;
    let order = pending_order(&pool, &user, OrderKind::Subscription).await;
    let paid = CheckoutService::new(&pool)
        .fulfil(order.id, "CAPTURE")
        .await
        .unwrap()
        .user
        .unwrap();
    let token = token_for_user(&user);

    let resp = send_to(
        app_with(pool.clone()),
        authed("POST", "/api/subscriptions/cancel", &token),
    )
    .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["subscription"]["status"], "cancelled");
    assert_eq!(resp.body["isActive"], true);

    let stored = UserRepository::new(&pool)
        .get_by_id(user.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.subscription.expires_at, paid.subscription.expires_at);

    let resp = send_to(app_with(pool), authed("POST", "/api/subscriptions/cancel", &token)).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Email Verification
// ============================================================================

#[tokio::test]
#[ignore = "Requires DATABASE_URL"]
async fn test_second_verification_click_is_already_verified() {
    let pool = database().await;
    let user = create_user(&pool, 0, false).await;
    let auth = AuthService::new(&pool);
    let link = auth.issue_verification(&user).await.unwrap();

    assert!(matches!(
        auth.verify_email(&link.token).await.unwrap(),
        VerifyOutcome::Verified(u) if u.is_verified
    ));
    assert!(matches!(
        auth.verify_email(&link.token).await.unwrap(),
        VerifyOutcome::AlreadyVerified(_)
    ));
    assert!(matches!(
        auth.verify_short_link(link.short_id.as_str()).await.unwrap(),
        VerifyOutcome::AlreadyVerified(_)
    ));

    let resp = send_to(
        app_with(pool),
        request("GET", &format!("/verify/{}", link.short_id))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(resp.status, StatusCode::OK);
}

#[tokio::test]
#[ignore = "Requires DATABASE_URL"]
async fn test_expired_short_link_still_reports_already_verified() {
    let pool = database().await;
    let user = create_user(&pool, 0, false).await;
    let auth = AuthService::new(&pool);
    let link = auth.issue_verification(&user).await.unwrap();
    auth.verify_email(&link.token).await.unwrap();

    sqlx::query("UPDATE short_links SET expires_at = NOW() - INTERVAL '1 day' WHERE id = $1")
        .bind(link.short_id.as_str())
        .execute(&pool)
        .await
        .unwrap();

    assert!(matches!(
        auth.verify_short_link(link.short_id.as_str()).await.unwrap(),
        VerifyOutcome::AlreadyVerified(_)
    ));
}

#[tokio::test]
#[ignore = "Requires DATABASE_URL"]
async fn test_expired_short_link_reports_expired() {
    let pool = database().await;
    let user = create_user(&pool, 0, false).await;
    let auth = AuthService::new(&pool);
    let link = auth.issue_verification(&user).await.unwrap();

    sqlx::query(
        "UPDATE users SET verification_token_expires_at = NOW() - INTERVAL '1 hour' WHERE id = $1",
    )
    .bind(user.id)
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query("UPDATE short_links SET expires_at = NOW() - INTERVAL '1 hour' WHERE id = $1")
        .bind(link.short_id.as_str())
        .execute(&pool)
        .await
        .unwrap();

    assert!(matches!(
        auth.verify_short_link(link.short_id.as_str()).await.unwrap(),
        VerifyOutcome::Expired
    ));
}
