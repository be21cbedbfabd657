//! End-to-end request flows through the full router.
//!
//! Run with: cargo test -p tee-studio-integration-tests

#![allow(clippy::unwrap_used)]

use axum::http::{Method, StatusCode};
use serde_json::json;

use tee_studio_api::config::TranslationPolicy;
use tee_studio_core::{Amount, UserId};
use tee_studio_integration_tests::{ADMIN_NOTIFY_EMAIL, PASSWORD, TestApp, shipping_address};

async fn user_id(app: &TestApp, token: &str) -> UserId {
    let me = app.request(Method::GET, "/auth/me", Some(token), None).await;
    assert_eq!(me.status, StatusCode::OK);
    UserId::new(i32::try_from(me.body["id"].as_i64().unwrap()).unwrap())
}

// ============================================================================
// Health & Auth
// ============================================================================

#[tokio::test]
async fn test_health_endpoints() {
    let app = TestApp::new();

    let live = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(live.status, StatusCode::OK);
    assert_eq!(live.body, json!("ok"));

    let ready = app.request(Method::GET, "/health/ready", None, None).await;
    assert_eq!(ready.status, StatusCode::OK);
}

#[tokio::test]
async fn test_signup_then_login_returns_same_user() {
    let app = TestApp::new();
    let token = app.signup("shopper@example.com").await;
    let id = user_id(&app, &token).await;

    let login = app
        .request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "shopper@example.com", "password": PASSWORD })),
        )
        .await;
    assert_eq!(login.status, StatusCode::OK);
    assert_eq!(login.body["user"]["id"].as_i64(), Some(i64::from(id.as_i32())));
    assert_eq!(login.body["user"]["is_admin"], json!(false));
}

#[tokio::test]
async fn test_duplicate_signup_conflicts() {
    let app = TestApp::new();
    app.signup("shopper@example.com").await;

    let again = app
        .request(
            Method::POST,
            "/auth/signup",
            None,
            Some(json!({ "email": "shopper@example.com", "password": "another password" })),
        )
        .await;
    assert_eq!(again.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = TestApp::new();

    for (method, uri) in [
        (Method::GET, "/cart"),
        (Method::GET, "/designs"),
        (Method::GET, "/orders"),
        (Method::POST, "/payment/test-flow"),
    ] {
        let response = app.request(method, uri, None, None).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED, "{uri}");
        assert!(response.body["error"].is_string(), "{uri}");
    }

    let forged = app
        .request(Method::GET, "/cart", Some("not.a.token"), None)
        .await;
    assert_eq!(forged.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_json_uses_error_shape() {
    let app = TestApp::new();
    let token = app.signup("shopper@example.com").await;

    let response = app
        .request(
            Method::POST,
            "/cart",
            Some(&token),
            Some(json!({ "design_id": "seven" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].is_string());
}

// ============================================================================
// Designs
// ============================================================================

#[tokio::test]
async fn test_empty_prompt_rejected_before_generation() {
    let app = TestApp::new();
    let token = app.signup("shopper@example.com").await;

    let response = app
        .request(
            Method::POST,
            "/designs/generate",
            Some(&token),
            Some(json!({ "prompt": "   " })),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.generator.call_count(), 0);
    assert!(app.artifacts.keys().is_empty());
}

#[tokio::test]
async fn test_generate_uses_translated_prompt() {
    let app = TestApp::new();
    let token = app.signup("shopper@example.com").await;
    app.translator.respond_with("a red fox under the moon");

    let response = app
        .request(
            Method::POST,
            "/designs/generate",
            Some(&token),
            Some(json!({ "prompt": "月の下の赤い狐", "scale": 1.5 })),
        )
        .await;

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["message"], json!("Design generated"));
    let design = &response.body["design"];
    assert_eq!(design["prompt"], json!("月の下の赤い狐"));
    assert_eq!(design["translated_prompt"], json!("a red fox under the moon"));
    assert_eq!(app.generator.prompts(), vec!["a red fox under the moon"]);
    assert_eq!(app.artifacts.keys().len(), 1);
}

#[tokio::test]
async fn test_translation_failure_policy() {
    let fallback = TestApp::new();
    let token = fallback.signup("shopper@example.com").await;
    fallback.translator.fail();
    let design_id = fallback.generate_design(&token, "猫").await;
    assert!(design_id > 0);
    assert_eq!(fallback.generator.prompts(), vec!["猫"]);

    let closed = TestApp::with_policy(TranslationPolicy::FailClosed);
    let token = closed.signup("shopper@example.com").await;
    closed.translator.fail();
    let response = closed
        .request(
            Method::POST,
            "/designs/generate",
            Some(&token),
            Some(json!({ "prompt": "猫" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert_eq!(closed.generator.call_count(), 0);
}

#[tokio::test]
async fn test_generator_failure_stores_nothing() {
    let app = TestApp::new();
    let token = app.signup("shopper@example.com").await;
    app.generator.fail();

    let response = app
        .request(
            Method::POST,
            "/designs/generate",
            Some(&token),
            Some(json!({ "prompt": "a lighthouse" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_GATEWAY);

    let designs = app.request(Method::GET, "/designs", Some(&token), None).await;
    assert_eq!(designs.body, json!([]));
}

#[tokio::test]
async fn test_designs_are_private() {
    let app = TestApp::new();
    let owner = app.signup("owner@example.com").await;
    let other = app.signup("other@example.com").await;
    let design_id = app.generate_design(&owner, "a lighthouse").await;

    let peek = app
        .request(
            Method::GET,
            &format!("/designs/{design_id}"),
            Some(&other),
            None,
        )
        .await;
    assert!(matches!(
        peek.status,
        StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
    ));

    let add = app.add_to_cart(&other, design_id, 1).await;
    assert_eq!(add.status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Cart & Checkout
// ============================================================================

#[tokio::test]
async fn test_cart_is_priced_canonically() {
    let app = TestApp::new();
    let token = app.signup("shopper@example.com").await;
    let design_id = app.generate_design(&token, "a lighthouse").await;

    let added = app.add_to_cart(&token, design_id, 2).await;
    assert_eq!(added.status, StatusCode::CREATED);
    let item_id = added.body["id"].as_i64().unwrap();

    let cart = app.request(Method::GET, "/cart", Some(&token), None).await;
    assert_eq!(cart.status, StatusCode::OK);
    assert_eq!(cart.body["total"], json!(6000));
    assert_eq!(cart.body["currency"], json!("jpy"));

    let updated = app
        .request(
            Method::PATCH,
            &format!("/cart/{item_id}"),
            Some(&token),
            Some(json!({ "quantity": 3 })),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);

    let intent = app
        .request(Method::POST, "/payment/create-intent", Some(&token), None)
        .await;
    assert_eq!(intent.status, StatusCode::OK);
    assert_eq!(intent.body["amount"], json!(9000));
    assert!(intent.body["client_secret"].is_string());

    let too_many = app
        .request(
            Method::PATCH,
            &format!("/cart/{item_id}"),
            Some(&token),
            Some(json!({ "quantity": 100 })),
        )
        .await;
    assert_eq!(too_many.status, StatusCode::BAD_REQUEST);

    let removed = app
        .request(
            Method::DELETE,
            &format!("/cart/{item_id}"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(removed.status, StatusCode::NO_CONTENT);

    let empty = app
        .request(Method::POST, "/payment/create-intent", Some(&token), None)
        .await;
    assert_eq!(empty.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_test_flow_places_order_and_notifies() {
    let app = TestApp::new();
    let token = app.signup("shopper@example.com").await;
    let design_id = app.generate_design(&token, "a lighthouse").await;
    app.add_to_cart(&token, design_id, 2).await;

    let placed = app
        .request(Method::POST, "/payment/test-flow", Some(&token), None)
        .await;
    assert_eq!(placed.status, StatusCode::OK, "{:?}", placed.body);
    assert_eq!(placed.body["message"], json!("Order placed"));
    assert_eq!(placed.body["order"]["total_amount"], json!(6000));
    assert_eq!(placed.body["order"]["status"], json!("processing"));

    let cart = app.request(Method::GET, "/cart", Some(&token), None).await;
    assert_eq!(cart.body["items"], json!([]));

    let orders = app.request(Method::GET, "/orders", Some(&token), None).await;
    assert_eq!(orders.body.as_array().unwrap().len(), 1);

    let sent = app.mailer.sent();
    assert!(!sent.is_empty());
    assert!(sent.iter().all(|email| email.to == ADMIN_NOTIFY_EMAIL));
}

#[tokio::test]
async fn test_test_flow_disabled_outside_test_mode() {
    let app = TestApp::new();
    let token = app.signup("shopper@example.com").await;
    let design_id = app.generate_design(&token, "a lighthouse").await;
    app.add_to_cart(&token, design_id, 1).await;
    app.payments.set_test_mode(false);

    let response = app
        .request(Method::POST, "/payment/test-flow", Some(&token), None)
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let cart = app.request(Method::GET, "/cart", Some(&token), None).await;
    assert_eq!(cart.body["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_confirm_is_idempotent_per_intent() {
    let app = TestApp::new();
    let token = app.signup("shopper@example.com").await;
    let id = user_id(&app, &token).await;
    let design_id = app.generate_design(&token, "a lighthouse").await;
    app.add_to_cart(&token, design_id, 1).await;
    let intent_id = app.payments.succeeded_intent(Amount::from_minor(3000), id);

    let body = json!({
        "payment_intent_id": intent_id,
        "shipping_address": shipping_address(),
    });

    let first = app
        .request(Method::POST, "/payment/confirm", Some(&token), Some(body.clone()))
        .await;
    assert_eq!(first.status, StatusCode::OK, "{:?}", first.body);
    assert_eq!(first.body["message"], json!("Order placed"));

    let second = app
        .request(Method::POST, "/payment/confirm", Some(&token), Some(body))
        .await;
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.body["message"], json!("Order already confirmed"));
    assert_eq!(second.body["order_id"], first.body["order_id"]);

    let orders = app.request(Method::GET, "/orders", Some(&token), None).await;
    assert_eq!(orders.body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_confirm_rejects_underpaid_intent() {
    let app = TestApp::new();
    let token = app.signup("shopper@example.com").await;
    let id = user_id(&app, &token).await;
    let design_id = app.generate_design(&token, "a lighthouse").await;
    app.add_to_cart(&token, design_id, 2).await;
    let intent_id = app.payments.succeeded_intent(Amount::from_minor(3000), id);

    let response = app
        .request(
            Method::POST,
            "/payment/confirm",
            Some(&token),
            Some(json!({
                "payment_intent_id": intent_id,
                "shipping_address": shipping_address(),
            })),
        )
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);

    let orders = app.request(Method::GET, "/orders", Some(&token), None).await;
    assert_eq!(orders.body, json!([]));
}

// ============================================================================
// Orders & Admin
// ============================================================================

#[tokio::test]
async fn test_orders_are_private_and_admin_moves_status() {
    let app = TestApp::new();
    let shopper = app.signup("shopper@example.com").await;
    let other = app.signup("other@example.com").await;
    let staff = app.signup("staff@example.com").await;

    let design_id = app.generate_design(&shopper, "a lighthouse").await;
    app.add_to_cart(&shopper, design_id, 1).await;
    let placed = app
        .request(Method::POST, "/payment/test-flow", Some(&shopper), None)
        .await;
    let order_id = placed.body["order_id"].as_i64().unwrap();

    let peek = app
        .request(Method::GET, &format!("/orders/{order_id}"), Some(&other), None)
        .await;
    assert_eq!(peek.status, StatusCode::FORBIDDEN);

    let status_uri = format!("/admin/orders/{order_id}/status");
    let not_admin = app
        .request(
            Method::PATCH,
            &status_uri,
            Some(&staff),
            Some(json!({ "status": "paid" })),
        )
        .await;
    assert_eq!(not_admin.status, StatusCode::FORBIDDEN);

    app.promote("staff@example.com").await;

    let paid = app
        .request(
            Method::PATCH,
            &status_uri,
            Some(&staff),
            Some(json!({ "status": "paid" })),
        )
        .await;
    assert_eq!(paid.status, StatusCode::OK, "{:?}", paid.body);

    let shipped = app
        .request(
            Method::PATCH,
            &status_uri,
            Some(&staff),
            Some(json!({ "status": "shipped", "tracking_number": "JP123456789" })),
        )
        .await;
    assert_eq!(shipped.status, StatusCode::OK);

    let backwards = app
        .request(
            Method::PATCH,
            &status_uri,
            Some(&staff),
            Some(json!({ "status": "processing" })),
        )
        .await;
    assert_eq!(backwards.status, StatusCode::CONFLICT);

    let order = app
        .request(Method::GET, &format!("/orders/{order_id}"), Some(&shopper), None)
        .await;
    assert_eq!(order.body["status"], json!("shipped"));
}

#[tokio::test]
async fn test_admin_test_email_checks_delivery() {
    let app = TestApp::new();
    let staff = app.signup("staff@example.com").await;

    let not_admin = app
        .request(Method::POST, "/admin/test-email", Some(&staff), None)
        .await;
    assert_eq!(not_admin.status, StatusCode::FORBIDDEN);
    assert!(app.mailer.sent().is_empty());

    app.promote("staff@example.com").await;

    let sent = app
        .request(Method::POST, "/admin/test-email", Some(&staff), None)
        .await;
    assert_eq!(sent.status, StatusCode::OK, "{:?}", sent.body);
    assert_eq!(sent.body["recipient"], ADMIN_NOTIFY_EMAIL);
    let mail = app.mailer.sent();
    assert_eq!(mail.len(), 1);
    assert_eq!(mail[0].to, ADMIN_NOTIFY_EMAIL);

    app.mailer.fail();
    let refused = app
        .request(Method::POST, "/admin/test-email", Some(&staff), None)
        .await;
    assert_eq!(refused.status, StatusCode::BAD_GATEWAY);
    assert_eq!(refused.body["error"], "Mail delivery failed");
}
