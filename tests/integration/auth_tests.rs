//! Authentication integration tests.
//!
//! Tests verify:
//! - Anonymous access to public routes
//! - 401 for anonymous callers on owner routes
//! - 401 for malformed, expired or forged tokens on any route

use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::http::{header, Request, StatusCode};

use snap_vault::TokenAuth;

use super::test_utils::{json_body, TestApp, OWNER};

fn with_auth(uri: &str, value: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, value)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_public_routes_allow_anonymous() {
    let app = TestApp::new().await;
    let response = app.get("/v1/public/images", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_owner_routes_require_token() {
    let app = TestApp::new().await;
    let gallery = app.gallery(OWNER, false).await;

    let response = app
        .get(&format!("/v1/galleries/{}/images", gallery.id), None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = json_body(response).await;
    assert_eq!(body["status_code"], 401);
    assert_eq!(
        body["error"],
        "you must be authenticated to access this resource"
    );
}

#[tokio::test]
async fn test_valid_token_is_accepted() {
    let app = TestApp::new().await;
    let gallery = app.gallery(OWNER, false).await;

    let response = app
        .get(&format!("/v1/galleries/{}/images", gallery.id), Some(OWNER))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_forged_token_is_rejected_even_on_public_routes() {
    let app = TestApp::new().await;
    let forged = TokenAuth::new("some-other-secret").sign(OWNER, std::time::Duration::from_secs(60));

    let response = app
        .send(with_auth("/v1/public/images", &format!("Bearer {}", forged)))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        json_body(response).await["error"],
        "invalid or missing authentication token"
    );
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let app = TestApp::new().await;
    let past = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
        - 60;
    let expired = app.auth.sign_with_expiry(OWNER, past);

    let response = app
        .send(with_auth("/v1/images/1", &format!("Bearer {}", expired)))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_headers_are_rejected() {
    let app = TestApp::new().await;

    for value in ["Bearer", "Bearer not-a-token", "Basic dXNlcjpwYXNz", "Bearer 1.2"] {
        let response = app.send(with_auth("/v1/public/images", value)).await;
        assert_eq!(
            response.status(),
            StatusCode::UNAUTHORIZED,
            "header {:?} should be rejected",
            value
        );
    }
}
