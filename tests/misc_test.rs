// ABOUTME: Tests for discovery, JWKS, the landing page, and user management
// ABOUTME: Everything outside the core authorization flow
//
// SPDX-License-Identifier: MIT OR Apache-2.0

mod common;

use axum::http::StatusCode;
use serde_json::json;

use oidc_provider_mock::config::ServerConfig;

use common::{app, body_json, body_text, get, put_json, ISSUER};

#[tokio::test]
async fn discovery_document_names_all_endpoints() {
    let app = app(ServerConfig::default());
    let response = get(&app, "/.well-known/openid-configuration").await;

    assert_eq!(response.status(), StatusCode::OK);
    let document = body_json(response).await;
    assert_eq!(document["issuer"], ISSUER);
    assert_eq!(
        document["authorization_endpoint"],
        format!("{ISSUER}/oauth2/authorize")
    );
    assert_eq!(document["token_endpoint"], format!("{ISSUER}/oauth2/token"));
    assert_eq!(document["userinfo_endpoint"], format!("{ISSUER}/userinfo"));
    assert_eq!(document["jwks_uri"], format!("{ISSUER}/jwks"));
    assert_eq!(
        document["registration_endpoint"],
        format!("{ISSUER}/oauth2/clients")
    );
    assert_eq!(document["response_types_supported"], json!(["code"]));
    assert_eq!(
        document["grant_types_supported"],
        json!(["authorization_code", "refresh_token"])
    );
    assert_eq!(
        document["id_token_signing_alg_values_supported"],
        json!(["RS256"])
    );
    assert!(document["scopes_supported"]
        .as_array()
        .expect("scopes_supported")
        .contains(&json!("openid")));
}

#[tokio::test]
async fn jwks_serves_the_signing_key() {
    let app = app(ServerConfig::default());
    let response = get(&app, "/jwks").await;

    assert_eq!(response.status(), StatusCode::OK);
    let jwks = body_json(response).await;
    let keys = jwks["keys"].as_array().expect("keys array");
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0]["kty"], "RSA");
    assert_eq!(keys[0]["alg"], "RS256");
    assert_eq!(keys[0]["use"], "sig");
    assert_eq!(keys[0]["e"], "AQAB");
    assert!(keys[0]["kid"].is_string());
}

#[tokio::test]
async fn home_page_links_to_discovery() {
    let app = app(ServerConfig::default());
    let response = get(&app, "/").await;

    assert_eq!(response.status(), StatusCode::OK);
    let page = body_text(response).await;
    assert!(page.contains("/.well-known/openid-configuration"));
    assert!(page.contains(ISSUER));
}

#[tokio::test]
async fn put_user_replaces_the_whole_record() {
    let app = app(ServerConfig::default());

    let first = put_json(&app, "/users/alice", &json!({"name": "Alice"})).await;
    assert_eq!(first.status(), StatusCode::NO_CONTENT);

    let second = put_json(&app, "/users/alice", &json!({"email": "a@example.com"})).await;
    assert_eq!(second.status(), StatusCode::NO_CONTENT);

    let code = common::obtain_code(&app, "client-1", "https://rp.example/cb", "openid profile email", "alice").await;
    let tokens = body_json(
        common::redeem_code(&app, "client-1", "https://rp.example/cb", &code).await,
    )
    .await;
    let userinfo = body_json(
        common::get_bearer(
            &app,
            "/userinfo",
            tokens["access_token"].as_str().expect("access_token"),
        )
        .await,
    )
    .await;

    // The first write was overwritten, not merged.
    assert!(userinfo.get("name").is_none());
    assert_eq!(userinfo["email"], "a@example.com");
}

#[tokio::test]
async fn put_user_rejects_non_object_bodies() {
    let app = app(ServerConfig::default());
    let response = put_json(&app, "/users/alice", &json!(["not", "an", "object"])).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_request");
}

#[tokio::test]
async fn put_user_rejects_conflicting_sub_claim() {
    let app = app(ServerConfig::default());
    let response = put_json(&app, "/users/alice", &json!({"sub": "bob"})).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_request");
}
