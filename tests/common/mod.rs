// ABOUTME: Shared helpers for integration tests
// ABOUTME: Drives the router in-process via tower::ServiceExt::oneshot
//
// SPDX-License-Identifier: MIT OR Apache-2.0

#![allow(dead_code)]

use std::collections::HashMap;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, Response};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;
use url::Url;

use oidc_provider_mock::config::ServerConfig;
use oidc_provider_mock::server::build_app;

pub const ISSUER: &str = "http://127.0.0.1:9400";

/// Build a router with a fixed issuer for in-process requests.
pub fn app(config: ServerConfig) -> Router {
    let (app, _state) = build_app(config, ISSUER.to_owned()).expect("app construction");
    app
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.expect("infallible")
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request");
    send(app, request).await
}

pub async fn get_bearer(app: &Router, uri: &str, token: &str) -> Response<Body> {
    let request = Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .expect("request");
    send(app, request).await
}

pub async fn post_form(
    app: &Router,
    uri: &str,
    fields: &[(&str, &str)],
    authorization: Option<&str>,
) -> Response<Body> {
    let body = serde_urlencoded::to_string(fields).expect("encode form");
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(authorization) = authorization {
        builder = builder.header(header::AUTHORIZATION, authorization);
    }
    send(app, builder.body(Body::from(body)).expect("request")).await
}

pub async fn post_json(app: &Router, uri: &str, body: &Value) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request");
    send(app, request).await
}

pub async fn put_json(app: &Router, uri: &str, body: &Value) -> Response<Body> {
    let request = Request::builder()
        .method("PUT")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request");
    send(app, request).await
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("JSON body")
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    String::from_utf8(bytes.to_vec()).expect("UTF-8 body")
}

/// Parse the Location header of a redirect response.
pub fn location(response: &Response<Body>) -> Url {
    let value = response
        .headers()
        .get(header::LOCATION)
        .expect("Location header")
        .to_str()
        .expect("ASCII location");
    Url::parse(value).expect("absolute redirect URL")
}

/// Query parameters of a URL as a map.
pub fn query_map(url: &Url) -> HashMap<String, String> {
    url.query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Run the consent form POST for an approval and return the response.
pub async fn approve(
    app: &Router,
    client_id: &str,
    redirect_uri: &str,
    scope: &str,
    sub: &str,
) -> Response<Body> {
    post_form(
        app,
        "/oauth2/authorize",
        &[
            ("response_type", "code"),
            ("client_id", client_id),
            ("redirect_uri", redirect_uri),
            ("scope", scope),
            ("state", "test-state"),
            ("sub", sub),
            ("action", "approve"),
        ],
        None,
    )
    .await
}

/// Obtain an authorization code through the full consent flow.
pub async fn obtain_code(
    app: &Router,
    client_id: &str,
    redirect_uri: &str,
    scope: &str,
    sub: &str,
) -> String {
    let response = approve(app, client_id, redirect_uri, scope, sub).await;
    assert_eq!(response.status(), axum::http::StatusCode::FOUND);
    let location = location(&response);
    query_map(&location)
        .remove("code")
        .expect("code in redirect")
}

/// Redeem an authorization code with POST-body client credentials.
pub async fn redeem_code(
    app: &Router,
    client_id: &str,
    redirect_uri: &str,
    code: &str,
) -> Response<Body> {
    post_form(
        app,
        "/oauth2/token",
        &[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", client_id),
        ],
        None,
    )
    .await
}

/// Decode ID token claims without verifying the signature.
pub fn decode_id_token(token: &str) -> Value {
    jsonwebtoken::dangerous::insecure_decode::<Value>(token)
        .expect("decode id_token")
        .claims
}
