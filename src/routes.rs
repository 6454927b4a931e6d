// ABOUTME: HTTP surface of the mock identity provider
// ABOUTME: Axum router wiring discovery, authorization, token, and resource endpoints
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{get, post, put};
use axum::{Form, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::claims::{disclose, SUPPORTED_SCOPES};
use crate::config::ServerConfig;
use crate::jwks::SigningKey;
use crate::middleware::ResourceGuard;
use crate::models::{ClientAuthMethod, User};
use crate::oauth2::client_registration::ClientRegistry;
use crate::oauth2::flow::{append_query, AuthorizationFlow, AuthorizeError};
use crate::oauth2::models::{AuthorizeParams, ClientRegistrationRequest, OAuth2Error, TokenRequest};
use crate::oauth2::tokens::TokenIssuer;
use crate::storage::Storage;

/// Shared application state; cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub issuer: String,
    pub storage: Arc<Storage>,
    pub key: Arc<SigningKey>,
}

impl AppState {
    fn flow(&self) -> AuthorizationFlow {
        AuthorizationFlow::new(Arc::clone(&self.storage), self.config.clone())
    }

    fn token_issuer(&self) -> TokenIssuer {
        TokenIssuer::new(
            Arc::clone(&self.storage),
            self.config.clone(),
            Arc::clone(&self.key),
            self.issuer.clone(),
        )
    }

    fn registry(&self) -> ClientRegistry {
        ClientRegistry::new(
            Arc::clone(&self.storage),
            self.config.require_client_registration,
        )
    }
}

/// Build the full application router.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/.well-known/openid-configuration", get(discovery))
        .route("/jwks", get(jwks))
        .route("/oauth2/clients", post(register_client))
        .route("/register-client", post(register_client))
        .route("/oauth2/authorize", get(authorize_form).post(authorize_submit))
        .route("/oauth2/token", post(token))
        .route("/userinfo", get(userinfo).post(userinfo))
        .route("/users/:sub", put(put_user))
        .with_state(state)
}

/// Minimal HTML escaping for text interpolated into pages and forms.
fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// 302 redirect. Axum's `Redirect` helper answers 303 or 307; relying
/// parties under test expect the classic 302 of RFC 6749 examples.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_owned())]).into_response()
}

async fn home(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        "<!doctype html>\n<html>\n<head><title>OIDC provider mock</title></head>\n<body>\n\
         <h1>OIDC provider mock</h1>\n\
         <p>Issuer: <code>{issuer}</code></p>\n\
         <ul>\n\
         <li><a href=\"/.well-known/openid-configuration\">Discovery document</a></li>\n\
         <li><a href=\"/jwks\">JSON Web Key Set</a></li>\n\
         </ul>\n</body>\n</html>\n",
        issuer = escape_html(&state.issuer),
    ))
}

async fn discovery(State(state): State<AppState>) -> Json<Value> {
    let issuer = state.issuer.trim_end_matches('/');
    Json(json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{issuer}/oauth2/authorize"),
        "token_endpoint": format!("{issuer}/oauth2/token"),
        "userinfo_endpoint": format!("{issuer}/userinfo"),
        "jwks_uri": format!("{issuer}/jwks"),
        "registration_endpoint": format!("{issuer}/oauth2/clients"),
        "response_types_supported": ["code"],
        "grant_types_supported": ["authorization_code", "refresh_token"],
        "subject_types_supported": ["public"],
        "id_token_signing_alg_values_supported": ["RS256"],
        "scopes_supported": SUPPORTED_SCOPES,
        "token_endpoint_auth_methods_supported": [
            ClientAuthMethod::ClientSecretBasic.as_str(),
            ClientAuthMethod::ClientSecretPost.as_str(),
        ],
    }))
}

async fn jwks(State(state): State<AppState>) -> Response {
    Json(state.key.jwks()).into_response()
}

async fn register_client(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let request: ClientRegistrationRequest = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(e) => {
            return OAuth2Error::invalid_request(&format!("Malformed registration request: {e}"))
                .into_response();
        }
    };

    match state.registry().register(request) {
        Ok(response) => (StatusCode::CREATED, Json(response)).into_response(),
        Err(error) => error.into_response(),
    }
}

/// Render a local authorization error page or relay the error to the
/// client's redirect URI, depending on where validation failed.
fn authorize_error_response(error: AuthorizeError) -> Response {
    match error {
        AuthorizeError::Page { error, message } => (
            StatusCode::BAD_REQUEST,
            Html(format!(
                "<!doctype html>\n<html>\n<body>\n<h1>Error: {}</h1>\n<p>{}</p>\n</body>\n</html>\n",
                escape_html(&error),
                escape_html(&message),
            )),
        )
            .into_response(),
        AuthorizeError::Redirect {
            redirect_uri,
            error,
            description,
            state,
        } => {
            let mut params = vec![("error", error.as_str())];
            if let Some(description) = &description {
                params.push(("error_description", description.as_str()));
            }
            if let Some(state) = &state {
                params.push(("state", state.as_str()));
            }
            found(&append_query(&redirect_uri, &params))
        }
    }
}

fn hidden_input(name: &str, value: Option<&str>) -> String {
    value.map_or_else(String::new, |value| {
        format!(
            "<input type=\"hidden\" name=\"{name}\" value=\"{}\">\n",
            escape_html(value)
        )
    })
}

async fn authorize_form(
    State(state): State<AppState>,
    Query(params): Query<AuthorizeParams>,
) -> Response {
    let request = match state.flow().validate(&params) {
        Ok(request) => request,
        Err(error) => return authorize_error_response(error),
    };

    let mut form = String::from(
        "<!doctype html>\n<html>\n<head><title>Authorize</title></head>\n<body>\n\
         <h1>Authorization request</h1>\n",
    );
    form.push_str(&format!(
        "<p>Client <code>{}</code> requests scope <code>{}</code>.</p>\n",
        escape_html(&request.client.id),
        escape_html(&request.scope),
    ));
    form.push_str("<form method=\"post\" action=\"/oauth2/authorize\">\n");
    form.push_str(&hidden_input("response_type", params.response_type.as_deref()));
    form.push_str(&hidden_input("client_id", params.client_id.as_deref()));
    form.push_str(&hidden_input("redirect_uri", params.redirect_uri.as_deref()));
    form.push_str(&hidden_input("scope", params.scope.as_deref()));
    form.push_str(&hidden_input("state", params.state.as_deref()));
    form.push_str(&hidden_input("nonce", params.nonce.as_deref()));
    form.push_str(
        "<label>Subject <input type=\"text\" name=\"sub\" autofocus></label>\n\
         <button type=\"submit\" name=\"action\" value=\"approve\">Sign in</button>\n\
         <button type=\"submit\" name=\"action\" value=\"deny\">Deny</button>\n\
         </form>\n</body>\n</html>\n",
    );
    Html(form).into_response()
}

/// Form body of the consent page, echoing the authorization parameters.
#[derive(Debug, Deserialize)]
struct ConsentForm {
    response_type: Option<String>,
    client_id: Option<String>,
    redirect_uri: Option<String>,
    scope: Option<String>,
    state: Option<String>,
    nonce: Option<String>,
    sub: Option<String>,
    action: Option<String>,
}

impl ConsentForm {
    fn params(&self) -> AuthorizeParams {
        AuthorizeParams {
            response_type: self.response_type.clone(),
            client_id: self.client_id.clone(),
            redirect_uri: self.redirect_uri.clone(),
            scope: self.scope.clone(),
            state: self.state.clone(),
            nonce: self.nonce.clone(),
        }
    }
}

async fn authorize_submit(
    State(state): State<AppState>,
    Form(form): Form<ConsentForm>,
) -> Response {
    let flow = state.flow();
    let request = match flow.validate(&form.params()) {
        Ok(request) => request,
        Err(error) => return authorize_error_response(error),
    };

    match form.action.as_deref() {
        Some("deny") => found(&flow.deny(&request)),
        Some("approve") => {
            let Some(sub) = form.sub.as_deref().filter(|s| !s.is_empty()) else {
                return (
                    StatusCode::BAD_REQUEST,
                    Html(
                        "<!doctype html>\n<html>\n<body>\n<h1>Error: invalid_request</h1>\n\
                         <p>Missing 'sub' field</p>\n</body>\n</html>\n"
                            .to_owned(),
                    ),
                )
                    .into_response();
            };
            found(&flow.approve(&request, sub))
        }
        _ => (
            StatusCode::BAD_REQUEST,
            Html(
                "<!doctype html>\n<html>\n<body>\n<h1>Error: invalid_request</h1>\n\
                 <p>Missing 'action' field</p>\n</body>\n</html>\n"
                    .to_owned(),
            ),
        )
            .into_response(),
    }
}

async fn token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(body): Form<TokenRequest>,
) -> Response {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    match state.token_issuer().token(authorization, &body) {
        Ok(response) => Json(response).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn userinfo(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let token = match ResourceGuard::new(&state.storage).authenticate(&headers) {
        Ok(token) => token,
        Err(error) => return error.into_response(),
    };

    let user = state
        .storage
        .get_user(&token.sub)
        .unwrap_or_else(|| User::implicit(&token.sub));

    let mut body = disclose(&user.sub, &user.claims, &token.scope);
    for (name, value) in &user.userinfo {
        body.insert(name.clone(), value.clone());
    }
    Json(Value::Object(body)).into_response()
}

async fn put_user(
    State(state): State<AppState>,
    Path(sub): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let Value::Object(mut claims) = body else {
        return OAuth2Error::invalid_request("User claims must be a JSON object").into_response();
    };

    if let Some(body_sub) = claims.get("sub").and_then(Value::as_str) {
        if body_sub != sub {
            return OAuth2Error::invalid_request(
                "Claim 'sub' must match the subject in the request path",
            )
            .into_response();
        }
    }

    // A "userinfo" member holds free-form data returned from /userinfo
    // without scope filtering; everything else is a claim.
    let userinfo = match claims.remove("userinfo") {
        None => std::collections::HashMap::new(),
        Some(Value::Object(map)) => map.into_iter().collect(),
        Some(_) => {
            return OAuth2Error::invalid_request("'userinfo' must be a JSON object")
                .into_response();
        }
    };

    let user = User {
        sub: sub.clone(),
        claims: claims
            .into_iter()
            .filter(|(name, _)| name != "sub")
            .collect(),
        userinfo,
    };
    state.storage.store_user(user);
    info!(sub = %sub, "user record replaced");

    StatusCode::NO_CONTENT.into_response()
}
