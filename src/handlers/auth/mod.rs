//! Authentication endpoints: the one-time-link callback exchange, password
//! and magic-link sign-in, and sign-out.

use axum::{
    extract::Query,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{AuthError, IdentityProvider, OtpType};
use crate::backend;
use crate::config;
use crate::error::ApiError;
use crate::guard::{found, login_redirect, sanitize_next};
use crate::session::{CookieMutations, CookieSet};

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub token_hash: Option<String>,
    #[serde(rename = "type")]
    pub otp_type: Option<String>,
    pub next: Option<String>,
}

/// Credential carried by the callback URL: either an authorization code or
/// a (token-hash, one-time-type) pair. An unrecognized `type` value means
/// no credential at all; the provider is never consulted for it.
#[derive(Debug, PartialEq, Eq)]
pub enum CallbackCredential {
    Code(String),
    TokenHash { otp_type: OtpType, token_hash: String },
}

impl CallbackCredential {
    pub fn from_query(query: &CallbackQuery) -> Option<Self> {
        if let Some(code) = query.code.as_deref().filter(|c| !c.is_empty()) {
            return Some(Self::Code(code.to_string()));
        }
        let token_hash = query.token_hash.as_deref().filter(|t| !t.is_empty())?;
        let otp_type = OtpType::parse(query.otp_type.as_deref()?)?;
        Some(Self::TokenHash {
            otp_type,
            token_hash: token_hash.to_string(),
        })
    }
}

/// GET /auth/callback - exchange the emailed credential for a session.
///
/// On success the session cookies are written and the caller is redirected
/// to the sanitized `next` path. On any failure the caller lands back on
/// the login page with `next` carried forward; the provider error never
/// reaches the URL.
pub async fn callback(Query(query): Query<CallbackQuery>) -> Response {
    let config = config::config();
    let safe_next = sanitize_next(query.next.as_deref(), &config.default_next).to_string();

    let provider = backend::identity_provider();
    let outcome = match CallbackCredential::from_query(&query) {
        Some(CallbackCredential::Code(code)) => provider.exchange_code_for_session(&code).await,
        Some(CallbackCredential::TokenHash {
            otp_type,
            token_hash,
        }) => provider.verify_one_time_token(otp_type, &token_hash).await,
        None => Err(AuthError::ExchangeFailed(
            "missing or unrecognized callback credential".to_string(),
        )),
    };

    match outcome {
        Ok(session) => {
            let mut mutations = CookieMutations::new();
            mutations.set_session(&session);
            let mut response = found(&safe_next);
            mutations.apply(response.headers_mut());
            response
        }
        Err(e) => {
            tracing::warn!("auth callback failed: {}", e);
            found(&login_redirect(&safe_next))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

/// GET /login - login view data; echoes the sanitized `next` target.
pub async fn login_view(Query(query): Query<NextQuery>) -> Json<Value> {
    let config = config::config();
    let safe_next = sanitize_next(query.next.as_deref(), &config.default_next);
    Json(json!({
        "success": true,
        "data": { "next": safe_next }
    }))
}

#[derive(Debug, Deserialize)]
pub struct PasswordLogin {
    pub email: String,
    pub password: String,
}

/// POST /auth/login - password sign-in; materializes the session cookies.
pub async fn password_login(
    Query(query): Query<NextQuery>,
    Json(body): Json<PasswordLogin>,
) -> Result<Response, ApiError> {
    let config = config::config();
    let safe_next = sanitize_next(query.next.as_deref(), &config.default_next).to_string();

    let email = body.email.trim().to_lowercase();
    if email.is_empty() || body.password.is_empty() {
        return Err(ApiError::bad_request("Email et mot de passe requis."));
    }

    let provider = backend::identity_provider();
    let session = provider.sign_in_with_password(&email, &body.password).await?;

    let mut mutations = CookieMutations::new();
    mutations.set_session(&session);
    let mut response = Json(json!({
        "success": true,
        "data": { "redirect": safe_next }
    }))
    .into_response();
    mutations.apply(response.headers_mut());
    Ok(response)
}

#[derive(Debug, Deserialize)]
pub struct MagicLinkRequest {
    pub email: String,
}

/// POST /auth/magic-link - send a one-time login email. No session yet;
/// the emailed link returns through /auth/callback with `next` preserved.
pub async fn magic_link(
    Query(query): Query<NextQuery>,
    Json(body): Json<MagicLinkRequest>,
) -> Result<Json<Value>, ApiError> {
    let config = config::config();
    let safe_next = sanitize_next(query.next.as_deref(), &config.default_next);

    let email = body.email.trim().to_lowercase();
    if email.is_empty() {
        return Err(ApiError::bad_request("Email requis."));
    }

    let next_param = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("next", safe_next)
        .finish();
    let redirect_to = format!("{}/auth/callback?{}", config.site_url, next_param);

    let provider = backend::identity_provider();
    provider.sign_in_with_one_time_link(&email, &redirect_to).await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "message": "Un lien de connexion a été envoyé. Vérifie ta boîte mail."
        }
    })))
}

/// POST /auth/logout - best-effort provider sign-out, then clear the
/// session cookies regardless.
pub async fn logout(headers: axum::http::HeaderMap) -> Response {
    let provider = backend::identity_provider();
    let cookies = CookieSet::from_headers(&headers);

    if let Some(session) = cookies.session() {
        if let Err(e) = provider.sign_out(&session.access_token).await {
            tracing::warn!("provider sign-out failed: {}", e);
        }
    }

    let mut mutations = CookieMutations::new();
    mutations.clear_session();

    let mut response = Json(json!({
        "success": true,
        "data": { "redirect": "/login" }
    }))
    .into_response();
    mutations.apply(response.headers_mut());
    response
}
