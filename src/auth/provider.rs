//! REST implementation of the identity provider capability.
//!
//! Speaks the hosted auth service's token endpoints: password grant,
//! one-time email links, token-hash verification, refresh, user lookup and
//! logout. Every call carries the public `apikey` header; calls acting on
//! behalf of a session additionally send the opaque access token as a
//! bearer credential.

use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use crate::config::AppConfig;
use crate::session::Session;

use super::{AuthError, Identity, IdentityProvider, OtpType};

#[derive(Clone)]
pub struct HttpIdentityProvider {
    http: reqwest::Client,
    config: &'static AppConfig,
}

/// Token payload returned by the provider's session-granting endpoints.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    /// Absolute expiry (unix seconds); some deployments only send
    /// `expires_in`, so both are accepted.
    expires_at: Option<i64>,
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .unwrap_or_else(|| Utc::now() + Duration::seconds(self.expires_in.unwrap_or(3600)));
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    #[serde(alias = "error_description", alias = "msg")]
    message: Option<String>,
}

impl HttpIdentityProvider {
    pub fn new(http: reqwest::Client, config: &'static AppConfig) -> Self {
        Self { http, config }
    }

    async fn session_request(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: serde_json::Value,
    ) -> Result<Session, AuthError> {
        let response = self
            .http
            .post(self.config.auth_endpoint(path))
            .query(query)
            .header("apikey", &self.config.anon_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let token: TokenResponse = response.json().await?;
            return Ok(token.into_session());
        }

        let message = Self::error_message(response).await;
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            if message.contains("Invalid login credentials") {
                return Err(AuthError::InvalidCredentials);
            }
            return Err(AuthError::ExchangeFailed(message));
        }
        Err(AuthError::Provider {
            status: status.as_u16(),
            message,
        })
    }

    async fn error_message(response: reqwest::Response) -> String {
        match response.json::<ProviderErrorBody>().await {
            Ok(body) => body.message.unwrap_or_else(|| "unknown error".to_string()),
            Err(_) => "unknown error".to_string(),
        }
    }
}

#[async_trait::async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        self.session_request(
            "token",
            &[("grant_type", "password")],
            json!({ "email": email, "password": password }),
        )
        .await
    }

    async fn sign_in_with_one_time_link(
        &self,
        email: &str,
        redirect_to: &str,
    ) -> Result<(), AuthError> {
        let response = self
            .http
            .post(self.config.auth_endpoint("otp"))
            .query(&[("redirect_to", redirect_to)])
            .header("apikey", &self.config.anon_key)
            .json(&json!({ "email": email, "create_user": false }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(AuthError::Provider {
            status: status.as_u16(),
            message: Self::error_message(response).await,
        })
    }

    async fn exchange_code_for_session(&self, code: &str) -> Result<Session, AuthError> {
        self.session_request(
            "token",
            &[("grant_type", "pkce")],
            json!({ "auth_code": code }),
        )
        .await
    }

    async fn verify_one_time_token(
        &self,
        otp_type: OtpType,
        token_hash: &str,
    ) -> Result<Session, AuthError> {
        self.session_request(
            "verify",
            &[],
            json!({ "type": otp_type.as_str(), "token_hash": token_hash }),
        )
        .await
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, AuthError> {
        self.session_request(
            "token",
            &[("grant_type", "refresh_token")],
            json!({ "refresh_token": refresh_token }),
        )
        .await
    }

    async fn get_user(&self, access_token: &str) -> Result<Option<Identity>, AuthError> {
        let response = self
            .http
            .get(self.config.auth_endpoint("user"))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let identity: Identity = response.json().await?;
            return Ok(Some(identity));
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Ok(None);
        }
        Err(AuthError::Provider {
            status: status.as_u16(),
            message: Self::error_message(response).await,
        })
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        let response = self
            .http
            .post(self.config.auth_endpoint("logout"))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        // An already-dead session is fine; sign-out is best effort.
        let status = response.status();
        if status.is_success() || status == StatusCode::UNAUTHORIZED {
            return Ok(());
        }
        Err(AuthError::Provider {
            status: status.as_u16(),
            message: Self::error_message(response).await,
        })
    }
}
