//! Identity provider adapter.
//!
//! The hosted identity service owns credentials and sessions; this module
//! wraps its REST surface behind the [`IdentityProvider`] capability trait
//! and ties it to the request's cookie set through [`RequestAuth`]. There
//! is no ambient "current session": each execution context builds its own
//! short-lived `RequestAuth` scoped to that request's cookies.

pub mod provider;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::session::{CookieMutations, CookieSet, Session};

pub use provider::HttpIdentityProvider;

/// Errors from the identity provider adapter
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("code or token exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// The authenticated caller, as reported by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: Option<String>,
}

/// Closed set of one-time token types accepted for hash verification.
/// Anything outside this set is rejected before the provider is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpType {
    MagicLink,
    Recovery,
    Invite,
    EmailChange,
}

impl OtpType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "magiclink" => Some(Self::MagicLink),
            "recovery" => Some(Self::Recovery),
            "invite" => Some(Self::Invite),
            "email_change" => Some(Self::EmailChange),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MagicLink => "magiclink",
            Self::Recovery => "recovery",
            Self::Invite => "invite",
            Self::EmailChange => "email_change",
        }
    }
}

/// Capability interface over the hosted identity service.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError>;

    /// Sends a one-time login email; no session is created yet.
    async fn sign_in_with_one_time_link(
        &self,
        email: &str,
        redirect_to: &str,
    ) -> Result<(), AuthError>;

    async fn exchange_code_for_session(&self, code: &str) -> Result<Session, AuthError>;

    async fn verify_one_time_token(
        &self,
        otp_type: OtpType,
        token_hash: &str,
    ) -> Result<Session, AuthError>;

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, AuthError>;

    /// `Ok(None)` means the token was rejected (expired or revoked).
    async fn get_user(&self, access_token: &str) -> Result<Option<Identity>, AuthError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError>;
}

/// Per-request authentication state: the inbound cookie set, the provider,
/// and the cookie mutations accumulated while resolving the caller.
pub struct RequestAuth<'a> {
    provider: &'a dyn IdentityProvider,
    cookies: CookieSet,
    mutations: CookieMutations,
}

impl<'a> RequestAuth<'a> {
    pub fn new(provider: &'a dyn IdentityProvider, cookies: CookieSet) -> Self {
        Self {
            provider,
            cookies,
            mutations: CookieMutations::new(),
        }
    }

    /// Resolve the current caller from the request's cookies.
    ///
    /// A session whose advertised expiry has passed is refreshed first; a
    /// token the provider rejects gets one refresh-and-retry. Either path
    /// records the replacement cookies. Provider transport failures are
    /// logged and treated as "no identity" so callers fall back to the
    /// login redirect instead of surfacing an error page.
    pub async fn current_user(&mut self) -> Option<(Identity, Session)> {
        let mut session = self.cookies.session()?;
        let mut refreshed = false;

        if session.is_expired(Utc::now()) {
            session = self.try_refresh(&session).await?;
            refreshed = true;
        }

        match self.provider.get_user(&session.access_token).await {
            Ok(Some(identity)) => Some((identity, session)),
            Ok(None) if !refreshed => {
                let session = self.try_refresh(&session).await?;
                match self.provider.get_user(&session.access_token).await {
                    Ok(Some(identity)) => Some((identity, session)),
                    Ok(None) => {
                        self.mutations.clear_session();
                        None
                    }
                    Err(e) => {
                        tracing::error!("user lookup failed after refresh: {}", e);
                        None
                    }
                }
            }
            Ok(None) => {
                self.mutations.clear_session();
                None
            }
            Err(e) => {
                tracing::error!("user lookup failed: {}", e);
                None
            }
        }
    }

    async fn try_refresh(&mut self, session: &Session) -> Option<Session> {
        match self.provider.refresh_session(&session.refresh_token).await {
            Ok(next) => {
                self.mutations.set_session(&next);
                Some(next)
            }
            Err(e) => {
                tracing::warn!("session refresh failed: {}", e);
                self.mutations.clear_session();
                None
            }
        }
    }

    /// Cookie writes to apply onto the outbound response.
    pub fn into_mutations(self) -> CookieMutations {
        self.mutations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeProvider {
        calls: AtomicUsize,
        accept_token: &'static str,
        refreshed: Option<Session>,
    }

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        async fn sign_in_with_password(&self, _: &str, _: &str) -> Result<Session, AuthError> {
            unimplemented!()
        }
        async fn sign_in_with_one_time_link(&self, _: &str, _: &str) -> Result<(), AuthError> {
            unimplemented!()
        }
        async fn exchange_code_for_session(&self, _: &str) -> Result<Session, AuthError> {
            unimplemented!()
        }
        async fn verify_one_time_token(&self, _: OtpType, _: &str) -> Result<Session, AuthError> {
            unimplemented!()
        }
        async fn refresh_session(&self, _: &str) -> Result<Session, AuthError> {
            self.refreshed.clone().ok_or(AuthError::InvalidCredentials)
        }
        async fn get_user(&self, access_token: &str) -> Result<Option<Identity>, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if access_token == self.accept_token {
                Ok(Some(Identity {
                    id: Uuid::new_v4(),
                    email: Some("demo@exemple.com".into()),
                }))
            } else {
                Ok(None)
            }
        }
        async fn sign_out(&self, _: &str) -> Result<(), AuthError> {
            Ok(())
        }
    }

    fn live_session(access: &str) -> Session {
        Session {
            access_token: access.into(),
            refresh_token: "rt".into(),
            expires_at: Utc.timestamp_opt(4_000_000_000, 0).unwrap(),
        }
    }

    fn cookies_for(session: &Session) -> CookieSet {
        let mut mutations = CookieMutations::new();
        mutations.set_session(session);
        let mut headers = HeaderMap::new();
        mutations.apply(&mut headers);
        let joined = headers
            .get_all(axum::http::header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().split(';').next().unwrap().to_string())
            .collect::<Vec<_>>()
            .join("; ");
        let mut request = HeaderMap::new();
        request.insert(
            axum::http::header::COOKIE,
            axum::http::HeaderValue::from_str(&joined).unwrap(),
        );
        CookieSet::from_headers(&request)
    }

    #[tokio::test]
    async fn no_cookies_resolves_to_none_without_provider_call() {
        let provider = FakeProvider {
            calls: AtomicUsize::new(0),
            accept_token: "at",
            refreshed: None,
        };
        let mut auth = RequestAuth::new(&provider, CookieSet::default());
        assert!(auth.current_user().await.is_none());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn valid_session_resolves_identity() {
        let provider = FakeProvider {
            calls: AtomicUsize::new(0),
            accept_token: "at",
            refreshed: None,
        };
        let session = live_session("at");
        let mut auth = RequestAuth::new(&provider, cookies_for(&session));
        let (identity, resolved) = auth.current_user().await.unwrap();
        assert_eq!(identity.email.as_deref(), Some("demo@exemple.com"));
        assert_eq!(resolved.access_token, "at");
        assert!(auth.into_mutations().is_empty());
    }

    #[tokio::test]
    async fn rejected_token_refreshes_once_and_records_new_cookies() {
        let provider = FakeProvider {
            calls: AtomicUsize::new(0),
            accept_token: "at-new",
            refreshed: Some(live_session("at-new")),
        };
        let mut auth = RequestAuth::new(&provider, cookies_for(&live_session("at-old")));
        let (_, resolved) = auth.current_user().await.unwrap();
        assert_eq!(resolved.access_token, "at-new");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert!(!auth.into_mutations().is_empty());
    }

    #[tokio::test]
    async fn failed_refresh_clears_cookies() {
        let provider = FakeProvider {
            calls: AtomicUsize::new(0),
            accept_token: "other",
            refreshed: None,
        };
        let mut auth = RequestAuth::new(&provider, cookies_for(&live_session("at")));
        assert!(auth.current_user().await.is_none());
        assert!(!auth.into_mutations().is_empty());
    }

    #[test]
    fn otp_type_accepts_only_the_closed_set() {
        assert_eq!(OtpType::parse("magiclink"), Some(OtpType::MagicLink));
        assert_eq!(OtpType::parse("recovery"), Some(OtpType::Recovery));
        assert_eq!(OtpType::parse("invite"), Some(OtpType::Invite));
        assert_eq!(OtpType::parse("email_change"), Some(OtpType::EmailChange));
        assert_eq!(OtpType::parse("signup"), None);
        assert_eq!(OtpType::parse("sms"), None);
        assert_eq!(OtpType::parse(""), None);
        assert_eq!(OtpType::parse("MAGICLINK"), None);
    }
}
