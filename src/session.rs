//! Session cookie bridge.
//!
//! Translates between an inbound request's cookie set and the outbound
//! response's `Set-Cookie` headers. The session itself is an opaque
//! access/refresh token pair owned by the identity provider; this module
//! only materializes it as named cookies and never inspects the tokens.
//!
//! The same bridge serves all three execution contexts: the auth callback
//! endpoint, view handlers, and the route-guard middleware. Each context
//! builds a fresh [`CookieSet`] from the request and collects whatever
//! mutations the identity adapter asks for in a [`CookieMutations`], then
//! applies them onto its own response.

use axum::http::{header, HeaderMap, HeaderValue};
use chrono::{DateTime, TimeZone, Utc};
use cookie::{Cookie, SameSite};
use std::collections::HashMap;

pub const ACCESS_COOKIE: &str = "fret-access-token";
pub const REFRESH_COOKIE: &str = "fret-refresh-token";
pub const EXPIRES_COOKIE: &str = "fret-expires-at";

/// Opaque session token pair plus its advertised expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Read-only snapshot of the cookies on an inbound request, parsed once.
#[derive(Debug, Default, Clone)]
pub struct CookieSet {
    values: HashMap<String, String>,
}

impl CookieSet {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut values = HashMap::new();
        for raw in headers.get_all(header::COOKIE) {
            let Ok(raw) = raw.to_str() else { continue };
            for piece in Cookie::split_parse_encoded(raw.to_string()).flatten() {
                values.insert(piece.name().to_string(), piece.value().to_string());
            }
        }
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Reassemble the session from its cookie materialization. Returns
    /// `None` unless both tokens and a parseable expiry are present.
    pub fn session(&self) -> Option<Session> {
        let access_token = self.get(ACCESS_COOKIE)?.to_string();
        let refresh_token = self.get(REFRESH_COOKIE)?.to_string();
        let expires_at = self
            .get(EXPIRES_COOKIE)
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())?;
        Some(Session {
            access_token,
            refresh_token,
            expires_at,
        })
    }
}

/// Cookie writes requested by the identity adapter during a request:
/// refreshed tokens to set, or stale tokens to clear. Applied onto the
/// outbound response whichever way the request resolves.
#[derive(Debug, Default)]
pub struct CookieMutations {
    pending: Vec<Cookie<'static>>,
}

impl CookieMutations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Materialize a session as the three named cookies.
    pub fn set_session(&mut self, session: &Session) {
        self.set(ACCESS_COOKIE, session.access_token.clone());
        self.set(REFRESH_COOKIE, session.refresh_token.clone());
        self.set(EXPIRES_COOKIE, session.expires_at.timestamp().to_string());
    }

    /// Expire all session cookies on the client.
    pub fn clear_session(&mut self) {
        for name in [ACCESS_COOKIE, REFRESH_COOKIE, EXPIRES_COOKIE] {
            let mut cookie = Self::base_cookie(name, String::new());
            cookie.set_max_age(cookie::time::Duration::ZERO);
            self.pending.push(cookie);
        }
    }

    fn set(&mut self, name: &'static str, value: String) {
        self.pending.push(Self::base_cookie(name, value));
    }

    fn base_cookie(name: &'static str, value: String) -> Cookie<'static> {
        let mut cookie = Cookie::new(name, value);
        cookie.set_path("/");
        cookie.set_http_only(true);
        cookie.set_same_site(SameSite::Lax);
        cookie
    }

    /// Append the accumulated mutations as `Set-Cookie` headers.
    pub fn apply(&self, headers: &mut HeaderMap) {
        for cookie in &self.pending {
            if let Ok(value) = HeaderValue::from_str(&cookie.encoded().to_string()) {
                headers.append(header::SET_COOKIE, value);
            }
        }
    }
}
