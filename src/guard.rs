//! Route guard.
//!
//! Runs before routing for every request; protected paths require a
//! resolved identity, everything else passes through untouched. An
//! unauthenticated caller is redirected to the login entry point with the
//! originally requested path (and query) preserved in `next`, so the
//! destination survives the login round trip.

use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::{Identity, RequestAuth};
use crate::backend;
use crate::config;
use crate::session::CookieSet;

/// Authenticated caller context injected into protected requests.
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub identity: Identity,
    /// Opaque access token forwarded to the record store for row access.
    pub access_token: String,
}

/// A path is protected iff it equals a configured prefix exactly or starts
/// with that prefix followed by `/`. Exact-prefix matching, not globs:
/// `/chargements-export` is not protected by `/chargements`.
pub fn is_protected(path: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|p| {
        path == p
            || path
                .strip_prefix(p.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

/// Open-redirect guard: a `next` value is honored only when it is
/// path-absolute (begins with `/`); anything else gets the fixed default
/// landing path. Applied both when capturing `next` and when echoing it
/// back later.
pub fn sanitize_next<'a>(raw: Option<&'a str>, default_next: &'a str) -> &'a str {
    match raw {
        Some(next) if next.starts_with('/') => next,
        _ => default_next,
    }
}

/// Plain `302 Found` redirect (axum's `Redirect` helpers only offer
/// 303/307/308).
pub fn found(location: &str) -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, location.to_string())],
    )
        .into_response()
}

/// `/login?next=<target>` with the target percent-encoded.
pub fn login_redirect(next: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("next", next)
        .finish();
    format!("/login?{}", query)
}

pub async fn route_guard(request: Request, next: Next) -> Response {
    let config = config::config();
    let path = request.uri().path().to_string();

    if !is_protected(&path, &config.protected_paths) {
        return next.run(request).await;
    }

    let provider = backend::identity_provider();
    let mut auth = RequestAuth::new(&provider, CookieSet::from_headers(request.headers()));

    match auth.current_user().await {
        Some((identity, session)) => {
            let mutations = auth.into_mutations();
            let mut request = request;
            request.extensions_mut().insert(CurrentUser {
                identity,
                access_token: session.access_token,
            });
            let mut response = next.run(request).await;
            // Token refreshes performed while resolving the caller must
            // reach the client even though the page itself succeeded.
            mutations.apply(response.headers_mut());
            response
        }
        None => {
            let mutations = auth.into_mutations();
            let original = match request.uri().query() {
                Some(query) => format!("{}?{}", path, query),
                None => path,
            };
            let mut response = found(&login_redirect(&original));
            mutations.apply(response.headers_mut());
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefixes() -> Vec<String> {
        vec!["/chargements".into(), "/nouveau-chargement".into()]
    }

    #[test]
    fn exact_prefix_and_subpaths_are_protected() {
        let p = prefixes();
        assert!(is_protected("/chargements", &p));
        assert!(is_protected("/chargements/42/edit", &p));
        assert!(is_protected("/nouveau-chargement", &p));
    }

    #[test]
    fn lookalike_paths_are_not_protected() {
        let p = prefixes();
        assert!(!is_protected("/chargements-export", &p));
        assert!(!is_protected("/nouveau-chargement2", &p));
        assert!(!is_protected("/login", &p));
        assert!(!is_protected("/", &p));
    }

    #[test]
    fn next_must_be_path_absolute() {
        let default = "/chargements";
        assert_eq!(sanitize_next(Some("/chargements/9/edit"), default), "/chargements/9/edit");
        assert_eq!(sanitize_next(Some("https://evil.example"), default), default);
        assert_eq!(sanitize_next(Some("chargements"), default), default);
        assert_eq!(sanitize_next(Some(""), default), default);
        assert_eq!(sanitize_next(None, default), default);
    }

    #[test]
    fn login_redirect_preserves_path_and_query() {
        assert_eq!(
            login_redirect("/chargements/9/edit?tab=lignes"),
            "/login?next=%2Fchargements%2F9%2Fedit%3Ftab%3Dlignes"
        );
    }
}
