//! Shared HTTP plumbing for the hosted backend.
//!
//! One process-wide `reqwest::Client` (connection pooling); adapters are
//! built per request on top of it, scoped to that request's session.

use once_cell::sync::Lazy;
use std::time::Duration;

use crate::auth::HttpIdentityProvider;
use crate::config;
use crate::store::HttpRecordStore;

static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .expect("failed to build HTTP client")
});

pub fn http_client() -> reqwest::Client {
    HTTP_CLIENT.clone()
}

/// Identity provider adapter for the current request.
pub fn identity_provider() -> HttpIdentityProvider {
    HttpIdentityProvider::new(http_client(), config::config())
}

/// Record store adapter scoped to the caller's access token; the anonymous
/// key is used when no session exists.
pub fn record_store(access_token: Option<&str>) -> HttpRecordStore {
    HttpRecordStore::new(http_client(), config::config(), access_token)
}
