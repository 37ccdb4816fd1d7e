use axum::{middleware, routing::get, Router};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod auth;
pub mod backend;
pub mod config;
pub mod error;
pub mod form;
pub mod guard;
pub mod handlers;
pub mod session;
pub mod store;

pub fn app() -> Router {
    Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        // Auth surface
        .merge(auth_routes())
        // Protected load views and mutations (enforced by the route guard)
        .merge(load_routes())
        // Global middleware; the guard runs before routing
        .layer(middleware::from_fn(guard::route_guard))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn auth_routes() -> Router {
    use axum::routing::post;
    use handlers::auth;

    Router::new()
        .route("/auth/callback", get(auth::callback))
        .route("/login", get(auth::login_view))
        .route("/auth/login", post(auth::password_login))
        .route("/auth/magic-link", post(auth::magic_link))
        .route("/auth/logout", post(auth::logout))
}

fn load_routes() -> Router {
    use axum::routing::put;
    use handlers::loads;

    Router::new()
        .route("/chargements", get(loads::list).post(loads::create))
        .route("/nouveau-chargement", get(loads::new_view))
        .route("/chargements/:id/edit", get(loads::edit_view))
        .route("/chargements/:id", put(loads::update).delete(loads::delete))
}

async fn root() -> axum::response::Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    axum::response::Json(json!({
        "success": true,
        "data": {
            "name": "Fret API",
            "version": version,
            "description": "Gestion des chargements (clients, transporteurs, produits)",
            "endpoints": {
                "home": "/ (public)",
                "login": "/login, /auth/login, /auth/magic-link, /auth/callback (public)",
                "chargements": "/chargements, /chargements/:id, /chargements/:id/edit (protected)",
                "nouveau": "/nouveau-chargement (protected)",
            }
        }
    }))
}

async fn health() -> impl axum::response::IntoResponse {
    use axum::http::StatusCode;

    let now = chrono::Utc::now();
    let config = config::config();

    // Ping the hosted record store; the app is useless without it.
    let reachable = backend::http_client()
        .get(config.rest_endpoint(""))
        .header("apikey", &config.anon_key)
        .send()
        .await
        .is_ok();

    if reachable {
        (
            StatusCode::OK,
            axum::response::Json(json!({
                "success": true,
                "data": { "status": "ok", "timestamp": now, "backend": "ok" }
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            axum::response::Json(json!({
                "success": false,
                "error": "backend unavailable",
                "data": { "status": "degraded", "timestamp": now }
            })),
        )
    }
}
