//! HTTP router assembly.

use std::time::Duration;

use axum::{
    Router,
    http::{HeaderValue, Method, StatusCode, header},
    middleware as axum_middleware,
    routing::{delete, get, post, put},
};
use tower::ServiceBuilder;
use tower_cookies::CookieManagerLayer;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::{config::Config, handlers, middleware, state::AppState};

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins()
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Build the full application router.
///
/// # Route groups
///
/// - Public: health, register/login/guest/refresh/logout, telemetry
/// - Authenticated (`require_auth`): profile, order placement
/// - Admin (`require_admin`): order fulfillment, user administration
pub fn build_router(state: AppState, config: &Config) -> Router {
    let public_routes = Router::new()
        .route("/api/health", get(handlers::health::health_check))
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/guest", post(handlers::auth::guest))
        .route("/api/auth/refresh", post(handlers::auth::refresh))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/stats", post(handlers::stats::log_event));

    let authenticated_routes = Router::new()
        .route("/api/auth/me", get(handlers::auth::me))
        .route("/api/orders", post(handlers::orders::create_order))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    let admin_routes = Router::new()
        .route("/api/orders/{id}", put(handlers::orders::update_order))
        .route("/api/users/{id}/admin", put(handlers::users::set_admin))
        .route("/api/users/{id}", delete(handlers::users::delete_user))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_admin,
        ));

    Router::new()
        .merge(public_routes)
        .merge(authenticated_routes)
        .merge(admin_routes)
        // Outermost first. A timed-out handler drops its open store transaction.
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(config))
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    Duration::from_secs(config.request_timeout_secs),
                ))
                .layer(CookieManagerLayer::new()),
        )
        .with_state(state)
}
