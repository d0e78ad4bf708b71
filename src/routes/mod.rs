use crate::config::rate_limit::{RateLimitConfig, RateLimitRule};
use crate::handlers;
use crate::middleware::auth::auth_middleware;
use crate::utils::image::MAX_IMAGE_BYTES;
use crate::websocket;
use axum::{extract::DefaultBodyLimit, middleware, routing, Router};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

/// Room for a maximum-size image plus the other multipart fields. Anything
/// larger is cut off before it is buffered.
const MULTIPART_BODY_LIMIT: usize = MAX_IMAGE_BYTES + 1024 * 1024;

pub fn create_routes() -> Router {
    Router::new()
        .nest("/api/v1", api_routes())
        // Change feed (auth handled inside the handler via query token or cookie)
        .route("/ws", routing::get(websocket::feed::ws_handler))
}

fn api_routes() -> Router {
    let rate_limit_config = RateLimitConfig::from_env();

    let auth = auth_routes(&rate_limit_config);
    let protected = read_routes(&rate_limit_config)
        .merge(write_routes(&rate_limit_config))
        .layer(middleware::from_fn(auth_middleware));

    auth.merge(protected)
}

/// Signup and login.
fn auth_routes(config: &RateLimitConfig) -> Router {
    let router = Router::new()
        .route("/auth/signup", routing::post(handlers::signup))
        .route("/auth/login", routing::post(handlers::login));

    with_optional_rate_limit(router, config.enabled, config.auth)
}

/// Authenticated reads: listings, map, current profile.
fn read_routes(config: &RateLimitConfig) -> Router {
    let router = Router::new()
        .route("/auth/me", routing::get(handlers::me))
        .route(
            "/complaints/mine",
            routing::get(handlers::complaint::my_complaints),
        )
        .route(
            "/complaints/nearby",
            routing::get(handlers::complaint::nearby_complaints),
        )
        .route(
            "/complaints/{id}",
            routing::get(handlers::complaint::get_complaint),
        )
        .route("/map/markers", routing::get(handlers::map::map_markers));

    with_optional_rate_limit(router, config.enabled, config.read)
}

/// Authenticated writes: filing, accepting, proofs, approvals, previews.
fn write_routes(config: &RateLimitConfig) -> Router {
    let router = Router::new()
        .route("/auth/logout", routing::post(handlers::logout))
        .route(
            "/complaints",
            routing::post(handlers::complaint::submit_complaint)
                .get(handlers::complaint::list_complaints),
        )
        .route(
            "/complaints/{id}/accept",
            routing::post(handlers::complaint::accept_complaint),
        )
        .route(
            "/complaints/{id}/completion",
            routing::post(handlers::complaint::upload_completion),
        )
        .route(
            "/complaints/{id}/approve",
            routing::post(handlers::complaint::approve_completion),
        )
        .route(
            "/uploads/preview",
            routing::post(handlers::upload::preview_image),
        )
        .layer(DefaultBodyLimit::max(MULTIPART_BODY_LIMIT));

    with_optional_rate_limit(router, config.enabled, config.write)
}

fn with_optional_rate_limit(router: Router, enabled: bool, rule: RateLimitRule) -> Router {
    if !enabled {
        return router;
    }

    match GovernorConfigBuilder::default()
        .per_second(rule.per_second)
        .burst_size(rule.burst_size)
        .finish()
    {
        Some(governor_conf) => router.layer(GovernorLayer::new(governor_conf)),
        None => {
            tracing::warn!("Invalid rate limit rule {:?}, serving without a limit", rule);
            router
        }
    }
}
