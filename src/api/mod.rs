//! API layer - HTTP handlers and routing
//!
//! This module contains all HTTP API endpoints of the slide server.
//! It includes:
//! - Auth endpoints (register, login, logout, home summary)
//! - Folder and slide database endpoints
//! - Slide viewer endpoints (Deep Zoom descriptor, tiles, annotations)
//! - Tag, lecture folder, lecture and annotation endpoints
//! - Staff administration endpoints

pub mod admin;
pub mod annotations;
pub mod auth;
pub mod common;
pub mod folders;
pub mod lecture_folders;
pub mod lectures;
pub mod middleware;
pub mod slides;
pub mod tags;
pub mod viewer;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::get,
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub use middleware::{ApiError, AppState, AuthenticatedUser};

/// Build the main API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    let upload_limit = usize::try_from(state.media_config.max_upload_size).unwrap_or(usize::MAX);

    // Staff routes
    let admin_routes = Router::new()
        .nest("/admin", admin::router())
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Signed-in routes; model permissions are checked by the services
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .nest("/folders", folders::router())
        .route("/database", get(folders::browse))
        .nest(
            "/slides",
            slides::router().layer(DefaultBodyLimit::max(upload_limit)),
        )
        .nest("/viewer", viewer::router())
        .nest("/tags", tags::router())
        .nest("/lecture-folders", lecture_folders::router())
        .route("/lecture-database", get(lecture_folders::browse))
        .nest("/lectures", lectures::router())
        .nest("/annotations", annotations::router())
        .route("/groups", get(admin::list_groups))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Public routes
    Router::new()
        .nest("/auth", auth::public_router())
        .merge(admin_routes)
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    let origin = cors_origin.parse::<HeaderValue>().unwrap_or_else(|_| {
        tracing::warn!("Invalid CORS origin '{}', falling back to localhost", cors_origin);
        HeaderValue::from_static("http://localhost:3000")
    });
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);

    Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
