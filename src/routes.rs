use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use http::{HeaderValue, Method, header};
use std::sync::Arc;
use std::time::Duration;
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{
    error::{AppError, Result},
    handlers, middleware_layer,
    state::AppState,
};

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
            HeaderValue::from_static("http://[::1]:3000"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .max_age(Duration::from_secs(86400))
}

/// Builds the `/api` router over `state`.
///
/// Login and scan are rate limited per client IP, so the router must be
/// served with `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn build_router(state: AppState) -> Result<Router> {
    let login_governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(2)
            .burst_size(30)
            .use_headers()
            .finish()
            .ok_or_else(|| AppError::Internal("Invalid login rate limit".to_string()))?,
    );

    let scan_governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(1)
            .burst_size(120)
            .use_headers()
            .finish()
            .ok_or_else(|| AppError::Internal("Invalid scan rate limit".to_string()))?,
    );

    let login_routes = Router::new()
        .route("/api/auth/login", post(handlers::auth::login))
        .layer(GovernorLayer::new(login_governor_conf))
        .with_state(state.clone());

    let token_routes = Router::new()
        .route("/api/auth/refresh", post(handlers::auth::refresh))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .with_state(state.clone());

    let scan_routes = Router::new()
        .route("/api/scan", post(handlers::scan::scan))
        .layer(GovernorLayer::new(scan_governor_conf))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_auth,
        ))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/sessions", get(handlers::sessions::list))
        .route("/api/sessions/open", post(handlers::sessions::open))
        .route("/api/sessions/active", get(handlers::sessions::active))
        .route("/api/sessions/{session_id}", get(handlers::sessions::view))
        .route("/api/sessions/{session_id}/close", post(handlers::sessions::close))
        .route("/api/sessions/{session_id}/rotate", post(handlers::sessions::rotate))
        .route("/api/sessions/{session_id}/records", get(handlers::sessions::records))
        .route("/api/sessions/{session_id}/summary", get(handlers::sessions::summary))
        .route("/api/records/mine", get(handlers::sessions::history))
        .route("/api/audit", get(handlers::audit::recent))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_auth,
        ))
        .with_state(state);

    Ok(Router::new()
        .merge(login_routes)
        .merge(token_routes)
        .merge(scan_routes)
        .merge(protected_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(cors()))
}
