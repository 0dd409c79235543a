use anyhow::Result;
use axum::{
    extract::Extension,
    middleware,
    routing::{get, patch, post},
    Router,
};
use desk_core::DeskContext;
use desk_delivery::EmailDelivery;
use desk_notify::NotificationService;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing;

use crate::auth;
use crate::handlers;
use crate::internal;

pub async fn run(ctx: DeskContext) -> Result<()> {
    let api_port = ctx.config.server.api_port;
    let service = Arc::new(NotificationService::new(ctx.clone()));
    let delivery = Arc::new(EmailDelivery::new(&ctx.config.delivery)?);

    // Allow specific origins when CORS_ORIGINS is set, otherwise stay
    // permissive and warn.
    let cors_layer = if let Ok(origins) = env::var("CORS_ORIGINS") {
        let origin_list: Vec<&str> = origins.split(',').map(|s| s.trim()).collect();
        let mut cors = CorsLayer::new();
        for origin in origin_list {
            if let Ok(parsed) = origin.parse::<axum::http::HeaderValue>() {
                cors = cors.allow_origin(parsed);
            }
        }
        cors.allow_methods(Any)
            .allow_headers(Any)
            .allow_credentials(true)
    } else {
        tracing::warn!("CORS_ORIGINS not set, using permissive CORS. Set CORS_ORIGINS for production!");
        CorsLayer::permissive()
    };

    let internal_routes = Router::new()
        .route(
            "/tickets/:id/send-acknowledgment",
            post(internal::send_ticket_acknowledgment),
        )
        .route("/notifications", post(internal::ingest_notification))
        .route_layer(middleware::from_fn(internal::internal_gate));

    let app = Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/auth/token", post(handlers::issue_token))
        .route(
            "/api/v1/notifications/unread-count",
            get(handlers::unread_count),
        )
        .route(
            "/api/v1/notifications/mark-all-read",
            patch(handlers::mark_all_read),
        )
        .route("/api/v1/alerts/summary", get(handlers::alerts_summary))
        .route("/api/v1/users/me", get(handlers::profile))
        .route("/api/v1/admin/overview", get(handlers::admin_overview))
        .route("/api/debug/db-test", get(handlers::db_test))
        .nest("/api/internal", internal_routes)
        .layer(
            ServiceBuilder::new()
                .layer(Extension(ctx))
                .layer(Extension(service))
                .layer(Extension(delivery))
                .layer(middleware::from_fn(auth::session_middleware))
                .layer(cors_layer),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], api_port));
    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
