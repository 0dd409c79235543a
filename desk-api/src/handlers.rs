use axum::{
    extract::{Extension, Query},
    response::{IntoResponse, Json, Redirect, Response},
};
use chrono::Utc;
use desk_core::db::mask_database_url;
use desk_core::schema::{call_logs, tickets, users};
use desk_core::types::{Role, Scope, User};
use desk_core::DeskContext;
use desk_notify::NotificationService;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::auth::{self, authorize, AuthContext, AuthDecision};
use crate::error::ApiError;

const SIGNIN_PATH: &str = "/auth/signin";

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "desk-api"
    }))
}

#[derive(Deserialize)]
pub struct TokenRequest {
    pub user_id: Uuid,
    pub role: String,
    #[serde(default)]
    pub store_id: Option<Uuid>,
}

/// POST /api/v1/auth/token
///
/// Development stand-in for the upstream identity provider.
pub async fn issue_token(
    Extension(ctx): Extension<DeskContext>,
    Json(req): Json<TokenRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let role = Role::parse(&req.role).ok_or(ApiError::Unauthorized)?;
    let token = auth::generate_token(
        req.user_id,
        role,
        req.store_id,
        &ctx.config.server.jwt_secret,
        ctx.config.server.session_ttl_days,
    )
    .map_err(|e| ApiError::internal(e, ctx.config.server.environment))?;

    Ok(Json(serde_json::json!({ "token": token })))
}

#[derive(Deserialize)]
pub struct ScopeQuery {
    #[serde(default)]
    pub store_id: Option<Uuid>,
}

/// The scope a notification request operates on: the session's user, and
/// the store from the query string, falling back to the session's own
/// store scope.
fn request_scope(session: &AuthContext, params: &ScopeQuery) -> Scope {
    Scope::new(session.user_id, params.store_id.or(session.store_id))
}

/// GET /api/v1/notifications/unread-count?store_id=
pub async fn unread_count(
    Extension(ctx): Extension<DeskContext>,
    Extension(service): Extension<Arc<NotificationService>>,
    session: Option<Extension<AuthContext>>,
    Query(params): Query<ScopeQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = match authorize(session.as_deref(), None) {
        AuthDecision::Authorized(s) => s,
        _ => return Err(ApiError::Unauthorized),
    };

    let count = service
        .unread_count(request_scope(&session, &params))
        .await
        .map_err(|e| ApiError::internal(e, ctx.config.server.environment))?;

    Ok(Json(serde_json::json!({ "count": count })))
}

/// PATCH /api/v1/notifications/mark-all-read?store_id=
pub async fn mark_all_read(
    Extension(ctx): Extension<DeskContext>,
    Extension(service): Extension<Arc<NotificationService>>,
    session: Option<Extension<AuthContext>>,
    Query(params): Query<ScopeQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = match authorize(session.as_deref(), None) {
        AuthDecision::Authorized(s) => s,
        _ => return Err(ApiError::Unauthorized),
    };

    let count = service
        .mark_all_read(request_scope(&session, &params))
        .await
        .map_err(|e| ApiError::internal(e, ctx.config.server.environment))?;

    Ok(Json(serde_json::json!({ "success": true, "count": count })))
}

/// GET /api/v1/alerts/summary
///
/// Placeholder surface for the alerting dashboard: a stable shape with
/// zeroed counters until an alert source exists.
pub async fn alerts_summary(
    session: Option<Extension<AuthContext>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match authorize(session.as_deref(), None) {
        AuthDecision::Authorized(_) => Ok(Json(empty_alerts_summary())),
        _ => Err(ApiError::Unauthorized),
    }
}

fn empty_alerts_summary() -> serde_json::Value {
    serde_json::json!({
        "alerts": [],
        "counts": {
            "critical": 0,
            "warning": 0,
            "info": 0,
        },
        "generated_at": Utc::now(),
    })
}

/// GET /api/v1/users/me
///
/// Profile lookup for the session user. A session whose user row no
/// longer exists is sent back through sign-in rather than rendered.
pub async fn profile(
    Extension(ctx): Extension<DeskContext>,
    session: Option<Extension<AuthContext>>,
) -> Result<Response, ApiError> {
    let session = match authorize(session.as_deref(), None) {
        AuthDecision::Authorized(s) => s,
        _ => return Ok(Redirect::to(SIGNIN_PATH).into_response()),
    };

    let environment = ctx.config.server.environment;
    let mut conn = ctx
        .db_pool
        .get()
        .await
        .map_err(|e| ApiError::internal(e.into(), environment))?;

    let user: Option<User> = users::table
        .filter(users::id.eq(session.user_id))
        .select((
            users::id,
            users::name,
            users::email,
            users::phone,
            users::avatar_url,
            users::role,
            users::store_id,
            users::created_at,
        ))
        .first::<(
            Uuid,
            String,
            String,
            Option<String>,
            Option<String>,
            String,
            Option<Uuid>,
            chrono::DateTime<Utc>,
        )>(&mut conn)
        .await
        .optional()
        .map_err(|e| ApiError::internal(e.into(), environment))?
        .map(
            |(id, name, email, phone, avatar_url, role, store_id, created_at)| User {
                id,
                name,
                email,
                phone,
                avatar_url,
                role,
                store_id,
                created_at,
            },
        );

    match user {
        Some(user) => Ok(Json(user).into_response()),
        None => {
            tracing::debug!("Session user {} has no profile row", session.user_id);
            Ok(Redirect::to(SIGNIN_PATH).into_response())
        }
    }
}

/// GET /api/v1/admin/overview
///
/// Admin-only counters. Non-admin sessions go back through sign-in.
pub async fn admin_overview(
    Extension(ctx): Extension<DeskContext>,
    session: Option<Extension<AuthContext>>,
) -> Result<Response, ApiError> {
    match authorize(session.as_deref(), Some(Role::Admin)) {
        AuthDecision::Authorized(_) => {}
        _ => return Ok(Redirect::to(SIGNIN_PATH).into_response()),
    }

    let environment = ctx.config.server.environment;
    let mut conn = ctx
        .db_pool
        .get()
        .await
        .map_err(|e| ApiError::internal(e.into(), environment))?;

    let user_count: i64 = users::table
        .count()
        .get_result(&mut conn)
        .await
        .map_err(|e| ApiError::internal(e.into(), environment))?;

    let ticket_count: i64 = tickets::table
        .count()
        .get_result(&mut conn)
        .await
        .map_err(|e| ApiError::internal(e.into(), environment))?;

    let open_ticket_count: i64 = tickets::table
        .filter(tickets::status.eq("OPEN"))
        .count()
        .get_result(&mut conn)
        .await
        .map_err(|e| ApiError::internal(e.into(), environment))?;

    Ok(Json(serde_json::json!({
        "user_count": user_count,
        "ticket_count": ticket_count,
        "open_ticket_count": open_ticket_count,
    }))
    .into_response())
}

/// GET /api/debug/db-test
///
/// Connectivity probe: run two cheap counts, report timing and the
/// credential-masked connection URL. Failures come back as a 500 with a
/// hint instead of a bare error.
pub async fn db_test(Extension(ctx): Extension<DeskContext>) -> Response {
    let started = Instant::now();

    let result: anyhow::Result<(i64, i64)> = async {
        let mut conn = ctx.db_pool.get().await?;
        let user_count: i64 = users::table.count().get_result(&mut conn).await?;
        let call_log_count: i64 = call_logs::table.count().get_result(&mut conn).await?;
        Ok((user_count, call_log_count))
    }
    .await;

    match result {
        Ok((user_count, call_log_count)) => Json(serde_json::json!({
            "success": true,
            "message": "Database connection OK",
            "stats": {
                "user_count": user_count,
                "call_log_count": call_log_count,
                "response_time_ms": started.elapsed().as_millis() as u64,
            },
            "database_url": mask_database_url(&ctx.config.database.url),
        }))
        .into_response(),
        Err(e) => {
            tracing::error!("Database test failed: {:#}", e);
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "success": false,
                    "error": e.to_string(),
                    "hint": "Check DATABASE_URL (or the DB_* variables) and that Postgres is reachable",
                })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with_store(store_id: Option<Uuid>) -> AuthContext {
        AuthContext {
            user_id: Uuid::new_v4(),
            role: Role::Customer,
            store_id,
        }
    }

    #[test]
    fn query_store_wins_over_session_store() {
        let session_store = Uuid::new_v4();
        let query_store = Uuid::new_v4();
        let session = session_with_store(Some(session_store));

        let scope = request_scope(
            &session,
            &ScopeQuery {
                store_id: Some(query_store),
            },
        );
        assert_eq!(scope.store_id, Some(query_store));

        let scope = request_scope(&session, &ScopeQuery { store_id: None });
        assert_eq!(scope.store_id, Some(session_store));
    }

    #[test]
    fn unscoped_session_without_query_yields_total_scope() {
        let session = session_with_store(None);
        let scope = request_scope(&session, &ScopeQuery { store_id: None });
        assert_eq!(scope.store_id, None);
        assert_eq!(scope.user_id, session.user_id);
    }

    #[test]
    fn alerts_summary_shape_is_zeroed() {
        let summary = empty_alerts_summary();
        assert_eq!(summary["alerts"], serde_json::json!([]));
        assert_eq!(summary["counts"]["critical"], 0);
        assert_eq!(summary["counts"]["warning"], 0);
        assert_eq!(summary["counts"]["info"], 0);
        assert!(summary["generated_at"].is_string());
    }
}
