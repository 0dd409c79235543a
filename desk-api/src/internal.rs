use axum::{
    extract::{Extension, Path, Request},
    response::{Json, Response},
};
use chrono::Utc;
use desk_core::schema::{tickets, users};
use desk_core::DeskContext;
use desk_delivery::EmailDelivery;
use desk_notify::{CreateNotification, NotificationService};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use std::sync::Arc;
use tracing;
use uuid::Uuid;

use crate::error::ApiError;

const API_KEY_HEADER: &str = "x-internal-api-key";

/// Outcome of the shared-secret check. Plain equality, no timing-safe
/// comparison, no rotation.
#[derive(Debug, PartialEq, Eq)]
enum KeyCheck {
    Allowed,
    Unauthorized,
    Unconfigured,
}

fn check_api_key(configured: Option<&str>, presented: Option<&str>) -> KeyCheck {
    match configured {
        // Fail closed: an unset secret must never silently allow access.
        None => KeyCheck::Unconfigured,
        Some(expected) => match presented {
            Some(got) if got == expected => KeyCheck::Allowed,
            _ => KeyCheck::Unauthorized,
        },
    }
}

/// Gate for service-to-service routes: every request must present the
/// configured `INTERNAL_API_KEY` in the `x-internal-api-key` header.
pub async fn internal_gate(
    req: Request,
    next: axum::middleware::Next,
) -> Result<Response, ApiError> {
    let ctx = req
        .extensions()
        .get::<DeskContext>()
        .ok_or(ApiError::Config("request context is not installed"))?;

    let presented = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok());

    match check_api_key(ctx.config.internal.api_key.as_deref(), presented) {
        KeyCheck::Allowed => Ok(next.run(req).await),
        KeyCheck::Unauthorized => {
            tracing::warn!("Rejected internal request with bad or missing API key");
            Err(ApiError::Unauthorized)
        }
        KeyCheck::Unconfigured => {
            tracing::error!("INTERNAL_API_KEY is not configured; refusing internal request");
            Err(ApiError::Config("INTERNAL_API_KEY is not configured"))
        }
    }
}

/// POST /api/internal/tickets/:id/send-acknowledgment
///
/// Looks up the ticket and its customer, sends the acknowledgment email,
/// and stamps the ticket. Unknown tickets are a 404, not a silent success.
pub async fn send_ticket_acknowledgment(
    Extension(ctx): Extension<DeskContext>,
    Extension(delivery): Extension<Arc<EmailDelivery>>,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let environment = ctx.config.server.environment;
    let mut conn = ctx
        .db_pool
        .get()
        .await
        .map_err(|e| ApiError::internal(e.into(), environment))?;

    let ticket: Option<(Uuid, String, Uuid)> = tickets::table
        .filter(tickets::id.eq(ticket_id))
        .select((tickets::id, tickets::subject, tickets::customer_id))
        .first(&mut conn)
        .await
        .optional()
        .map_err(|e| ApiError::internal(e.into(), environment))?;

    let (ticket_id, subject, customer_id) = ticket.ok_or(ApiError::NotFound("ticket"))?;

    let customer: Option<(String, String)> = users::table
        .filter(users::id.eq(customer_id))
        .select((users::name, users::email))
        .first(&mut conn)
        .await
        .optional()
        .map_err(|e| ApiError::internal(e.into(), environment))?;

    let (name, email) = customer.ok_or(ApiError::NotFound("customer"))?;

    delivery
        .send_ticket_acknowledgment(&email, &name, ticket_id, &subject)
        .await
        .map_err(|e| ApiError::internal(e, environment))?;

    diesel::update(tickets::table)
        .filter(tickets::id.eq(ticket_id))
        .set(tickets::acknowledged_at.eq(Some(Utc::now())))
        .execute(&mut conn)
        .await
        .map_err(|e| ApiError::internal(e.into(), environment))?;

    tracing::info!("Acknowledgment sent for ticket {}", ticket_id);

    Ok(Json(serde_json::json!({ "success": true })))
}

/// POST /api/internal/notifications
///
/// Ingestion endpoint for external producers (ticketing jobs, call-log
/// importers). Stores the notification and bumps the unread counters.
pub async fn ingest_notification(
    Extension(ctx): Extension<DeskContext>,
    Extension(service): Extension<Arc<NotificationService>>,
    Json(req): Json<CreateNotification>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let environment = ctx.config.server.environment;
    let notification = service
        .create(req)
        .await
        .map_err(|e| ApiError::internal(e, environment))?;

    Ok(Json(serde_json::json!({
        "success": true,
        "id": notification.id,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_key_is_allowed() {
        assert_eq!(
            check_api_key(Some("sekrit"), Some("sekrit")),
            KeyCheck::Allowed
        );
    }

    #[test]
    fn absent_or_wrong_header_is_unauthorized() {
        assert_eq!(check_api_key(Some("sekrit"), None), KeyCheck::Unauthorized);
        assert_eq!(
            check_api_key(Some("sekrit"), Some("guess")),
            KeyCheck::Unauthorized
        );
        assert_eq!(
            check_api_key(Some("sekrit"), Some("")),
            KeyCheck::Unauthorized
        );
    }

    #[test]
    fn unconfigured_key_fails_closed_regardless_of_header() {
        assert_eq!(check_api_key(None, None), KeyCheck::Unconfigured);
        assert_eq!(check_api_key(None, Some("anything")), KeyCheck::Unconfigured);
    }
}
