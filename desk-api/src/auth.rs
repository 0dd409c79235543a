use axum::{
    extract::Request,
    http::header::AUTHORIZATION,
    response::Response,
};
use desk_core::types::Role;
use desk_core::DeskContext;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing;
use uuid::Uuid;

use crate::error::ApiError;

/// Session token claims.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_id: Option<Uuid>,
    pub exp: usize,
}

/// Verified session identity, inserted into request extensions by the
/// session middleware and consumed by handlers.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: Role,
    pub store_id: Option<Uuid>,
}

/// Outcome of an authorization check. Handlers match on this rather than
/// re-deriving status codes.
#[derive(Debug, Clone)]
pub enum AuthDecision {
    Authorized(AuthContext),
    Unauthenticated,
    Forbidden,
}

/// Check a (possibly absent) session against a required role. `None` for
/// `required_role` means any authenticated user.
pub fn authorize(session: Option<&AuthContext>, required_role: Option<Role>) -> AuthDecision {
    match session {
        None => AuthDecision::Unauthenticated,
        Some(ctx) => match required_role {
            Some(required) if ctx.role != required => AuthDecision::Forbidden,
            _ => AuthDecision::Authorized(ctx.clone()),
        },
    }
}

fn extract_token(auth_header: Option<&str>) -> Option<String> {
    auth_header?
        .strip_prefix("Bearer ")
        .map(|s| s.trim().to_string())
}

/// Issue a session token for a user.
pub fn generate_token(
    user_id: Uuid,
    role: Role,
    store_id: Option<Uuid>,
    secret: &str,
    ttl_days: u64,
) -> anyhow::Result<String> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)?
        .as_secs() as usize;
    let exp = now + (ttl_days * 24 * 60 * 60) as usize;

    let claims = Claims {
        sub: user_id,
        role: role.as_str().to_string(),
        store_id,
        exp,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?;
    Ok(token)
}

/// Verify a session token and produce the caller's identity.
pub fn verify_token(token: &str, secret: &str) -> Result<AuthContext, ApiError> {
    let decoding_key = DecodingKey::from_secret(secret.as_ref());
    let validation = Validation::default();

    match decode::<Claims>(token, &decoding_key, &validation) {
        Ok(token_data) => {
            let role = Role::parse(&token_data.claims.role).ok_or_else(|| {
                tracing::debug!("Session token carries unknown role: {}", token_data.claims.role);
                ApiError::Unauthorized
            })?;
            Ok(AuthContext {
                user_id: token_data.claims.sub,
                role,
                store_id: token_data.claims.store_id,
            })
        }
        Err(e) => {
            tracing::debug!("Session verification failed: {}", e);
            Err(ApiError::Unauthorized)
        }
    }
}

/// Paths served without a session: health, token issuance, the debug
/// endpoint, and internal routes (those carry their own API-key gate).
fn is_public_path(path: &str) -> bool {
    path == "/health"
        || path == "/api/v1/auth/token"
        || path.starts_with("/api/debug/")
        || path.starts_with("/api/internal/")
}

/// Session middleware. Rejects protected requests without a valid token;
/// otherwise inserts the verified `AuthContext` for handlers.
pub async fn session_middleware(
    mut req: Request,
    next: axum::middleware::Next,
) -> Result<Response, ApiError> {
    if is_public_path(req.uri().path()) {
        return Ok(next.run(req).await);
    }

    let auth_header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match extract_token(auth_header) {
        Some(t) => t,
        None => {
            tracing::debug!("Missing Authorization header");
            return Err(ApiError::Unauthorized);
        }
    };

    let ctx = req
        .extensions()
        .get::<DeskContext>()
        .ok_or(ApiError::Config("request context is not installed"))?;

    let session = verify_token(&token, &ctx.config.server.jwt_secret)?;

    tracing::debug!("Authenticated user: {}", session.user_id);
    req.extensions_mut().insert(session);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    fn session(role: Role) -> AuthContext {
        AuthContext {
            user_id: Uuid::new_v4(),
            role,
            store_id: None,
        }
    }

    #[test]
    fn token_round_trip_preserves_identity() {
        let user_id = Uuid::new_v4();
        let store_id = Some(Uuid::new_v4());

        let token = generate_token(user_id, Role::Agent, store_id, SECRET, 1).unwrap();
        let ctx = verify_token(&token, SECRET).unwrap();

        assert_eq!(ctx.user_id, user_id);
        assert_eq!(ctx.role, Role::Agent);
        assert_eq!(ctx.store_id, store_id);
    }

    #[test]
    fn wrong_secret_is_unauthorized() {
        let token = generate_token(Uuid::new_v4(), Role::Customer, None, SECRET, 1).unwrap();
        assert!(matches!(
            verify_token(&token, "other-secret"),
            Err(ApiError::Unauthorized)
        ));
    }

    #[test]
    fn garbage_token_is_unauthorized() {
        assert!(matches!(
            verify_token("not.a.token", SECRET),
            Err(ApiError::Unauthorized)
        ));
    }

    #[test]
    fn authorize_requires_a_session() {
        assert!(matches!(
            authorize(None, None),
            AuthDecision::Unauthenticated
        ));
        assert!(matches!(
            authorize(None, Some(Role::Admin)),
            AuthDecision::Unauthenticated
        ));
    }

    #[test]
    fn authorize_enforces_required_role() {
        let agent = session(Role::Agent);
        assert!(matches!(
            authorize(Some(&agent), Some(Role::Admin)),
            AuthDecision::Forbidden
        ));
        assert!(matches!(
            authorize(Some(&agent), None),
            AuthDecision::Authorized(_)
        ));

        let admin = session(Role::Admin);
        assert!(matches!(
            authorize(Some(&admin), Some(Role::Admin)),
            AuthDecision::Authorized(_)
        ));
    }

    #[test]
    fn bearer_extraction_tolerates_whitespace() {
        assert_eq!(extract_token(Some("Bearer abc ")), Some("abc".to_string()));
        assert_eq!(extract_token(Some("Basic abc")), None);
        assert_eq!(extract_token(None), None);
    }

    #[test]
    fn internal_and_debug_paths_skip_session_auth() {
        assert!(is_public_path("/health"));
        assert!(is_public_path("/api/debug/db-test"));
        assert!(is_public_path("/api/internal/notifications"));
        assert!(!is_public_path("/api/v1/notifications/unread-count"));
        assert!(!is_public_path("/api/v1/users/me"));
    }
}
