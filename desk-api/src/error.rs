use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use desk_core::Environment;
use thiserror::Error;

/// Error taxonomy at the HTTP boundary. Services below this layer return
/// `anyhow::Result`; handlers convert once, here, and nothing retries.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Server configuration error: {0}")]
    Config(&'static str),
    #[error("Internal server error")]
    Internal { details: Option<String> },
}

impl ApiError {
    /// Wrap a downstream failure. The underlying message is carried as a
    /// response `details` field only in development builds; production
    /// responses stay generic.
    pub fn internal(err: anyhow::Error, environment: Environment) -> Self {
        tracing::error!("Request failed: {:#}", err);
        ApiError::Internal {
            details: environment
                .is_development()
                .then(|| format!("{:#}", err)),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Internal { details: Some(d) } => serde_json::json!({
                "error": self.to_string(),
                "details": d,
            }),
            _ => serde_json::json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound("ticket").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Config("INTERNAL_API_KEY is not set").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unauthorized_renders_the_literal_error_body() {
        assert_eq!(ApiError::Unauthorized.to_string(), "Unauthorized");
    }

    #[test]
    fn details_are_development_only() {
        let dev = ApiError::internal(anyhow!("connection refused"), Environment::Development);
        match dev {
            ApiError::Internal { details: Some(d) } => assert!(d.contains("connection refused")),
            other => panic!("expected details in development, got {:?}", other),
        }

        let prod = ApiError::internal(anyhow!("connection refused"), Environment::Production);
        match prod {
            ApiError::Internal { details: None } => {}
            other => panic!("expected no details in production, got {:?}", other),
        }
    }
}
