use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub server: ServerConfig,
    pub internal: InternalConfig,
    pub delivery: DeliveryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub api_port: u16,
    pub jwt_secret: String,
    pub session_ttl_days: u64,
    pub environment: Environment,
}

/// Shared secret for service-to-service calls. `None` means the gate is
/// unconfigured and every internal request must fail closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalConfig {
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    pub resend_api_key: Option<String>,
    pub resend_from_email: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        let _ = dotenv::dotenv();

        Config {
            database: DatabaseConfig {
                url: database_url_from_env(),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL")
                    .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
                max_connections: env::var("REDIS_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
            },
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                api_port: env::var("API_PORT")
                    .or_else(|_| env::var("PORT"))
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .unwrap_or(8080),
                jwt_secret: env::var("JWT_SECRET")
                    .unwrap_or_else(|_| "your-secret-key-change-in-production".to_string()),
                session_ttl_days: env::var("SESSION_TTL_DAYS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
                environment: parse_environment(env::var("ENVIRONMENT").ok().as_deref()),
            },
            internal: InternalConfig {
                api_key: env::var("INTERNAL_API_KEY").ok().filter(|k| !k.is_empty()),
            },
            delivery: DeliveryConfig {
                resend_api_key: env::var("RESEND_API_KEY").ok(),
                resend_from_email: env::var("RESEND_FROM_EMAIL").ok(),
            },
        }
    }
}

/// `DATABASE_URL` wins; otherwise the URL is assembled from the discrete
/// `DB_*` variables, defaulting to a local development database.
fn database_url_from_env() -> String {
    if let Ok(url) = env::var("DATABASE_URL") {
        return url;
    }

    let host = env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string());
    let port = env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string());
    let user = env::var("DB_USER").unwrap_or_else(|_| "postgres".to_string());
    let password = env::var("DB_PASSWORD").unwrap_or_else(|_| "postgres".to_string());
    let name = env::var("DB_NAME").unwrap_or_else(|_| "desk".to_string());

    format!("postgres://{}:{}@{}:{}/{}", user, password, host, port, name)
}

fn parse_environment(raw: Option<&str>) -> Environment {
    match raw {
        Some(v) if v.eq_ignore_ascii_case("production") || v.eq_ignore_ascii_case("prod") => {
            Environment::Production
        }
        _ => Environment::Development,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parsing_defaults_to_development() {
        assert_eq!(parse_environment(None), Environment::Development);
        assert_eq!(parse_environment(Some("staging")), Environment::Development);
        assert_eq!(parse_environment(Some("production")), Environment::Production);
        assert_eq!(parse_environment(Some("PROD")), Environment::Production);
        assert!(parse_environment(Some("development")).is_development());
    }
}
