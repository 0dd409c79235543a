pub mod config;
pub mod context;
pub mod db;
pub mod redis;
pub mod schema;
pub mod types;

pub use config::{Config, Environment};
pub use context::DeskContext;
pub use db::DbPool;
pub use redis::RedisPool;
pub use types::{Role, Scope};
