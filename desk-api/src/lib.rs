pub mod auth;
pub mod error;
pub mod handlers;
pub mod internal;
pub mod server;

pub use error::ApiError;
pub use server::run;
