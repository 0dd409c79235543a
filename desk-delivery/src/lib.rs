pub mod email;

pub use email::EmailDelivery;
