pub mod config;
pub mod error;
pub mod identity;
pub mod issuer;
pub mod server;
