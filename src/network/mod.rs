//! Connections, credentials and the client cache.

pub mod auth;
pub mod cache;
pub mod client;
pub mod connection;

pub use auth::{Authentication, SecretSource, StaticSecrets, TokenMinter};
pub use cache::ClientCache;
pub use client::{Client, VersionInfo};
pub use connection::{Connection, HttpConnectionFactory, Response};
