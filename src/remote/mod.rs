// ABOUTME: Remote admin API access - HTTP client, wire models and credentials
// ABOUTME: Adapters receive a ready-to-use authenticated client from here

pub mod client;
pub mod models;
pub mod token;

pub use client::{AdminClient, DEFAULT_REQUEST_TIMEOUT};
pub use models::RemoteProduct;
pub use token::{resolve_token, AdminTokenService, TokenStore};
