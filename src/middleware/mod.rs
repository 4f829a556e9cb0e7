//! HTTP middleware components.
//!
//! Middleware are functions that run before route handlers.
//! They can:
//! - Authenticate requests
//! - Identify the client for rate limiting
//! - Short-circuit requests (reject unauthorized)

/// Bearer credential authentication middleware
pub mod auth;
/// Client key extractor for rate limiting
pub mod client_ip;
