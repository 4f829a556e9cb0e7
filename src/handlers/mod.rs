//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, cookies, identity)
//! 2. Delegates to a service
//! 3. Returns HTTP response (JSON, status code)

/// Session endpoints
pub mod auth;
/// Health check
pub mod health;
/// Order placement and fulfillment
pub mod orders;
/// Storefront telemetry
pub mod stats;
/// User administration
pub mod users;
