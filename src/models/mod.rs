//! Data models representing database entities.
//!
//! This module contains all data structures that map to database tables,
//! plus the request and response bodies of the HTTP API.

/// Normalized email address
pub mod email;
/// Order and line item models
pub mod order;
/// Perfume pricing and stock view
pub mod perfume;
/// Refresh token rotation chain
pub mod refresh_token;
/// Telemetry event payload
pub mod stat_event;
/// User accounts and identities
pub mod user;
