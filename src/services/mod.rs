//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers.
//! They take the caller's identity explicitly and own all store transactions.

pub mod order_service;
pub mod password;
pub mod rate_limiter;
pub mod session_service;
pub mod stats_service;
pub mod token_service;
