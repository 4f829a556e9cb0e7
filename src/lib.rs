//! Perfume storefront backend: identity and commerce transaction core.
//!
//! The crate covers two subsystems:
//! - Sessions: access credentials, rotating refresh tokens, guest identities,
//!   per-client rate limiting and admin management
//! - Orders: authoritative repricing, currency checks, order counters and
//!   stock decrement on fulfillment
//!
//! The binary in `main.rs` wires these over PostgreSQL; tests wire them over
//! [`store::MemoryStore`].

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod state;
pub mod store;
