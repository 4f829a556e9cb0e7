//! Client identification for rate limiting.
//!
//! The key is, in order of preference:
//! 1. First hop of `X-Forwarded-For`
//! 2. `X-Real-IP`
//! 3. The peer address from `ConnectInfo`
//! 4. `"unknown"`
//!
//! A trailing `:port` is stripped so one client is one key.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, request::Parts},
};

/// Rate-limit key of the requesting client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientId(pub String);

impl ClientId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn strip_port(raw: &str) -> String {
    match raw.parse::<SocketAddr>() {
        Ok(addr) => addr.ip().to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Resolve the client key from proxy headers, falling back to the peer address.
pub fn resolve_client_id(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = header_value(headers, "x-forwarded-for")
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty());

    if let Some(ip) = forwarded.or_else(|| header_value(headers, "x-real-ip")) {
        return strip_port(ip);
    }

    peer.map_or_else(|| "unknown".to_string(), |addr| addr.ip().to_string())
}

impl<S> FromRequestParts<S> for ClientId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Ok(ClientId(resolve_client_id(&parts.headers, peer)))
    }
}
