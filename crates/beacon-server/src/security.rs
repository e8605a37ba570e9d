// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Origin / loopback admission policy for the WebSocket handshake.

use std::net::{IpAddr, SocketAddr};

/// `true` if `addr` is a loopback address (`127.0.0.0/8` or `::1`).
pub fn is_loopback(addr: SocketAddr) -> bool {
    match addr.ip() {
        IpAddr::V4(v4) => v4.is_loopback(),
        IpAddr::V6(v6) => v6.is_loopback(),
    }
}

/// `true` if `origin` exactly matches the static dashboard's allow-listed
/// localhost/loopback origin for `static_port`.
pub fn is_allowed_origin(origin: &str, static_port: u16) -> bool {
    origin == format!("http://localhost:{static_port}") || origin == format!("http://127.0.0.1:{static_port}")
}

/// Admission decision for an incoming WebSocket upgrade request.
///
/// If an `Origin` header was supplied it must exactly match the allow-list;
/// otherwise the peer address itself must be loopback.
pub fn admit(origin: Option<&str>, peer: SocketAddr, static_port: u16) -> bool {
    match origin {
        Some(o) => is_allowed_origin(o, static_port),
        None => is_loopback(peer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(ip: &str) -> SocketAddr {
        format!("{ip}:12345").parse().unwrap()
    }

    #[test]
    fn allows_matching_localhost_origin() {
        assert!(is_allowed_origin("http://localhost:3356", 3356));
        assert!(is_allowed_origin("http://127.0.0.1:3356", 3356));
    }

    #[test]
    fn rejects_mismatched_port_or_host() {
        assert!(!is_allowed_origin("http://localhost:9999", 3356));
        assert!(!is_allowed_origin("http://evil.example:3356", 3356));
    }

    #[test]
    fn admits_loopback_peer_with_no_origin() {
        assert!(admit(None, addr("127.0.0.1"), 3356));
    }

    #[test]
    fn rejects_non_loopback_peer_with_no_origin() {
        assert!(!admit(None, addr("10.0.0.5"), 3356));
    }

    #[test]
    fn rejects_forbidden_origin_even_from_loopback_peer() {
        assert!(!admit(Some("http://evil.example"), addr("127.0.0.1"), 3356));
    }

    #[test]
    fn ipv6_loopback_is_recognized() {
        let v6: SocketAddr = "[::1]:12345".parse().unwrap();
        assert!(is_loopback(v6));
    }
}
