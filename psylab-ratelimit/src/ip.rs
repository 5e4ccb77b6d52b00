//! Client address extraction

use psylab_core::HttpRequest;
use std::net::IpAddr;

/// Key used when no client address is known.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// The client address of `req`.
///
/// With `trust_proxy` the left-most `X-Forwarded-For` entry wins, falling
/// back to `X-Real-IP` and then the socket peer. IPv4-mapped IPv6
/// addresses are reported as plain IPv4.
pub fn client_ip(req: &HttpRequest, trust_proxy: bool) -> Option<IpAddr> {
    let forwarded = trust_proxy
        .then(|| {
            req.header("x-forwarded-for")
                .and_then(|v| v.split(',').next())
                .and_then(|first| first.trim().parse().ok())
                .or_else(|| req.header("x-real-ip").and_then(|v| v.trim().parse().ok()))
        })
        .flatten();

    forwarded
        .or_else(|| req.remote_addr.map(|addr| addr.ip()))
        .map(|ip: IpAddr| ip.to_canonical())
}

/// The client address as a counter key.
pub fn client_key(req: &HttpRequest, trust_proxy: bool) -> String {
    client_ip(req, trust_proxy)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}
