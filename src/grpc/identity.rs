//! Client identifier derivation.

use tonic::Request;

/// Identifier used when nothing about the client is known.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Headers consulted in order. Proxies append to `x-forwarded-for`, so only
/// its first entry names the client.
const FORWARDING_HEADERS: [&str; 3] = ["x-forwarded-for", "x-real-ip", "x-vercel-forwarded-for"];

/// Pick the identifier rate limits are keyed on.
///
/// An explicit identifier wins, then forwarding headers, then the peer
/// address, then [`UNKNOWN_CLIENT`].
pub fn client_identifier<T>(request: &Request<T>, explicit: &str) -> String {
    let explicit = explicit.trim();
    if !explicit.is_empty() {
        return explicit.to_string();
    }

    let metadata = request.metadata();
    FORWARDING_HEADERS
        .iter()
        .filter_map(|header| metadata.get(*header))
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(',').next())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| request.remote_addr().map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}
