//! Client IP extraction from HTTP headers with trust validation
//!
//! The client IP is half of a visitor fingerprint, so forwarding headers are
//! only believed when the configuration says the hop that sent them is ours.
//! Anything else falls back to the socket address.

use axum::http::HeaderMap;
use std::net::IpAddr;
use tracing::warn;

use crate::config::{AnalyticsConfig, TrustedProxyMode};

/// Extract the client IP address according to the trust configuration
pub fn extract_client_ip(
    headers: &HeaderMap,
    socket_addr: IpAddr,
    config: &AnalyticsConfig,
) -> IpAddr {
    match config.trusted_proxy_mode {
        TrustedProxyMode::Cloudflare => cloudflare_ip(headers).unwrap_or_else(|| {
            warn!("CF-Connecting-IP header missing in Cloudflare mode, using socket address");
            socket_addr
        }),
        TrustedProxyMode::Standard => forwarded_for_ip(headers, socket_addr, config),
        TrustedProxyMode::None => socket_addr,
    }
}

fn cloudflare_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("cf-connecting-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

/// Resolve the client from X-Forwarded-For, walking the chain right to left.
fn forwarded_for_ip(headers: &HeaderMap, socket_addr: IpAddr, config: &AnalyticsConfig) -> IpAddr {
    let is_trusted = |ip: &IpAddr| config.trusted_proxies.iter().any(|net| net.contains(ip));

    // A forwarding header from an unknown peer is attacker controlled
    if !config.trusted_proxies.is_empty() && !is_trusted(&socket_addr) {
        return socket_addr;
    }

    let chain: Vec<IpAddr> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|s| s.trim().parse::<IpAddr>().ok())
        .collect();

    if chain.is_empty() {
        return socket_addr;
    }

    if let Some(hops) = config.num_trusted_proxies {
        return match chain.len().checked_sub(hops + 1) {
            Some(index) => chain[index],
            None => chain[0],
        };
    }

    if !config.trusted_proxies.is_empty() {
        return chain
            .iter()
            .rev()
            .find(|ip| !is_trusted(ip))
            .copied()
            .unwrap_or(chain[0]);
    }

    chain[chain.len() - 1]
}
