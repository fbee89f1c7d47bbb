//! Client IP extraction from HTTP headers with trust validation
//!
//! The address returned here is what gets hashed into a visitor identity, so
//! headers are only honoured when the deployment says a proxy sets them:
//! - `none`: the socket peer address, headers ignored
//! - `cloudflare`: `CF-Connecting-IP`
//! - `standard`: RFC 7239 `Forwarded`, then `X-Forwarded-For`, walked right
//!   to left past trusted hops

use axum::http::HeaderMap;
use std::net::IpAddr;
use tracing::warn;

use crate::config::{ClientIpConfig, TrustedProxyMode};

/// Extract the client IP address from HTTP headers
///
/// Falls back to `socket_addr` whenever the configured headers are missing
/// or unparsable.
pub fn extract_client_ip(
    headers: &HeaderMap,
    socket_addr: IpAddr,
    config: &ClientIpConfig,
) -> IpAddr {
    match config.trusted_proxy_mode {
        TrustedProxyMode::Cloudflare => extract_cloudflare_ip(headers).unwrap_or_else(|| {
            warn!("CF-Connecting-IP header missing in Cloudflare mode, using socket address");
            socket_addr
        }),
        TrustedProxyMode::Standard => {
            extract_standard_ip(headers, socket_addr, config).unwrap_or(socket_addr)
        }
        TrustedProxyMode::None => socket_addr,
    }
}

fn extract_cloudflare_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("cf-connecting-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

fn extract_standard_ip(
    headers: &HeaderMap,
    socket_addr: IpAddr,
    config: &ClientIpConfig,
) -> Option<IpAddr> {
    // Prefer RFC 7239 Forwarded header
    let chain = forwarded_chain(headers);
    let chain = if chain.is_empty() {
        x_forwarded_for_chain(headers)
    } else {
        chain
    };

    select_from_chain(&chain, socket_addr, config)
}

/// Collect `for=` addresses from every `Forwarded` element, left to right
fn forwarded_chain(headers: &HeaderMap) -> Vec<IpAddr> {
    let Some(forwarded) = headers.get("forwarded").and_then(|h| h.to_str().ok()) else {
        return Vec::new();
    };

    forwarded
        .split(',')
        .filter_map(|element| {
            element.split(';').find_map(|param| {
                let (key, value) = param.trim().split_once('=')?;
                if !key.eq_ignore_ascii_case("for") {
                    return None;
                }
                parse_forwarded_node(value)
            })
        })
        .collect()
}

/// Parse a Forwarded node such as `192.0.2.60`, `"192.0.2.60:8080"` or
/// `"[2001:db8::1]:4711"`
fn parse_forwarded_node(value: &str) -> Option<IpAddr> {
    let value = value.trim().trim_matches('"');

    if let Some(rest) = value.strip_prefix('[') {
        return rest.split(']').next()?.parse().ok();
    }

    if let Ok(ip) = value.parse::<IpAddr>() {
        return Some(ip);
    }

    // IPv4 with port
    value.rsplit_once(':')?.0.parse().ok()
}

fn x_forwarded_for_chain(headers: &HeaderMap) -> Vec<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .map(|xff| {
            xff.split(',')
                .filter_map(|s| s.trim().parse::<IpAddr>().ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Pick the client out of a proxy chain.
///
/// With `num_trusted_proxies` set, that many hops are skipped from the right.
/// Otherwise hops inside `trusted_proxies` are skipped from the right and the
/// first untrusted address wins. The socket peer must itself be trusted for
/// the CIDR walk to apply.
fn select_from_chain(
    chain: &[IpAddr],
    socket_addr: IpAddr,
    config: &ClientIpConfig,
) -> Option<IpAddr> {
    if chain.is_empty() {
        return None;
    }

    if let Some(num_trusted) = config.num_trusted_proxies {
        if chain.len() > num_trusted {
            return Some(chain[chain.len() - num_trusted - 1]);
        }
        // Not enough hops in the chain, return the leftmost
        return chain.first().copied();
    }

    if !config.trusted_proxies.is_empty() {
        if !is_trusted(socket_addr, config) {
            warn!("Forwarding headers sent by an untrusted peer, using socket address");
            return None;
        }

        return chain
            .iter()
            .rev()
            .find(|ip| !is_trusted(**ip, config))
            .or_else(|| chain.first())
            .copied();
    }

    // No trust configuration, return the rightmost IP
    chain.last().copied()
}

fn is_trusted(ip: IpAddr, config: &ClientIpConfig) -> bool {
    config.trusted_proxies.iter().any(|net| net.contains(&ip))
}
