//! Callback Target Checks
//!
//! Template callback URLs are tenant-supplied, so forwards to loopback,
//! private or reserved networks are refused unless explicitly allowed.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use reqwest::Url;

use super::delivery::ForwardError;

const BLOCKED_HOSTNAMES: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "ip6-localhost",
    "ip6-loopback",
];

/// Callback host resolved to the address the request must be sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub url: Url,
    pub host: String,
    pub addr: SocketAddr,
}

/// Parse a callback URL. Only `http` and `https` with a host are accepted.
pub fn parse_target(raw: &str) -> Result<Url, ForwardError> {
    let url = Url::parse(raw).map_err(|e| ForwardError::InvalidUrl(format!("{raw}: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ForwardError::InvalidUrl(format!(
            "{raw}: unsupported scheme {}",
            url.scheme()
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ForwardError::InvalidUrl(format!("{raw}: missing host")));
    }

    Ok(url)
}

/// Static check on a hostname or literal address, before any resolution.
pub fn is_blocked_host(host: &str) -> bool {
    let lower = host.to_ascii_lowercase();
    if BLOCKED_HOSTNAMES.contains(&lower.as_str()) {
        return true;
    }

    let bare = lower.trim_start_matches('[').trim_end_matches(']');
    bare.parse::<IpAddr>().is_ok_and(|ip| is_private_ip(&ip))
}

/// Loopback, private, link-local, shared, documentation, multicast or
/// otherwise reserved addresses.
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => is_private_v6(v6),
    }
}

fn is_private_v4(v4: &Ipv4Addr) -> bool {
    let [a, b, c, _] = v4.octets();
    v4.is_loopback()
        || v4.is_private()
        || v4.is_link_local()
        || v4.is_broadcast()
        || v4.is_unspecified()
        // 100.64.0.0/10
        || (a == 100 && (b & 0xC0) == 64)
        // 198.18.0.0/15
        || (a == 198 && (b & 0xFE) == 18)
        // 192.0.0.0/24, 192.0.2.0/24, 198.51.100.0/24, 203.0.113.0/24
        || (a == 192 && b == 0 && (c == 0 || c == 2))
        || (a == 198 && b == 51 && c == 100)
        || (a == 203 && b == 0 && c == 113)
        // multicast and 240.0.0.0/4
        || a >= 224
}

fn is_private_v6(v6: &Ipv6Addr) -> bool {
    let first = v6.segments()[0];
    v6.is_loopback()
        || v6.is_unspecified()
        || (first & 0xFE00) == 0xFC00
        || (first & 0xFFC0) == 0xFE80
        || (first & 0xFF00) == 0xFF00
        || v6
            .to_ipv4_mapped()
            .is_some_and(|v4| is_private_v4(&v4))
}

/// Resolve the callback host and pick the address to pin the request to.
///
/// With `allow_private` unset, every resolved address must be public; a
/// single private answer rejects the target.
pub async fn resolve_target(raw: &str, allow_private: bool) -> Result<ResolvedTarget, ForwardError> {
    let url = parse_target(raw)?;
    let host = url
        .host_str()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_owned())
        .ok_or_else(|| ForwardError::InvalidUrl(format!("{raw}: missing host")))?;
    let port = url.port_or_known_default().unwrap_or(443);

    if !allow_private && is_blocked_host(&host) {
        return Err(ForwardError::Blocked(host));
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ResolvedTarget {
            addr: SocketAddr::new(ip, port),
            url,
            host,
        });
    }

    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), port))
        .await
        .map_err(|e| ForwardError::InvalidUrl(format!("DNS resolution failed for {host}: {e}")))?
        .collect();

    if !allow_private {
        if let Some(private) = addrs.iter().find(|addr| is_private_ip(&addr.ip())) {
            return Err(ForwardError::Blocked(format!(
                "{host} resolved to {}",
                private.ip()
            )));
        }
    }

    let addr = addrs
        .first()
        .copied()
        .ok_or_else(|| ForwardError::InvalidUrl(format!("{host} resolved to no addresses")))?;

    Ok(ResolvedTarget { url, host, addr })
}
