//! Private-address guard for image requests.
//!
//! Image URLs come from MCP callers, so before a request is sent the host is
//! resolved and every answer must be a public address. Redirect targets that
//! are IP literals are checked the same way.
use std::net::{IpAddr, Ipv4Addr};

use url::{Host, Url};

/// Why a host was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SsrfError {
    #[error("refusing private or reserved address {0}")]
    BlockedIp(IpAddr),

    #[error("could not resolve {host}: {reason}")]
    Unresolvable { host: String, reason: String },
}

/// Loopback, RFC 1918, link-local, shared (100.64/10), multicast, broadcast
/// and unspecified IPv4; loopback, unique-local, link-local, multicast and
/// unspecified IPv6. IPv4-mapped IPv6 is judged by its IPv4 part.
pub fn is_private_or_reserved(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_reserved_v4(v4),
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_reserved_v4(mapped);
            }
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_multicast()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
        }
    }
}

fn is_reserved_v4(v4: Ipv4Addr) -> bool {
    let [a, b, ..] = v4.octets();
    v4.is_loopback()
        || v4.is_private()
        || v4.is_link_local()
        || v4.is_multicast()
        || v4.is_broadcast()
        || v4.is_unspecified()
        || a == 0
        || (a == 100 && (b & 0xc0) == 64)
}

/// Reject `url` if its host is an IP literal in a blocked range.
///
/// Names are not resolved here; see [`check_host`].
pub fn check_literal(url: &Url) -> Result<(), SsrfError> {
    let ip = match url.host() {
        Some(Host::Ipv4(v4)) => IpAddr::V4(v4),
        Some(Host::Ipv6(v6)) => IpAddr::V6(v6),
        _ => return Ok(()),
    };
    if is_private_or_reserved(ip) { Err(SsrfError::BlockedIp(ip)) } else { Ok(()) }
}

/// Resolve the host of `url` and reject it if any address is blocked.
pub async fn check_host(url: &Url) -> Result<(), SsrfError> {
    check_literal(url)?;
    let Some(Host::Domain(domain)) = url.host() else {
        return Ok(());
    };

    let port = url.port_or_known_default().unwrap_or(80);
    let addrs = tokio::net::lookup_host((domain, port))
        .await
        .map_err(|e| SsrfError::Unresolvable { host: domain.to_string(), reason: e.to_string() })?;

    let mut resolved = false;
    for addr in addrs {
        resolved = true;
        if is_private_or_reserved(addr.ip()) {
            tracing::warn!(host = domain, ip = %addr.ip(), "blocked image host");
            return Err(SsrfError::BlockedIp(addr.ip()));
        }
    }

    if resolved {
        Ok(())
    } else {
        Err(SsrfError::Unresolvable { host: domain.to_string(), reason: "no addresses".into() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    fn v4(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(a, b, c, d))
    }

    #[test]
    fn test_private_v4_ranges() {
        for ip in [
            v4(127, 0, 0, 1),
            v4(10, 1, 2, 3),
            v4(172, 20, 0, 1),
            v4(192, 168, 1, 1),
            v4(169, 254, 169, 254),
            v4(100, 64, 0, 1),
            v4(100, 127, 255, 255),
            v4(0, 0, 0, 0),
            v4(255, 255, 255, 255),
            v4(224, 0, 0, 1),
        ] {
            assert!(is_private_or_reserved(ip), "{ip} should be blocked");
        }
    }

    #[test]
    fn test_public_v4_allowed() {
        assert!(!is_private_or_reserved(v4(93, 184, 216, 34)));
        assert!(!is_private_or_reserved(v4(100, 128, 0, 1)));
        assert!(!is_private_or_reserved(v4(172, 32, 0, 1)));
    }

    #[test]
    fn test_v6_ranges() {
        assert!(is_private_or_reserved(IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert!(is_private_or_reserved(IpAddr::V6(Ipv6Addr::new(0xfd12, 0, 0, 0, 0, 0, 0, 1))));
        assert!(is_private_or_reserved(IpAddr::V6(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1))));
        assert!(is_private_or_reserved(IpAddr::V6(Ipv4Addr::new(10, 0, 0, 1).to_ipv6_mapped())));
        assert!(!is_private_or_reserved(IpAddr::V6(Ipv6Addr::new(0x2606, 0x4700, 0, 0, 0, 0, 0, 0x1111))));
    }

    #[test]
    fn test_check_literal() {
        let blocked = Url::parse("http://169.254.169.254/latest/meta-data").unwrap();
        assert_eq!(check_literal(&blocked), Err(SsrfError::BlockedIp(v4(169, 254, 169, 254))));

        let blocked_v6 = Url::parse("http://[::1]:8080/a.png").unwrap();
        assert!(check_literal(&blocked_v6).is_err());

        let named = Url::parse("https://img.example.com/a.png").unwrap();
        assert!(check_literal(&named).is_ok());
    }

    #[tokio::test]
    async fn test_check_host_rejects_loopback_literal() {
        let url = Url::parse("http://127.0.0.1:9/a.png").unwrap();
        assert!(matches!(check_host(&url).await, Err(SsrfError::BlockedIp(_))));
    }

    #[tokio::test]
    async fn test_check_host_rejects_localhost_name() {
        let url = Url::parse("http://localhost/a.png").unwrap();
        assert!(check_host(&url).await.is_err());
    }
}
