//! Target resolution: turns the command-line argument into a dial plan.

use std::net::ToSocketAddrs;

use url::{Host, Url};

use crate::error::CheckError;

/// Port probed when the target does not name one, whatever the scheme.
pub const DEFAULT_TLS_PORT: u16 = 443;

/// A resolved connection plan.
///
/// `dial_target` is the address actually dialed; `sni_hostname` is the name
/// announced in the TLS handshake and verified against. An SNI override
/// replaces the latter and never touches the former.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// `host:port` handed to the TCP dialer. Holds the first resolved
    /// address when forward resolution succeeds, otherwise the hostname as
    /// given (IPv6 literals bracketed).
    pub dial_target: String,
    /// Hostname sent via SNI.
    pub sni_hostname: String,
}

#[derive(Debug, PartialEq, Eq)]
struct ParsedTarget {
    host: String,
    port: u16,
    sni_hostname: String,
}

/// Splits the raw argument into host, port and SNI name.
///
/// A bare host gets an implicit `https://` scheme, and any scheme the input
/// carries is rewritten to `https` so a spelled-out port is never dropped
/// as a scheme default. Only host and port are taken from the parsed URL;
/// path, query and userinfo are ignored, which means an `http://` target
/// still probes port 443 unless a port is spelled out. An empty SNI
/// override counts as absent.
fn parse_target(input: &str, sni_override: Option<&str>) -> Result<ParsedTarget, CheckError> {
    let normalized = match input.find("://") {
        Some(idx) => format!("https://{}", &input[idx + 3..]),
        None => format!("https://{}", input),
    };

    let url = Url::parse(&normalized).map_err(|e| CheckError::InvalidTarget {
        input: input.to_string(),
        reason: e.to_string(),
    })?;

    let host = match url.host() {
        Some(Host::Domain(domain)) => domain.to_string(),
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Ipv6(ip)) => ip.to_string(),
        None => {
            return Err(CheckError::InvalidTarget {
                input: input.to_string(),
                reason: "no host in target".to_string(),
            })
        }
    };
    let port = url.port().unwrap_or(DEFAULT_TLS_PORT);
    let sni_hostname = match sni_override.filter(|name| !name.is_empty()) {
        Some(name) => name.to_string(),
        None => host.clone(),
    };

    Ok(ParsedTarget {
        host,
        port,
        sni_hostname,
    })
}

fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Resolves the command-line target into an [`Endpoint`].
///
/// Forward DNS resolution picks the first returned address. When resolution
/// fails the hostname itself becomes the dial target, silently, so an
/// unresolvable name surfaces later as an ordinary connection failure
/// instead of aborting here.
pub fn resolve(input: &str, sni_override: Option<&str>) -> Result<Endpoint, CheckError> {
    let target = parse_target(input, sni_override)?;

    let dial_target = match (target.host.as_str(), target.port).to_socket_addrs() {
        Ok(mut addrs) => match addrs.next() {
            Some(addr) => addr.to_string(),
            None => join_host_port(&target.host, target.port),
        },
        Err(_) => join_host_port(&target.host, target.port),
    };

    Ok(Endpoint {
        dial_target,
        sni_hostname: target.sni_hostname,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_equals_https_url() {
        let bare = parse_target("example.com", None).unwrap();
        let url = parse_target("https://example.com", None).unwrap();
        assert_eq!(bare, url);
        assert_eq!(bare.port, DEFAULT_TLS_PORT);
    }

    #[test]
    fn explicit_port_is_kept() {
        let target = parse_target("example.com:8443", None).unwrap();
        assert_eq!(target.host, "example.com");
        assert_eq!(target.port, 8443);
    }

    #[test]
    fn http_scheme_still_probes_443() {
        let target = parse_target("http://example.com", None).unwrap();
        assert_eq!(target.port, DEFAULT_TLS_PORT);
    }

    #[test]
    fn port_matching_a_scheme_default_is_kept() {
        let target = parse_target("http://example.com:80", None).unwrap();
        assert_eq!(target.port, 80);
    }

    #[test]
    fn path_and_query_are_ignored() {
        let target = parse_target("https://example.com/some/path?q=1", None).unwrap();
        assert_eq!(target.host, "example.com");
        assert_eq!(target.port, DEFAULT_TLS_PORT);
    }

    #[test]
    fn sni_override_leaves_host_alone() {
        let target = parse_target("93.184.216.34", Some("www.example.com")).unwrap();
        assert_eq!(target.host, "93.184.216.34");
        assert_eq!(target.sni_hostname, "www.example.com");
    }

    #[test]
    fn empty_sni_override_is_ignored() {
        let target = parse_target("example.com", Some("")).unwrap();
        assert_eq!(target.sni_hostname, "example.com");
    }

    #[test]
    fn ip_literal_dials_without_lookup() {
        let endpoint = resolve("93.184.216.34", Some("www.example.com")).unwrap();
        assert_eq!(endpoint.dial_target, "93.184.216.34:443");
        assert_eq!(endpoint.sni_hostname, "www.example.com");
    }

    #[test]
    fn ipv6_literal_is_bracketed() {
        let endpoint = resolve("https://[::1]:8443/health", None).unwrap();
        assert_eq!(endpoint.dial_target, "[::1]:8443");
        assert_eq!(endpoint.sni_hostname, "::1");
    }

    #[test]
    fn unresolvable_host_falls_back_to_hostname() {
        // .invalid never resolves, so the dial target keeps the name.
        let endpoint = resolve("no-such-host.invalid", None).unwrap();
        assert_eq!(endpoint.dial_target, "no-such-host.invalid:443");
    }

    #[test]
    fn empty_host_is_rejected() {
        let err = resolve("https://", None).unwrap_err();
        assert!(matches!(err, CheckError::InvalidTarget { .. }));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(resolve("exa mple.com", None).is_err());
    }
}
