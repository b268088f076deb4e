//! Model endpoint checks
//!
//! The base URL decides where rule intents and uploaded media are sent, so it is
//! checked at startup: HTTPS only, and no loopback, private, link-local or cloud
//! metadata hosts unless local endpoints are explicitly allowed.

use std::net::IpAddr;
use thiserror::Error;
use url::{Host, Url};

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("URL scheme '{0}' is not allowed, only HTTPS is permitted")]
    InvalidScheme(String),

    #[error("Host '{0}' is blocked: local and internal addresses are not allowed")]
    BlockedHost(String),

    #[error("URL must have a host")]
    MissingHost,
}

/// Metadata services stay blocked even for local endpoints
const METADATA_HOSTS: &[&str] = &[
    "metadata.google.internal",
    "metadata.goog",
    "169.254.169.254",
];

const LOCAL_HOSTNAMES: &[&str] = &["localhost", "localhost.localdomain"];

/// What kinds of model endpoints are acceptable
#[derive(Debug, Clone, Copy, Default)]
pub struct EndpointPolicy {
    pub allow_http: bool,
    pub allow_local: bool,
}

impl EndpointPolicy {
    /// Self-hosted models on the same machine or network
    pub fn local() -> Self {
        Self {
            allow_http: true,
            allow_local: true,
        }
    }
}

/// Parse and check a model base URL against the policy
pub fn check_model_endpoint(raw: &str, policy: &EndpointPolicy) -> Result<Url, EndpointError> {
    let url = Url::parse(raw)?;

    match url.scheme() {
        "https" => {}
        "http" if policy.allow_http => {}
        scheme => return Err(EndpointError::InvalidScheme(scheme.to_string())),
    }

    let host = url.host().ok_or(EndpointError::MissingHost)?;
    let host_str = host.to_string();
    let lower = host_str.to_lowercase();

    if METADATA_HOSTS.iter().any(|h| lower == *h || lower.ends_with(&format!(".{}", h))) {
        return Err(EndpointError::BlockedHost(host_str));
    }

    let ip = match host {
        Host::Ipv4(v4) => Some(IpAddr::V4(v4)),
        // ::ffff:a.b.c.d reaches the IPv4 host, so it is checked as one
        Host::Ipv6(v6) => Some(match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        }),
        Host::Domain(_) => None,
    };

    if let Some(ip) = ip {
        if is_link_local(&ip) {
            return Err(EndpointError::BlockedHost(host_str));
        }
        if !policy.allow_local && (ip.is_loopback() || is_private(&ip)) {
            return Err(EndpointError::BlockedHost(host_str));
        }
    } else if !policy.allow_local && LOCAL_HOSTNAMES.contains(&lower.as_str()) {
        return Err(EndpointError::BlockedHost(host_str));
    }

    Ok(url)
}

fn is_private(ip: &IpAddr) -> bool {
    match ip {
        // RFC 1918, carrier-grade NAT 100.64.0.0/10, and 0.0.0.0/8
        IpAddr::V4(v4) => {
            let o = v4.octets();
            v4.is_private() || (o[0] == 100 && (o[1] & 0xC0) == 64) || o[0] == 0
        }
        // fc00::/7
        IpAddr::V6(v6) => (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

fn is_link_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_link_local(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfe80,
    }
}
