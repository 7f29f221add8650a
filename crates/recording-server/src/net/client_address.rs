//! Client address resolution through a chain of trusted reverse proxies.
//!
//! The immediate peer is only believed about `X-Forwarded-For` when it is a
//! trusted proxy itself. The chain is then walked from the nearest hop
//! (right-most entry) outwards, and the first hop that is not a trusted proxy
//! is taken as the real client. Only IP addresses are accepted in the chain;
//! a hostname or any other token ends the walk at the last validated hop.

use super::networks::TrustedNetworkSet;
use axum::http::HeaderMap;
use std::net::IpAddr;
use thiserror::Error;

/// Name of the forwarded address chain header.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Error resolving the client address.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid remote address: {0:?}")]
    InvalidAddress(String),
}

/// The address treated as the true client of a request.
///
/// Inserted into the request extensions by the client address middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddress(pub String);

impl ClientAddress {
    /// Parses the address, ignoring a trailing port.
    #[must_use]
    pub fn ip(&self) -> Option<IpAddr> {
        strip_port(&self.0).parse().ok()
    }
}

/// Removes an optional trailing port from an address.
///
/// `[addr]` and `[addr]:port` are unwrapped to `addr`; `addr:port` with a
/// single colon returns `addr`. Anything else (including bare IPv6 addresses)
/// is returned unchanged.
#[must_use]
pub fn strip_port(address: &str) -> &str {
    if let Some(rest) = address.strip_prefix('[') {
        return match rest.rfind(']') {
            Some(end) => rest.get(..end).unwrap_or(rest),
            None => rest,
        };
    }

    match address.split_once(':') {
        Some((host, port)) if !port.contains(':') => host,
        _ => address,
    }
}

/// Collects every `X-Forwarded-For` header line into a single chain.
#[must_use]
pub fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    let values: Vec<&str> = headers
        .get_all(FORWARDED_FOR_HEADER)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();

    if values.is_empty() {
        None
    } else {
        Some(values.join(","))
    }
}

/// Resolves the address that should be treated as the true client.
///
/// # Arguments
///
/// * `remote_address` - Address of the immediate peer, optionally with port
/// * `forwarded_for` - Value of the `X-Forwarded-For` chain, if any
/// * `trusted_proxies` - Networks whose forwarded claims are believed
///
/// # Returns
///
/// The remote address exactly as received when the forwarded chain is not
/// considered, otherwise the resolved hop in compressed form without port.
///
/// # Errors
///
/// `AddressError::InvalidAddress` if the remote address is empty or is not
/// an IP address.
pub fn resolve_client_address(
    remote_address: &str,
    forwarded_for: Option<&str>,
    trusted_proxies: &TrustedNetworkSet,
) -> Result<String, AddressError> {
    if remote_address.is_empty() {
        return Err(AddressError::InvalidAddress(remote_address.to_string()));
    }

    let remote_ip: IpAddr = strip_port(remote_address)
        .parse()
        .map_err(|_| AddressError::InvalidAddress(remote_address.to_string()))?;

    let forwarded_for = match forwarded_for {
        Some(chain) if !chain.trim().is_empty() => chain,
        _ => return Ok(remote_address.to_string()),
    };

    if !trusted_proxies.contains(remote_ip) {
        return Ok(remote_address.to_string());
    }

    let mut candidate = remote_ip;

    for hop in forwarded_for.rsplit(',') {
        let Ok(hop_ip) = strip_port(hop.trim()).parse::<IpAddr>() else {
            break;
        };

        if !trusted_proxies.contains(hop_ip) {
            return Ok(hop_ip.to_string());
        }

        candidate = hop_ip;
    }

    Ok(candidate.to_string())
}
