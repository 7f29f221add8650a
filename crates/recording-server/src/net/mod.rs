//! Network address handling: trusted network sets and client address
//! resolution through reverse proxies.

pub mod client_address;
pub mod networks;

pub use client_address::{
    forwarded_for, resolve_client_address, strip_port, AddressError, ClientAddress,
};
pub use networks::{IpNetwork, NetworkParseError, TrustedNetworkSet};
