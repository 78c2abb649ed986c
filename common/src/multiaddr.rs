//! Textual helpers for the addresses and JSON fragments handed to the
//! storage daemon and the cluster coordinator.
//!
//! Values built here end up inside `bash -c` command lines, so the escaping
//! is load-bearing: the receiving process parses the unescaped text as JSON.

use crate::error::{FleetError, Result};
use std::net::{Ipv4Addr, SocketAddr};

/// Prefix selecting the IP version in a multiaddress
pub const IP_VERSION: &str = "/ip4/";

/// Prefix selecting the transport in a multiaddress
pub const TRANSPORT_PROTOCOL: &str = "/tcp/";

/// `/ip4/<ip>/tcp/` without the port
pub fn multiaddr_prefix(ip: &str) -> String {
    format!("{}{}{}", IP_VERSION, ip, TRANSPORT_PROTOCOL)
}

/// `/ip4/<ip>/tcp/<port>`
pub fn multiaddr(ip: &str, port: u16) -> String {
    format!("{}{}", multiaddr_prefix(ip), port)
}

/// Extract `ip:port` from an `/ip4/<ip>/tcp/<port>` multiaddress.
///
/// Trailing protocol segments (e.g. `/p2p/<id>`) are ignored.
pub fn parse_multiaddr(addr: &str) -> Result<SocketAddr> {
    let invalid = || FleetError::InvalidArgument {
        message: format!("not an /ip4/../tcp/.. multiaddress: {}", addr),
    };

    let rest = addr.strip_prefix(IP_VERSION).ok_or_else(invalid)?;
    let mut parts = rest.split('/');
    let ip: Ipv4Addr = parts.next().and_then(|s| s.parse().ok()).ok_or_else(invalid)?;
    if parts.next() != Some("tcp") {
        return Err(invalid());
    }
    let port: u16 = parts.next().and_then(|s| s.parse().ok()).ok_or_else(invalid)?;

    Ok(SocketAddr::from((ip, port)))
}

/// A single JSON string value as it must appear on the shell line: `\"value\"`
pub fn json_elem(value: &str) -> String {
    format!("\\\"{}\\\"", value)
}

/// A JSON array of strings as it must appear on the shell line:
/// `"[\"a\",\"b\"]"`
pub fn json_array<S: AsRef<str>>(values: &[S]) -> String {
    let inner = values
        .iter()
        .map(|v| json_elem(v.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    format!("\"[{}]\"", inner)
}

/// One environment assignment as emitted before a command: `KEY="value" `
pub fn env_assignment(key: &str, value: &str) -> String {
    format!("{}=\"{}\" ", key, value)
}
