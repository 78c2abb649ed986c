use crate::ports::HostPorts;
use fleetbench_common::{FleetError, PortRange, Result};
use std::net::{Ipv4Addr, TcpListener};
use tokio::sync::{Mutex, MutexGuard};

/// A physical host that storage daemons and cluster peers are formed on.
///
/// The host's port state doubles as its exclusive section: a formation
/// holds the guard from port allocation until its daemon is ready, so two
/// formations on the same host never interleave.
#[derive(Debug)]
pub struct Host {
    name: String,
    ip: Ipv4Addr,
    index: usize,
    range: PortRange,
    section: Mutex<HostPorts>,
}

impl Host {
    pub fn new(name: impl Into<String>, ip: Ipv4Addr, index: usize, range: PortRange) -> Self {
        Self {
            name: name.into(),
            ip,
            index,
            range,
            section: Mutex::new(HostPorts::new(range)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn range(&self) -> PortRange {
        self.range
    }

    /// Enter the host's exclusive section; released when the guard drops
    pub async fn lock(&self) -> MutexGuard<'_, HostPorts> {
        self.section.lock().await
    }

    /// Ports currently held by instances on this host
    pub async fn claimed_ports(&self) -> Vec<u16> {
        self.section.lock().await.claimed().collect()
    }
}

/// Parse a host IP; multiaddresses are built with `/ip4/`
pub fn parse_ip(host: &str, ip: &str) -> Result<Ipv4Addr> {
    ip.parse().map_err(|_| FleetError::Configuration {
        message: format!("host {} has invalid IPv4 address {:?}", host, ip),
    })
}

/// Host names become path segments and `CLUSTER_PEERNAME` values on
/// `bash -c` lines, so only `[A-Za-z0-9_.-]` is accepted
pub fn validate_host_name(name: &str) -> Result<()> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-');
    if name.is_empty() || name == "." || name == ".." || !name.chars().all(allowed) {
        return Err(FleetError::Configuration {
            message: format!("invalid host name {:?}: use letters, digits, '_', '.', '-'", name),
        });
    }
    Ok(())
}

/// Daemons run and ports are tested on this machine, so a host's IP must
/// be one of its own addresses
pub fn ensure_local(host: &str, ip: Ipv4Addr) -> Result<()> {
    match TcpListener::bind((ip, 0)) {
        Ok(_) => Ok(()),
        Err(e) => Err(FleetError::Configuration {
            message: format!("host {} address {} is not assigned on this machine: {}", host, ip, e),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_section_is_exclusive() {
        let host = Arc::new(Host::new(
            "node_0",
            Ipv4Addr::LOCALHOST,
            0,
            PortRange::new(14000, 15000).unwrap(),
        ));

        let guard = host.lock().await;
        let contender = host.clone();
        let waiter = tokio::spawn(async move {
            let _g = contender.lock().await;
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[test]
    fn test_host_names() {
        assert!(validate_host_name("node_0").is_ok());
        assert!(validate_host_name("rack-1.host.example").is_ok());

        assert!(validate_host_name("").is_err());
        assert!(validate_host_name("..").is_err());
        assert!(validate_host_name("a/b").is_err());
        assert!(validate_host_name("x;touch /tmp/pwned;").is_err());
        assert!(validate_host_name("n\"$(id)\"").is_err());
        assert!(validate_host_name("two words").is_err());
    }

    #[test]
    fn test_ensure_local() {
        assert!(ensure_local("n", Ipv4Addr::LOCALHOST).is_ok());
        // TEST-NET-1, never assigned to a real interface
        assert!(matches!(
            ensure_local("n", Ipv4Addr::new(192, 0, 2, 1)),
            Err(FleetError::Configuration { .. })
        ));
    }

    #[test]
    fn test_parse_ip() {
        assert_eq!(parse_ip("n", "10.0.0.1").unwrap(), Ipv4Addr::new(10, 0, 0, 1));
        assert!(parse_ip("n", "::1").is_err());
        assert!(parse_ip("n", "somewhere").is_err());
    }
}
