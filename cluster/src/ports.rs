use fleetbench_common::{FleetError, PortRange, Result};
use std::collections::BTreeSet;
use std::net::{Ipv4Addr, TcpListener};
use tracing::debug;

/// Find `count` distinct ports in `[min, max)` that can be bound right now.
///
/// Ports are probed in ascending order by binding and immediately releasing
/// them; nothing is reserved, so another process may still take a port
/// between this call and the caller's own bind.
pub fn allocate(min: u16, max: u16, count: usize) -> Result<Vec<u16>> {
    allocate_excluding(min, max, count, &BTreeSet::new())
}

/// Same as [`allocate`], skipping every port in `claimed`
pub fn allocate_excluding(
    min: u16,
    max: u16,
    count: usize,
    claimed: &BTreeSet<u16>,
) -> Result<Vec<u16>> {
    if min >= max {
        return Err(FleetError::InvalidArgument {
            message: format!("empty port range [{}, {})", min, max),
        });
    }

    let mut ports = Vec::with_capacity(count);
    if count == 0 {
        return Ok(ports);
    }

    for port in min..max {
        if claimed.contains(&port) || !is_bindable(port) {
            continue;
        }
        ports.push(port);
        if ports.len() == count {
            return Ok(ports);
        }
    }

    Err(FleetError::PortExhausted {
        min,
        max,
        requested: count,
        found: ports.len(),
    })
}

fn is_bindable(port: u16) -> bool {
    // the listener is dropped at the end of the statement, releasing the port
    TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).is_ok()
}

/// Port state of one host: its range plus the ports already handed to
/// instances formed on it by this process
#[derive(Debug)]
pub struct HostPorts {
    range: PortRange,
    claimed: BTreeSet<u16>,
}

impl HostPorts {
    pub fn new(range: PortRange) -> Self {
        Self {
            range,
            claimed: BTreeSet::new(),
        }
    }

    pub fn range(&self) -> PortRange {
        self.range
    }

    /// Probe and claim `count` ports
    pub fn allocate(&mut self, count: usize) -> Result<Vec<u16>> {
        let ports = allocate_excluding(self.range.min, self.range.max, count, &self.claimed)?;
        self.claimed.extend(ports.iter().copied());
        debug!("Allocated ports {:?} in {}", ports, self.range);
        Ok(ports)
    }

    /// Return ports of a formation that did not come up or of a stopped
    /// instance
    pub fn release(&mut self, ports: &[u16]) {
        for port in ports {
            self.claimed.remove(port);
        }
    }

    pub fn claimed(&self) -> impl Iterator<Item = u16> + '_ {
        self.claimed.iter().copied()
    }

    pub fn claimed_count(&self) -> usize {
        self.claimed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A port the OS considers free right now
    fn free_port() -> u16 {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0)).unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn test_allocate_distinct_in_range() {
        let ports = allocate(14000, 15000, 3).unwrap();
        assert_eq!(ports.len(), 3);
        for port in &ports {
            assert!((14000..15000).contains(port));
        }
        let unique: BTreeSet<_> = ports.iter().collect();
        assert_eq!(unique.len(), 3);
        // ascending probe order
        assert!(ports.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_allocate_zero() {
        assert!(allocate(14000, 15000, 0).unwrap().is_empty());
    }

    #[test]
    fn test_allocate_empty_range() {
        assert!(matches!(
            allocate(15000, 15000, 1),
            Err(FleetError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_allocate_exhausted() {
        let err = allocate(14000, 14002, 3).unwrap_err();
        match err {
            FleetError::PortExhausted { min, max, requested, .. } => {
                assert_eq!((min, max, requested), (14000, 14002, 3));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bound_port_is_skipped() {
        let port = free_port();
        let _held = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).unwrap();

        let err = allocate(port, port + 1, 1).unwrap_err();
        assert!(matches!(err, FleetError::PortExhausted { found: 0, .. }));
    }

    #[test]
    fn test_host_ports_never_reissues_claimed() {
        let mut host = HostPorts::new(PortRange::new(14000, 15000).unwrap());

        let first = host.allocate(3).unwrap();
        let second = host.allocate(3).unwrap();
        assert!(first.iter().all(|p| !second.contains(p)));
        assert_eq!(host.claimed_count(), 6);

        host.release(&first);
        assert_eq!(host.claimed_count(), 3);
        let third = host.allocate(3).unwrap();
        assert_eq!(third, first);
    }
}
