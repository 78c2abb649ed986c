use crate::daemon::{DaemonHandle, DaemonState};
use fleetbench_common::{FleetError, Result};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tracing::debug;

/// How a launched daemon is judged ready
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Sleep for a fixed warm-up interval
    Fixed(Duration),

    /// Poll a TCP connect to the daemon's listen address until it succeeds
    Probe { timeout: Duration, interval: Duration },
}

impl Readiness {
    /// Upper bound of the warm-up
    pub fn budget(&self) -> Duration {
        match self {
            Readiness::Fixed(d) => *d,
            Readiness::Probe { timeout, .. } => *timeout,
        }
    }

    /// Wait for `daemon` to become ready.
    ///
    /// Fails with `DaemonExited` if the daemon stops during the warm-up and,
    /// for `Probe`, with `NotReady` if `target` never accepts a connection.
    pub async fn wait(&self, daemon: &DaemonHandle, target: SocketAddr) -> Result<()> {
        match *self {
            Readiness::Fixed(warmup) => {
                tokio::select! {
                    _ = tokio::time::sleep(warmup) => Ok(()),
                    state = daemon.wait_exit() => Err(exited(daemon.label(), state)),
                }
            }
            Readiness::Probe { timeout, interval } => {
                let started = Instant::now();
                loop {
                    let state = daemon.state();
                    if state.is_terminal() {
                        return Err(exited(daemon.label(), state));
                    }

                    if let Ok(Ok(_)) = tokio::time::timeout(interval, TcpStream::connect(target)).await {
                        debug!("{} accepting connections at {}", daemon.label(), target);
                        return Ok(());
                    }

                    if started.elapsed() >= timeout {
                        return Err(FleetError::NotReady {
                            name: daemon.label().to_string(),
                            waited_ms: started.elapsed().as_millis() as u64,
                        });
                    }
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }
}

fn exited(label: &str, state: DaemonState) -> FleetError {
    let code = match state {
        DaemonState::Exited { code } => code,
        _ => None,
    };
    FleetError::DaemonExited {
        name: label.to_string(),
        code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn alive() -> DaemonHandle {
        DaemonHandle::supervise("alive", std::future::pending())
    }

    #[tokio::test]
    async fn test_fixed_waits_full_interval() {
        let daemon = alive();
        let started = Instant::now();
        Readiness::Fixed(Duration::from_millis(50))
            .wait(&daemon, "127.0.0.1:1".parse().unwrap())
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_fixed_reports_early_exit() {
        let daemon = DaemonHandle::supervise("dies", async { Ok(Some(2)) });
        let err = Readiness::Fixed(Duration::from_secs(5))
            .wait(&daemon, "127.0.0.1:1".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::DaemonExited { code: Some(2), .. }));
    }

    #[tokio::test]
    async fn test_probe_succeeds_when_listening() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = listener.local_addr().unwrap();
        let readiness = Readiness::Probe {
            timeout: Duration::from_secs(2),
            interval: Duration::from_millis(20),
        };
        readiness.wait(&alive(), target).await.unwrap();
    }

    #[tokio::test]
    async fn test_probe_not_ready() {
        // bind then drop to get an address nothing listens on
        let target = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let readiness = Readiness::Probe {
            timeout: Duration::from_millis(100),
            interval: Duration::from_millis(20),
        };
        let err = readiness.wait(&alive(), target).await.unwrap_err();
        assert!(matches!(err, FleetError::NotReady { .. }));
    }
}
