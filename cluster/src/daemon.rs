use std::future::Future;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Lifecycle of a background daemon after launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonState {
    /// Process is (as far as we know) alive
    Running,

    /// Process exited on its own
    Exited { code: Option<i32> },

    /// Waiting on the process failed
    Crashed { message: String },

    /// Stopped through [`DaemonHandle::stop`]
    Stopped,
}

impl DaemonState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DaemonState::Running)
    }
}

/// Owned handle on a launched daemon.
///
/// A supervising task waits for the process; when it exits the exit is
/// logged and published as a terminal [`DaemonState`]. Nothing is restarted.
#[derive(Debug, Clone)]
pub struct DaemonHandle {
    label: String,
    state: watch::Receiver<DaemonState>,
    cancel: CancellationToken,
}

impl DaemonHandle {
    /// Supervise a process whose exit is reported by `exit`.
    ///
    /// Dropping `exit` must terminate the process (e.g. a child spawned with
    /// `kill_on_drop`); that is how [`stop`](Self::stop) is carried out.
    pub fn supervise<F>(label: impl Into<String>, exit: F) -> Self
    where
        F: Future<Output = std::io::Result<Option<i32>>> + Send + 'static,
    {
        let label = label.into();
        let (tx, rx) = watch::channel(DaemonState::Running);
        let cancel = CancellationToken::new();

        let token = cancel.clone();
        let task_label = label.clone();
        tokio::spawn(async move {
            let state = tokio::select! {
                result = exit => match result {
                    Ok(code) => {
                        warn!("{} exited (code {:?})", task_label, code);
                        DaemonState::Exited { code }
                    }
                    Err(e) => {
                        warn!("{} crashed: {}", task_label, e);
                        DaemonState::Crashed { message: e.to_string() }
                    }
                },
                _ = token.cancelled() => {
                    info!("Stopped {}", task_label);
                    DaemonState::Stopped
                }
            };
            let _ = tx.send(state);
        });

        Self {
            label,
            state: rx,
            cancel,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Current state snapshot
    pub fn state(&self) -> DaemonState {
        self.state.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        !self.state().is_terminal()
    }

    /// Resolve once the daemon reaches a terminal state
    pub async fn wait_exit(&self) -> DaemonState {
        let mut rx = self.state.clone();
        let state = match rx.wait_for(|state| state.is_terminal()).await {
            Ok(state) => state.clone(),
            // supervisor gone without publishing; only happens on runtime shutdown
            Err(_) => DaemonState::Stopped,
        };
        state
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<DaemonState> {
        self.state.clone()
    }

    /// Terminate the daemon. No-op if it already exited.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}
