use thiserror::Error;

/// Errors shared by every fleetbench crate
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("no {requested} free ports in range [{min}, {max}): only {found} available")]
    PortExhausted {
        min: u16,
        max: u16,
        requested: usize,
        found: usize,
    },

    #[error("randomness source unavailable: {message}")]
    RandomnessUnavailable { message: String },

    #[error("external command failed ({status}): {command}\n{output}")]
    ExternalCommand {
        command: String,
        status: String,
        output: String,
    },

    #[error("unknown node: {name}")]
    UnknownNode { name: String },

    #[error("{name} not ready after {waited_ms}ms")]
    NotReady { name: String, waited_ms: u64 },

    #[error("{name} exited during warm-up (code {code:?})")]
    DaemonExited { name: String, code: Option<i32> },

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("{path}:{line}: {message}")]
    Parse {
        path: String,
        line: usize,
        message: String,
    },

    #[error("network error: {message}")]
    Network { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FleetError {
    /// True for failures caused by the fleet rather than by the caller
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            FleetError::ExternalCommand { .. }
                | FleetError::NotReady { .. }
                | FleetError::DaemonExited { .. }
                | FleetError::Network { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FleetError>;
