pub mod error;
pub mod types;
pub mod multiaddr;
pub mod fleetfile;

pub use error::{FleetError, Result};
pub use types::*;
pub use multiaddr::*;
pub use fleetfile::{FleetDescription, FleetEntry};
