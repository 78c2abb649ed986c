use fleetbench_common::{Credential, FleetError, Result};
use rand::rngs::OsRng;
use rand::RngCore;

/// Bytes of entropy behind one cluster secret
pub const SECRET_BYTES: usize = 32;

/// Issue a fresh cluster secret from the OS randomness source
pub fn issue() -> Result<Credential> {
    issue_from(&mut OsRng)
}

/// Issue a secret from `rng`. A failing source is an error; there is no
/// fallback to a weaker generator.
pub fn issue_from<R: RngCore + ?Sized>(rng: &mut R) -> Result<Credential> {
    let mut key = [0u8; SECRET_BYTES];
    rng.try_fill_bytes(&mut key)
        .map_err(|e| FleetError::RandomnessUnavailable {
            message: e.to_string(),
        })?;
    Credential::from_hex(hex::encode(key))
}
