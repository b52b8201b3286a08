//! Implementation of `ev <vault> mount` and `ev <vault> attach`.

use tracing::info;

use crate::{vault::Vault, Error, Result};

pub fn execute(vault: &Vault, read_only: bool) -> Result<()> {
    let rc = vault.mount(read_only)?;
    if rc != 0 {
        return Err(Error::MountFailed { code: rc }.into());
    }
    info!(vault = vault.name(), read_only, "mount command completed");
    Ok(())
}
