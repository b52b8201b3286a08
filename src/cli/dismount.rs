//! Implementation of `ev <vault> dismount` (also `eject`, `detach`).

use crate::{vault::Vault, Error, Result};

pub fn execute(vault: &Vault) -> Result<()> {
    let rc = vault.dismount()?;
    if rc != 0 {
        return Err(Error::UnmountFailed { code: rc }.into());
    }
    Ok(())
}
