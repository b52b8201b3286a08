//! Implementation of `ev <vault> backup`: push LOCAL to REMOTE.

use crate::{vault::Vault, Error, Result};

pub fn execute(vault: &Vault) -> Result<()> {
    let rc = vault.backup()?;
    if rc != 0 {
        return Err(Error::CopyFailed { code: rc }.into());
    }
    Ok(())
}
