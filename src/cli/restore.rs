//! Implementation of `ev <vault> restore`: pull REMOTE over LOCAL.

use crate::{vault::Vault, Error, Result};

pub fn execute(vault: &Vault) -> Result<()> {
    let rc = vault.restore()?;
    if rc != 0 {
        return Err(Error::CopyFailed { code: rc }.into());
    }
    Ok(())
}
