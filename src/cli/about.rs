//! Implementation of `ev <vault> about` (also `status`).

use crate::{vault::Vault, Error, Result};

use super::StatusFormat;

/// Text format relies on the reporter having already printed the narrative;
/// JSON prints the structured report on stdout.
pub fn execute(vault: &Vault, format: StatusFormat) -> Result<()> {
    let report = vault.status()?;

    if format == StatusFormat::Json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    if let Some(reason) = report.invalid_reason {
        return Err(Error::VaultInvalid {
            vault: report.vault,
            reason,
        }
        .into());
    }
    Ok(())
}
