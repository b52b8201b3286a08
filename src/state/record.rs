use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{Error, Result};

pub const SCHEMA_VERSION: &str = "1.0";
pub const STATE_FILE_EXT: &str = "json";

/// The persisted document, one per vault name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VaultState {
    pub schema_version: String,
    pub mounted_writable: bool,
    #[serde(default)]
    pub owner_computer_name: String,
    pub needs_backup: bool,
    /// Bumped on every write. Lets a writer notice that someone else saved
    /// in between its load and its save. Absent in older files.
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub updated_at: u64,
}

impl Default for VaultState {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            mounted_writable: false,
            owner_computer_name: String::new(),
            needs_backup: false,
            revision: 0,
            updated_at: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Nothing changed since load; no write happened.
    Skipped,
    Written { revision: u64 },
    /// Written, but the file on disk had moved past the revision we loaded.
    Overwrote { expected: u64, found: u64, revision: u64 },
}

/// Ownership bookkeeping for one vault, backed by `<state_dir>/<vault>.json`.
///
/// There is no cross-process or cross-machine locking. The record is an
/// advisory hint that may be stale by the time it is read.
#[derive(Debug, Clone)]
pub struct StateRecord {
    path: PathBuf,
    state: VaultState,
    /// Revision found on disk at load time; `None` if the file did not exist.
    loaded_revision: Option<u64>,
    dirty: bool,
}

impl StateRecord {
    /// Load the record for `vault_name`, or start from defaults when no file
    /// exists yet. A fresh record is not dirty: the file is created by the
    /// first save that carries an actual change.
    pub fn load(state_dir: &Path, vault_name: &str) -> Result<Self> {
        let path = state_path(state_dir, vault_name);
        let (state, loaded_revision) = match read_state(&path)? {
            Some(state) => {
                let rev = state.revision;
                (state, Some(rev))
            }
            None => {
                debug!(path = %path.display(), "no state record, using defaults");
                (VaultState::default(), None)
            }
        };

        Ok(Self {
            path,
            state,
            loaded_revision,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &VaultState {
        &self.state
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn exists_on_disk(&self) -> bool {
        self.loaded_revision.is_some()
    }

    pub fn is_mounted(&self) -> bool {
        self.state.mounted_writable
    }

    pub fn set_mounted(&mut self, mounted: bool) {
        if self.state.mounted_writable != mounted {
            self.state.mounted_writable = mounted;
            self.dirty = true;
        }
    }

    pub fn owner_name(&self) -> &str {
        &self.state.owner_computer_name
    }

    pub fn set_owner_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        if self.state.owner_computer_name != name {
            self.state.owner_computer_name = name;
            self.dirty = true;
        }
    }

    pub fn needs_backup(&self) -> bool {
        self.state.needs_backup
    }

    pub fn set_needs_backup(&mut self, needs_backup: bool) {
        if self.state.needs_backup != needs_backup {
            self.state.needs_backup = needs_backup;
            self.dirty = true;
        }
    }

    /// True when the record names `computer` as the holder of a writable mount.
    pub fn is_owned_by(&self, computer: &str) -> bool {
        self.state.mounted_writable && self.state.owner_computer_name == computer
    }

    /// Persist the record if any mutator changed it.
    ///
    /// The on-disk copy is re-read first; a revision other than the one we
    /// loaded means another writer got in between. That is reported through
    /// [`SaveOutcome::Overwrote`], not prevented.
    pub fn save(&mut self) -> Result<SaveOutcome> {
        if !self.dirty {
            return Ok(SaveOutcome::Skipped);
        }

        let on_disk = read_state(&self.path)?.map(|s| s.revision);
        let expected = self.loaded_revision.unwrap_or(0);
        let conflict = match (self.loaded_revision, on_disk) {
            (Some(loaded), Some(found)) => (loaded != found).then_some(found),
            (None, Some(found)) => Some(found),
            _ => None,
        };

        let revision = on_disk.unwrap_or(expected).max(expected) + 1;
        self.state.revision = revision;
        self.state.updated_at = now_secs();
        write_state(&self.path, &self.state)?;

        self.loaded_revision = Some(revision);
        self.dirty = false;

        match conflict {
            Some(found) => {
                warn!(
                    path = %self.path.display(),
                    expected,
                    found,
                    revision,
                    "state record changed on disk since it was loaded"
                );
                Ok(SaveOutcome::Overwrote {
                    expected,
                    found,
                    revision,
                })
            }
            None => {
                info!(path = %self.path.display(), revision, "state record persisted");
                Ok(SaveOutcome::Written { revision })
            }
        }
    }
}

pub fn state_path(state_dir: &Path, vault_name: &str) -> PathBuf {
    state_dir.join(format!("{vault_name}.{STATE_FILE_EXT}"))
}

fn read_state(path: &Path) -> Result<Option<VaultState>> {
    let contents = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(persistence(path, err).into()),
    };
    let state: VaultState =
        serde_json::from_slice(&contents).map_err(|e| persistence(path, e))?;
    Ok(Some(state))
}

/// Write via a sibling temp file and rename so readers never see a partial
/// document.
fn write_state(path: &Path, state: &VaultState) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| persistence(path, e))?;
    }
    let data = serde_json::to_vec_pretty(state).map_err(|e| persistence(path, e))?;
    let tmp = path.with_extension(format!("{STATE_FILE_EXT}.tmp"));
    fs::write(&tmp, data).map_err(|e| persistence(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| persistence(path, e))?;
    Ok(())
}

fn persistence(path: &Path, err: impl std::fmt::Display) -> Error {
    Error::Persistence {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
