//! Configuration for the vault console.
//!
//! Loaded from TOML; every field has a default so a missing file is valid.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Error, Result};

pub const CONFIG_ENV: &str = "EV_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the local replicas, one subdirectory per vault.
    pub local_root: PathBuf,

    /// Directory inside the sync folder holding the remote replicas.
    pub remote_root: PathBuf,

    /// Where `<vault>.json` state records live. Defaults to `local_root`.
    pub state_dir: Option<PathBuf>,

    /// Band modification times are truncated to this many seconds before
    /// comparison. The sync transport drops sub-second precision.
    pub mtime_granularity_secs: u64,

    /// Identity recorded as the owner of a writable mount. Defaults to the
    /// OS hostname.
    pub computer_name: Option<String>,

    pub tools: ToolsConfig,
}

/// External programs used for disk image and copy operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub hdiutil: PathBuf,
    pub rsync: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            hdiutil: PathBuf::from("hdiutil"),
            rsync: PathBuf::from("rsync"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            local_root: PathBuf::from("~/vaults"),
            remote_root: PathBuf::from("~/Dropbox/system/vaults"),
            state_dir: None,
            mtime_granularity_secs: 1,
            computer_name: None,
            tools: ToolsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the config file (explicit path, `$EV_CONFIG`, then the user
    /// config dir), load it if present and apply environment overrides.
    ///
    /// An explicitly named file must exist; the implicit locations may not.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => match std::env::var_os(CONFIG_ENV) {
                Some(path) => Self::load(Path::new(&path))?,
                None => {
                    let path = default_config_path();
                    if path.exists() {
                        Self::load(&path)?
                    } else {
                        debug!(path = %path.display(), "no config file, using defaults");
                        Self::default()
                    }
                }
            },
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `EV_*` overrides. The lookup is injected so callers (and tests)
    /// control where values come from.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get("EV_LOCAL_ROOT") {
            self.local_root = PathBuf::from(v);
        }
        if let Some(v) = get("EV_REMOTE_ROOT") {
            self.remote_root = PathBuf::from(v);
        }
        if let Some(v) = get("EV_STATE_DIR") {
            self.state_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get("EV_COMPUTER_NAME") {
            self.computer_name = Some(v);
        }
        if let Some(v) = get("EV_MTIME_GRANULARITY_SECS") {
            match v.parse::<u64>() {
                Ok(secs) => self.mtime_granularity_secs = secs,
                Err(err) => warn!("invalid EV_MTIME_GRANULARITY_SECS, ignoring: {err}"),
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.mtime_granularity_secs == 0 {
            return Err(Error::Config("mtime_granularity_secs must be at least 1".into()).into());
        }
        if let Some(name) = &self.computer_name {
            if name.trim().is_empty() {
                return Err(Error::Config("computer_name must not be empty".into()).into());
            }
        }
        Ok(())
    }

    pub fn local_root(&self) -> PathBuf {
        expand_home(&self.local_root)
    }

    pub fn remote_root(&self) -> PathBuf {
        expand_home(&self.remote_root)
    }

    pub fn state_dir(&self) -> PathBuf {
        match &self.state_dir {
            Some(dir) => expand_home(dir),
            None => self.local_root(),
        }
    }

    /// This machine's identity for ownership bookkeeping.
    pub fn computer_name(&self) -> String {
        self.computer_name.clone().unwrap_or_else(|| {
            hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".into())
        })
    }
}

pub fn default_config_path() -> PathBuf {
    expand_home(Path::new("~/.config/ev/config.toml"))
}

/// Expand a leading `~` using `$HOME`. Other paths are returned unchanged.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}
