use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use tracing::debug;
use walkdir::WalkDir;

use crate::{Error, Result};

pub const BUNDLE_EXT: &str = "sparsebundle";
pub const METADATA_FILE: &str = "Info.plist";
pub const BANDS_DIR: &str = "bands";

/// Band identifier to modification time (seconds since epoch, truncated to
/// the configured granularity). Sorted so iteration is deterministic.
pub type BandMap = BTreeMap<String, u64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicaSide {
    Local,
    Remote,
}

impl std::fmt::Display for ReplicaSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplicaSide::Local => f.write_str("LOCAL"),
            ReplicaSide::Remote => f.write_str("REMOTE"),
        }
    }
}

/// Band scan state. Comparisons need `Loaded`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Bands {
    #[default]
    NotLoaded,
    Loaded(BandMap),
}

/// One physical copy of a vault:
/// `<root>/<vault>/<vault>.sparsebundle/{Info.plist,bands/}`.
#[derive(Debug, Clone)]
pub struct ReplicaStore {
    side: ReplicaSide,
    path: PathBuf,
    container_path: PathBuf,
    bands: Bands,
}

impl ReplicaStore {
    pub fn new(side: ReplicaSide, root: impl AsRef<Path>, vault_name: &str) -> Self {
        let path = root.as_ref().join(vault_name);
        let container_path = path.join(format!("{vault_name}.{BUNDLE_EXT}"));
        Self {
            side,
            path,
            container_path,
            bands: Bands::NotLoaded,
        }
    }

    pub fn side(&self) -> ReplicaSide {
        self.side
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn container_path(&self) -> &Path {
        &self.container_path
    }

    pub fn metadata_file_path(&self) -> PathBuf {
        self.container_path.join(METADATA_FILE)
    }

    pub fn bands_dir_path(&self) -> PathBuf {
        self.container_path.join(BANDS_DIR)
    }

    /// Check the replica directory, the container and its metadata file, in
    /// that order, failing on the first one missing.
    pub fn validate(&self) -> Result<()> {
        if !self.path.is_dir() {
            return Err(Error::MissingReplicaDir(self.path.display().to_string()).into());
        }
        if !self.container_path.is_dir() {
            return Err(Error::MissingContainer(self.container_path.display().to_string()).into());
        }
        let metadata = self.metadata_file_path();
        if !metadata.is_file() {
            return Err(Error::MissingMetadata(metadata.display().to_string()).into());
        }
        Ok(())
    }

    /// Scan the bands directory, keeping regular files only. Times are
    /// truncated to `granularity_secs` so both sides compare at the precision
    /// the sync transport preserves.
    pub fn load_bands(&mut self, granularity_secs: u64) -> Result<()> {
        let dir = self.bands_dir_path();
        if !dir.is_dir() {
            return Err(Error::BandsDirMissing(dir.display().to_string()).into());
        }

        let granularity = granularity_secs.max(1);
        let mut bands = BandMap::new();
        // Symlinks are followed: a link to a regular file counts as a band,
        // a dangling link does not.
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if is_unresolvable_link(&err) => {
                    debug!(path = ?err.path(), "skipping unresolvable link in bands dir");
                    continue;
                }
                Err(err) => return Err(Error::Io(err.into()).into()),
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let modified = entry.metadata().map_err(|e| Error::Io(e.into()))?.modified()?;
            let secs = epoch_secs(modified);
            bands.insert(
                entry.file_name().to_string_lossy().into_owned(),
                secs - secs % granularity,
            );
        }

        debug!(
            side = %self.side,
            bands_dir = %dir.display(),
            count = bands.len(),
            "bands loaded"
        );
        self.bands = Bands::Loaded(bands);
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.bands, Bands::Loaded(_))
    }

    /// The most recently loaded band set.
    pub fn bands(&self) -> Result<&BandMap> {
        match &self.bands {
            Bands::Loaded(map) => Ok(map),
            Bands::NotLoaded => {
                Err(Error::BandsNotLoaded(self.container_path.display().to_string()).into())
            }
        }
    }

    /// Install a band set directly, bypassing the filesystem scan.
    pub fn set_bands(&mut self, bands: BandMap) {
        self.bands = Bands::Loaded(bands);
    }

    /// Modification time of the bands directory, used as a coarse "last
    /// mounted" hint.
    pub fn modified_time(&self) -> Result<SystemTime> {
        Ok(std::fs::metadata(self.bands_dir_path())?.modified()?)
    }
}

fn is_unresolvable_link(err: &walkdir::Error) -> bool {
    err.loop_ancestor().is_some()
        || err
            .io_error()
            .is_some_and(|e| e.kind() == std::io::ErrorKind::NotFound)
}

fn epoch_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}
