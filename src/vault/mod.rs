//! Vault coordinator.
//!
//! Ties the local and remote replicas of one vault to its state record and
//! enforces the ownership protocol around mount, dismount, backup and
//! restore. Every check reads the record immediately before acting; nothing
//! here is atomic across machines.

use std::{
    ffi::OsStr,
    path::{Component, Path, PathBuf},
};

use tracing::{info, instrument, warn};

use crate::{
    config::Config,
    logging::{NullReporter, Reporter},
    replica::{ReplicaSide, ReplicaStore},
    state::{SaveOutcome, StateRecord},
    Error, Result,
};

pub mod status;
pub mod tools;

pub use status::StatusReport;
pub use tools::{DirectoryMirror, DiskImageTool, HdiInfo, Hdiutil, Rsync};

/// Outcome of construction-time layout validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validity {
    Valid,
    Invalid { code: i32, reason: String },
}

/// Where the vault stands, combining the record with what is attached here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VaultPhase {
    Unmounted,
    MountedWritableLocal,
    MountedReadOnly,
    Invalid,
}

/// The external programs and message sink a vault talks to.
pub struct Collaborators {
    pub images: Box<dyn DiskImageTool>,
    pub mirror: Box<dyn DirectoryMirror>,
    pub reporter: Box<dyn Reporter>,
}

impl Collaborators {
    /// Real tools from the config, narrative discarded.
    pub fn from_config(config: &Config) -> Self {
        Self {
            images: Box::new(Hdiutil::new(&config.tools.hdiutil)),
            mirror: Box::new(Rsync::new(&config.tools.rsync)),
            reporter: Box::new(NullReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Box<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }
}

pub struct Vault {
    name: String,
    computer_name: String,
    state_dir: PathBuf,
    granularity_secs: u64,
    local: ReplicaStore,
    remote: ReplicaStore,
    validity: Validity,
    images: Box<dyn DiskImageTool>,
    mirror: Box<dyn DirectoryMirror>,
    reporter: Box<dyn Reporter>,
}

impl Vault {
    /// Build the vault and validate both replica layouts once. A missing
    /// directory, container or metadata file leaves the vault `Invalid`;
    /// only `status` is useful afterwards.
    pub fn open(name: &str, config: &Config, tools: Collaborators) -> Self {
        let local = ReplicaStore::new(ReplicaSide::Local, config.local_root(), name);
        let remote = ReplicaStore::new(ReplicaSide::Remote, config.remote_root(), name);

        let validity = match validate_name(name)
            .and_then(|_| local.validate())
            .and_then(|_| remote.validate())
        {
            Ok(()) => Validity::Valid,
            Err(err) => {
                let code = err.downcast_ref::<Error>().map(Error::code).unwrap_or(1);
                warn!(vault = name, code, error = %err, "vault failed validation");
                Validity::Invalid {
                    code,
                    reason: err.to_string(),
                }
            }
        };

        Self {
            name: name.to_string(),
            computer_name: config.computer_name(),
            state_dir: config.state_dir(),
            granularity_secs: config.mtime_granularity_secs,
            local,
            remote,
            validity,
            images: tools.images,
            mirror: tools.mirror,
            reporter: tools.reporter,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn computer_name(&self) -> &str {
        &self.computer_name
    }

    pub fn local(&self) -> &ReplicaStore {
        &self.local
    }

    pub fn remote(&self) -> &ReplicaStore {
        &self.remote
    }

    pub fn validity(&self) -> &Validity {
        &self.validity
    }

    pub fn is_valid(&self) -> bool {
        self.validity == Validity::Valid
    }

    pub fn load_record(&self) -> Result<StateRecord> {
        StateRecord::load(&self.state_dir, &self.name)
    }

    /// Mount the local replica. Refuses while the record shows a writable
    /// mount anywhere. Only writable mounts are recorded as ownership.
    ///
    /// Returns the disk image tool's exit code; the caller decides how to
    /// surface a non-zero result.
    #[instrument(skip(self), fields(vault = %self.name))]
    pub fn mount(&self, read_only: bool) -> Result<i32> {
        self.ensure_valid()?;
        let mut record = self.load_record()?;

        if record.is_mounted() {
            return Err(Error::AlreadyMounted {
                vault: self.name.clone(),
                owner: record.owner_name().to_string(),
            }
            .into());
        }

        let container = self.local.container_path();
        self.report(format!(
            "mounting encrypted vault: {}{}",
            container.display(),
            if read_only { " (read-only)" } else { "" }
        ));
        let rc = self.images.mount_image(container, read_only)?;

        if rc != 0 {
            warn!(rc, read_only, "mount failed");
            self.report(format!("mount returned {rc}; state record left unchanged"));
            return Ok(rc);
        }

        if !read_only {
            self.report("setting mounted flag and owner computer name");
            record.set_mounted(true);
            record.set_owner_name(self.computer_name.clone());
            self.save_record(&mut record)?;
        }
        info!(read_only, owner = %self.computer_name, "vault mounted");
        Ok(rc)
    }

    /// Read-only mount.
    pub fn attach(&self) -> Result<i32> {
        self.mount(true)
    }

    /// Detach the local volume if attached, then release ownership if this
    /// machine held it. A failed detach leaves the record alone.
    #[instrument(skip(self), fields(vault = %self.name))]
    pub fn dismount(&self) -> Result<i32> {
        self.ensure_valid()?;
        self.report(format!("Dismounting {}...", self.name));
        let mut record = self.load_record()?;

        let container = self.local.container_path();
        let rc = match self.images.find_mounted_volume(container)? {
            Some(mount_point) => {
                self.report(format!(
                    "ejecting encrypted vault mounted at {}",
                    mount_point.display()
                ));
                self.images.unmount_volume(&mount_point)?
            }
            None => {
                self.report(format!(
                    "no volume is currently mounted from {}",
                    container.display()
                ));
                0
            }
        };

        if rc != 0 {
            warn!(rc, "unmount failed; state record untouched");
            self.report(format!(
                "unmount returned {rc}; leaving the state record untouched"
            ));
            return Ok(rc);
        }

        if record.is_owned_by(&self.computer_name) {
            self.report("clearing mounted flag and setting needs-backup");
            record.set_mounted(false);
            record.set_needs_backup(true);
            self.save_record(&mut record)?;
            info!("writable mount released");
        } else {
            let owner = display_owner(record.owner_name());
            warn!(owner = %owner, mounted = record.is_mounted(), "dismount without local ownership");
            self.report(format!(
                "doesn't look like you had this mounted last -> {owner}"
            ));
        }
        Ok(rc)
    }

    /// Mirror local onto remote. Only the machine that last held the
    /// writable mount may push, and never while a writable mount is open.
    #[instrument(skip(self), fields(vault = %self.name))]
    pub fn backup(&self) -> Result<i32> {
        self.ensure_valid()?;
        let mut record = self.load_record()?;

        if record.is_mounted() {
            return Err(Error::UnsafeOperation(format!(
                "can't back up the vault while it is mounted by {}",
                display_owner(record.owner_name())
            ))
            .into());
        }

        if !record.needs_backup() {
            self.report("According to my records, this vault doesn't need to be backed up...");
        }

        if record.owner_name() != self.computer_name {
            return Err(Error::UnsafeOperation(format!(
                "{} did not hold the last writable mount ({} did); not backing up this copy",
                self.computer_name,
                display_owner(record.owner_name())
            ))
            .into());
        }

        self.report(format!(
            "Backing up LOCAL ({}) to REMOTE ({})...",
            self.local.path().display(),
            self.remote.path().display()
        ));
        let rc = self.mirror.mirror(self.local.path(), self.remote.path())?;

        if rc != 0 {
            warn!(rc, "backup copy failed");
            self.report(format!("copy returned {rc}; needs-backup left set"));
            return Ok(rc);
        }

        record.set_needs_backup(false);
        self.save_record(&mut record)?;
        info!("backup completed");
        Ok(rc)
    }

    /// Mirror remote onto local, unless the local image is attached here.
    /// Restoring does not establish ownership, so the record is not written.
    #[instrument(skip(self), fields(vault = %self.name))]
    pub fn restore(&self) -> Result<i32> {
        self.ensure_valid()?;
        let record = self.load_record()?;
        if record.is_mounted() {
            self.report(format!(
                "FYI, restoring while the record says the vault is mounted by {}",
                display_owner(record.owner_name())
            ));
        }

        if let Some(mount_point) = self.images.find_mounted_volume(self.local.container_path())? {
            return Err(Error::UnsafeOperation(format!(
                "can't restore the vault while it is mounted locally at {}",
                mount_point.display()
            ))
            .into());
        }

        self.report(format!(
            "Restoring LOCAL ({}) from REMOTE ({})...",
            self.local.path().display(),
            self.remote.path().display()
        ));
        let rc = self.mirror.mirror(self.remote.path(), self.local.path())?;
        if rc != 0 {
            warn!(rc, "restore copy failed");
        } else {
            info!("restore completed");
        }
        Ok(rc)
    }

    /// Combine validity, the record and the attached-volume lookup.
    pub fn phase(&self) -> Result<VaultPhase> {
        if !self.is_valid() {
            return Ok(VaultPhase::Invalid);
        }
        let record = self.load_record()?;
        let attached = self
            .images
            .find_mounted_volume(self.local.container_path())?
            .is_some();
        Ok(match (attached, record.is_owned_by(&self.computer_name)) {
            (true, true) => VaultPhase::MountedWritableLocal,
            (true, false) => VaultPhase::MountedReadOnly,
            (false, _) => VaultPhase::Unmounted,
        })
    }

    fn ensure_valid(&self) -> Result<()> {
        match &self.validity {
            Validity::Valid => Ok(()),
            Validity::Invalid { reason, .. } => Err(Error::VaultInvalid {
                vault: self.name.clone(),
                reason: reason.clone(),
            }
            .into()),
        }
    }

    fn save_record(&self, record: &mut StateRecord) -> Result<()> {
        if let SaveOutcome::Overwrote {
            expected, found, ..
        } = record.save()?
        {
            self.report(format!(
                "warning: the state record changed on disk since it was read \
                 (expected revision {expected}, found {found}); another machine may be using this vault"
            ));
        }
        Ok(())
    }

    fn report(&self, message: impl AsRef<str>) {
        self.reporter.report(message.as_ref());
    }
}

/// Vault names become directory and file names under the configured roots,
/// so they must be exactly one normal path component.
pub fn validate_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == OsStr::new(name) => Ok(()),
        _ => Err(Error::InvalidVaultName(name.to_string()).into()),
    }
}

fn display_owner(owner: &str) -> &str {
    if owner.is_empty() {
        "<nobody>"
    } else {
        owner
    }
}
