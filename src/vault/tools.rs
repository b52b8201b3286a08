//! External collaborators: disk image attach/detach and directory mirroring.
//!
//! The coordinator only sees the traits; `Hdiutil` and `Rsync` shell out to
//! the real programs.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    process::{Command, ExitStatus},
};

use serde::Deserialize;
use tracing::debug;

use crate::{Error, Result};

/// Content hint of the file system entity that carries the vault volume.
pub const VOLUME_CONTENT_HINT: &str = "Apple_HFS";

/// Attach, detach and locate mounted disk images.
pub trait DiskImageTool {
    /// Attach `container` as a volume. Returns the tool's exit code.
    fn mount_image(&self, container: &Path, read_only: bool) -> Result<i32>;

    /// Detach the volume mounted at `mount_point`. Returns the exit code.
    fn unmount_volume(&self, mount_point: &Path) -> Result<i32>;

    /// Mount point of the volume attached from `container`, if any.
    fn find_mounted_volume(&self, container: &Path) -> Result<Option<PathBuf>>;
}

/// Make `destination` an exact copy of `source`, deletions included.
pub trait DirectoryMirror {
    fn mirror(&self, source: &Path, destination: &Path) -> Result<i32>;
}

/// The parts of `hdiutil info -plist` the lookup needs. Everything else in
/// the property list is ignored.
#[derive(Debug, Default, Deserialize)]
pub struct HdiInfo {
    #[serde(default)]
    pub images: Vec<AttachedImage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AttachedImage {
    #[serde(default)]
    pub image_path: Option<PathBuf>,
    #[serde(default)]
    pub system_entities: Vec<SystemEntity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SystemEntity {
    #[serde(default)]
    pub dev_entry: Option<String>,
    #[serde(default)]
    pub content_hint: Option<String>,
    #[serde(default)]
    pub mount_point: Option<PathBuf>,
}

impl HdiInfo {
    /// Parse the XML (or binary) property list printed by `hdiutil info -plist`.
    pub fn from_plist(bytes: &[u8]) -> Result<Self> {
        plist::from_bytes(bytes)
            .map_err(|e| Error::Cli(format!("could not parse hdiutil info output: {e}")).into())
    }

    /// Mount point of the `Apple_HFS` entity of the image attached from
    /// `container`. An image that is attached but has no mounted volume
    /// yields `None`.
    pub fn mounted_volume(&self, container: &Path) -> Option<PathBuf> {
        self.images
            .iter()
            .filter(|image| {
                image
                    .image_path
                    .as_deref()
                    .is_some_and(|path| paths_match(path, container))
            })
            .flat_map(|image| image.system_entities.iter())
            .find(|entity| entity.content_hint.as_deref() == Some(VOLUME_CONTENT_HINT))
            .and_then(|entity| entity.mount_point.clone())
    }
}

#[derive(Debug, Clone)]
pub struct Hdiutil {
    program: PathBuf,
}

impl Hdiutil {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl DiskImageTool for Hdiutil {
    fn mount_image(&self, container: &Path, read_only: bool) -> Result<i32> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("attach").arg(container);
        if read_only {
            cmd.arg("-readonly");
        }
        run_status(&self.program, &mut cmd)
    }

    fn unmount_volume(&self, mount_point: &Path) -> Result<i32> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("detach").arg(mount_point);
        run_status(&self.program, &mut cmd)
    }

    fn find_mounted_volume(&self, container: &Path) -> Result<Option<PathBuf>> {
        let output = Command::new(&self.program)
            .arg("info")
            .arg("-plist")
            .output()
            .map_err(|e| spawn_error(&self.program, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Cli(format!(
                "{} info failed with exit code {:?}: {}",
                self.program.display(),
                output.status.code(),
                stderr.trim()
            ))
            .into());
        }

        let info = HdiInfo::from_plist(&output.stdout)?;
        debug!(images = info.images.len(), "hdiutil info parsed");
        Ok(info.mounted_volume(container))
    }
}

#[derive(Debug, Clone)]
pub struct Rsync {
    program: PathBuf,
}

impl Rsync {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl DirectoryMirror for Rsync {
    fn mirror(&self, source: &Path, destination: &Path) -> Result<i32> {
        // Trailing slash: copy the contents of source, not source itself.
        let mut src = source.as_os_str().to_os_string();
        src.push("/");
        let mut cmd = Command::new(&self.program);
        cmd.arg("-a").arg("--delete").arg(src).arg(destination);
        run_status(&self.program, &mut cmd)
    }
}

fn run_status(program: &Path, cmd: &mut Command) -> Result<i32> {
    debug!(command = ?cmd, "running external tool");
    let status = cmd.status().map_err(|e| spawn_error(program, e))?;
    Ok(exit_code(status))
}

/// Exit code of a finished child; -1 when it was killed by a signal.
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

fn spawn_error(program: &Path, err: std::io::Error) -> Error {
    if err.kind() == ErrorKind::NotFound {
        Error::Cli(format!(
            "{} not found in PATH; check the [tools] section of the config",
            program.display()
        ))
    } else {
        Error::Io(err)
    }
}

fn canonicalize_or(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn paths_match(a: &Path, b: &Path) -> bool {
    canonicalize_or(a) == canonicalize_or(b)
}
