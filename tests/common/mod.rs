//! Shared fixtures: scratch replica trees and recording collaborators.
#![allow(dead_code)]

use std::{
    cell::{Cell, RefCell},
    fs::{self, File},
    path::{Path, PathBuf},
    rc::Rc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use ev::{
    config::Config,
    logging::Reporter,
    replica::{BANDS_DIR, BUNDLE_EXT, METADATA_FILE},
    vault::{Collaborators, DirectoryMirror, DiskImageTool, Vault},
};
use tempfile::{tempdir, TempDir};

pub const THIS_HOST: &str = "desk";
pub const OTHER_HOST: &str = "laptop";

#[derive(Default)]
struct ImagesState {
    mounted: RefCell<Option<PathBuf>>,
    mount_rc: Cell<i32>,
    unmount_rc: Cell<i32>,
    calls: RefCell<Vec<String>>,
    on_mount: RefCell<Option<Box<dyn Fn()>>>,
}

/// Disk image tool that tracks a single attached volume in memory.
#[derive(Clone, Default)]
pub struct FakeImages {
    state: Rc<ImagesState>,
}

impl FakeImages {
    pub fn set_mounted(&self, mount_point: Option<&str>) {
        *self.state.mounted.borrow_mut() = mount_point.map(PathBuf::from);
    }

    pub fn mounted(&self) -> Option<PathBuf> {
        self.state.mounted.borrow().clone()
    }

    pub fn fail_mount_with(&self, rc: i32) {
        self.state.mount_rc.set(rc);
    }

    pub fn fail_unmount_with(&self, rc: i32) {
        self.state.unmount_rc.set(rc);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.calls.borrow().clone()
    }

    /// Run `hook` inside every `mount_image` call.
    pub fn on_mount(&self, hook: impl Fn() + 'static) {
        *self.state.on_mount.borrow_mut() = Some(Box::new(hook));
    }
}

impl DiskImageTool for FakeImages {
    fn mount_image(&self, container: &Path, read_only: bool) -> ev::Result<i32> {
        self.state
            .calls
            .borrow_mut()
            .push(format!("mount {} ro={read_only}", container.display()));
        if let Some(hook) = self.state.on_mount.borrow().as_ref() {
            hook();
        }
        let rc = self.state.mount_rc.get();
        if rc == 0 {
            self.set_mounted(Some("/Volumes/vault"));
        }
        Ok(rc)
    }

    fn unmount_volume(&self, mount_point: &Path) -> ev::Result<i32> {
        self.state
            .calls
            .borrow_mut()
            .push(format!("unmount {}", mount_point.display()));
        let rc = self.state.unmount_rc.get();
        if rc == 0 {
            self.set_mounted(None);
        }
        Ok(rc)
    }

    fn find_mounted_volume(&self, _container: &Path) -> ev::Result<Option<PathBuf>> {
        Ok(self.mounted())
    }
}

#[derive(Default)]
struct MirrorState {
    rc: Cell<i32>,
    copies: RefCell<Vec<(PathBuf, PathBuf)>>,
}

/// Mirror that records (source, destination) pairs without copying.
#[derive(Clone, Default)]
pub struct FakeMirror {
    state: Rc<MirrorState>,
}

impl FakeMirror {
    pub fn fail_with(&self, rc: i32) {
        self.state.rc.set(rc);
    }

    pub fn copies(&self) -> Vec<(PathBuf, PathBuf)> {
        self.state.copies.borrow().clone()
    }
}

impl DirectoryMirror for FakeMirror {
    fn mirror(&self, source: &Path, destination: &Path) -> ev::Result<i32> {
        self.state
            .copies
            .borrow_mut()
            .push((source.to_path_buf(), destination.to_path_buf()));
        Ok(self.state.rc.get())
    }
}

#[derive(Clone, Default)]
pub struct RecordingReporter {
    lines: Rc<RefCell<Vec<String>>>,
}

impl RecordingReporter {
    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.borrow().iter().any(|l| l.contains(needle))
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, message: &str) {
        self.lines.borrow_mut().push(message.to_string());
    }
}

/// Scratch local/remote roots plus fakes wired into a config.
pub struct Fixture {
    pub root: TempDir,
    pub config: Config,
    pub images: FakeImages,
    pub mirror: FakeMirror,
    pub reporter: RecordingReporter,
}

impl Fixture {
    pub fn new() -> Self {
        Self::for_host(THIS_HOST)
    }

    pub fn for_host(host: &str) -> Self {
        let root = tempdir().expect("tempdir");
        let config = Config {
            local_root: root.path().join("local"),
            remote_root: root.path().join("remote"),
            state_dir: Some(root.path().join("state")),
            computer_name: Some(host.to_string()),
            ..Config::default()
        };
        fs::create_dir_all(&config.local_root).expect("local root");
        fs::create_dir_all(&config.remote_root).expect("remote root");
        Self {
            root,
            config,
            images: FakeImages::default(),
            mirror: FakeMirror::default(),
            reporter: RecordingReporter::default(),
        }
    }

    /// Same roots and fakes, different machine identity.
    pub fn config_for_host(&self, host: &str) -> Config {
        Config {
            computer_name: Some(host.to_string()),
            ..self.config.clone()
        }
    }

    pub fn with_replicas(self, name: &str) -> Self {
        make_replica(&self.config.local_root, name);
        make_replica(&self.config.remote_root, name);
        self
    }

    pub fn tools(&self) -> Collaborators {
        Collaborators {
            images: Box::new(self.images.clone()),
            mirror: Box::new(self.mirror.clone()),
            reporter: Box::new(self.reporter.clone()),
        }
    }

    pub fn vault(&self, name: &str) -> Vault {
        Vault::open(name, &self.config, self.tools())
    }

    pub fn vault_as(&self, name: &str, host: &str) -> Vault {
        Vault::open(name, &self.config_for_host(host), self.tools())
    }

    pub fn state_dir(&self) -> PathBuf {
        self.config.state_dir()
    }

    pub fn local_bands(&self, name: &str) -> PathBuf {
        bands_dir(&self.config.local_root, name)
    }

    pub fn remote_bands(&self, name: &str) -> PathBuf {
        bands_dir(&self.config.remote_root, name)
    }
}

pub fn container_dir(root: &Path, name: &str) -> PathBuf {
    root.join(name).join(format!("{name}.{BUNDLE_EXT}"))
}

pub fn bands_dir(root: &Path, name: &str) -> PathBuf {
    container_dir(root, name).join(BANDS_DIR)
}

/// Create `<root>/<name>/<name>.sparsebundle/{Info.plist,bands/}`.
pub fn make_replica(root: &Path, name: &str) -> PathBuf {
    let container = container_dir(root, name);
    fs::create_dir_all(container.join(BANDS_DIR)).expect("bands dir");
    fs::write(container.join(METADATA_FILE), b"<plist/>").expect("metadata file");
    container
}

/// Write a band file with its modification time pinned to `secs` (plus an
/// optional sub-second part).
pub fn write_band_at(dir: &Path, band: &str, secs: u64, nanos: u32) {
    let path = dir.join(band);
    fs::write(&path, band.as_bytes()).expect("band file");
    let file = File::options().write(true).open(&path).expect("open band");
    file.set_modified(UNIX_EPOCH + Duration::new(secs, nanos))
        .expect("set mtime");
}

pub fn write_band(dir: &Path, band: &str, secs: u64) {
    write_band_at(dir, band, secs, 0);
}

pub fn write_bands(dir: &Path, bands: &[(&str, u64)]) {
    for (band, secs) in bands {
        write_band(dir, band, *secs);
    }
}

pub fn set_dir_mtime(dir: &Path, time: SystemTime) {
    File::open(dir)
        .and_then(|f| f.set_modified(time))
        .expect("set dir mtime");
}
