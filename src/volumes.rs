//! Find mounted volumes and read how much space they have
//!
//! Two seams keep the rest of the crate platform agnostic:
//!
//! * A [`VolumeResolver`] turns a drive letter into the root path of the
//!   volume, `C:\` on Windows or whatever mount point was configured
//!   elsewhere.
//! * A [`VolumeSource`] lists mounted roots and reports capacity for one of
//!   them. [`SystemVolumes`] asks the operating system.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use sysinfo::Disks;
use tracing::debug;

use crate::units::{bytes_to_gb, percent_of};
use crate::validate::VolumeId;

/// Capacity counters for one volume, fresh from the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeUsage {
    pub total_bytes: u64,
    /// Space available to unprivileged users, like `df`'s "Avail"
    pub free_bytes: u64,
}

impl VolumeUsage {
    pub fn total_gb(&self) -> f64 {
        bytes_to_gb(self.total_bytes)
    }

    pub fn free_gb(&self) -> f64 {
        bytes_to_gb(self.free_bytes)
    }

    pub fn percent_free(&self) -> f64 {
        percent_of(self.free_gb(), self.total_gb())
    }
}

/// Where volumes come from
pub trait VolumeSource {
    /// Root paths of every mounted volume
    fn mounted_roots(&self) -> io::Result<Vec<PathBuf>>;

    /// Capacity of the volume mounted at `root`
    fn usage(&self, root: &Path) -> io::Result<VolumeUsage>;
}

/// Maps a drive letter onto the root path of its volume
pub trait VolumeResolver {
    fn root_path(&self, id: VolumeId) -> PathBuf;
}

/// Windows-style resolution: `C` lives at `C:\`
#[derive(Debug, Default, Clone, Copy)]
pub struct DriveLetters;

impl VolumeResolver for DriveLetters {
    fn root_path(&self, id: VolumeId) -> PathBuf {
        PathBuf::from(format!("{}:\\", id.letter()))
    }
}

/// Explicit letter to mount point table, for hosts without drive letters
///
/// Letters missing from the table fall back to drive-letter paths, which
/// simply won't be mounted on such hosts.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MountMap {
    roots: BTreeMap<VolumeId, PathBuf>,
}

impl MountMap {
    pub fn new(roots: BTreeMap<VolumeId, PathBuf>) -> MountMap {
        MountMap { roots }
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn insert(&mut self, id: VolumeId, root: PathBuf) {
        self.roots.insert(id, root);
    }
}

impl VolumeResolver for MountMap {
    fn root_path(&self, id: VolumeId) -> PathBuf {
        match self.roots.get(&id) {
            Some(root) => root.clone(),
            None => DriveLetters.root_path(id),
        }
    }
}

/// The volumes the operating system knows about
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemVolumes;

impl VolumeSource for SystemVolumes {
    fn mounted_roots(&self) -> io::Result<Vec<PathBuf>> {
        let disks = Disks::new_with_refreshed_list();
        let roots: Vec<PathBuf> = disks
            .list()
            .iter()
            .map(|disk| disk.mount_point().to_path_buf())
            .collect();
        debug!(count = roots.len(), "enumerated mounted volumes");
        Ok(roots)
    }

    fn usage(&self, root: &Path) -> io::Result<VolumeUsage> {
        let usage = platform_usage(root)?;
        debug!(
            root = %root.display(),
            total_bytes = usage.total_bytes,
            free_bytes = usage.free_bytes,
            "queried volume usage"
        );
        Ok(usage)
    }
}

#[cfg(unix)]
fn platform_usage(root: &Path) -> io::Result<VolumeUsage> {
    use nix::sys::statvfs::statvfs;

    let stat = statvfs(root)?;
    let fragment = stat.fragment_size() as u64;
    Ok(VolumeUsage {
        total_bytes: stat.blocks() as u64 * fragment,
        free_bytes: stat.blocks_available() as u64 * fragment,
    })
}

#[cfg(not(unix))]
fn platform_usage(root: &Path) -> io::Result<VolumeUsage> {
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .find(|disk| disk.mount_point() == root)
        .map(|disk| VolumeUsage {
            total_bytes: disk.total_space(),
            free_bytes: disk.available_space(),
        })
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no mounted volume at {}", root.display()),
            )
        })
}

/// Whether the volume named by `id` is currently mounted
pub fn volume_exists(
    source: &dyn VolumeSource,
    resolver: &dyn VolumeResolver,
    id: VolumeId,
) -> io::Result<bool> {
    let root = resolver.root_path(id);
    Ok(source.mounted_roots()?.iter().any(|mounted| *mounted == root))
}

/// Read the current capacity of the volume named by `id`
pub fn query_volume_usage(
    source: &dyn VolumeSource,
    resolver: &dyn VolumeResolver,
    id: VolumeId,
) -> io::Result<VolumeUsage> {
    source.usage(&resolver.root_path(id))
}

/// False if the volume could never hold `threshold_gb` of free space
pub fn check_threshold_within_capacity(
    source: &dyn VolumeSource,
    resolver: &dyn VolumeResolver,
    id: VolumeId,
    threshold_gb: u64,
) -> io::Result<bool> {
    let usage = query_volume_usage(source, resolver, id)?;
    Ok(usage.total_gb() > threshold_gb as f64)
}
