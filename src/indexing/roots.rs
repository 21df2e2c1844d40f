//! Root discovery: which top-level directories get crawled and watched.
//!
//! Discovery never fails. Volumes that are not ready or not eligible are
//! logged and skipped, and an empty result simply yields an empty index.
//!
//! `sysinfo` only reports disk-backed volumes, so on Linux the kernel mount
//! table is read as well to find pseudo file systems (`/proc`, `/sys`,
//! `/dev`, cgroups) that live under an eligible root.

use std::path::{Path, PathBuf};

use sysinfo::Disks;

/// Source of roots to crawl and watch.
///
/// Every call re-enumerates, so a source can be asked again after volumes
/// come and go.
pub trait RootSource: Send + Sync {
    /// Directories to crawl and watch.
    fn roots(&self) -> Vec<PathBuf>;

    /// Paths inside those roots that must not be walked (mount points of
    /// pseudo, network or removable file systems).
    fn excluded(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}

/// How a mounted volume is classified for indexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeClass {
    Fixed,
    Removable,
    Network,
    Virtual,
}

const NETWORK_FILE_SYSTEMS: &[&str] = &[
    "nfs", "nfs4", "cifs", "smbfs", "smb3", "sshfs", "afs", "9p", "ncpfs", "davfs", "webdav",
    "glusterfs", "ceph", "lustre", "afpfs",
];

const VIRTUAL_FILE_SYSTEMS: &[&str] = &[
    "proc", "sysfs", "tmpfs", "devtmpfs", "devpts", "devfs", "overlay", "squashfs", "cgroup",
    "cgroup2", "debugfs", "tracefs", "securityfs", "pstore", "bpf", "configfs", "fusectl",
    "mqueue", "hugetlbfs", "autofs", "binfmt_misc", "efivarfs", "ramfs", "nsfs", "rpc_pipefs",
    "iso9660", "udf",
];

/// Classify a volume by file system name and removability.
pub fn classify_volume(file_system: &str, is_removable: bool) -> VolumeClass {
    let fs = file_system.to_ascii_lowercase();
    if is_removable {
        return VolumeClass::Removable;
    }
    // fuse.sshfs, fuse.rclone and friends are user-space network mounts
    if NETWORK_FILE_SYSTEMS.contains(&fs.as_str()) || fs.starts_with("fuse.") {
        return VolumeClass::Network;
    }
    if VIRTUAL_FILE_SYSTEMS.contains(&fs.as_str()) {
        return VolumeClass::Virtual;
    }
    VolumeClass::Fixed
}

/// Whether a root can be listed right now.
fn is_ready(path: &Path) -> bool {
    match std::fs::read_dir(path) {
        Ok(_) => true,
        Err(e) => {
            tracing::info!("[roots] {} could not be read: {e}", path.display());
            false
        }
    }
}

/// Drop duplicates and paths nested under another kept path.
fn collapse_nested(mut paths: Vec<PathBuf>) -> Vec<PathBuf> {
    paths.sort_by_key(|p| p.components().count());
    let mut kept: Vec<PathBuf> = Vec::new();
    for path in paths {
        if !kept.iter().any(|root| path.starts_with(root)) {
            kept.push(path);
        }
    }
    kept
}

/// Mount points and file system types from the kernel mount table.
#[cfg(target_os = "linux")]
fn mount_table() -> Vec<(PathBuf, String)> {
    match std::fs::read_to_string("/proc/self/mounts") {
        Ok(contents) => parse_mount_table(&contents),
        Err(e) => {
            tracing::debug!("[roots] mount table unavailable: {e}");
            Vec::new()
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn mount_table() -> Vec<(PathBuf, String)> {
    Vec::new()
}

/// Parse `/proc/mounts` lines: `source mount_point fs_type options ...`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_mount_table(contents: &str) -> Vec<(PathBuf, String)> {
    contents
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let _source = fields.next()?;
            let mount_point = fields.next()?;
            let file_system = fields.next()?;
            Some((
                PathBuf::from(unescape_mount_field(mount_point)),
                file_system.to_string(),
            ))
        })
        .collect()
}

/// Undo the kernel's octal escaping of blanks (`\040`) and backslashes.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let octal = bytes.get(i + 1..i + 4).filter(|digits| {
            bytes[i] == b'\\' && digits.iter().all(|d| (b'0'..=b'7').contains(d))
        });
        match octal {
            Some(digits) => {
                let value = digits.iter().fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                out.push(u8::try_from(value).unwrap_or(b'?'));
                i += 4;
            }
            None => {
                out.push(bytes[i]);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Fixed local volumes reported by the operating system.
#[derive(Debug, Default)]
pub struct VolumeRoots;

impl VolumeRoots {
    pub fn new() -> Self {
        Self
    }

    fn classified() -> Vec<(PathBuf, VolumeClass)> {
        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .map(|disk| {
                let fs = disk.file_system().to_string_lossy();
                let class = classify_volume(&fs, disk.is_removable());
                (disk.mount_point().to_path_buf(), class)
            })
            .collect()
    }

    /// Ineligible mount points that sit strictly inside one of `roots`.
    fn excluded_under(
        roots: &[PathBuf],
        disks: Vec<(PathBuf, VolumeClass)>,
        mounts: Vec<(PathBuf, String)>,
    ) -> Vec<PathBuf> {
        let from_mounts = mounts
            .into_iter()
            .map(|(mount_point, fs)| (mount_point, classify_volume(&fs, false)));

        let mut excluded: Vec<PathBuf> = disks
            .into_iter()
            .chain(from_mounts)
            .filter(|(_, class)| *class != VolumeClass::Fixed)
            .map(|(mount_point, _)| mount_point)
            // A container's overlay root is itself "virtual"; never exclude
            // a root or anything above one.
            .filter(|mount_point| !roots.iter().any(|root| root.starts_with(mount_point)))
            .filter(|mount_point| roots.iter().any(|root| mount_point.starts_with(root)))
            .collect();
        excluded.sort();
        excluded.dedup();
        excluded
    }
}

impl RootSource for VolumeRoots {
    fn roots(&self) -> Vec<PathBuf> {
        let mut eligible = Vec::new();
        for (mount_point, class) in Self::classified() {
            if class != VolumeClass::Fixed {
                tracing::info!(
                    "[roots] skipping {} ({class:?})",
                    mount_point.display()
                );
                continue;
            }
            if !is_ready(&mount_point) {
                continue;
            }
            eligible.push(mount_point);
        }

        let roots = collapse_nested(eligible);
        crate::debug_event!("roots", "discovered", "{} root(s)", roots.len());
        roots
    }

    fn excluded(&self) -> Vec<PathBuf> {
        Self::excluded_under(&self.roots(), Self::classified(), mount_table())
    }
}

/// An explicit list of roots, typically from `indexing.roots`.
#[derive(Debug, Clone, Default)]
pub struct FixedRoots {
    roots: Vec<PathBuf>,
}

impl FixedRoots {
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            roots: roots.into_iter().collect(),
        }
    }
}

impl RootSource for FixedRoots {
    fn roots(&self) -> Vec<PathBuf> {
        let ready = self
            .roots
            .iter()
            .filter(|root| {
                if root.is_dir() {
                    is_ready(root)
                } else {
                    tracing::warn!("[roots] {} is not a directory, skipping", root.display());
                    false
                }
            })
            .map(|root| std::fs::canonicalize(root).unwrap_or_else(|_| root.clone()))
            .collect();
        collapse_nested(ready)
    }
}

/// Configured roots win over volume discovery.
pub fn root_source_for(configured: &[PathBuf]) -> Box<dyn RootSource> {
    if configured.is_empty() {
        Box::new(VolumeRoots::new())
    } else {
        Box::new(FixedRoots::new(configured.iter().cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_classify_volume() {
        assert_eq!(classify_volume("ext4", false), VolumeClass::Fixed);
        assert_eq!(classify_volume("NTFS", false), VolumeClass::Fixed);
        assert_eq!(classify_volume("apfs", false), VolumeClass::Fixed);
        assert_eq!(classify_volume("fuseblk", false), VolumeClass::Fixed);
        assert_eq!(classify_volume("vfat", true), VolumeClass::Removable);
        assert_eq!(classify_volume("nfs4", false), VolumeClass::Network);
        assert_eq!(classify_volume("fuse.sshfs", false), VolumeClass::Network);
        assert_eq!(classify_volume("cifs", false), VolumeClass::Network);
        assert_eq!(classify_volume("proc", false), VolumeClass::Virtual);
        assert_eq!(classify_volume("tmpfs", false), VolumeClass::Virtual);
    }

    #[test]
    fn test_collapse_nested() {
        let kept = collapse_nested(vec![
            PathBuf::from("/data/projects"),
            PathBuf::from("/data"),
            PathBuf::from("/home"),
            PathBuf::from("/data"),
        ]);
        assert_eq!(kept, vec![PathBuf::from("/data"), PathBuf::from("/home")]);
    }

    #[test]
    fn test_parse_mount_table() {
        let table = "\
/dev/nvme0n1p2 / ext4 rw,relatime 0 0
proc /proc proc rw,nosuid,nodev,noexec,relatime 0 0
sysfs /sys sysfs rw,nosuid,nodev,noexec,relatime 0 0
//nas/share /mnt/my\\040share cifs rw 0 0
truncated
";
        let mounts = parse_mount_table(table);

        assert_eq!(mounts.len(), 4);
        assert_eq!(mounts[1], (PathBuf::from("/proc"), "proc".to_string()));
        assert_eq!(mounts[3].0, PathBuf::from("/mnt/my share"));
    }

    #[test]
    fn test_pseudo_mounts_under_root_are_excluded() {
        let roots = vec![PathBuf::from("/")];
        let disks = vec![(PathBuf::from("/"), VolumeClass::Fixed)];
        let mounts = vec![
            (PathBuf::from("/"), "overlay".to_string()),
            (PathBuf::from("/proc"), "proc".to_string()),
            (PathBuf::from("/sys"), "sysfs".to_string()),
            (PathBuf::from("/dev"), "devtmpfs".to_string()),
            (PathBuf::from("/sys/fs/cgroup"), "cgroup2".to_string()),
            (PathBuf::from("/boot"), "ext4".to_string()),
            (PathBuf::from("/mnt/nas"), "nfs4".to_string()),
        ];

        let excluded = VolumeRoots::excluded_under(&roots, disks, mounts);

        assert_eq!(
            excluded,
            vec![
                PathBuf::from("/dev"),
                PathBuf::from("/mnt/nas"),
                PathBuf::from("/proc"),
                PathBuf::from("/sys"),
                PathBuf::from("/sys/fs/cgroup"),
            ]
        );
    }

    #[test]
    fn test_mounts_outside_roots_are_ignored() {
        let roots = vec![PathBuf::from("/data")];
        let mounts = vec![
            (PathBuf::from("/proc"), "proc".to_string()),
            (PathBuf::from("/data/usb"), "vfat".to_string()),
            (PathBuf::from("/data/scratch"), "tmpfs".to_string()),
        ];

        let excluded = VolumeRoots::excluded_under(&roots, Vec::new(), mounts);
        assert_eq!(excluded, vec![PathBuf::from("/data/scratch")]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_host_proc_is_excluded_when_root_is_scanned() {
        let source = VolumeRoots::new();
        if !source.roots().contains(&PathBuf::from("/")) || !Path::new("/proc/self").exists() {
            return;
        }
        let excluded = source.excluded();
        assert!(excluded.contains(&PathBuf::from("/proc")), "{excluded:?}");
        assert!(!excluded.contains(&PathBuf::from("/")));
    }

    #[test]
    fn test_fixed_roots_skip_missing() {
        let temp_dir = TempDir::new().unwrap();
        let present = temp_dir.path().join("present");
        std::fs::create_dir(&present).unwrap();

        let source = FixedRoots::new(vec![present.clone(), temp_dir.path().join("absent")]);
        let roots = source.roots();

        assert_eq!(roots, vec![std::fs::canonicalize(&present).unwrap()]);
        assert!(source.excluded().is_empty());
    }

    #[test]
    fn test_fixed_roots_are_restartable() {
        let temp_dir = TempDir::new().unwrap();
        let source = FixedRoots::new(vec![temp_dir.path().to_path_buf()]);
        assert_eq!(source.roots(), source.roots());
    }

    #[test]
    fn test_empty_configuration_uses_volume_discovery() {
        // Must not panic whatever the host looks like.
        let source = root_source_for(&[]);
        let _ = source.roots();
    }
}
