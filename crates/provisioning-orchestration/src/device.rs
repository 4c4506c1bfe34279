//! Normalized device identifiers used as lock keys

use serde::{Deserialize, Serialize};
use std::fmt;

const SCSI_STYLE: &[&str] = &["sd", "vd", "hd", "xvd"];

/// Directories under `/dev` that hold kernel or udev nodes, never volume groups
const NON_VG_DIRS: &[&str] = &[
    "block", "bus", "char", "cpu", "disk", "dri", "input", "mapper", "md", "net", "pts", "shm",
    "snd",
];

/// A normalized key for a device, partition, volume or mount point
///
/// Two identifiers compare equal when they name the same path after
/// normalization: surrounding whitespace is trimmed, letters are lowercased,
/// runs of `/` collapse to one, `.` components are dropped and a trailing
/// `/` is removed. `..` is left alone; validation rejects it.
///
/// ```
/// use provisioning_orchestration::DeviceId;
///
/// assert_eq!(DeviceId::new("/DEV/SDB/"), DeviceId::new("/dev/sdb"));
/// assert_eq!(DeviceId::new(" /mnt/.//data ").as_str(), "/mnt/data");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Normalize `raw` into an identifier
    pub fn new(raw: impl AsRef<str>) -> Self {
        let lowered = raw.as_ref().trim().to_lowercase();
        let joined = lowered
            .split('/')
            .filter(|part| !part.is_empty() && *part != ".")
            .collect::<Vec<_>>()
            .join("/");

        if lowered.starts_with('/') {
            Self(format!("/{joined}"))
        } else {
            Self(joined)
        }
    }

    /// Identifier of a logical volume (`/dev/<vg>/<lv>`)
    pub fn logical_volume(volume_group: &str, logical_volume: &str) -> Self {
        Self::new(format!("/dev/{volume_group}/{logical_volume}"))
    }

    /// Identifier of a volume group (`/dev/<vg>`)
    pub fn volume_group(volume_group: &str) -> Self {
        Self::new(format!("/dev/{volume_group}"))
    }

    /// The normalized string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The whole-disk identifier a partition belongs to
    ///
    /// `/dev/sdb1` → `/dev/sdb`, `/dev/nvme0n1p2` → `/dev/nvme0n1`,
    /// `/dev/mmcblk0p1` → `/dev/mmcblk0`. Returns `None` when the identifier
    /// does not look like a numbered partition.
    pub fn parent_disk(&self) -> Option<DeviceId> {
        let (dir, name) = self.0.rsplit_once('/')?;
        let stem = name.trim_end_matches(|c: char| c.is_ascii_digit());
        if stem.is_empty() || stem.len() == name.len() {
            return None;
        }

        let disk = match stem.strip_suffix('p') {
            // nvme0n1p2, mmcblk0p1, loop0p1
            Some(base) if base.ends_with(|c: char| c.is_ascii_digit()) => base,
            // sdb1, vda3, xvdf1
            _ if SCSI_STYLE.iter().any(|prefix| stem.starts_with(prefix))
                && stem.chars().all(|c| c.is_ascii_alphabetic()) =>
            {
                stem
            }
            _ => return None,
        };

        Some(DeviceId(format!("{dir}/{disk}")))
    }

    /// The volume group a `/dev/<vg>/<lv>` path lives in
    ///
    /// `None` unless the identifier is exactly two levels under `/dev` and
    /// the first level is not a kernel directory such as `mapper` or `disk`.
    pub fn volume_group_of(&self) -> Option<DeviceId> {
        let (vg, lv) = self.0.strip_prefix("/dev/")?.split_once('/')?;
        if lv.is_empty() || lv.contains('/') || NON_VG_DIRS.contains(&vg) {
            return None;
        }
        Some(DeviceId(format!("/dev/{vg}")))
    }

    /// This identifier plus whatever contains it
    ///
    /// A partition brings its parent disk and a logical volume its volume
    /// group, so work on the container serializes with work on its parts.
    pub fn with_containers(self) -> impl Iterator<Item = DeviceId> {
        let parent = self.parent_disk();
        let volume_group = self.volume_group_of();
        [Some(self), parent, volume_group].into_iter().flatten()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}
