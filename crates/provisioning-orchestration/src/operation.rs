//! Typed operation requests
//!
//! Each variant knows three things about itself: how to validate its fields,
//! which device identifiers it must lock, and which argument vector runs it.
//! Arguments are always discrete; nothing is ever passed through a shell.

use crate::boot;
use crate::config::OrchestratorConfig;
use crate::device::DeviceId;
use crate::validate::{self, ValidationError};
use command_executor::Command;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Describes an image being captured or restored
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageProfile {
    /// Human readable image name
    pub image_name: String,
    /// Expected image size in bytes, informational
    pub image_size: i64,
    /// Filesystem identifier; selects the imaging tool backend
    pub file_system: String,
    /// Compression label, informational
    pub compression_type: String,
    /// Free-form description
    pub description: String,
}

/// Addresses written into network-boot artifacts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address handed to the booting machine
    pub ip_address: String,
    /// Netmask handed to the booting machine
    pub subnet_mask: String,
    /// Default gateway handed to the booting machine
    pub gateway: String,
    /// Address of the HTTP/TFTP boot server
    pub server_address: String,
}

impl NetworkConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        validate::ipv4("ip_address", &self.ip_address)?;
        validate::netmask("subnet_mask", &self.subnet_mask)?;
        validate::ipv4("gateway", &self.gateway)?;
        validate::ipv4("server_address", &self.server_address)?;
        Ok(())
    }
}

/// A provisioning operation to perform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum OperationRequest {
    /// Copy a device's contents into an image file
    CaptureImage {
        /// Device to read
        source_device: String,
        /// Image file to write
        destination_path: String,
        /// Image description; `file_system` picks the tool
        profile: ImageProfile,
    },
    /// Write an image file onto a device
    RestoreImage {
        /// Image file to read
        image_path: String,
        /// Device to overwrite
        target_device: String,
        /// Image description; `file_system` picks the tool
        profile: ImageProfile,
    },
    /// Add a partition to a disk's partition table
    CreatePartition {
        /// Disk to partition
        device: String,
        /// `primary`, `logical` or `extended`
        partition_type: String,
        /// Partition end, in megabytes
        size_mb: i64,
    },
    /// Create a filesystem on a partition
    FormatPartition {
        /// Partition to format
        partition: String,
        /// Filesystem identifier
        filesystem: String,
    },
    /// Mount a partition, creating the mount point if missing
    MountPartition {
        /// Partition to mount
        partition: String,
        /// Directory to mount on
        mount_point: String,
    },
    /// Unmount whatever is mounted at a mount point
    UnmountPartition {
        /// Directory to unmount
        mount_point: String,
    },
    /// Create a logical volume in a volume group
    CreateLogicalVolume {
        /// Volume group
        volume_group: String,
        /// New logical volume name
        logical_volume: String,
        /// Size in megabytes
        size_mb: i64,
    },
    /// Grow a logical volume
    ExtendLogicalVolume {
        /// Volume group
        volume_group: String,
        /// Logical volume name
        logical_volume: String,
        /// Megabytes to add
        size_mb: i64,
    },
    /// Shrink a logical volume
    ReduceLogicalVolume {
        /// Volume group
        volume_group: String,
        /// Logical volume name
        logical_volume: String,
        /// Megabytes to remove
        size_mb: i64,
    },
    /// Delete a logical volume
    RemoveLogicalVolume {
        /// Volume group
        volume_group: String,
        /// Logical volume name
        logical_volume: String,
    },
    /// Write the iPXE script and PXE boot menu
    ConfigureNetworkBoot {
        /// Addresses for the booting machine
        network_config: NetworkConfig,
    },
    /// Write a dnsmasq configuration serving PXE over DHCP/TFTP
    ConfigureMulticast {
        /// Addresses for the booting machine
        network_config: NetworkConfig,
    },
    /// Start dnsmasq on the configuration written by `configure_multicast`
    StartMulticast,
}

/// Discriminant of an [`OperationRequest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum OperationKind {
    CaptureImage,
    RestoreImage,
    CreatePartition,
    FormatPartition,
    MountPartition,
    UnmountPartition,
    CreateLogicalVolume,
    ExtendLogicalVolume,
    ReduceLogicalVolume,
    RemoveLogicalVolume,
    ConfigureNetworkBoot,
    ConfigureMulticast,
    StartMulticast,
}

/// Broad operation class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
    /// Whole-device image transfer
    Imaging,
    /// Partition, filesystem, mount and LVM changes
    Storage,
    /// Network-boot artifacts and the PXE server
    BootConfig,
}

impl OperationKind {
    /// Snake-case name, as used in requests and logs
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CaptureImage => "capture_image",
            Self::RestoreImage => "restore_image",
            Self::CreatePartition => "create_partition",
            Self::FormatPartition => "format_partition",
            Self::MountPartition => "mount_partition",
            Self::UnmountPartition => "unmount_partition",
            Self::CreateLogicalVolume => "create_logical_volume",
            Self::ExtendLogicalVolume => "extend_logical_volume",
            Self::ReduceLogicalVolume => "reduce_logical_volume",
            Self::RemoveLogicalVolume => "remove_logical_volume",
            Self::ConfigureNetworkBoot => "configure_network_boot",
            Self::ConfigureMulticast => "configure_multicast",
            Self::StartMulticast => "start_multicast",
        }
    }

    /// Class of the operation
    pub fn class(self) -> OperationClass {
        match self {
            Self::CaptureImage | Self::RestoreImage => OperationClass::Imaging,
            Self::ConfigureNetworkBoot | Self::ConfigureMulticast | Self::StartMulticast => {
                OperationClass::BootConfig
            }
            _ => OperationClass::Storage,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl OperationRequest {
    /// Parse a request from JSON
    pub fn from_json_str(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse a request from YAML
    pub fn from_yaml_str(yaml: &str) -> crate::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// The request's kind
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::CaptureImage { .. } => OperationKind::CaptureImage,
            Self::RestoreImage { .. } => OperationKind::RestoreImage,
            Self::CreatePartition { .. } => OperationKind::CreatePartition,
            Self::FormatPartition { .. } => OperationKind::FormatPartition,
            Self::MountPartition { .. } => OperationKind::MountPartition,
            Self::UnmountPartition { .. } => OperationKind::UnmountPartition,
            Self::CreateLogicalVolume { .. } => OperationKind::CreateLogicalVolume,
            Self::ExtendLogicalVolume { .. } => OperationKind::ExtendLogicalVolume,
            Self::ReduceLogicalVolume { .. } => OperationKind::ReduceLogicalVolume,
            Self::RemoveLogicalVolume { .. } => OperationKind::RemoveLogicalVolume,
            Self::ConfigureNetworkBoot { .. } => OperationKind::ConfigureNetworkBoot,
            Self::ConfigureMulticast { .. } => OperationKind::ConfigureMulticast,
            Self::StartMulticast => OperationKind::StartMulticast,
        }
    }

    /// Check every field against `config`
    ///
    /// Fails on the first invalid field. Has no side effects.
    pub fn validate(&self, config: &OrchestratorConfig) -> Result<(), ValidationError> {
        let supported = |fs: &str| config.supports_filesystem(fs);

        match self {
            Self::CaptureImage {
                source_device,
                destination_path,
                profile,
            } => {
                validate::device_path("source_device", source_device)?;
                validate::absolute_path("destination_path", destination_path)?;
                validate::filesystem("profile.file_system", &profile.file_system, supported)
            }
            Self::RestoreImage {
                image_path,
                target_device,
                profile,
            } => {
                validate::absolute_path("image_path", image_path)?;
                validate::device_path("target_device", target_device)?;
                validate::filesystem("profile.file_system", &profile.file_system, supported)
            }
            Self::CreatePartition {
                device,
                partition_type,
                size_mb,
            } => {
                validate::device_path("device", device)?;
                validate::partition_type("partition_type", partition_type)?;
                validate::size_mb("size_mb", *size_mb)
            }
            Self::FormatPartition {
                partition,
                filesystem,
            } => {
                validate::device_path("partition", partition)?;
                validate::filesystem("filesystem", filesystem, supported)
            }
            Self::MountPartition {
                partition,
                mount_point,
            } => {
                validate::device_path("partition", partition)?;
                validate::absolute_path("mount_point", mount_point)
            }
            Self::UnmountPartition { mount_point } => {
                validate::absolute_path("mount_point", mount_point)
            }
            Self::CreateLogicalVolume {
                volume_group,
                logical_volume,
                size_mb,
            }
            | Self::ExtendLogicalVolume {
                volume_group,
                logical_volume,
                size_mb,
            }
            | Self::ReduceLogicalVolume {
                volume_group,
                logical_volume,
                size_mb,
            } => {
                validate::lvm_name("volume_group", volume_group)?;
                validate::lvm_name("logical_volume", logical_volume)?;
                validate::size_mb("size_mb", *size_mb)
            }
            Self::RemoveLogicalVolume {
                volume_group,
                logical_volume,
            } => {
                validate::lvm_name("volume_group", volume_group)?;
                validate::lvm_name("logical_volume", logical_volume)
            }
            Self::ConfigureNetworkBoot { network_config }
            | Self::ConfigureMulticast { network_config } => network_config.validate(),
            Self::StartMulticast => Ok(()),
        }
    }

    /// Identifiers that must be locked while the operation runs
    ///
    /// Every device target is locked together with its containers (parent
    /// disk, volume group); see [`DeviceId::with_containers`].
    pub fn device_ids(&self, config: &OrchestratorConfig) -> BTreeSet<DeviceId> {
        let mut ids = BTreeSet::new();
        match self {
            Self::CaptureImage { source_device, .. } => {
                ids.extend(DeviceId::new(source_device).with_containers());
            }
            Self::RestoreImage { target_device, .. } => {
                ids.extend(DeviceId::new(target_device).with_containers());
            }
            Self::CreatePartition { device, .. } => {
                ids.extend(DeviceId::new(device).with_containers());
            }
            Self::FormatPartition { partition, .. } => {
                ids.extend(DeviceId::new(partition).with_containers());
            }
            Self::MountPartition {
                partition,
                mount_point,
            } => {
                ids.extend(DeviceId::new(partition).with_containers());
                ids.insert(DeviceId::new(mount_point));
            }
            Self::UnmountPartition { mount_point } => {
                ids.insert(DeviceId::new(mount_point));
            }
            Self::CreateLogicalVolume {
                volume_group,
                logical_volume,
                ..
            }
            | Self::ExtendLogicalVolume {
                volume_group,
                logical_volume,
                ..
            }
            | Self::ReduceLogicalVolume {
                volume_group,
                logical_volume,
                ..
            }
            | Self::RemoveLogicalVolume {
                volume_group,
                logical_volume,
            } => {
                ids.insert(DeviceId::logical_volume(volume_group, logical_volume));
                ids.insert(DeviceId::volume_group(volume_group));
            }
            Self::ConfigureNetworkBoot { .. }
            | Self::ConfigureMulticast { .. }
            | Self::StartMulticast => {
                ids.insert(DeviceId::new(config.boot_config_dir.to_string_lossy()));
            }
        }
        ids
    }

    /// External command that performs the operation
    ///
    /// `None` for boot configuration, which is written in-process.
    pub fn command(&self, config: &OrchestratorConfig) -> Option<Command> {
        let command = match self {
            Self::CaptureImage {
                source_device,
                destination_path,
                profile,
            } => Command::builder(partclone(&profile.file_system))
                .args(["-c", "-s", source_device.as_str(), "-o", destination_path.as_str()])
                .build(),
            Self::RestoreImage {
                image_path,
                target_device,
                profile,
            } => Command::builder(partclone(&profile.file_system))
                .args(["-r", "-s", image_path.as_str(), "-o", target_device.as_str()])
                .build(),
            Self::CreatePartition {
                device,
                partition_type,
                size_mb,
            } => Command::builder("parted")
                .args([device.as_str(), "mkpart", partition_type.as_str(), "0%"])
                .arg(format!("{size_mb}MB"))
                .build(),
            Self::FormatPartition {
                partition,
                filesystem,
            } => Command::builder(format!("mkfs.{}", filesystem.to_ascii_lowercase()))
                .arg(partition)
                .build(),
            Self::MountPartition {
                partition,
                mount_point,
            } => Command::builder("mount")
                .args([partition, mount_point])
                .build(),
            Self::UnmountPartition { mount_point } => {
                Command::builder("umount").arg(mount_point).build()
            }
            Self::CreateLogicalVolume {
                volume_group,
                logical_volume,
                size_mb,
            } => Command::builder("lvcreate")
                .arg("-L")
                .arg(format!("{size_mb}M"))
                .args(["-n", logical_volume.as_str(), volume_group.as_str()])
                .build(),
            Self::ExtendLogicalVolume {
                volume_group,
                logical_volume,
                size_mb,
            } => Command::builder("lvextend")
                .arg("-L")
                .arg(format!("+{size_mb}M"))
                .arg(format!("{volume_group}/{logical_volume}"))
                .build(),
            Self::ReduceLogicalVolume {
                volume_group,
                logical_volume,
                size_mb,
            } => Command::builder("lvreduce")
                .arg("-L")
                .arg(format!("-{size_mb}M"))
                .arg(format!("{volume_group}/{logical_volume}"))
                .build(),
            Self::RemoveLogicalVolume {
                volume_group,
                logical_volume,
            } => Command::builder("lvremove")
                .arg("-f")
                .arg(format!("{volume_group}/{logical_volume}"))
                .build(),
            Self::StartMulticast => {
                let conf = config.boot_config_dir.join(boot::DNSMASQ_CONFIG);
                let mut conf_arg = std::ffi::OsString::from("--conf-file=");
                conf_arg.push(conf);
                Command::builder("dnsmasq").arg(conf_arg).build()
            }
            Self::ConfigureNetworkBoot { .. } | Self::ConfigureMulticast { .. } => return None,
        };
        Some(command)
    }
}

fn partclone(file_system: &str) -> String {
    format!("partclone.{}", file_system.to_ascii_lowercase())
}
