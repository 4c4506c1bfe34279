//! Field validation for operation requests
//!
//! Every check here runs before any lock is taken or process spawned.

use regex::Regex;
use std::net::Ipv4Addr;
use std::path::{Component, Path};
use std::sync::LazyLock;

const MAX_PATH_LEN: usize = 256;
const MAX_LVM_NAME_LEN: usize = 127;
const PARTITION_TYPES: &[&str] = &["primary", "logical", "extended"];

static DEVICE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/dev/[A-Za-z0-9/_.:+@-]+$").expect("valid regex"));
static LVM_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9+_.][A-Za-z0-9+_.-]*$").expect("valid regex"));
static FILESYSTEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+$").expect("valid regex"));

/// A request field that failed validation
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    /// Name of the offending field
    pub field: &'static str,
    /// Why it was rejected
    pub reason: String,
}

impl ValidationError {
    pub(crate) fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

type Result<T = ()> = std::result::Result<T, ValidationError>;

pub(crate) fn required(field: &'static str, value: &str) -> Result {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "is required"));
    }
    Ok(())
}

fn has_parent_component(path: &str) -> bool {
    Path::new(path)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
}

pub(crate) fn device_path(field: &'static str, value: &str) -> Result {
    required(field, value)?;
    if value.len() > MAX_PATH_LEN {
        return Err(ValidationError::new(field, "path too long"));
    }
    if !DEVICE_PATH.is_match(value) {
        return Err(ValidationError::new(
            field,
            format!("{value:?} is not a device path under /dev/"),
        ));
    }
    if has_parent_component(value) {
        return Err(ValidationError::new(field, "must not contain '..'"));
    }
    Ok(())
}

/// Absolute filesystem path (mount points, image files)
pub(crate) fn absolute_path(field: &'static str, value: &str) -> Result {
    required(field, value)?;
    if value.len() > MAX_PATH_LEN {
        return Err(ValidationError::new(field, "path too long"));
    }
    if !value.starts_with('/') {
        return Err(ValidationError::new(field, "must be an absolute path"));
    }
    if value.chars().any(char::is_control) {
        return Err(ValidationError::new(field, "contains control characters"));
    }
    if has_parent_component(value) {
        return Err(ValidationError::new(field, "must not contain '..'"));
    }
    Ok(())
}

pub(crate) fn filesystem(
    field: &'static str,
    value: &str,
    supported: impl Fn(&str) -> bool,
) -> Result {
    required(field, value)?;
    let lowered = value.to_ascii_lowercase();
    if !FILESYSTEM.is_match(&lowered) {
        return Err(ValidationError::new(
            field,
            format!("{value:?} is not a filesystem identifier"),
        ));
    }
    if !supported(&lowered) {
        return Err(ValidationError::new(
            field,
            format!("unsupported filesystem {lowered:?}"),
        ));
    }
    Ok(())
}

pub(crate) fn partition_type(field: &'static str, value: &str) -> Result {
    required(field, value)?;
    if !PARTITION_TYPES.contains(&value) {
        return Err(ValidationError::new(
            field,
            format!("must be one of {}", PARTITION_TYPES.join(", ")),
        ));
    }
    Ok(())
}

pub(crate) fn lvm_name(field: &'static str, value: &str) -> Result {
    required(field, value)?;
    if value.len() > MAX_LVM_NAME_LEN {
        return Err(ValidationError::new(field, "name too long"));
    }
    if !LVM_NAME.is_match(value) || value == "." || value == ".." {
        return Err(ValidationError::new(
            field,
            format!("{value:?} is not a valid LVM name"),
        ));
    }
    Ok(())
}

pub(crate) fn size_mb(field: &'static str, value: i64) -> Result {
    if value <= 0 {
        return Err(ValidationError::new(
            field,
            format!("must be a positive number of megabytes, got {value}"),
        ));
    }
    Ok(())
}

/// Dotted-quad IPv4, exactly as it will be rendered into boot files
pub(crate) fn ipv4(field: &'static str, value: &str) -> Result<Ipv4Addr> {
    required(field, value)?;
    value
        .parse::<Ipv4Addr>()
        .map_err(|_| ValidationError::new(field, format!("{value:?} is not an IPv4 address")))
}

pub(crate) fn netmask(field: &'static str, value: &str) -> Result {
    let mask = u32::from(ipv4(field, value)?);
    // Contiguous: all ones followed by all zeros.
    if mask.leading_ones() + mask.trailing_zeros() != 32 {
        return Err(ValidationError::new(
            field,
            format!("{value:?} is not a contiguous netmask"),
        ));
    }
    Ok(())
}
