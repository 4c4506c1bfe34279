//! Network-boot artifact templating
//!
//! Renders the iPXE chainload script, the PXELINUX boot menu and a dnsmasq
//! configuration from a [`NetworkConfig`], and writes them atomically. The
//! templates are plain text; the bootloaders themselves validate syntax.

use crate::operation::NetworkConfig;
use futures_lite::io::AsyncWriteExt;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the iPXE script inside the boot config directory
pub const IPXE_SCRIPT: &str = "boot.ipxe";
/// Path of the PXELINUX default menu inside the boot config directory
pub const PXELINUX_MENU: &str = "pxelinux.cfg/default";
/// File name of the dnsmasq configuration inside the boot config directory
pub const DNSMASQ_CONFIG: &str = "dnsmasq.conf";

/// Render the iPXE script that configures the NIC and chainloads the server
pub fn ipxe_script(net: &NetworkConfig) -> String {
    format!(
        "#!ipxe\n\
         dhcp\n\
         set net0/ip {ip}\n\
         set net0/netmask {mask}\n\
         set net0/gateway {gateway}\n\
         chain http://{server}/boot.ipxe\n",
        ip = net.ip_address,
        mask = net.subnet_mask,
        gateway = net.gateway,
        server = net.server_address,
    )
}

/// Render the PXELINUX menu: local disk by default, network boot on demand
pub fn pxelinux_menu(net: &NetworkConfig) -> String {
    let server = &net.server_address;
    format!(
        "default menu.c32\n\
         prompt 0\n\
         timeout 50\n\
         ONTIMEOUT local\n\
         \n\
         label local\n    \
             menu label Boot from local drive\n    \
             localboot 0\n\
         \n\
         label network\n    \
             menu label Boot from network\n    \
             kernel http://{server}/vmlinuz\n    \
             append initrd=http://{server}/initrd.img root=/dev/ram0 rw\n"
    )
}

/// Render a dnsmasq configuration serving PXE to BIOS and UEFI clients
pub fn dnsmasq_config(net: &NetworkConfig, interface: &str, tftp_root: &Path) -> String {
    let ip = &net.ip_address;
    format!(
        "interface={interface}\n\
         bind-interfaces\n\
         dhcp-range={ip},{ip},{mask},12h\n\
         dhcp-option=option:router,{gateway}\n\
         enable-tftp\n\
         tftp-root={root}\n\
         pxe-service=x86PC, \"Network Boot\", pxelinux\n\
         pxe-service=x86-64_EFI, \"Network Boot\", bootx64.efi\n",
        mask = net.subnet_mask,
        gateway = net.gateway,
        root = tftp_root.display(),
    )
}

/// Write the iPXE script and PXELINUX menu under `dir`
///
/// Both files are staged before either is replaced, so a failed write
/// leaves the previous pair in place.
pub async fn write_network_boot(dir: &Path, net: &NetworkConfig) -> io::Result<Vec<PathBuf>> {
    let ipxe = dir.join(IPXE_SCRIPT);
    let menu = dir.join(PXELINUX_MENU);
    write_all_atomic(&[
        (ipxe.as_path(), ipxe_script(net)),
        (menu.as_path(), pxelinux_menu(net)),
    ])
    .await?;
    Ok(vec![ipxe, menu])
}

/// Write the dnsmasq configuration under `dir`
pub async fn write_multicast(
    dir: &Path,
    net: &NetworkConfig,
    interface: &str,
    tftp_root: &Path,
) -> io::Result<Vec<PathBuf>> {
    let path = dir.join(DNSMASQ_CONFIG);
    write_all_atomic(&[(path.as_path(), dnsmasq_config(net, interface, tftp_root))]).await?;
    Ok(vec![path])
}

/// Stage every file in a sibling temp file, then rename them all into place
///
/// Readers see either the old file or the complete new one. Nothing is
/// renamed until every temp file has been written and synced.
async fn write_all_atomic(files: &[(&Path, String)]) -> io::Result<()> {
    let mut staged: Vec<(PathBuf, &Path)> = Vec::with_capacity(files.len());
    for (path, contents) in files {
        match stage(path, contents.as_bytes()).await {
            Ok(tmp) => staged.push((tmp, *path)),
            Err(e) => {
                discard(&staged).await;
                return Err(e);
            }
        }
    }

    for (i, (tmp, path)) in staged.iter().enumerate() {
        if let Err(e) = async_fs::rename(tmp, path).await {
            discard(&staged[i..]).await;
            return Err(e);
        }
        debug!(path = %path.display(), "wrote boot artifact");
    }
    Ok(())
}

/// Write `contents` to a synced temp file next to `path`
async fn stage(path: &Path, contents: &[u8]) -> io::Result<PathBuf> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    async_fs::create_dir_all(parent).await?;

    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let tmp = parent.join(format!(
        ".{}.{}.tmp",
        file_name.to_string_lossy(),
        uuid::Uuid::new_v4().simple()
    ));

    let written = async {
        let mut file = async_fs::File::create(&tmp).await?;
        file.write_all(contents).await?;
        file.sync_all().await
    }
    .await;

    match written {
        Ok(()) => Ok(tmp),
        Err(e) => {
            let _ = async_fs::remove_file(&tmp).await;
            Err(e)
        }
    }
}

async fn discard(staged: &[(PathBuf, &Path)]) {
    for (tmp, _) in staged {
        let _ = async_fs::remove_file(tmp).await;
    }
}
