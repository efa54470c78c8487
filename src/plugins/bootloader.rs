//! The two bootloader plugins this installer ships: one claims
//! `base:bootloader = efi` and drives `efibootmgr`, the other claims
//! `legacy` and installs a syslinux-style MBR loader. Exactly one of the
//! two is expected to claim the phase per run; the other's `execute`
//! returns immediately.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

use anyhow::{Context as _, Result};
use log::info;
use sys_mount::{unmount, Mount, UnmountFlags};

use crate::driver::{Context, Plugin};
use crate::utils::{cmd_run_check_status, sync_filesystem};

/// The mount point the EFI loader is currently using, if any - read by the
/// SIGABRT/SIGINT handler installed in `main` so a crash mid-install still
/// unmounts the ESP rather than leaving it dangling.
pub static ACTIVE_MOUNT: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Unmount whatever the bootloader plugin currently has mounted. Safe to
/// call even if nothing is mounted. Called from the signal handler, so it
/// deliberately swallows errors rather than panicking mid-signal.
pub fn unmount_on_abort() {
    if let Ok(mut guard) = ACTIVE_MOUNT.lock() {
        if let Some(path) = guard.take() {
            let _ = sys_mount::unmount(&path, UnmountFlags::DETACH);
        }
    }
}

pub struct EfiBootloader;

impl Plugin for EfiBootloader {
    fn name(&self) -> &str {
        "bootloader-efi"
    }

    fn execute(&mut self, ctx: &mut Context) -> Result<()> {
        if ctx.options.get_opt("base:bootloader") != Some("efi") {
            return Ok(());
        }

        let device = ctx.options.get("partition.bootloader:device")?.to_owned();
        let index: u32 = ctx.options.get("partition.bootloader:index")?.parse()?;
        let install_disk = ctx.options.get("base:install_disk")?.to_owned();
        let mode = ctx.options.get_or("partition.bootloader:mode", "format").to_owned();

        if mode != "skip" {
            info!("formatting ESP '{}'", device);
            let mut mkfs = Command::new("mkfs.vfat");
            mkfs.args(["-F", "32", &device]);
            cmd_run_check_status(&mut mkfs)?;
        }

        let mount_point = std::env::temp_dir().join("iago-esp");
        std::fs::create_dir_all(&mount_point)
            .with_context(|| format!("failed to create '{}'", mount_point.display()))?;
        Mount::builder()
            .fstype("vfat")
            .mount(&device, &mount_point)
            .with_context(|| format!("failed to mount ESP '{}' at '{}'", device, mount_point.display()))?;
        *ACTIVE_MOUNT.lock().unwrap() = Some(mount_point.clone());

        let result = write_loader_entry(ctx, &mount_point).and_then(|_| {
            let device_base = &install_disk;
            register_efi_entry(device_base, index)
        });

        sync_filesystem(&mount_point)?;
        unmount(&mount_point, UnmountFlags::empty())
            .with_context(|| format!("failed to unmount '{}'", mount_point.display()))?;
        *ACTIVE_MOUNT.lock().unwrap() = None;

        result
    }
}

fn write_loader_entry(ctx: &Context, esp_root: &Path) -> Result<()> {
    let entries_dir = esp_root.join("loader").join("entries");
    std::fs::create_dir_all(&entries_dir)
        .with_context(|| format!("failed to create '{}'", entries_dir.display()))?;

    let default_boot = ctx.options.get_opt("base:bootimages").and_then(|s| s.split_whitespace().next());
    let boot_guid = match default_boot {
        Some(name) => ctx.options.get_opt(&format!("partition.{}:guid", name)).map(str::to_owned),
        None => None,
    };

    let mut entry = String::new();
    entry.push_str("title Android\n");
    entry.push_str("linux /android/kernel\n");
    if let Some(guid) = &boot_guid {
        entry.push_str(&format!("options androidboot.slot_suffix=_a root=PARTUUID={}\n", guid));
    }
    let entry_path = entries_dir.join("android.conf");
    std::fs::write(&entry_path, entry).with_context(|| format!("failed to write '{}'", entry_path.display()))?;
    Ok(())
}

fn register_efi_entry(install_disk: &str, part_index: u32) -> Result<()> {
    info!("registering EFI boot entry on '{}' partition {}", install_disk, part_index);
    let mut cmd = Command::new("efibootmgr");
    cmd.args([
        "--create",
        "--disk",
        install_disk,
        "--part",
        &part_index.to_string(),
        "--label",
        "Android",
        "--loader",
        "\\loader\\entries\\android.conf",
    ]);
    cmd_run_check_status(&mut cmd)
}

pub struct LegacyBootloader;

impl Plugin for LegacyBootloader {
    fn name(&self) -> &str {
        "bootloader-legacy"
    }

    fn execute(&mut self, ctx: &mut Context) -> Result<()> {
        if ctx.options.get_opt("base:bootloader") != Some("legacy") {
            return Ok(());
        }

        let device = ctx.options.get("partition.bootloader:device")?.to_owned();
        let install_disk = ctx.options.get("base:install_disk")?.to_owned();

        info!("installing syslinux on '{}'", device);
        let mut mkfs = Command::new("mkfs.vfat");
        mkfs.args(["-F", "32", &device]);
        cmd_run_check_status(&mut mkfs)?;

        let mut syslinux = Command::new("syslinux");
        syslinux.arg(&device);
        cmd_run_check_status(&mut syslinux)?;

        info!("installing MBR boot code on '{}'", install_disk);
        let mut extlinux_mbr = Command::new("dd");
        extlinux_mbr.args([
            "if=/usr/lib/syslinux/bios/mbr.bin",
            &format!("of={}", install_disk),
            "bs=440",
            "count=1",
            "conv=notrunc",
        ]);
        cmd_run_check_status(&mut extlinux_mbr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OptionStore;

    #[test]
    fn efi_plugin_is_noop_unless_claimed() {
        let mut plugin = EfiBootloader;
        let mut ctx = Context::new(OptionStore::new(), false);
        assert!(plugin.execute(&mut ctx).is_ok());
    }

    #[test]
    fn legacy_plugin_is_noop_unless_claimed() {
        let mut plugin = LegacyBootloader;
        let mut ctx = Context::new(OptionStore::new(), false);
        assert!(plugin.execute(&mut ctx).is_ok());
    }
}
