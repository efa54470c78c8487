//! Lays data onto each created partition according to its configured mode:
//! `format` runs the matching mkfs, `image` dd's a source file across then
//! fixes up the filesystem, `zero` overwrites the partition with zeroes,
//! `skip` does nothing.

use std::process::Command;
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use log::info;

use crate::config::BaseConfig;
use crate::driver::{Context, Plugin};
use crate::partition::{PartitionMode, PartitionType};
use crate::utils::{cmd_run_check_status, get_fsuuid, sync_filesystem};

const DEVICE_WAIT_ATTEMPTS: u32 = 20;
const DEVICE_WAIT_INTERVAL: Duration = Duration::from_secs(1);

pub struct Imager;

impl Plugin for Imager {
    fn name(&self) -> &str {
        "imager"
    }

    fn execute(&mut self, ctx: &mut Context) -> Result<()> {
        let base = BaseConfig::from_store(&ctx.options)?;
        for name in &base.partitions {
            let ns = format!("partition.{}", name);
            let device = ctx.options.get(&format!("{}:device", ns))?.to_owned();
            let ptype = PartitionType::parse(ctx.options.get(&format!("{}:type", ns))?)?;
            let mode = PartitionMode::parse(ctx.options.get(&format!("{}:mode", ns))?)?;

            wait_for_device(&device)?;

            match mode {
                PartitionMode::Format => {
                    info!("[{}] formatting '{}' as {}", name, device, ptype);
                    mkfs(&device, ptype)?;
                }
                PartitionMode::Image => {
                    let src = ctx
                        .options
                        .get(&format!("{}:src", ns))
                        .with_context(|| format!("'{}:src' is required for mode 'image'", ns))?
                        .to_owned();
                    info!("[{}] imaging '{}' from '{}'", name, device, src);
                    write_image(&src, &device)?;
                    if let Some(footer) = ctx.options.get_opt(&format!("{}:footer", ns)) {
                        let footer: u64 = footer
                            .parse()
                            .with_context(|| format!("'{}:footer' is not a valid integer", ns))?;
                        grow_to_partition_size(&device, ptype, footer)?;
                    }
                }
                PartitionMode::Zero => {
                    info!("[{}] zeroing '{}'", name, device);
                    zero_device(&device);
                }
                PartitionMode::Skip => {
                    info!("[{}] skipping '{}'", name, device);
                    continue;
                }
            }

            sync_filesystem(&device)?;
            if let Ok(uuid) = get_fsuuid(&device) {
                ctx.options.put_formatted(&ns, "fsuuid", uuid);
            }
        }
        Ok(())
    }
}

fn wait_for_device(device: &str) -> Result<()> {
    for attempt in 1..=DEVICE_WAIT_ATTEMPTS {
        if std::fs::metadata(device).is_ok() {
            return Ok(());
        }
        log::warn!("device node '{}' not yet present (attempt {}/{})", device, attempt, DEVICE_WAIT_ATTEMPTS);
        std::thread::sleep(DEVICE_WAIT_INTERVAL);
    }
    bail!("device node '{}' did not appear within {} seconds", device, DEVICE_WAIT_ATTEMPTS);
}

fn mkfs(device: &str, ptype: PartitionType) -> Result<()> {
    let mut cmd = match ptype {
        PartitionType::Ext4 => {
            let mut c = Command::new("mkfs.ext4");
            c.args(["-F", "-q", device]);
            c
        }
        PartitionType::Vfat | PartitionType::Esp => {
            let mut c = Command::new("mkfs.vfat");
            c.args(["-F", "32", device]);
            c
        }
        PartitionType::Boot | PartitionType::Misc => {
            bail!("partition type '{}' has no filesystem; use mode 'image' or 'zero' instead of 'format'", ptype)
        }
    };
    cmd_run_check_status(&mut cmd)
}

fn write_image(src: &str, device: &str) -> Result<()> {
    let mut cmd = Command::new("dd");
    cmd.args([&format!("if={}", src), &format!("of={}", device), "bs=4M", "conv=fsync"]);
    cmd_run_check_status(&mut cmd)
}

/// Android filesystem images are built undersized with a reserved "growfs"
/// footer; once the raw bytes have been dd'd onto the partition, grow the
/// filesystem to fill it (minus the footer reserve) with resize2fs.
fn grow_to_partition_size(device: &str, ptype: PartitionType, footer: u64) -> Result<()> {
    if ptype != PartitionType::Ext4 {
        bail!("growfs footer fixups only apply to ext4 images, got '{}'", ptype);
    }
    info!("growing '{}' to fill its partition (footer reserve {} bytes)", device, footer);
    let mut fsck = Command::new("e2fsck");
    fsck.args(["-fy", device]);
    cmd_run_check_status(&mut fsck)?;
    let mut resize = Command::new("resize2fs");
    resize.arg(device);
    cmd_run_check_status(&mut resize)
}

/// Overwrite the partition with zeroes until it runs out of space. A
/// non-zero `dd` exit here is the expected "no space left" termination, not
/// a failure, so the status is logged rather than propagated.
fn zero_device(device: &str) {
    let mut cmd = Command::new("dd");
    cmd.args(["if=/dev/zero", &format!("of={}", device), "bs=4M"]);
    match cmd.status() {
        Ok(status) => info!("zero fill of '{}' finished ({})", device, status),
        Err(e) => log::warn!("failed to run dd to zero '{}': {}", device, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_rejects_filesystem_less_types() {
        assert!(mkfs("/dev/null", PartitionType::Boot).is_err());
        assert!(mkfs("/dev/null", PartitionType::Misc).is_err());
    }

    #[test]
    fn growfs_rejects_non_ext4() {
        assert!(grow_to_partition_size("/dev/null", PartitionType::Vfat, 0).is_err());
    }
}
