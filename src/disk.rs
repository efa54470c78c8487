//! Block-device enumeration and the low-level device I/O the partitioner
//! needs: opening a disk to read or write its GPT, asking the kernel to
//! reread the partition table, and waiting for the resulting device nodes
//! to appear.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use walkdir::WalkDir;

use crate::gpt::Gpt;

pub const DEFAULT_BLOCK_DIR: &str = "/sys/block";
const DEVICE_NODE_POLL_ATTEMPTS: u32 = 20;
const DEVICE_NODE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A candidate disk surfaced by discovery, with the geometry fields the
/// partitioner records verbatim into the option store.
#[derive(Clone, Debug)]
pub struct DiskInfo {
    pub name: String,
    pub device: String,
    pub sectors: u64,
    pub lba_size: u64,
    pub model: String,
}

impl DiskInfo {
    pub fn size_bytes(&self) -> u64 {
        self.sectors * self.lba_size
    }
}

fn is_excluded(name: &str, booted_media: Option<&str>) -> bool {
    if name.starts_with('.') {
        return true;
    }
    if name.starts_with("ram") || name.starts_with("loop") || name.starts_with("sr") {
        return true;
    }
    if name.starts_with("mmcblk") && (name.contains("rpmb") || name.contains("boot")) {
        return true;
    }
    if let Some(media) = booted_media {
        if name == media || format!("/dev/{}", name) == media {
            return true;
        }
    }
    false
}

fn read_trimmed(path: &Path) -> Option<String> {
    std::fs::read_to_string(path).ok().map(|s| s.trim().to_owned())
}

fn read_u64(path: &Path) -> Option<u64> {
    read_trimmed(path).and_then(|s| s.parse().ok())
}

/// Scan `block_dir` (normally `/sys/block`) for candidate disks, applying
/// the exclusion rules from discovery: dotfiles, ram/loop/sr devices, MMC
/// RPMB/boot partitions, and whichever device the installer itself booted
/// from.
pub fn discover_disks(block_dir: &Path, booted_media: Option<&str>) -> Result<Vec<DiskInfo>> {
    let mut disks = Vec::new();
    let entries = WalkDir::new(block_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok());
    for entry in entries {
        let name = entry.file_name().to_string_lossy().to_string();
        if is_excluded(&name, booted_media) {
            debug!("excluding block device '{}' from candidates", name);
            continue;
        }
        let dev_dir = entry.path();
        let sectors = read_u64(&dev_dir.join("size"))
            .with_context(|| format!("could not read sector count for '{}'", name))?;
        let lba_size = read_u64(&dev_dir.join("queue/logical_block_size")).unwrap_or(512);
        let model = read_trimmed(&dev_dir.join("device/model"))
            .or_else(|| read_trimmed(&dev_dir.join("device/name")))
            .unwrap_or_else(|| "unknown".to_owned());
        disks.push(DiskInfo {
            device: format!("/dev/{}", name),
            name,
            sectors,
            lba_size,
            model,
        });
    }
    Ok(disks)
}

/// Open a disk and attempt to read its GPT. `Ok(None)` means "no GPT
/// present", which per the codec's contract is a normal discovery outcome,
/// not an error.
pub fn read_gpt(disk: &DiskInfo) -> Result<Option<Gpt>> {
    let mut file = File::open(&disk.device)
        .with_context(|| format!("failed to open '{}' for reading", disk.device))?;
    Gpt::read_from(&mut file, disk.lba_size, disk.sectors)
}

/// Write the GPT back to the disk (primary, backup, protective MBR), fsync,
/// then ask the kernel to reread the partition table.
pub fn commit_gpt(disk: &DiskInfo, gpt: &mut Gpt) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .open(&disk.device)
        .with_context(|| format!("failed to open '{}' for writing", disk.device))?;
    gpt.write_to(&mut file, disk.lba_size, disk.sectors)
        .with_context(|| format!("failed to write GPT to '{}'", disk.device))?;
    file.sync_all()
        .with_context(|| format!("failed to sync '{}' after writing GPT", disk.device))?;
    reread_partition_table(&disk.device)?;
    Ok(())
}

/// Issue `BLKRRPART` so the kernel re-enumerates the partition table
/// without a reboot. Failure is fatal - the core cannot proceed without
/// accurate device nodes for the partitions it just created.
pub fn reread_partition_table(device: &str) -> Result<()> {
    use std::os::unix::io::AsRawFd;
    const BLKRRPART: libc::c_ulong = 0x125F;

    let file = File::open(device).with_context(|| format!("failed to open '{}'", device))?;
    let ret = unsafe { libc::ioctl(file.as_raw_fd(), BLKRRPART) };
    if ret != 0 {
        let errno = errno::errno();
        return Err(anyhow!(
            "BLKRRPART ioctl failed on '{}': {}",
            device,
            errno
        ));
    }
    Ok(())
}

/// Poll for a partition's device node to appear, up to 20 times with a 1
/// second sleep between attempts, per the bounded-wait rule in the
/// concurrency model.
pub fn wait_for_device_node(path: &str) -> Result<()> {
    let node = PathBuf::from(path);
    for attempt in 1..=DEVICE_NODE_POLL_ATTEMPTS {
        match std::fs::metadata(&node) {
            Ok(_) => return Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(
                    "device node '{}' not yet present (attempt {}/{})",
                    path, attempt, DEVICE_NODE_POLL_ATTEMPTS
                );
                sleep(DEVICE_NODE_POLL_INTERVAL);
            }
            Err(e) => return Err(e).with_context(|| format!("failed to stat '{}'", path)),
        }
    }
    Err(anyhow!(
        "device node '{}' did not appear within {} seconds",
        path,
        DEVICE_NODE_POLL_ATTEMPTS
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusion_rules() {
        assert!(is_excluded(".lock", None));
        assert!(is_excluded("ram0", None));
        assert!(is_excluded("loop3", None));
        assert!(is_excluded("sr0", None));
        assert!(is_excluded("mmcblk0rpmb", None));
        assert!(is_excluded("mmcblk0boot0", None));
        assert!(!is_excluded("mmcblk0", None));
        assert!(!is_excluded("sda", None));
        assert!(is_excluded("sda", Some("sda")));
        assert!(is_excluded("nvme0n1", Some("/dev/nvme0n1")));
    }
}
