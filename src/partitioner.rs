//! The core plugin: disk discovery, existing-install analysis, layout
//! planning, and GPT commit. See `DESIGN.md` for how this maps onto the
//! original partitioner.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context as _, Result};
use log::{debug, info, warn};

use crate::config::{partition_spec_from_store, BaseConfig};
use crate::disk::{self, DiskInfo};
use crate::driver::{Context, Plugin};
use crate::gpt::Gpt;
use crate::guid::type_guid;
use crate::partition::PartitionSpec;
use crate::ui::{self, UiOption};
use crate::utils::cmd_run_check_status;

/// Leading bytes of every partition name this installer creates, and the
/// leading bytes any prior install is recognized by.
pub const INSTALL_MAGIC: &str = "ANDROID!";
/// Configured entry names longer than this are rejected, to leave room for
/// the 16-character install-id prefix ahead of them.
pub const MAX_ENTRY_NAME_LEN: usize = 27;
pub const MIN_DATA_PART_SIZE_BYTES: u64 = 350 * 1024 * 1024;
const MIB: u64 = 1024 * 1024;

/// What prepare learned about one candidate disk. Kept as typed plugin
/// state in addition to being flattened into `disk.<name>:*` option-store
/// keys, per the typed-internal-representation design note: the flat map
/// stays the external surface, this struct is what the rest of the
/// partitioner actually works with.
#[derive(Clone, Debug)]
struct DiscoveryRecord {
    disk: DiskInfo,
    gpt: Option<Gpt>,
    msdata_index: Option<u32>,
    msdata_size: Option<u64>,
    msdata_minsize: Option<u64>,
    esp_index: Option<u32>,
    esp_size: Option<u64>,
    android_size: u64,
    free_region: Option<(u64, u64)>,
}

impl DiscoveryRecord {
    fn free_size_bytes(&self) -> u64 {
        match self.free_region {
            Some((s, e)) => (e - s + 1) * self.disk.lba_size,
            None => 0,
        }
    }
}

pub struct Partitioner {
    block_dir: PathBuf,
    booted_media: Option<String>,
    discoveries: Vec<DiscoveryRecord>,
    created: Vec<String>,
}

impl Partitioner {
    pub fn new(block_dir: impl Into<PathBuf>, booted_media: Option<String>) -> Self {
        Partitioner {
            block_dir: block_dir.into(),
            booted_media,
            discoveries: Vec::new(),
            created: Vec::new(),
        }
    }

    fn record_for<'a>(&'a self, name: &str) -> Result<&'a DiscoveryRecord> {
        self.discoveries
            .iter()
            .find(|d| d.disk.name == name)
            .with_context(|| format!("no discovery record for disk '{}'", name))
    }
}

impl Plugin for Partitioner {
    fn name(&self) -> &str {
        "partitioner"
    }

    fn prepare(&mut self, ctx: &mut Context) -> Result<()> {
        let disks = disk::discover_disks(&self.block_dir, self.booted_media.as_deref())?;
        if disks.is_empty() {
            bail!("no candidate disks found");
        }

        let mut names = Vec::with_capacity(disks.len());
        for d in disks {
            ctx.options.put_formatted(&format!("disk.{}", d.name), "sectors", d.sectors.to_string());
            ctx.options.put_formatted(&format!("disk.{}", d.name), "lba_size", d.lba_size.to_string());
            ctx.options.put_formatted(&format!("disk.{}", d.name), "size", d.size_bytes().to_string());
            ctx.options.put_formatted(&format!("disk.{}", d.name), "model", d.model.clone());
            ctx.options.put_formatted(&format!("disk.{}", d.name), "device", d.device.clone());

            let record = analyze_disk(&d, ctx.interactive)?;
            if let Some(idx) = record.msdata_index {
                ctx.options.put_formatted(&format!("disk.{}", d.name), "msdata_index", idx.to_string());
                ctx.options.put_formatted(
                    &format!("disk.{}", d.name),
                    "msdata_size",
                    record.msdata_size.unwrap_or(0).to_string(),
                );
                if let Some(minsize) = record.msdata_minsize {
                    ctx.options.put_formatted(&format!("disk.{}", d.name), "msdata_minsize", minsize.to_string());
                }
            }
            if let Some(idx) = record.esp_index {
                ctx.options.put_formatted(&format!("disk.{}", d.name), "esp_index", idx.to_string());
                ctx.options.put_formatted(
                    &format!("disk.{}", d.name),
                    "esp_size",
                    record.esp_size.unwrap_or(0).to_string(),
                );
            }
            ctx.options.put_formatted(&format!("disk.{}", d.name), "android_size", record.android_size.to_string());
            if let Some((s, e)) = record.free_region {
                ctx.options.put_formatted(&format!("disk.{}", d.name), "free_start_lba", s.to_string());
                ctx.options.put_formatted(&format!("disk.{}", d.name), "free_end_lba", e.to_string());
                ctx.options.put_formatted(&format!("disk.{}", d.name), "free_size", record.free_size_bytes().to_string());
            }

            names.push(d.name.clone());
            self.discoveries.push(record);
        }
        ctx.options.put("base:disks", names.join(" "));
        Ok(())
    }

    fn cli_session(&mut self, ctx: &mut Context) -> Result<()> {
        let disks = ctx.options.get("base:disks")?.to_owned();
        let install_disk = match ctx.options.get_opt("base:install_disk") {
            Some(d) => d.to_owned(),
            None => {
                let names: Vec<&str> = disks.split_whitespace().collect();
                if names.len() == 1 {
                    names[0].to_owned()
                } else {
                    let options: Vec<UiOption> = names
                        .iter()
                        .map(|name| {
                            let record = self.record_for(name);
                            let description = match record {
                                Ok(r) => format!(
                                    "{} ({} MiB, {})",
                                    r.disk.device,
                                    r.disk.size_bytes() / MIB,
                                    r.disk.model
                                ),
                                Err(_) => String::new(),
                            };
                            UiOption::new(*name, description)
                        })
                        .collect();
                    ui::prompt_choice("Select the disk to install onto:", &options)?
                }
            }
        };
        ctx.options.put("base:install_disk", install_disk.clone());

        let base = BaseConfig::from_store(&ctx.options)?;
        let specs = load_partition_specs(&ctx.options, &base)?;
        let record = self.record_for(&install_disk)?.clone();

        if record.msdata_index.is_some() {
            let dualboot = match ctx.options.get_opt("base:dualboot") {
                Some(v) => v == "1",
                None => ui::prompt_yes_no("An existing Windows installation was found. Dual-boot with it?", true)?,
            };
            if dualboot {
                let esp_extra = record.esp_size.unwrap_or(0);
                let required = required_size_bytes(&specs, esp_extra);
                let available = record.android_size + record.free_size_bytes();
                if required > available {
                    let minsize = record
                        .msdata_minsize
                        .context("Windows data partition must be shrunk but its minimum size could not be determined")?;
                    let shortfall = required - available;
                    let msdata_size = record.msdata_size.unwrap_or(0);
                    if msdata_size < shortfall + minsize {
                        bail!("Windows data partition cannot be shrunk enough to make room for the install");
                    }
                    let windows_max = msdata_size - shortfall;
                    let windows_new_size = if ctx.interactive {
                        ui::prompt_u64_in_range(
                            "Enter the new size (in bytes) for the Windows data partition:",
                            minsize,
                            windows_max,
                        )?
                    } else {
                        windows_max
                    };
                    ctx.options.put("base:windows_resize", windows_new_size.to_string());
                }
                ctx.options.put("base:dualboot", "1");
            }
        } else {
            let required = required_size_bytes(&specs, 0);
            if record.disk.size_bytes() < required + 2 * MIB {
                bail!(
                    "insufficient disk space: need {} MiB more",
                    (required + 2 * MIB - record.disk.size_bytes()).div_ceil(MIB)
                );
            }
            if ctx.interactive
                && !ui::confirm_phrase(
                    &format!("All data on '{}' will be erased.", record.disk.device),
                    "erase",
                )?
            {
                bail!("installation cancelled by operator");
            }
        }
        Ok(())
    }

    fn execute(&mut self, ctx: &mut Context) -> Result<()> {
        let install_disk = ctx.options.get("base:install_disk")?.to_owned();
        let base = BaseConfig::from_store(&ctx.options)?;
        let specs = load_partition_specs(&ctx.options, &base)?;
        let record = self.record_for(&install_disk)?.clone();

        let install_id = generate_install_id();
        ctx.options.put("base:install_id", install_id.clone());
        ctx.cmdline.put("androidboot.install_id", install_id.clone());
        crate::driver::publish("ro.boot.install_id", &install_id);

        let dualboot = ctx.options.get_opt("base:dualboot") == Some("1");
        let created = if dualboot {
            execute_dualboot(ctx, &record, &specs, &install_id)?
        } else {
            execute_wipe(ctx, &record, &specs, &install_id)?
        };

        self.created = created;
        Ok(())
    }
}

fn generate_install_id() -> String {
    format!("{}{:08x}", INSTALL_MAGIC, rand::random::<u32>())
}

fn load_partition_specs(store: &crate::options::OptionStore, base: &BaseConfig) -> Result<Vec<PartitionSpec>> {
    base.partitions
        .iter()
        .map(|name| partition_spec_from_store(store, name))
        .collect()
}

fn required_size_bytes(specs: &[PartitionSpec], extra_bytes: u64) -> u64 {
    let sum_fixed: u64 = specs
        .iter()
        .filter(|p| !p.fills_remainder())
        .map(|p| p.len_mib.max(0) as u64 * MIB)
        .sum();
    sum_fixed + extra_bytes + MIN_DATA_PART_SIZE_BYTES
}

/// Round a free-region LBA range up/down to MiB boundaries: the first
/// partition starts at the first MiB-aligned LBA at or after the region's
/// start, and the usable end is rounded down to the last MiB boundary.
fn align_region_to_mib(region: (u64, u64), lba_size: u64) -> (u64, u64) {
    let (start, end) = region;
    let lbas_per_mib = MIB / lba_size;
    let aligned_start = start.div_ceil(lbas_per_mib) * lbas_per_mib;
    let aligned_end_plus_one = (end + 1) / lbas_per_mib * lbas_per_mib;
    (aligned_start, aligned_end_plus_one.saturating_sub(1))
}

/// Walk `specs` in order, creating each in `gpt` within `[start, end]`
/// (inclusive LBAs), synthesizing `bootloader2` right after `bootloader`.
/// `skip_name` entries are not created (the dual-boot branch reuses the
/// existing ESP for `bootloader` instead of creating a new one).
fn create_partitions(
    gpt: &mut Gpt,
    specs: &[PartitionSpec],
    region: (u64, u64),
    lba_size: u64,
    install_id: &str,
    skip_name: Option<&str>,
) -> Result<Vec<String>> {
    let mut working: Vec<PartitionSpec> = Vec::with_capacity(specs.len() + 1);
    for spec in specs {
        if Some(spec.name.as_str()) == skip_name {
            continue;
        }
        working.push(spec.clone());
        if spec.name == "bootloader" {
            let mut backup = spec.clone();
            backup.name = "bootloader2".to_owned();
            working.push(backup);
        }
    }

    let (start, end) = align_region_to_mib(region, lba_size);
    let region_mib = ((end - start + 1) * lba_size) / MIB;
    let sum_fixed_mib: i64 = working.iter().filter(|p| !p.fills_remainder()).map(|p| p.len_mib).sum();

    let mut cursor = start;
    let mut created = Vec::new();
    for spec in &working {
        if spec.name.chars().count() > MAX_ENTRY_NAME_LEN {
            bail!(
                "partition entry name '{}' is longer than {} characters",
                spec.name,
                MAX_ENTRY_NAME_LEN
            );
        }
        let len_mib = if spec.fills_remainder() {
            region_mib as i64 - sum_fixed_mib
        } else {
            spec.len_mib
        };
        if len_mib <= 0 {
            bail!("partition '{}' would have non-positive size", spec.name);
        }
        let lba_count = (len_mib as u64 * MIB).div_ceil(lba_size);
        let first_lba = cursor;
        let last_lba = first_lba + lba_count - 1;
        if last_lba > end {
            bail!("not enough space to create partition '{}'", spec.name);
        }
        let name = format!("{}{}", install_id, spec.name);
        let flags = spec.flags;
        gpt.create(&name, spec.ptype.type_guid(), flags, first_lba, last_lba)?;
        created.push(spec.name.clone());
        cursor = last_lba + 1;
    }
    Ok(created)
}

fn finish_and_commit(
    ctx: &mut Context,
    record: &DiscoveryRecord,
    gpt: &mut Gpt,
    created: &[String],
    install_id: &str,
) -> Result<()> {
    disk::commit_gpt(&record.disk, gpt)?;

    gpt.iterate_present(|idx, entry| {
        if let Some(short) = entry.name.strip_prefix(install_id) {
            if created.iter().any(|c| c == short) {
                let device = crate::gpt::partition_device_path(&record.disk.device, idx);
                ctx.options.put_formatted(&format!("partition.{}", short), "index", idx.to_string());
                ctx.options.put_formatted(&format!("partition.{}", short), "device", device.clone());
                ctx.options.put_formatted(&format!("partition.{}", short), "guid", entry.part_guid.to_string());
            }
        }
    });

    for name in created {
        if let Ok(device) = ctx.options.get(&format!("partition.{}:device", name)) {
            disk::wait_for_device_node(device)?;
        }
    }
    Ok(())
}

fn execute_wipe(
    ctx: &mut Context,
    record: &DiscoveryRecord,
    specs: &[PartitionSpec],
    install_id: &str,
) -> Result<Vec<String>> {
    info!("wiping disk '{}'", record.disk.device);
    let mut gpt = Gpt::new_empty(record.disk.lba_size, record.disk.sectors);
    let region = gpt.find_free_region().context("fresh GPT unexpectedly has no free space")?;

    let required = required_size_bytes(specs, 0);
    let region_bytes = (region.1 - region.0 + 1) * record.disk.lba_size;
    if region_bytes < required {
        bail!(
            "insufficient disk space: need {} MiB more",
            (required - region_bytes).div_ceil(MIB)
        );
    }

    let created = create_partitions(&mut gpt, specs, region, record.disk.lba_size, install_id, None)?;
    finish_and_commit(ctx, record, &mut gpt, &created, install_id)?;
    Ok(created)
}

fn execute_dualboot(
    ctx: &mut Context,
    record: &DiscoveryRecord,
    specs: &[PartitionSpec],
    install_id: &str,
) -> Result<Vec<String>> {
    let esp_index = record.esp_index.context("dual-boot requires an existing ESP")?;
    let mut gpt = record
        .gpt
        .clone()
        .context("dual-boot requires a readable existing GPT")?;

    if let Some(new_size_str) = ctx.options.get_opt("base:windows_resize").map(str::to_owned) {
        let new_size: u64 = new_size_str.parse().context("'base:windows_resize' is not a valid integer")?;
        let msdata_index = record.msdata_index.context("windows resize requested but no msdata partition found")?;
        let msdata_device = crate::gpt::partition_device_path(&record.disk.device, msdata_index);
        resize_ntfs(&msdata_device, new_size)?;
        let entry = gpt.get(msdata_index)?.clone();
        let new_lba_count = new_size.div_ceil(record.disk.lba_size);
        let new_last_lba = entry.first_lba + new_lba_count - 1;
        gpt.entries[(msdata_index - 1) as usize].last_lba = new_last_lba;
    }

    ctx.properties.put("ro.rtc_local_time", "1");

    let stale: Vec<u32> = {
        let mut stale = Vec::new();
        gpt.iterate_present(|idx, e| {
            if e.name.starts_with(INSTALL_MAGIC) && !e.name.ends_with("bootloader") {
                stale.push(idx);
            }
        });
        stale
    };
    for idx in stale {
        gpt.delete(idx)?;
    }

    let esp_size = record.esp_size.unwrap_or(0);
    ctx.options.put("partition.bootloader:mode", "skip");
    ctx.options.put_formatted("partition.bootloader", "len", (esp_size / MIB).to_string());
    ctx.options.put_formatted("partition.bootloader", "index", esp_index.to_string());
    ctx.options
        .put_formatted("partition.bootloader", "device", crate::gpt::partition_device_path(&record.disk.device, esp_index));

    let region = gpt
        .find_free_region()
        .context("no free space remains for the new Android partitions")?;
    let mut created = create_partitions(&mut gpt, specs, region, record.disk.lba_size, install_id, Some("bootloader"))?;

    let new_esp_name = format!("{}bootloader", install_id);
    gpt.set_name(esp_index, &new_esp_name)?;
    created.push("bootloader".to_owned());

    finish_and_commit(ctx, record, &mut gpt, &created, install_id)?;
    Ok(created)
}

fn resize_ntfs(device: &str, new_size_bytes: u64) -> Result<()> {
    info!("shrinking NTFS filesystem on '{}' to {} bytes", device, new_size_bytes);
    let mut dry = Command::new("ntfsresize");
    dry.args(["--no-action", "--size", &new_size_bytes.to_string(), device]);
    cmd_run_check_status(&mut dry).context("NTFS dry-run resize failed; the disk is likely corrupt")?;

    let mut real = Command::new("ntfsresize");
    real.args(["--size", &new_size_bytes.to_string(), device]);
    cmd_run_check_status(&mut real).context("NTFS resize failed; the disk is likely corrupt")
}

/// Read the discovery fields (MSR/ESP/prior-install/free-region) out of a
/// disk's existing GPT, if any.
fn analyze_disk(d: &DiskInfo, interactive: bool) -> Result<DiscoveryRecord> {
    let gpt = disk::read_gpt(d)?;
    let mut record = DiscoveryRecord {
        disk: d.clone(),
        gpt: gpt.clone(),
        msdata_index: None,
        msdata_size: None,
        msdata_minsize: None,
        esp_index: None,
        esp_size: None,
        android_size: 0,
        free_region: None,
    };

    let Some(gpt) = gpt else {
        return Ok(record);
    };

    let mut msr_index = None;
    gpt.iterate_present(|idx, e| {
        if e.type_guid == type_guid::microsoft_reserved() {
            msr_index = Some(idx);
        }
        if e.type_guid == type_guid::esp() {
            record.esp_index = Some(idx);
        }
        if e.name.starts_with(INSTALL_MAGIC) && !e.name.ends_with("bootloader") {
            record.android_size += (e.last_lba - e.first_lba + 1) * d.lba_size;
        }
    });

    if let Some(idx) = record.esp_index {
        let size = gpt.size_bytes(idx, d.lba_size)?;
        record.esp_size = Some(size.div_ceil(MIB) * MIB);
    }

    if let Some(msr) = msr_index {
        let msdata_index = msr + 1;
        if gpt.get(msdata_index).map(|e| e.is_present()).unwrap_or(false) {
            record.msdata_index = Some(msdata_index);
            record.msdata_size = Some(gpt.size_bytes(msdata_index, d.lba_size)?);
            if interactive {
                let msdata_device = crate::gpt::partition_device_path(&d.device, msdata_index);
                record.msdata_minsize = probe_ntfs_minsize(&msdata_device)?;
            }
        }
    }

    record.free_region = gpt.find_free_region();
    record.gpt = Some(gpt);
    Ok(record)
}

/// Probe the minimum size an NTFS filesystem can be shrunk to by running
/// `ntfsresize` in check-only, info mode and parsing its "You might resize
/// at <bytes>" line. Returns `None` (not fatal) if the tool reports the
/// filesystem is not NTFS, needs a `chkdsk` pass first, or is unreadable.
fn probe_ntfs_minsize(device: &str) -> Result<Option<u64>> {
    let output = Command::new("ntfsresize")
        .args(["--no-action", "--info", "--force", device])
        .output();
    let output = match output {
        Ok(o) => o,
        Err(e) => {
            warn!("could not run ntfsresize on '{}': {}", device, e);
            return Ok(None);
        }
    };
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    if text.contains("Failed to startup volume") || text.contains("chkdsk") {
        warn!("NTFS volume '{}' requires a chkdsk pass before it can be shrunk", device);
        return Ok(None);
    }
    if let Some(pos) = text.find("You might resize at ") {
        let rest = &text[pos + "You might resize at ".len()..];
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if let Ok(bytes) = digits.parse::<u64>() {
            debug!("NTFS minimum resize for '{}' is {} bytes", device, bytes);
            return Ok(Some(bytes));
        }
    }
    Ok(None)
}

pub fn default_block_dir() -> &'static Path {
    Path::new(disk::DEFAULT_BLOCK_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::{PartitionMode, PartitionType};

    fn spec(name: &str, ptype: PartitionType, len_mib: i64) -> PartitionSpec {
        PartitionSpec {
            name: name.to_owned(),
            ptype,
            len_mib,
            mode: PartitionMode::Format,
            src: None,
            footer: None,
            flags: 0,
            description: None,
        }
    }

    #[test]
    fn required_size_sums_fixed_lens_only() {
        let specs = vec![
            spec("bootloader", PartitionType::Esp, 64),
            spec("data", PartitionType::Ext4, -1),
        ];
        let required = required_size_bytes(&specs, 0);
        assert_eq!(required, 64 * MIB + MIN_DATA_PART_SIZE_BYTES);
    }

    #[test]
    fn align_region_to_mib_rounds_inward() {
        let lba_size = 512;
        let lbas_per_mib = MIB / lba_size;
        let (start, end) = align_region_to_mib((3, lbas_per_mib * 10 + 5), lba_size);
        assert_eq!(start, lbas_per_mib);
        assert_eq!(end, lbas_per_mib * 10 - 1);
    }

    #[test]
    fn wipe_scenario_fills_remainder_and_synthesizes_ab_slot() {
        let lba_size = 512u64;
        let total_sectors = 16u64 * 1024 * 1024 * 1024 / lba_size;
        let mut gpt = Gpt::new_empty(lba_size, total_sectors);
        let region = gpt.find_free_region().unwrap();
        let specs = vec![
            spec("bootloader", PartitionType::Esp, 64),
            spec("boot", PartitionType::Boot, 64),
            spec("misc", PartitionType::Misc, 4),
            spec("system", PartitionType::Ext4, 1024),
            spec("cache", PartitionType::Ext4, 256),
            spec("factory", PartitionType::Ext4, 32),
            spec("data", PartitionType::Ext4, -1),
        ];
        let created = create_partitions(&mut gpt, &specs, region, lba_size, "ANDROID!deadbeef", None).unwrap();
        assert_eq!(created.len(), 8);
        assert!(created.contains(&"bootloader2".to_owned()));
        gpt.iterate_present(|_, e| {
            assert!(e.name.starts_with("ANDROID!deadbeef"));
        });
    }
}
