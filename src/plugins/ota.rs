//! Stages an OTA package for the next boot: copies it onto the cache
//! partition, drops a recovery command file, and redirects the reboot
//! target to recovery. A no-op unless `base:ota` names a real path.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use log::info;
use sys_mount::{Mount, UnmountDrop};

use crate::driver::{Context, Plugin};
use crate::utils::sync_filesystem;

const OTA_FILE_NAME: &str = "ota.zip";
const COMMAND_FILE_NAME: &str = "command";

pub struct OtaStager;

impl Plugin for OtaStager {
    fn name(&self) -> &str {
        "ota"
    }

    fn execute(&mut self, ctx: &mut Context) -> Result<()> {
        let Some(src) = ctx.options.get_opt("base:ota").map(str::to_owned) else {
            return Ok(());
        };
        if src.is_empty() {
            return Ok(());
        }
        let src_path = PathBuf::from(&src);
        if !src_path.is_file() {
            return Err(anyhow::anyhow!("'base:ota' names '{}', which is not a regular file", src));
        }

        let cache_device = ctx.options.get("partition.cache:device")?.to_owned();
        info!("staging OTA package '{}' onto '{}'", src, cache_device);

        let mount_point = tempdir()?;
        let mount: UnmountDrop<Mount> = Mount::builder()
            .mount(&cache_device, &mount_point)
            .with_context(|| format!("failed to mount '{}' at '{}'", cache_device, mount_point.display()))?
            .into_unmount_drop(sys_mount::UnmountFlags::DETACH);

        let dst = mount_point.join(OTA_FILE_NAME);
        std::fs::copy(&src_path, &dst)
            .with_context(|| format!("failed to copy '{}' to '{}'", src_path.display(), dst.display()))?;

        let command_path = mount_point.join(COMMAND_FILE_NAME);
        std::fs::write(&command_path, format!("--update_package=/cache/{}\n", OTA_FILE_NAME))
            .with_context(|| format!("failed to write '{}'", command_path.display()))?;

        sync_filesystem(&mount_point)?;
        drop(mount);

        ctx.options.put("base:reboot_target", "recovery");
        Ok(())
    }
}

fn tempdir() -> Result<PathBuf> {
    let path = std::env::temp_dir().join(format!("iago-ota-{}", std::process::id()));
    std::fs::create_dir_all(&path).with_context(|| format!("failed to create '{}'", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OptionStore;

    #[test]
    fn no_ota_path_is_a_noop() {
        let mut plugin = OtaStager;
        let mut ctx = Context::new(OptionStore::new(), false);
        assert!(plugin.execute(&mut ctx).is_ok());
        assert!(ctx.options.get_opt("base:reboot_target").is_none());
    }

    #[test]
    fn nonexistent_ota_path_is_fatal() {
        let mut plugin = OtaStager;
        let mut store = OptionStore::new();
        store.put("base:ota", "/nonexistent/path/to/update.zip");
        let mut ctx = Context::new(store, false);
        assert!(plugin.execute(&mut ctx).is_err());
    }
}

