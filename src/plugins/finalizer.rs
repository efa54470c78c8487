//! Last plugin in the pipeline: mounts the factory partition and writes
//! every key/value pair accumulated in the install-properties store as
//! `key=value` lines, for the booted system to read back.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use sys_mount::{unmount, Mount, UnmountFlags};

use crate::driver::{Context, Plugin};
use crate::utils::sync_filesystem;

const INSTALL_PROP_FILE: &str = "install.prop";

pub struct Finalizer;

impl Plugin for Finalizer {
    fn name(&self) -> &str {
        "finalizer"
    }

    fn execute(&mut self, ctx: &mut Context) -> Result<()> {
        let device = ctx.options.get("partition.factory:device")?.to_owned();

        let mount_point = std::env::temp_dir().join("iago-factory");
        std::fs::create_dir_all(&mount_point)
            .with_context(|| format!("failed to create '{}'", mount_point.display()))?;
        Mount::builder()
            .mount(&device, &mount_point)
            .with_context(|| format!("failed to mount factory partition '{}' at '{}'", device, mount_point.display()))?;

        let result = write_properties(&mount_point, ctx);

        sync_filesystem(&mount_point)?;
        unmount(&mount_point, UnmountFlags::empty())
            .with_context(|| format!("failed to unmount '{}'", mount_point.display()))?;
        result
    }
}

fn write_properties(mount_point: &std::path::Path, ctx: &Context) -> Result<()> {
    let mut contents = String::new();
    for (key, value) in ctx.properties.iter() {
        contents.push_str(key);
        contents.push('=');
        contents.push_str(value);
        contents.push('\n');
    }
    let path: PathBuf = mount_point.join(INSTALL_PROP_FILE);
    std::fs::write(&path, contents).with_context(|| format!("failed to write '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::PropertyStore;

    #[test]
    fn properties_render_as_key_value_lines() {
        let mut properties = PropertyStore::new();
        properties.put("ro.rtc_local_time", "1");
        properties.put("ro.boot.install_id", "ANDROID!deadbeef");

        let dir = std::env::temp_dir().join(format!("iago-finalizer-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let ctx = Context {
            options: crate::options::OptionStore::new(),
            properties,
            cmdline: crate::options::CmdlineStore::new(),
            interactive: false,
        };
        write_properties(&dir, &ctx).unwrap();
        let written = std::fs::read_to_string(dir.join(INSTALL_PROP_FILE)).unwrap();
        assert!(written.contains("ro.rtc_local_time=1\n"));
        assert!(written.contains("ro.boot.install_id=ANDROID!deadbeef\n"));
    }
}
