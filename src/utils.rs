//! External-tool invocation and direct syscall helpers shared by every
//! plugin: running a command and checking its exit status, syncing a
//! filesystem, and probing a block device's filesystem UUID.

use std::ffi::{c_int, c_void, CString};
use std::path::Path;
use std::process::Command;

use anyhow::{anyhow, bail, Context, Result};
use blkid::prober::ProbeState;
use libc::{close, open, O_NONBLOCK, O_RDONLY};
use log::debug;

#[link(name = "c")]
extern "C" {
    #[allow(dead_code)]
    pub fn geteuid() -> c_int;
    #[allow(dead_code)]
    pub fn sync() -> c_void;
    pub fn syncfs(fd: c_int) -> c_int;
}

/// Run a command and turn a non-zero exit (or abnormal termination) into a
/// fatal error carrying the full command line.
pub fn cmd_run_check_status(cmd: &mut Command) -> Result<()> {
    let result = cmd
        .status()
        .with_context(|| format!("failed to run {:?}", cmd.get_program()))?;
    if result.success() {
        Ok(())
    } else if let Some(c) = result.code() {
        Err(anyhow!(
            "the following command failed with exit code {}:\n{:?}",
            c,
            cmd
        ))
    } else {
        Err(anyhow!("the following command exited abnormally:\n{:?}", cmd))
    }
}

/// Sync the filesystem backing `path` via `syncfs(2)`, not just the one
/// file - used after writing a filesystem image onto a partition, before
/// the kernel is asked to reread the partition table.
pub fn sync_filesystem(path: &dyn AsRef<Path>) -> Result<()> {
    let tgt_path = path.as_ref();
    let path = CString::new(tgt_path.as_os_str().as_encoded_bytes())?;
    let path_ptr = path.as_ptr();

    let fd = unsafe { open(path_ptr, O_RDONLY | O_NONBLOCK) };
    if fd < 0 {
        let errno = errno::errno();
        return Err(anyhow!("failed to open path {}: {}", tgt_path.display(), errno));
    }
    debug!("open(\"{}\") returned fd {}", tgt_path.display(), fd);
    let result = unsafe { syncfs(fd) };
    debug!("syncfs({}) returned {}", fd, result);
    if result != 0 {
        let close_ret = unsafe { close(fd) };
        if close_ret != 0 {
            panic!("failed to close fd {}: {}", fd, errno::errno());
        }
        let errno = errno::errno();
        return Err(anyhow!("failed to sync filesystem {}: {}", tgt_path.display(), errno));
    }
    let close_ret = unsafe { close(fd) };
    if close_ret != 0 {
        panic!("failed to close fd {}: {}", fd, errno::errno());
    }
    Ok(())
}

/// Get the filesystem UUID of the given block device, for recording into
/// install properties after a format or image step.
pub fn get_fsuuid(fspath: &dyn AsRef<Path>) -> Result<String> {
    // libblkid's cache does not cover loop devices, and the partitions this
    // crate works with are never loop devices, but the low-level probe path
    // works uniformly either way, so it's used unconditionally.
    let fspath = fspath.as_ref();
    let probe = blkid::prober::Prober::new_from_filename(fspath)?;
    let result = probe.do_safe_probe()?;
    match result {
        ProbeState::Success => {
            let values = probe.get_values_map()?;
            let uuid = values
                .get("UUID")
                .context("no filesystem UUID in probe results; is there a filesystem on this partition?")?;
            Ok(uuid.to_owned())
        }
        _ => bail!("could not probe filesystem information on '{}'", fspath.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failing_command_is_an_error() {
        let mut cmd = Command::new("false");
        assert!(cmd_run_check_status(&mut cmd).is_err());
    }

    #[test]
    fn succeeding_command_is_ok() {
        let mut cmd = Command::new("true");
        assert!(cmd_run_check_status(&mut cmd).is_ok());
    }
}
