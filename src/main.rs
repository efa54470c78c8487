//! `iago` - GPT partitioner, imager, and bootloader pipeline for installing
//! an Android-IA-style system onto a PC-class target's block device.
//!
//! `main` itself is the thinnest layer in the crate: read configuration,
//! assemble the plugin pipeline in the fixed order §2 specifies, run it,
//! reboot. Everything interesting lives in [`driver`], [`partitioner`], and
//! the `plugins` the driver runs after it.

mod cli;
mod config;
mod disk;
mod driver;
mod gpt;
mod guid;
mod options;
mod partition;
mod partitioner;
mod plugins;
mod props;
mod ui;
mod utils;

use std::ffi::CString;
use std::path::PathBuf;

use anyhow::{bail, Context as _, Result};
use clap::Parser;
use cli::{Action, Cmdline};
use driver::{Context, Driver};
use log::{error, info};

fn main() {
    let cmdline = Cmdline::parse();

    let mut logger = colog::basic_builder();
    if cmdline.debug {
        logger.filter(None, log::LevelFilter::Debug);
    } else {
        logger.filter(None, log::LevelFilter::Info);
    }
    logger.init();

    install_signal_handlers();

    if let Err(e) = try_main(cmdline.action) {
        error!("{:#}", e);
        let mut chain = e.chain().skip(1).peekable();
        if chain.peek().is_some() {
            for cause in chain {
                error!("  - caused by: {}", cause);
            }
        }
        std::process::exit(1);
    }
}

/// `ctrlc` covers SIGINT/SIGTERM; SIGABRT additionally gets a raw handler
/// here because an abort (e.g. a panic-turned-abort, or an assertion in a
/// linked C library) bypasses Rust's normal unwind path entirely. Both
/// paths converge on the same cleanup: unmount whatever the bootloader
/// plugin currently has mounted, so a crash mid-install never leaves a
/// dangling mount behind (§5, Cancellation and timeouts).
fn install_signal_handlers() {
    ctrlc::set_handler(move || {
        plugins::bootloader::unmount_on_abort();
        eprintln!("\nReceived interrupt, exiting.");
        std::process::exit(130);
    })
    .expect("failed to register SIGINT/SIGTERM handler");

    unsafe {
        libc::signal(libc::SIGABRT, handle_sigabrt as libc::sighandler_t);
    }
}

extern "C" fn handle_sigabrt(signum: libc::c_int) {
    plugins::bootloader::unmount_on_abort();
    unsafe {
        libc::signal(signum, libc::SIG_DFL);
        libc::raise(signum);
    }
}

fn try_main(action: Action) -> Result<()> {
    info!("iago starting");
    match action {
        Action::Run {
            ini,
            interactive,
            gui,
            media,
            block_dir,
            run_as_root,
        } => run(ini, interactive, gui, media, block_dir, run_as_root),
        Action::DumpOptions { ini, media, block_dir } => dump_options(ini, media, block_dir),
    }
}

fn resolve_ini(ini: Option<String>) -> Result<String> {
    ini.or_else(props::boot_ini)
        .context("no ini configuration supplied (pass --ini or set 'IAGO_BOOT_INI')")
}

fn resolve_block_dir(block_dir: Option<String>) -> PathBuf {
    block_dir.map(PathBuf::from).unwrap_or_else(|| partitioner::default_block_dir().to_path_buf())
}

fn run(
    ini: Option<String>,
    interactive: bool,
    gui: bool,
    media: Option<String>,
    block_dir: Option<String>,
    run_as_root: bool,
) -> Result<()> {
    if gui || props::boot_gui() {
        bail!("GUI mode is not implemented");
    }
    if unsafe { libc::geteuid() } != 0 || !run_as_root {
        bail!("please run me as root and pass --run-as-root to acknowledge this will rewrite the target disk's partition table");
    }
    let interactive = interactive || props::boot_cli();
    let ini_paths = resolve_ini(ini)?;
    let media = media.or_else(props::media);
    let block_dir = resolve_block_dir(block_dir);

    let options = config::load_combined_ini(&ini_paths)?;
    let mut ctx = Context::new(options, interactive);

    let mut driver = Driver::new();
    driver.register(Box::new(partitioner::Partitioner::new(block_dir, media)));
    driver.register(Box::new(plugins::imager::Imager));
    driver.register(Box::new(plugins::ota::OtaStager));
    driver.register(Box::new(plugins::bootloader::EfiBootloader));
    driver.register(Box::new(plugins::bootloader::LegacyBootloader));
    driver.register(Box::new(plugins::finalizer::Finalizer));

    driver.run(&mut ctx)?;

    info!("installation complete; please remove the installation media");
    let reboot_target = ctx.options.get_or("base:reboot_target", "").to_owned();
    reboot_into(&reboot_target)
}

/// Run only `prepare` (disk discovery) and print the resulting option
/// store, without registering any of the plugins that would write to a
/// disk. A debugging aid, not part of the on-device contract.
fn dump_options(ini: Option<String>, media: Option<String>, block_dir: Option<String>) -> Result<()> {
    let ini_paths = resolve_ini(ini)?;
    let media = media.or_else(props::media);
    let block_dir = resolve_block_dir(block_dir);

    let options = config::load_combined_ini(&ini_paths)?;
    let mut ctx = Context::new(options, false);
    let mut partitioner = partitioner::Partitioner::new(block_dir, media);
    driver::Plugin::prepare(&mut partitioner, &mut ctx)?;

    for (key, value) in ctx.options.iter() {
        println!("{} = {}", key, value);
    }
    Ok(())
}

/// Invoke the kernel's `reboot(2)` with `LINUX_REBOOT_CMD_RESTART2`, passing
/// `target` as the restart command string - the same mechanism
/// `android_reboot(ANDROID_RB_RESTART2, 0, reboot_target)` uses in the
/// source, letting a bootloader that understands reboot reasons (e.g.
/// "recovery") act on it. An empty target is a normal boot.
fn reboot_into(target: &str) -> Result<()> {
    const LINUX_REBOOT_MAGIC1: libc::c_int = 0xfee1dead_u32 as libc::c_int;
    const LINUX_REBOOT_MAGIC2: libc::c_int = 0x2812_1969;
    const LINUX_REBOOT_CMD_RESTART2: libc::c_int = 0xA1B2_C3D4_u32 as libc::c_int;

    info!(
        "rebooting into '{}'",
        if target.is_empty() { "normal boot" } else { target }
    );
    unsafe {
        libc::sync();
    }
    let arg = CString::new(target).context("reboot target contains an interior NUL")?;
    let ret = unsafe {
        libc::syscall(
            libc::SYS_reboot,
            LINUX_REBOOT_MAGIC1,
            LINUX_REBOOT_MAGIC2,
            LINUX_REBOOT_CMD_RESTART2,
            arg.as_ptr(),
        )
    };
    if ret != 0 {
        let errno = errno::errno();
        bail!("reboot(2) failed: {}", errno);
    }
    Ok(())
}
