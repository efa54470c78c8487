//! Command-line surface.
//!
//! The real boot environment drives this installer purely through system
//! properties (`ro.boot.iago.cli`, `ro.boot.iago.gui`, `ro.boot.iago.ini`,
//! `ro.iago.media`, per §6) - on the device it "takes no arguments" at all.
//! This crate still ships a `clap`-derive binary, in the same
//! one-top-level-struct-plus-subcommand-enum shape as its teacher's
//! `Cmdline`/`Action`, so the same property-driven behavior is reachable
//! and testable off-device: each `run` flag below falls back to the
//! matching boot property (read as an environment variable via
//! [`crate::props`]) when omitted.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "iago", version, about = "Android-IA-style disk installer")]
pub struct Cmdline {
    /// Emit debug-level logging.
    #[arg(short = 'D', long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub action: Action,
}

#[derive(Subcommand, Debug)]
pub enum Action {
    /// Run the full prepare → (cli) → execute pipeline. This is the only
    /// subcommand that touches a disk.
    Run {
        /// Comma-separated ini file path(s) to load, same shape as
        /// `ro.boot.iago.ini`. Required one way or another; there is no
        /// built-in default configuration.
        #[arg(long)]
        ini: Option<String>,

        /// Run the interactive `cli_session` phase, same as
        /// `ro.boot.iago.cli`.
        #[arg(long)]
        interactive: bool,

        /// The GUI front-end, same as `ro.boot.iago.gui`. Not implemented;
        /// accepted only so the fatal behavior §6 specifies for it is
        /// reachable and testable.
        #[arg(long)]
        gui: bool,

        /// The device this installer itself booted from, excluded from
        /// discovery, same as `ro.iago.media`.
        #[arg(long)]
        media: Option<String>,

        /// Override the `/sys/block`-equivalent directory disk discovery
        /// scans. Only useful for pointing the partitioner at a fixture
        /// tree in tests; the real boot environment always uses the
        /// kernel's own sysfs.
        #[arg(long)]
        block_dir: Option<String>,

        /// Acknowledge that this run will rewrite the target disk's
        /// partition table. Required in addition to an effective UID of 0,
        /// an explicit consent step for a command this destructive.
        #[arg(short = 'r', long)]
        run_as_root: bool,
    },

    /// Run only the `prepare` phase and print the resulting option store as
    /// sorted `key = value` lines. A debugging aid for inspecting disk
    /// discovery without committing a layout; not part of the on-device
    /// contract.
    DumpOptions {
        #[arg(long)]
        ini: Option<String>,

        #[arg(long)]
        media: Option<String>,

        #[arg(long)]
        block_dir: Option<String>,
    },
}
