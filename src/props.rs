//! Reads the boot-environment properties the real installer's `main()`
//! consults directly: `ro.boot.iago.cli`, `ro.boot.iago.gui`,
//! `ro.boot.iago.ini`, `ro.iago.media`. These are the inputs `iago run`'s
//! flags (see [`crate::cli`]) fall back to when a flag is omitted.
//!
//! There is no Android property service on a development host, so this is
//! the same stand-in [`crate::driver::publish`] uses for outbound signals:
//! each property reads from a fixed environment variable name. A future
//! on-device build swaps this for a real `property_get` call without
//! touching any caller.

use std::env;

/// Read a boot property, or `None` if it is unset or empty - matching the
/// source's convention that an empty property string means "not set".
fn get_env(var: &str) -> Option<String> {
    env::var(var).ok().filter(|v| !v.is_empty())
}

pub fn boot_ini() -> Option<String> {
    get_env("IAGO_BOOT_INI")
}

pub fn boot_cli() -> bool {
    matches!(get_env("IAGO_BOOT_CLI").as_deref(), Some("1") | Some("true"))
}

pub fn boot_gui() -> bool {
    matches!(get_env("IAGO_BOOT_GUI").as_deref(), Some("1") | Some("true"))
}

pub fn media() -> Option<String> {
    get_env("IAGO_MEDIA")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_property_is_none_or_false() {
        assert_eq!(boot_ini(), None);
        assert!(!boot_cli());
        assert!(!boot_gui());
        assert_eq!(media(), None);
    }
}
