//! Planned-partition configuration: the `partition.<name>:*` keys loaded
//! from ini, and the token tables that turn them into GPT type GUIDs and
//! flag bits.
//!
//! See [`crate::config`] for how a whole `partition.<name>` section becomes
//! a [`PartitionSpec`].

use anyhow::{bail, Result};
use strum::Display;

use crate::guid::{type_guid, Guid};

/// `partition.<name>:type` token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum PartitionType {
    Esp,
    Boot,
    Misc,
    Ext4,
    Vfat,
}

impl PartitionType {
    pub fn parse(token: &str) -> Result<Self> {
        Ok(match token {
            "esp" => PartitionType::Esp,
            "boot" => PartitionType::Boot,
            "misc" => PartitionType::Misc,
            "ext4" => PartitionType::Ext4,
            "vfat" => PartitionType::Vfat,
            other => bail!("unknown partition type token '{}'", other),
        })
    }

    pub fn type_guid(&self) -> Guid {
        match self {
            PartitionType::Esp => type_guid::esp(),
            PartitionType::Boot => type_guid::android_boot(),
            PartitionType::Misc => type_guid::android_misc(),
            PartitionType::Ext4 => type_guid::linux_filesystem_data(),
            PartitionType::Vfat => type_guid::microsoft_basic_data(),
        }
    }
}

/// `partition.<name>:mode` token - what the imager plugin does with this
/// partition once it exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum PartitionMode {
    Format,
    Image,
    Zero,
    Skip,
}

impl PartitionMode {
    pub fn parse(token: &str) -> Result<Self> {
        Ok(match token {
            "format" => PartitionMode::Format,
            "image" => PartitionMode::Image,
            "zero" => PartitionMode::Zero,
            "skip" => PartitionMode::Skip,
            other => bail!("unknown partition mode token '{}'", other),
        })
    }
}

pub const FLAG_SYSTEM: u64 = 1 << 0;
pub const FLAG_BOOT: u64 = 1 << 2;
pub const FLAG_RO: u64 = 1 << 60;
pub const FLAG_HIDDEN: u64 = 1 << 62;
pub const FLAG_NOAUTO: u64 = 1 << 63;

/// Parse a whitespace-separated flag token list (a leading `!` negates a
/// single token) into a GPT attribute bitmask. Unknown tokens are fatal.
pub fn parse_flags(tokens: &str) -> Result<u64> {
    let mut flags = 0u64;
    for raw in tokens.split_whitespace() {
        let (negate, name) = match raw.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let bit = match name {
            "system" => FLAG_SYSTEM,
            "boot" => FLAG_BOOT,
            "ro" => FLAG_RO,
            "hidden" => FLAG_HIDDEN,
            "noauto" => FLAG_NOAUTO,
            other => bail!("unknown partition flag token '{}'", other),
        };
        if negate {
            flags &= !bit;
        } else {
            flags |= bit;
        }
    }
    Ok(flags)
}

/// A single `[partition.<name>]` entry, fully parsed from the option store.
#[derive(Clone, Debug)]
pub struct PartitionSpec {
    pub name: String,
    pub ptype: PartitionType,
    /// Size in MiB; negative means "fill the remaining space".
    pub len_mib: i64,
    pub mode: PartitionMode,
    pub src: Option<String>,
    pub footer: Option<u64>,
    pub flags: u64,
    pub description: Option<String>,
}

impl PartitionSpec {
    pub fn fills_remainder(&self) -> bool {
        self.len_mib < 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tokens_map_to_stable_guids() {
        assert_eq!(PartitionType::parse("esp").unwrap().type_guid(), type_guid::esp());
        assert_eq!(
            PartitionType::parse("vfat").unwrap().type_guid(),
            type_guid::microsoft_basic_data()
        );
        assert!(PartitionType::parse("ntfs").is_err());
    }

    #[test]
    fn mode_tokens() {
        assert_eq!(PartitionMode::parse("format").unwrap(), PartitionMode::Format);
        assert!(PartitionMode::parse("bogus").is_err());
    }

    #[test]
    fn flags_combine_and_negate() {
        let flags = parse_flags("system boot ro").unwrap();
        assert_eq!(flags, FLAG_SYSTEM | FLAG_BOOT | FLAG_RO);
        let flags = parse_flags("system boot !boot").unwrap();
        assert_eq!(flags, FLAG_SYSTEM);
    }

    #[test]
    fn unknown_flag_is_fatal() {
        assert!(parse_flags("system turbo").is_err());
    }
}
