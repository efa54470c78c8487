//! GPT GUIDs and their mixed-endian string form.
//!
//! A GUID is 16 raw on-disk bytes (`data1` little-endian u32, `data2` and
//! `data3` little-endian u16, `data4` eight raw bytes). Its canonical string
//! form byte-swaps the first three fields but prints `data4` verbatim, per
//! the EFI/Microsoft convention - this is not a bug to "fix" in either
//! direction.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail, Result};
use rand::RngCore;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Guid(pub [u8; 16]);

impl Guid {
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Guid(bytes)
    }

    pub const fn nil() -> Self {
        Guid([0u8; 16])
    }

    pub fn is_nil(&self) -> bool {
        self.0 == [0u8; 16]
    }

    pub fn random() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        // Set the version (4) and variant bits as a real v4 UUID would, so
        // disk GUIDs we mint look like every other GUID a partitioning tool
        // produces.
        bytes[7] = (bytes[7] & 0x0f) | 0x40;
        bytes[8] = (bytes[8] & 0x3f) | 0x80;
        Guid(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            b[3], b[2], b[1], b[0],
            b[5], b[4],
            b[7], b[6],
            b[8], b[9],
            b[10], b[11], b[12], b[13], b[14], b[15],
        )
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({})", self)
    }
}

impl FromStr for Guid {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let groups: Vec<&str> = s.split('-').collect();
        if groups.len() != 5 || groups.iter().map(|g| g.len()).collect::<Vec<_>>() != [8, 4, 4, 4, 12] {
            bail!("'{}' is not a well-formed GUID string", s);
        }
        let mut bytes = [0u8; 16];
        let g0 = parse_hex_bytes(groups[0])?;
        bytes[0] = g0[3];
        bytes[1] = g0[2];
        bytes[2] = g0[1];
        bytes[3] = g0[0];
        let g1 = parse_hex_bytes(groups[1])?;
        bytes[4] = g1[1];
        bytes[5] = g1[0];
        let g2 = parse_hex_bytes(groups[2])?;
        bytes[6] = g2[1];
        bytes[7] = g2[0];
        let g3 = parse_hex_bytes(groups[3])?;
        bytes[8] = g3[0];
        bytes[9] = g3[1];
        let g4 = parse_hex_bytes(groups[4])?;
        bytes[10..16].copy_from_slice(&g4);
        Ok(Guid(bytes))
    }
}

fn parse_hex_bytes(hex: &str) -> Result<Vec<u8>> {
    if hex.len() % 2 != 0 {
        bail!("odd-length hex group '{}'", hex);
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| anyhow!("invalid hex in '{}'", hex))
        })
        .collect()
}

/// Well-known GPT partition type GUIDs referenced by the type-token table.
pub mod type_guid {
    use super::Guid;
    use std::str::FromStr;

    pub fn esp() -> Guid {
        Guid::from_str("c12a7328-f81f-11d2-ba4b-00a0c93ec93b").unwrap()
    }

    pub fn microsoft_reserved() -> Guid {
        Guid::from_str("e3c9e316-0b5c-4db8-817d-f92df00215ae").unwrap()
    }

    pub fn microsoft_basic_data() -> Guid {
        Guid::from_str("ebd0a0a2-b9e5-4433-87c0-68b6b72699c7").unwrap()
    }

    /// Android boot image partition. There is no single universally
    /// registered GUID for this; the value below is the one used by the
    /// Android-IA installer this crate's partitioner logic is modeled on.
    pub fn android_boot() -> Guid {
        Guid::from_str("49a4d17f-93a3-45c1-a0de-f50b2ebe2599").unwrap()
    }

    /// Android misc partition (bootloader control block).
    pub fn android_misc() -> Guid {
        Guid::from_str("ef32a33b-a409-486c-9141-9ffb711f6266").unwrap()
    }

    pub fn linux_filesystem_data() -> Guid {
        Guid::from_str("0fc63daf-8483-4772-8e79-3d69d8477de4").unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_pattern() {
        let g = Guid::random();
        let s = g.to_string();
        assert_eq!(s.len(), 36);
        assert!(s
            .chars()
            .enumerate()
            .all(|(i, c)| if [8, 13, 18, 23].contains(&i) {
                c == '-'
            } else {
                c.is_ascii_hexdigit()
            }));
    }

    #[test]
    fn esp_guid_round_trips() {
        let s = type_guid::esp().to_string();
        assert_eq!(s, "c12a7328-f81f-11d2-ba4b-00a0c93ec93b");
        let parsed: Guid = s.parse().unwrap();
        assert_eq!(parsed, type_guid::esp());
    }

    #[test]
    fn mixed_endian_byte_order() {
        // data1=0x01020304 data2=0x0506 data3=0x0708 data4={09,0a,...,10}
        let bytes: [u8; 16] = [
            0x04, 0x03, 0x02, 0x01, 0x06, 0x05, 0x08, 0x07, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e,
            0x0f, 0x10,
        ];
        let g = Guid::from_bytes(bytes);
        assert_eq!(g.to_string(), "01020304-0506-0708-090a-0b0c0d0e0f10");
    }
}
