//! Hand-rolled GPT / protective-MBR codec.
//!
//! Every numeric field on disk is little-endian; this module never relies on
//! host byte order and never casts a `#[repr(C)]` struct over a byte buffer,
//! each field is read and written explicitly with `byteorder` so the
//! little-endian discipline is visible at the call site. GUIDs are stored in
//! raw on-disk byte order ([`Guid`] only mixed-endian-swaps for `Display`).

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use anyhow::{bail, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use log::{debug, warn};

use crate::guid::Guid;

pub const GPT_SIGNATURE: &[u8; 8] = b"EFI PART";
pub const GPT_REVISION: u32 = 0x0001_0000;
pub const GPT_HEADER_SIZE: u32 = 92;
pub const NUM_PENTRIES: u32 = 128;
pub const PENTRY_SIZE: u32 = 128;
pub const MAX_NAME_CODE_UNITS: usize = 36;

/// Offset of the protective-MBR partition-type byte within LBA 0.
pub const PROTECTIVE_MBR_TYPE_OFFSET: usize = 0x1BE + 4;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GptHeader {
    pub revision: u32,
    pub header_size: u32,
    pub header_crc32: u32,
    pub current_lba: u64,
    pub backup_lba: u64,
    pub first_usable_lba: u64,
    pub last_usable_lba: u64,
    pub disk_guid: Guid,
    pub partition_entry_lba: u64,
    pub num_partition_entries: u32,
    pub partition_entry_size: u32,
    pub partition_entry_array_crc32: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GptEntry {
    pub type_guid: Guid,
    pub part_guid: Guid,
    pub first_lba: u64,
    pub last_lba: u64,
    pub flags: u64,
    pub name: String,
}

impl GptEntry {
    pub fn empty() -> Self {
        GptEntry {
            type_guid: Guid::nil(),
            part_guid: Guid::nil(),
            first_lba: 0,
            last_lba: 0,
            flags: 0,
            name: String::new(),
        }
    }

    pub fn is_present(&self) -> bool {
        self.first_lba != 0
    }
}

#[derive(Clone, Debug)]
pub struct Gpt {
    pub header: GptHeader,
    /// 1-based addressing: slot `i` lives at `entries[i - 1]`.
    pub entries: Vec<GptEntry>,
}

fn reserve_sectors(lba_size: u64) -> u64 {
    let bytes = u64::from(NUM_PENTRIES) * u64::from(PENTRY_SIZE);
    bytes.div_ceil(lba_size)
}

/// Encode a name into 36 UTF-16LE code units, silently truncating any
/// excess - the 36-unit field width is a hard on-disk limit, not a
/// validation rule. The partitioner enforces the tighter 27-ASCII-character
/// cap on *configured* entry names itself, before this is ever called with
/// the install-id-prefixed full name (see `partitioner::MAX_ENTRY_NAME_LEN`).
fn encode_name(name: &str) -> [u16; MAX_NAME_CODE_UNITS] {
    let mut units = [0u16; MAX_NAME_CODE_UNITS];
    for (i, u) in name.encode_utf16().enumerate() {
        if i >= MAX_NAME_CODE_UNITS {
            break;
        }
        units[i] = u;
    }
    units
}

fn decode_name(units: &[u16]) -> Result<String> {
    let len = units.iter().position(|&u| u == 0).unwrap_or(units.len());
    String::from_utf16(&units[..len]).context("partition name is not valid UTF-16LE")
}

impl GptHeader {
    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(GPT_HEADER_SIZE as usize);
        buf.extend_from_slice(GPT_SIGNATURE);
        buf.write_u32::<LittleEndian>(self.revision).unwrap();
        buf.write_u32::<LittleEndian>(self.header_size).unwrap();
        buf.write_u32::<LittleEndian>(0).unwrap(); // header_crc32, zeroed for the checksum pass
        buf.write_u32::<LittleEndian>(0).unwrap(); // reserved
        buf.write_u64::<LittleEndian>(self.current_lba).unwrap();
        buf.write_u64::<LittleEndian>(self.backup_lba).unwrap();
        buf.write_u64::<LittleEndian>(self.first_usable_lba).unwrap();
        buf.write_u64::<LittleEndian>(self.last_usable_lba).unwrap();
        buf.extend_from_slice(self.disk_guid.as_bytes());
        buf.write_u64::<LittleEndian>(self.partition_entry_lba).unwrap();
        buf.write_u32::<LittleEndian>(self.num_partition_entries).unwrap();
        buf.write_u32::<LittleEndian>(self.partition_entry_size).unwrap();
        buf.write_u32::<LittleEndian>(self.partition_entry_array_crc32).unwrap();
        buf
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        let mut c = Cursor::new(buf);
        let mut sig = [0u8; 8];
        c.read_exact(&mut sig)?;
        if &sig != GPT_SIGNATURE {
            bail!("bad GPT signature");
        }
        let revision = c.read_u32::<LittleEndian>()?;
        let header_size = c.read_u32::<LittleEndian>()?;
        let header_crc32 = c.read_u32::<LittleEndian>()?;
        let _reserved = c.read_u32::<LittleEndian>()?;
        let current_lba = c.read_u64::<LittleEndian>()?;
        let backup_lba = c.read_u64::<LittleEndian>()?;
        let first_usable_lba = c.read_u64::<LittleEndian>()?;
        let last_usable_lba = c.read_u64::<LittleEndian>()?;
        let mut disk_guid_bytes = [0u8; 16];
        c.read_exact(&mut disk_guid_bytes)?;
        let partition_entry_lba = c.read_u64::<LittleEndian>()?;
        let num_partition_entries = c.read_u32::<LittleEndian>()?;
        let partition_entry_size = c.read_u32::<LittleEndian>()?;
        let partition_entry_array_crc32 = c.read_u32::<LittleEndian>()?;
        Ok(GptHeader {
            revision,
            header_size,
            header_crc32,
            current_lba,
            backup_lba,
            first_usable_lba,
            last_usable_lba,
            disk_guid: Guid::from_bytes(disk_guid_bytes),
            partition_entry_lba,
            num_partition_entries,
            partition_entry_size,
            partition_entry_array_crc32,
        })
    }

    fn computed_crc32(&self) -> u32 {
        let mut zeroed = self.clone();
        zeroed.header_crc32 = 0;
        let encoded = zeroed.encode();
        let mut hasher = Crc32::new();
        hasher.update(&encoded[..self.header_size as usize]);
        hasher.finalize()
    }
}

impl Gpt {
    /// Build the header+entries for a freshly wiped disk. Does not touch
    /// any device; pure in-memory construction.
    pub fn new_empty(lba_size: u64, total_sectors: u64) -> Self {
        let reserved = reserve_sectors(lba_size);
        let backup_lba = total_sectors - 1;
        let header = GptHeader {
            revision: GPT_REVISION,
            header_size: GPT_HEADER_SIZE,
            header_crc32: 0,
            current_lba: 1,
            backup_lba,
            first_usable_lba: 2 + reserved,
            last_usable_lba: backup_lba - 1 - reserved,
            disk_guid: Guid::random(),
            partition_entry_lba: 2,
            num_partition_entries: NUM_PENTRIES,
            partition_entry_size: PENTRY_SIZE,
            partition_entry_array_crc32: 0,
        };
        let entries = vec![GptEntry::empty(); NUM_PENTRIES as usize];
        Gpt { header, entries }
    }

    fn entries_buf(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.entries.len() * PENTRY_SIZE as usize);
        for e in &self.entries {
            buf.extend_from_slice(e.type_guid.as_bytes());
            buf.extend_from_slice(e.part_guid.as_bytes());
            buf.write_u64::<LittleEndian>(e.first_lba).unwrap();
            buf.write_u64::<LittleEndian>(e.last_lba).unwrap();
            buf.write_u64::<LittleEndian>(e.flags).unwrap();
            let units = if e.name.is_empty() {
                [0u16; MAX_NAME_CODE_UNITS]
            } else {
                encode_name(&e.name)
            };
            for u in units {
                buf.write_u16::<LittleEndian>(u).unwrap();
            }
        }
        buf
    }

    fn decode_entries(buf: &[u8], count: u32) -> Result<Vec<GptEntry>> {
        let mut c = Cursor::new(buf);
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let mut type_guid = [0u8; 16];
            c.read_exact(&mut type_guid)?;
            let mut part_guid = [0u8; 16];
            c.read_exact(&mut part_guid)?;
            let first_lba = c.read_u64::<LittleEndian>()?;
            let last_lba = c.read_u64::<LittleEndian>()?;
            let flags = c.read_u64::<LittleEndian>()?;
            let mut name_units = [0u16; MAX_NAME_CODE_UNITS];
            c.read_u16_into::<LittleEndian>(&mut name_units)?;
            let name = if first_lba == 0 {
                String::new()
            } else {
                decode_name(&name_units)?
            };
            entries.push(GptEntry {
                type_guid: Guid::from_bytes(type_guid),
                part_guid: Guid::from_bytes(part_guid),
                first_lba,
                last_lba,
                flags,
                name,
            });
        }
        Ok(entries)
    }

    fn entries_crc32(buf: &[u8]) -> u32 {
        let mut hasher = Crc32::new();
        hasher.update(buf);
        hasher.finalize()
    }

    /// Read the GPT off an already-open device. Returns `Ok(None)` if the
    /// protective-MBR signature byte is absent - a valid "no GPT" outcome,
    /// not an error. Falls back to the backup GPT if the primary's CRCs do
    /// not validate.
    pub fn read_from<R: Read + Seek>(r: &mut R, lba_size: u64, total_sectors: u64) -> Result<Option<Self>> {
        r.seek(SeekFrom::Start(0))?;
        let mut mbr = vec![0u8; lba_size as usize];
        r.read_exact(&mut mbr)?;
        if mbr[PROTECTIVE_MBR_TYPE_OFFSET] != 0xEE {
            debug!("protective MBR byte absent; no GPT present");
            return Ok(None);
        }

        match Self::read_copy_at(r, lba_size, 1) {
            Ok(gpt) if gpt.verify() => return Ok(Some(gpt)),
            Ok(_) => warn!("primary GPT failed CRC validation; falling back to backup"),
            Err(e) => warn!("failed to read primary GPT ({}); falling back to backup", e),
        }

        let backup_lba = total_sectors - 1;
        match Self::read_copy_at(r, lba_size, backup_lba) {
            Ok(gpt) if gpt.verify() => {
                warn!("recovered GPT from backup copy at LBA {}", backup_lba);
                Ok(Some(gpt))
            }
            _ => {
                warn!("backup GPT also failed validation; treating disk as having no usable GPT");
                Ok(None)
            }
        }
    }

    fn read_copy_at<R: Read + Seek>(r: &mut R, lba_size: u64, header_lba: u64) -> Result<Self> {
        r.seek(SeekFrom::Start(header_lba * lba_size))?;
        let mut header_buf = vec![0u8; lba_size as usize];
        r.read_exact(&mut header_buf)?;
        let header = GptHeader::decode(&header_buf[..GPT_HEADER_SIZE as usize])?;

        let entries_len = (header.num_partition_entries * header.partition_entry_size) as usize;
        r.seek(SeekFrom::Start(header.partition_entry_lba * lba_size))?;
        let mut entries_buf = vec![0u8; entries_len];
        r.read_exact(&mut entries_buf)?;
        let entries = Self::decode_entries(&entries_buf, header.num_partition_entries)?;

        Ok(Gpt { header, entries })
    }

    pub fn verify(&self) -> bool {
        if self.header.header_crc32 != self.header.computed_crc32() {
            return false;
        }
        let entries_crc = Self::entries_crc32(&self.entries_buf());
        self.header.partition_entry_array_crc32 == entries_crc
    }

    pub fn get(&self, index: u32) -> Result<&GptEntry> {
        if index == 0 || index as usize > self.entries.len() {
            bail!("partition index {} is out of range", index);
        }
        Ok(&self.entries[(index - 1) as usize])
    }

    pub fn iterate_present(&self, mut f: impl FnMut(u32, &GptEntry)) {
        for (i, e) in self.entries.iter().enumerate() {
            if e.is_present() {
                f((i + 1) as u32, e);
            }
        }
    }

    fn lowest_free_slot(&self) -> Option<u32> {
        self.entries
            .iter()
            .position(|e| !e.is_present())
            .map(|i| (i + 1) as u32)
    }

    /// Create a new entry in the lowest free slot. Fatal if the table is
    /// full, the range falls outside `[first_usable_lba, last_usable_lba]`,
    /// or it overlaps any present entry.
    pub fn create(
        &mut self,
        name: &str,
        type_guid: Guid,
        flags: u64,
        first_lba: u64,
        last_lba: u64,
    ) -> Result<u32> {
        let index = self
            .lowest_free_slot()
            .context("partition table is full")?;
        if first_lba < self.header.first_usable_lba || last_lba > self.header.last_usable_lba {
            bail!(
                "requested range [{}, {}] falls outside usable area [{}, {}]",
                first_lba,
                last_lba,
                self.header.first_usable_lba,
                self.header.last_usable_lba
            );
        }
        for e in self.entries.iter().filter(|e| e.is_present()) {
            let overlaps = first_lba <= e.last_lba && e.first_lba <= last_lba;
            if overlaps {
                bail!(
                    "requested range [{}, {}] overlaps existing partition '{}'",
                    first_lba,
                    last_lba,
                    e.name
                );
            }
        }
        self.entries[(index - 1) as usize] = GptEntry {
            type_guid,
            part_guid: Guid::random(),
            first_lba,
            last_lba,
            flags,
            name: name.to_owned(),
        };
        Ok(index)
    }

    pub fn delete(&mut self, index: u32) -> Result<()> {
        if index == 0 || index as usize > self.entries.len() {
            bail!("partition index {} is out of range", index);
        }
        self.entries[(index - 1) as usize] = GptEntry::empty();
        Ok(())
    }

    pub fn set_name(&mut self, index: u32, name: &str) -> Result<()> {
        let entry = self
            .entries
            .get_mut((index - 1) as usize)
            .context("partition index out of range")?;
        entry.name = name.to_owned();
        Ok(())
    }

    pub fn size_bytes(&self, index: u32, lba_size: u64) -> Result<u64> {
        let e = self.get(index)?;
        Ok((e.last_lba - e.first_lba + 1) * lba_size)
    }

    /// The largest contiguous gap, inclusive `[start_lba, end_lba]`, or
    /// `None` if the usable area is fully occupied.
    pub fn find_free_region(&self) -> Option<(u64, u64)> {
        let mut ranges: Vec<(u64, u64)> = self
            .entries
            .iter()
            .filter(|e| e.is_present())
            .map(|e| (e.first_lba, e.last_lba))
            .collect();
        ranges.sort_by_key(|&(first, _)| first);

        let mut best: Option<(u64, u64)> = None;
        let mut consider = |start: u64, end: u64, best: &mut Option<(u64, u64)>| {
            if end < start {
                return;
            }
            let size = end - start + 1;
            if best.map(|(s, e)| e - s + 1 < size).unwrap_or(true) {
                *best = Some((start, end));
            }
        };

        let mut cursor = self.header.first_usable_lba;
        for (first, last) in &ranges {
            if *first > cursor {
                consider(cursor, first - 1, &mut best);
            }
            cursor = cursor.max(last + 1);
        }
        if cursor <= self.header.last_usable_lba {
            consider(cursor, self.header.last_usable_lba, &mut best);
        }
        best
    }

    /// Recompute both CRCs, then write the primary copy, the backup copy
    /// (with `current_lba`/`backup_lba` swapped and the entries array at the
    /// end of the disk), and the protective MBR. Does not fsync or reread
    /// the partition table - see `disk::commit_gpt` for the full device-level
    /// write sequence.
    pub fn write_to<W: Write + Seek>(&mut self, w: &mut W, lba_size: u64, total_sectors: u64) -> Result<()> {
        let entries_buf = self.entries_buf();
        self.header.partition_entry_array_crc32 = Self::entries_crc32(&entries_buf);
        self.header.header_crc32 = self.header.computed_crc32();

        // Primary copy.
        write_lba(w, lba_size, 0, &protective_mbr(total_sectors))?;
        write_lba(w, lba_size, self.header.current_lba, &self.header.encode())?;
        w.seek(SeekFrom::Start(self.header.partition_entry_lba * lba_size))?;
        w.write_all(&entries_buf)?;

        // Backup copy: current/backup swapped, entries just before the
        // backup header.
        let backup_entries_lba = self.header.backup_lba - reserve_sectors(lba_size);
        let mut backup_header = self.header.clone();
        backup_header.current_lba = self.header.backup_lba;
        backup_header.backup_lba = self.header.current_lba;
        backup_header.partition_entry_lba = backup_entries_lba;
        backup_header.header_crc32 = backup_header.computed_crc32();
        w.seek(SeekFrom::Start(backup_entries_lba * lba_size))?;
        w.write_all(&entries_buf)?;
        write_lba(w, lba_size, backup_header.current_lba, &backup_header.encode())?;

        w.flush()?;
        Ok(())
    }
}

fn write_lba<W: Write + Seek>(w: &mut W, lba_size: u64, lba: u64, payload: &[u8]) -> Result<()> {
    let mut buf = vec![0u8; lba_size as usize];
    buf[..payload.len()].copy_from_slice(payload);
    w.seek(SeekFrom::Start(lba * lba_size))?;
    w.write_all(&buf)?;
    Ok(())
}

/// A protective MBR spanning the whole disk with a single `0xEE` entry,
/// clamped to the 32-bit LBA-size field.
pub fn protective_mbr(total_sectors: u64) -> [u8; 512] {
    let mut mbr = [0u8; 512];
    let size_in_lba = (total_sectors - 1).min(0xFFFF_FFFF) as u32;
    mbr[0x1BE] = 0x00; // status: not bootable
    mbr[0x1BE + 1..0x1BE + 4].copy_from_slice(&[0x00, 0x02, 0x00]); // CHS start, unused by GPT-aware tools
    mbr[PROTECTIVE_MBR_TYPE_OFFSET] = 0xEE;
    mbr[0x1BE + 5..0x1BE + 8].copy_from_slice(&[0xFF, 0xFF, 0xFF]); // CHS end, unused
    mbr[0x1BE + 8..0x1BE + 12].copy_from_slice(&1u32.to_le_bytes()); // starting LBA
    mbr[0x1BE + 12..0x1BE + 16].copy_from_slice(&size_in_lba.to_le_bytes());
    mbr[510] = 0x55;
    mbr[511] = 0xAA;
    mbr
}

/// Device-node path for a 1-based partition index on the given underlying
/// device, following the `sd*`/`nvme*`/`mmcblk*`/loop convention: append `p`
/// before the index when the device's basename ends in a digit.
pub fn partition_device_path(device: &str, index: u32) -> String {
    let ends_in_digit = device
        .rsplit('/')
        .next()
        .and_then(|base| base.chars().last())
        .map(|c| c.is_ascii_digit())
        .unwrap_or(false);
    if ends_in_digit {
        format!("{}p{}", device, index)
    } else {
        format!("{}{}", device, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LBA_SIZE: u64 = 512;
    const TOTAL_SECTORS: u64 = 16 * 1024 * 1024 * 1024 / LBA_SIZE; // 16 GiB disk

    #[test]
    fn new_empty_has_expected_geometry() {
        let gpt = Gpt::new_empty(LBA_SIZE, TOTAL_SECTORS);
        assert_eq!(gpt.header.num_partition_entries, 128);
        assert_eq!(gpt.header.first_usable_lba, 2 + 32); // 128*128/512 = 32
        assert_eq!(gpt.header.last_usable_lba, TOTAL_SECTORS - 1 - 1 - 32);
        assert!(gpt.entries.iter().all(|e| !e.is_present()));
    }

    #[test]
    fn round_trip_through_memory_buffer() {
        let mut gpt = Gpt::new_empty(LBA_SIZE, TOTAL_SECTORS);
        gpt.create(
            "bootloader",
            crate::guid::type_guid::esp(),
            0,
            gpt.header.first_usable_lba,
            gpt.header.first_usable_lba + 64 * 1024 * 1024 / LBA_SIZE - 1,
        )
        .unwrap();

        let mut buf = vec![0u8; (TOTAL_SECTORS * LBA_SIZE) as usize];
        let mut cursor = Cursor::new(&mut buf[..]);
        gpt.write_to(&mut cursor, LBA_SIZE, TOTAL_SECTORS).unwrap();

        let mut read_cursor = Cursor::new(&buf[..]);
        let read_back = Gpt::read_from(&mut read_cursor, LBA_SIZE, TOTAL_SECTORS)
            .unwrap()
            .expect("GPT should be present");
        assert_eq!(read_back.header.disk_guid, gpt.header.disk_guid);
        assert_eq!(read_back.entries, gpt.entries);
        assert!(read_back.verify());
    }

    #[test]
    fn protective_mbr_byte_is_0xee() {
        let mbr = protective_mbr(TOTAL_SECTORS);
        assert_eq!(mbr[PROTECTIVE_MBR_TYPE_OFFSET], 0xEE);
        assert_eq!(&mbr[510..512], &[0x55, 0xAA]);
    }

    #[test]
    fn no_gpt_when_protective_mbr_byte_absent() {
        let buf = vec![0u8; (TOTAL_SECTORS * LBA_SIZE) as usize];
        let mut cursor = Cursor::new(&buf[..]);
        assert!(Gpt::read_from(&mut cursor, LBA_SIZE, TOTAL_SECTORS)
            .unwrap()
            .is_none());
    }

    #[test]
    fn create_rejects_overlap_and_out_of_range() {
        let mut gpt = Gpt::new_empty(LBA_SIZE, TOTAL_SECTORS);
        let first = gpt.header.first_usable_lba;
        gpt.create("a", crate::guid::type_guid::esp(), 0, first, first + 99).unwrap();
        assert!(gpt.create("b", crate::guid::type_guid::esp(), 0, first + 50, first + 150).is_err());
        assert!(gpt
            .create("c", crate::guid::type_guid::esp(), 0, 0, first - 1)
            .is_err());
    }

    #[test]
    fn full_table_rejects_create() {
        let mut gpt = Gpt::new_empty(LBA_SIZE, TOTAL_SECTORS);
        let mut cursor = gpt.header.first_usable_lba;
        for i in 0..127 {
            gpt.create(&format!("p{}", i), crate::guid::type_guid::esp(), 0, cursor, cursor).unwrap();
            cursor += 1;
        }
        assert!(gpt.create("last", crate::guid::type_guid::esp(), 0, cursor, cursor).is_ok());
        assert!(gpt
            .create("overflow", crate::guid::type_guid::esp(), 0, cursor + 1, cursor + 1)
            .is_err());
    }

    #[test]
    fn find_free_region_picks_largest_gap() {
        let mut gpt = Gpt::new_empty(LBA_SIZE, TOTAL_SECTORS);
        let first = gpt.header.first_usable_lba;
        gpt.create("a", crate::guid::type_guid::esp(), 0, first, first + 9).unwrap();
        gpt.create("b", crate::guid::type_guid::esp(), 0, first + 20, first + 24).unwrap();
        let (start, end) = gpt.find_free_region().unwrap();
        // The largest gap is after "b" out to last_usable_lba, which dwarfs
        // the 10-sector gap between "a" and "b".
        assert_eq!(start, first + 25);
        assert_eq!(end, gpt.header.last_usable_lba);
    }

    #[test]
    fn name_round_trips_up_to_36_units_then_truncates() {
        let mut gpt = Gpt::new_empty(LBA_SIZE, TOTAL_SECTORS);
        let name = "a".repeat(36);
        let first = gpt.header.first_usable_lba;
        gpt.create(&name, crate::guid::type_guid::esp(), 0, first, first).unwrap();
        assert_eq!(gpt.get(1).unwrap().name, name);

        let too_long = "b".repeat(40);
        gpt.create(&too_long, crate::guid::type_guid::esp(), 0, first + 1, first + 1)
            .unwrap();
        assert_eq!(gpt.get(2).unwrap().name, "b".repeat(36));
    }

    #[test]
    fn device_path_derivation() {
        assert_eq!(partition_device_path("/dev/sda", 1), "/dev/sda1");
        assert_eq!(partition_device_path("/dev/nvme0n1", 2), "/dev/nvme0n1p2");
        assert_eq!(partition_device_path("/dev/loop0", 1), "/dev/loop0p1");
    }
}
