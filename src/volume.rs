//! Volume container and directory layout.
//!
//! Directories map a resource number to a (volume, offset) pair packed into
//! three bytes. Volume entries start with the 0x12 0x34 magic followed by
//! either the 5-byte legacy header (separate-directory games) or the 7-byte
//! compression-capable header (packed-directory games).

use std::collections::HashMap;

use log::{debug, warn};

use crate::filestore::FileStore;
use crate::lzw;
use crate::pic;
use crate::project::ResourceProblem;
use crate::util::{push_u16_le, u16_le};

pub const ENTRY_MAGIC: [u8; 2] = [0x12, 0x34];

/// One directory slot: which volume holds the resource and where.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirEntry {
    pub vol: u8,
    pub offset: u32,
}

/// Parse a directory blob into sparse slots. `0xFFFFFF` marks an absent
/// resource; a trailing partial record is ignored.
pub fn parse_directory(data: &[u8]) -> Vec<Option<DirEntry>> {
    let mut entries = Vec::with_capacity(data.len() / 3);
    for record in data.chunks_exact(3) {
        if record == [0xff, 0xff, 0xff] {
            entries.push(None);
        } else {
            entries.push(Some(DirEntry {
                vol: record[0] >> 4,
                offset: (((record[0] & 0x0f) as u32) << 16)
                    | ((record[1] as u32) << 8)
                    | record[2] as u32,
            }));
        }
    }
    entries
}

/// Encode directory slots back to the 3-byte-per-entry form.
pub fn build_directory(entries: &[Option<DirEntry>]) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(entries.len() * 3);
    for (index, entry) in entries.iter().enumerate() {
        match entry {
            None => out.extend_from_slice(&[0xff, 0xff, 0xff]),
            Some(entry) => {
                if entry.vol > 0x0f {
                    return Err(format!("resource {} volume {} exceeds 15", index, entry.vol));
                }
                if entry.offset >= 1 << 20 {
                    return Err(format!(
                        "resource {} offset {:#x} exceeds the 20-bit directory limit",
                        index, entry.offset
                    ));
                }
                out.push((entry.vol << 4) | ((entry.offset >> 16) as u8));
                out.push((entry.offset >> 8) as u8);
                out.push((entry.offset & 0xff) as u8);
            }
        }
    }
    Ok(out)
}

/// Which codec a packed-volume entry used, for faithful re-encoding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntryCompression {
    Stored,
    Lzw,
    Pic,
}

/// A resource entry read out of a volume: its decompressed payload and how
/// it was stored.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeEntry {
    pub data: Vec<u8>,
    pub compression: EntryCompression,
}

/// Read one resource entry. `packed` selects the 7-byte compression-capable
/// header. On failure the raw entry bytes (best effort) come back alongside
/// the problem tag so corrupt resources can still be carried and re-written
/// verbatim.
pub fn read_entry(
    vol_data: &[u8],
    offset: usize,
    expected_vol: u8,
    packed: bool,
) -> Result<VolumeEntry, (ResourceProblem, Vec<u8>)> {
    let raw_tail = |from: usize| vol_data[from.min(vol_data.len())..].to_vec();

    if offset + 5 > vol_data.len() {
        return Err((ResourceProblem::Truncated, raw_tail(offset)));
    }
    if vol_data[offset..offset + 2] != ENTRY_MAGIC {
        warn!("bad entry magic at offset {:#x}", offset);
        return Err((ResourceProblem::InvalidSignature, raw_tail(offset)));
    }
    let vol_byte = vol_data[offset + 2];

    if !packed {
        let len = u16_le(vol_data, offset + 3).unwrap() as usize;
        let end = offset + 5 + len;
        if vol_byte != expected_vol {
            warn!(
                "entry at {:#x} claims volume {}, directory says {}",
                offset, vol_byte, expected_vol
            );
            return Err((
                ResourceProblem::VolNumberMismatch,
                raw_tail(offset).into_iter().take(5 + len).collect(),
            ));
        }
        if end > vol_data.len() {
            return Err((ResourceProblem::Truncated, raw_tail(offset)));
        }
        return Ok(VolumeEntry {
            data: vol_data[offset + 5..end].to_vec(),
            compression: EntryCompression::Stored,
        });
    }

    if offset + 7 > vol_data.len() {
        return Err((ResourceProblem::Truncated, raw_tail(offset)));
    }
    let pic_compressed = vol_byte & 0x80 != 0;
    let vol_number = vol_byte & 0x7f;
    let decompressed_len = u16_le(vol_data, offset + 3).unwrap() as usize;
    let compressed_len = u16_le(vol_data, offset + 5).unwrap() as usize;
    let end = offset + 7 + compressed_len;
    let raw_entry = || raw_tail(offset).into_iter().take(7 + compressed_len).collect::<Vec<u8>>();

    if vol_number != expected_vol {
        warn!(
            "entry at {:#x} claims volume {}, directory says {}",
            offset, vol_number, expected_vol
        );
        return Err((ResourceProblem::VolNumberMismatch, raw_entry()));
    }
    if end > vol_data.len() {
        return Err((ResourceProblem::Truncated, raw_tail(offset)));
    }
    let payload = &vol_data[offset + 7..end];

    if compressed_len == decompressed_len {
        return Ok(VolumeEntry {
            data: payload.to_vec(),
            compression: EntryCompression::Stored,
        });
    }
    let result = if pic_compressed {
        pic::decompress(payload, decompressed_len)
    } else {
        lzw::decompress(payload, decompressed_len)
    };
    match result {
        Ok(data) => Ok(VolumeEntry {
            data,
            compression: if pic_compressed {
                EntryCompression::Pic
            } else {
                EntryCompression::Lzw
            },
        }),
        Err(e) => {
            warn!("failed to decompress entry at {:#x}: {}", offset, e);
            Err((ResourceProblem::CompressionError, raw_entry()))
        }
    }
}

/// Encode one resource entry. For packed volumes the requested codec is
/// tried first and silently downgraded to stored when it does not round-trip
/// or does not shrink the payload (equal lengths mean "stored" on disk).
pub fn write_entry(
    out: &mut Vec<u8>,
    data: &[u8],
    vol: u8,
    packed: bool,
    compression: EntryCompression,
) -> Result<(), String> {
    if data.len() > 0xffff {
        return Err(format!("resource of {} bytes exceeds the u16 size field", data.len()));
    }
    out.extend_from_slice(&ENTRY_MAGIC);
    if !packed {
        out.push(vol);
        push_u16_le(out, data.len() as u16);
        out.extend_from_slice(data);
        return Ok(());
    }

    let (payload, pic_flag) = match compression {
        EntryCompression::Stored => (data.to_vec(), false),
        EntryCompression::Lzw => (lzw::compress(data), false),
        EntryCompression::Pic => {
            let packed_payload = pic::compress(data);
            // PIC narrowing loses the high nibble of opcode arguments, so
            // only trust it when it reproduces the input.
            match pic::decompress(&packed_payload, data.len()) {
                Ok(restored) if restored == data => (packed_payload, true),
                _ => {
                    debug!("PIC compression does not round-trip, storing raw");
                    (data.to_vec(), false)
                }
            }
        }
    };

    if payload.len() >= data.len() {
        // No gain: store raw, signalled by equal length fields.
        out.push(vol);
        push_u16_le(out, data.len() as u16);
        push_u16_le(out, data.len() as u16);
        out.extend_from_slice(data);
    } else {
        out.push(if pic_flag { vol | 0x80 } else { vol });
        push_u16_le(out, data.len() as u16);
        push_u16_le(out, payload.len() as u16);
        out.extend_from_slice(&payload);
    }
    Ok(())
}

/// Loads each numbered volume file at most once. A volume is either not yet
/// requested, loaded, or known missing; there is no global state.
pub struct VolumeCache<'a> {
    store: &'a dyn FileStore,
    prefix: String,
    loaded: HashMap<u8, Option<Vec<u8>>>,
}

impl<'a> VolumeCache<'a> {
    /// `prefix` is the game id prepended to `vol.N` by packed-directory
    /// games (empty for separate-directory games or when suppressed).
    pub fn new(store: &'a dyn FileStore, prefix: &str) -> VolumeCache<'a> {
        VolumeCache {
            store,
            prefix: prefix.to_string(),
            loaded: HashMap::new(),
        }
    }

    pub fn file_name(&self, vol: u8) -> String {
        format!("{}vol.{}", self.prefix, vol)
    }

    pub fn get(&mut self, vol: u8) -> Option<&[u8]> {
        if !self.loaded.contains_key(&vol) {
            let name = self.file_name(vol);
            let data = self.store.read(&name);
            match &data {
                Some(bytes) => debug!("loaded {} ({} bytes)", name, bytes.len()),
                None => warn!("volume file {} not found", name),
            }
            self.loaded.insert(vol, data);
        }
        self.loaded[&vol].as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_round_trip() {
        let entries = vec![
            Some(DirEntry { vol: 1, offset: 0 }),
            None,
            Some(DirEntry { vol: 15, offset: 0xfffff }),
            Some(DirEntry { vol: 0, offset: 0x12345 }),
        ];
        let built = build_directory(&entries).unwrap();
        assert_eq!(built.len(), 12);
        assert_eq!(parse_directory(&built), entries);
    }

    #[test]
    fn directory_rejects_out_of_range_offsets() {
        assert!(build_directory(&[Some(DirEntry { vol: 0, offset: 1 << 20 })]).is_err());
        assert!(build_directory(&[Some(DirEntry { vol: 16, offset: 0 })]).is_err());
    }

    #[test]
    fn legacy_entry_round_trip() {
        let mut vol = vec![0u8; 3]; // leading padding
        let offset = vol.len();
        write_entry(&mut vol, b"resource data", 2, false, EntryCompression::Stored).unwrap();
        let entry = read_entry(&vol, offset, 2, false).unwrap();
        assert_eq!(entry.data, b"resource data");
        assert_eq!(entry.compression, EntryCompression::Stored);
    }

    #[test]
    fn packed_entry_round_trip_lzw() {
        let data: Vec<u8> = b"abcabcabc".iter().cycle().copied().take(600).collect();
        let mut vol = Vec::new();
        write_entry(&mut vol, &data, 1, true, EntryCompression::Lzw).unwrap();
        let entry = read_entry(&vol, 0, 1, true).unwrap();
        assert_eq!(entry.data, data);
        assert_eq!(entry.compression, EntryCompression::Lzw);
        assert!(vol.len() < data.len());
    }

    #[test]
    fn packed_entry_stores_incompressible_data() {
        // High-entropy short data: LZW gains nothing, both length fields match.
        let data = [0x01, 0x55, 0xaa, 0xfe];
        let mut vol = Vec::new();
        write_entry(&mut vol, &data, 1, true, EntryCompression::Lzw).unwrap();
        assert_eq!(u16_le(&vol, 3), u16_le(&vol, 5));
        let entry = read_entry(&vol, 0, 1, true).unwrap();
        assert_eq!(entry.data, data);
        assert_eq!(entry.compression, EntryCompression::Stored);
    }

    #[test]
    fn pic_entry_round_trip() {
        let data = [0xf0, 0x01, 0x20, 0x30, 0xf2, 0x05, 0x40, 0x50, 0x60, 0x70];
        let mut vol = Vec::new();
        write_entry(&mut vol, &data, 3, true, EntryCompression::Pic).unwrap();
        let entry = read_entry(&vol, 0, 3, true).unwrap();
        assert_eq!(entry.data, data);
        assert_eq!(entry.compression, EntryCompression::Pic);
    }

    #[test]
    fn bad_magic_is_invalid_signature() {
        let vol = vec![0x99, 0x34, 0, 0, 0, 0, 0];
        let err = read_entry(&vol, 0, 0, false).unwrap_err();
        assert_eq!(err.0, ResourceProblem::InvalidSignature);
    }

    #[test]
    fn vol_number_mismatch_keeps_raw_entry() {
        let mut vol = Vec::new();
        write_entry(&mut vol, b"data", 2, false, EntryCompression::Stored).unwrap();
        let (problem, raw) = read_entry(&vol, 0, 7, false).unwrap_err();
        assert_eq!(problem, ResourceProblem::VolNumberMismatch);
        assert_eq!(raw, vol);
    }

    #[test]
    fn truncated_entry() {
        let mut vol = Vec::new();
        write_entry(&mut vol, b"data", 1, false, EntryCompression::Stored).unwrap();
        vol.truncate(vol.len() - 2);
        let (problem, _) = read_entry(&vol, 0, 1, false).unwrap_err();
        assert_eq!(problem, ResourceProblem::Truncated);
    }
}
