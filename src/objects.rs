//! Codec for the inventory object table (`object` file).
//!
//! The table is a list of (name offset, starting room) records followed by a
//! pool of null-terminated name strings. Whole-file XOR obfuscation and the
//! 3-vs-4-byte record size are both detected heuristically, the way the
//! interpreter did it.

use std::collections::HashMap;

use log::{debug, warn};

use crate::util::avis_durgan;

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInfo {
    pub name: Vec<u8>,
    pub starting_room: u8,
}

/// Decoded object table plus the layout quirks needed to reproduce the
/// source bytes: `masked` (Avis Durgan obfuscation), `record_len` (3 or 4)
/// and `suppress_final_terminator` (the last name had no trailing null).
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectsFile {
    pub objects: Vec<ObjectInfo>,
    pub masked: bool,
    pub record_len: u8,
    pub suppress_final_terminator: bool,
}

impl Default for ObjectsFile {
    fn default() -> ObjectsFile {
        ObjectsFile {
            objects: Vec::new(),
            masked: false,
            record_len: 3,
            suppress_final_terminator: false,
        }
    }
}

/// Decode an object table. Total: out-of-range offsets end the scan or
/// produce empty names rather than failing.
pub fn unpack_objects(data: &[u8]) -> ObjectsFile {
    if data.len() < 2 {
        return ObjectsFile::default();
    }
    let mut data = data.to_vec();

    // If the first record's offset already points past the end of the file,
    // the table must be obfuscated.
    let masked = (data[0] as usize | ((data[1] as usize) << 8)) > data.len();
    if masked {
        debug!("object table is Avis Durgan masked");
        avis_durgan(&mut data);
    }

    let record_len: usize = if data.get(3).copied().unwrap_or(1) != 0 { 3 } else { 4 };

    let mut objects = Vec::new();
    let mut pos = 0usize;
    let mut stop_pos = usize::MAX;
    let mut suppress_final_terminator = false;
    while pos + record_len <= stop_pos {
        if pos + 2 > data.len() {
            warn!("object table ends mid-record at offset {}", pos);
            break;
        }
        let offset = record_len + (data[pos] as usize | ((data[pos + 1] as usize) << 8));
        stop_pos = stop_pos.min(offset);
        let (name, missing_terminator) = if offset >= data.len() {
            (Vec::new(), true)
        } else {
            match data[offset..].iter().position(|&b| b == 0) {
                Some(end) => (data[offset..offset + end].to_vec(), false),
                None => (data[offset..].to_vec(), true),
            }
        };
        if missing_terminator {
            suppress_final_terminator = true;
        }
        let starting_room = data.get(pos + 2).copied().unwrap_or(0);
        objects.push(ObjectInfo { name, starting_room });
        pos += record_len;
    }

    ObjectsFile {
        objects,
        masked,
        record_len: record_len as u8,
        suppress_final_terminator,
    }
}

/// Encode an object table, deduplicating repeated identical names to a
/// single string offset and reproducing the masking and missing-final-null
/// quirks of the source.
pub fn pack_objects(file: &ObjectsFile) -> Vec<u8> {
    let record_len = file.record_len as usize;
    let name_bytes: usize = file.objects.iter().map(|o| o.name.len() + 1).sum();
    let mut buf = vec![0u8; record_len * file.objects.len() + name_bytes];

    let mut pos = record_len * file.objects.len();
    let mut pos_cache: HashMap<&[u8], usize> = HashMap::new();
    for (i, object) in file.objects.iter().enumerate() {
        let enc_pos = match pos_cache.get(object.name.as_slice()) {
            Some(&cached) => cached,
            None => {
                let enc_pos = pos - record_len;
                pos_cache.insert(&object.name, enc_pos);
                buf[pos..pos + object.name.len()].copy_from_slice(&object.name);
                pos += object.name.len() + 1;
                enc_pos
            }
        };
        buf[i * record_len] = (enc_pos & 0xff) as u8;
        buf[i * record_len + 1] = (enc_pos >> 8) as u8;
        buf[i * record_len + 2] = object.starting_room;
    }

    let end = if file.suppress_final_terminator {
        pos.saturating_sub(1)
    } else {
        pos
    };
    buf.truncate(end);
    if file.masked {
        avis_durgan(&mut buf);
    }
    buf
}
