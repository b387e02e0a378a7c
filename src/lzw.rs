//! The LZW variant used by packed-volume resources.
//!
//! Codes start at 9 bits and grow to 11, packed LSB-first across byte
//! boundaries. 0x000-0x0ff are literals, 0x100 resets the dictionary,
//! 0x101 ends the stream, and dynamic codes are assigned from 258 upward
//! (entry = previous entry + first byte of the current entry). The encoder
//! resets the dictionary when the 11-bit code space fills up.

use bitvec::prelude::*;
use log::debug;

const RESET_CODE: u16 = 0x100;
const END_CODE: u16 = 0x101;
const FIRST_DYNAMIC: u16 = 258;
const MIN_WIDTH: usize = 9;
const MAX_WIDTH: usize = 11;
const CODE_LIMIT: u16 = 1 << MAX_WIDTH;

/// Decompress an LZW stream. `expected_len` is the decompressed length the
/// container header promised; a mismatch is an error.
pub fn decompress(data: &[u8], expected_len: usize) -> Result<Vec<u8>, String> {
    let bits = data.view_bits::<Lsb0>();
    let mut pos = 0usize;
    let mut width = MIN_WIDTH;
    // Dynamic entries only: index 0 holds code 258.
    let mut dict: Vec<Vec<u8>> = Vec::new();
    let mut prev: Option<Vec<u8>> = None;
    let mut out = Vec::with_capacity(expected_len);

    loop {
        if pos + width > bits.len() {
            return Err("unexpected end of compressed stream".to_string());
        }
        let code = bits[pos..pos + width].load_le::<u16>();
        pos += width;

        if code == END_CODE {
            break;
        }
        if code == RESET_CODE {
            dict.clear();
            width = MIN_WIDTH;
            prev = None;
            continue;
        }

        let entry: Vec<u8> = if code < 0x100 {
            vec![code as u8]
        } else {
            let index = (code - FIRST_DYNAMIC) as usize;
            if index < dict.len() {
                dict[index].clone()
            } else if index == dict.len() {
                // The code the encoder is defining right now: prev + prev[0].
                match &prev {
                    Some(p) => {
                        let mut entry = p.clone();
                        entry.push(p[0]);
                        entry
                    }
                    None => return Err(format!("undefined code {:#x} at stream start", code)),
                }
            } else {
                return Err(format!(
                    "undefined code {:#x} (dictionary has {} entries)",
                    code,
                    dict.len()
                ));
            }
        };

        if let Some(p) = prev.take() {
            if FIRST_DYNAMIC as usize + dict.len() < CODE_LIMIT as usize {
                let mut new_entry = p;
                new_entry.push(entry[0]);
                dict.push(new_entry);
                // The decoder lags the encoder by one entry, so it widens one
                // code earlier relative to its own dictionary size.
                let next_code = FIRST_DYNAMIC as usize + dict.len();
                if next_code == (1 << width) - 1 && width < MAX_WIDTH {
                    width += 1;
                }
            }
        }

        out.extend_from_slice(&entry);
        prev = Some(entry);
    }

    if out.len() != expected_len {
        return Err(format!(
            "decompressed {} bytes, expected {}",
            out.len(),
            expected_len
        ));
    }
    Ok(out)
}

/// Compress a buffer with the 9-to-11-bit LZW codec.
pub fn compress(data: &[u8]) -> Vec<u8> {
    let mut out = BitVec::<u8, Lsb0>::new();
    let mut emit = |code: u16, width: usize| {
        for bit in 0..width {
            out.push((code >> bit) & 1 != 0);
        }
    };

    if data.is_empty() {
        emit(END_CODE, MIN_WIDTH);
        return out.into_vec();
    }

    let mut dict: std::collections::HashMap<Vec<u8>, u16> = std::collections::HashMap::new();
    let mut next_code = FIRST_DYNAMIC;
    let mut width = MIN_WIDTH;

    let code_of = |dict: &std::collections::HashMap<Vec<u8>, u16>, seq: &[u8]| -> Option<u16> {
        if seq.len() == 1 {
            Some(seq[0] as u16)
        } else {
            dict.get(seq).copied()
        }
    };

    let mut seq = vec![data[0]];
    for &byte in &data[1..] {
        let mut candidate = seq.clone();
        candidate.push(byte);
        if code_of(&dict, &candidate).is_some() {
            seq = candidate;
            continue;
        }
        emit(code_of(&dict, &seq).unwrap(), width);
        dict.insert(candidate, next_code);
        next_code += 1;
        if next_code == (1 << width) as u16 && width < MAX_WIDTH {
            width += 1;
        }
        if next_code == CODE_LIMIT {
            // Code space exhausted: start over.
            emit(RESET_CODE, width);
            dict.clear();
            next_code = FIRST_DYNAMIC;
            width = MIN_WIDTH;
        }
        seq = vec![byte];
    }
    emit(code_of(&dict, &seq).unwrap(), width);
    // No entry follows the final code, so the decoder's one-entry-early
    // width growth must be mirrored here for the end-of-stream code.
    if FIRST_DYNAMIC as usize + dict.len() == (1 << width) - 1 && width < MAX_WIDTH {
        width += 1;
    }
    emit(END_CODE, width);

    let bytes = out.into_vec();
    debug!("LZW compressed {} bytes to {}", data.len(), bytes.len());
    bytes
}
