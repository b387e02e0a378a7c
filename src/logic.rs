//! Codec for logic resources: a bytecode blob plus a 1-based table of
//! message strings. The bytecode is never interpreted here, only carried.

use log::warn;

use crate::project::ResourceProblem;
use crate::util::{avis_durgan, push_u16_le, u16_le};

/// A decoded logic resource. `messages` is 1-based, index 0 is unused; a
/// `None` entry is a message slot with a zero pointer in the file.
/// `mask_messages` records whether the message text area was (and will be
/// again) Avis Durgan obfuscated, the layout used whenever a logic is
/// stored uncompressed.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicResource {
    pub bytecode: Vec<u8>,
    pub messages: Vec<Option<Vec<u8>>>,
    pub mask_messages: bool,
    pub vol_number: u8,
}

/// Decode a logic resource from its (already decompressed) bytes.
/// Truncation at any step reports a problem tag, never panics.
pub fn unpack_logic(
    data: &[u8],
    mask_messages: bool,
    vol_number: u8,
) -> Result<LogicResource, ResourceProblem> {
    let bytecode_len = u16_le(data, 0).ok_or(ResourceProblem::Truncated)? as usize;
    if 2 + bytecode_len > data.len() {
        warn!(
            "logic bytecode length {} exceeds resource size {}",
            bytecode_len,
            data.len()
        );
        return Err(ResourceProblem::Truncated);
    }
    let bytecode = data[2..2 + bytecode_len].to_vec();

    let count_pos = 2 + bytecode_len;
    if count_pos >= data.len() {
        return Err(ResourceProblem::Truncated);
    }
    let message_count = data[count_pos] as usize;
    let block_size = u16_le(data, count_pos + 1).ok_or(ResourceProblem::Truncated)? as usize;
    let block_start = count_pos + 3;
    if block_start + block_size > data.len() || message_count * 2 > block_size {
        return Err(ResourceProblem::Truncated);
    }
    let mut block = data[block_start..block_start + block_size].to_vec();

    // The string area after the pointer table is obfuscated in the
    // uncompressed layout.
    if mask_messages {
        avis_durgan(&mut block[message_count * 2..]);
    }

    let mut messages: Vec<Option<Vec<u8>>> = vec![None; message_count + 1];
    for i in 1..=message_count {
        let pointer = u16_le(&block, (i - 1) * 2).ok_or(ResourceProblem::Truncated)? as usize;
        if pointer == 0 {
            continue;
        }
        if pointer >= block.len() {
            return Err(ResourceProblem::Truncated);
        }
        let text = match block[pointer..].iter().position(|&b| b == 0) {
            Some(end) => block[pointer..pointer + end].to_vec(),
            None => block[pointer..].to_vec(),
        };
        messages[i] = Some(text);
    }

    Ok(LogicResource {
        bytecode,
        messages,
        mask_messages,
        vol_number,
    })
}

/// Encode a logic resource back to its raw byte layout.
pub fn pack_logic(logic: &LogicResource) -> Vec<u8> {
    let message_count = logic.messages.len().saturating_sub(1);

    let mut pointers = vec![0u16; message_count];
    let mut strings: Vec<u8> = Vec::new();
    for i in 1..=message_count {
        if let Some(text) = &logic.messages[i] {
            pointers[i - 1] = (message_count * 2 + strings.len()) as u16;
            strings.extend_from_slice(text);
            strings.push(0);
        }
    }
    if logic.mask_messages {
        avis_durgan(&mut strings);
    }

    let block_size = message_count * 2 + strings.len();
    let mut out = Vec::with_capacity(2 + logic.bytecode.len() + 3 + block_size);
    push_u16_le(&mut out, logic.bytecode.len() as u16);
    out.extend_from_slice(&logic.bytecode);
    out.push(message_count as u8);
    push_u16_le(&mut out, block_size as u16);
    for pointer in pointers {
        push_u16_le(&mut out, pointer);
    }
    out.extend_from_slice(&strings);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(mask_messages: bool) -> LogicResource {
        LogicResource {
            bytecode: vec![0x0c, 0x00, 0x16, 0x01, 0x00],
            messages: vec![
                None,
                Some(b"You can't go that way.".to_vec()),
                None,
                Some(b"".to_vec()),
                Some(b"It is pitch black.".to_vec()),
            ],
            mask_messages,
            vol_number: 0,
        }
    }

    #[test]
    fn round_trip_plain() {
        let logic = sample(false);
        assert_eq!(unpack_logic(&pack_logic(&logic), false, 0), Ok(logic));
    }

    #[test]
    fn round_trip_masked() {
        let logic = sample(true);
        let packed = pack_logic(&logic);
        assert_eq!(unpack_logic(&packed, true, 0), Ok(logic.clone()));
        // The masked text must not appear in the clear.
        let needle = b"pitch black";
        assert!(!packed.windows(needle.len()).any(|w| w == needle));
    }

    #[test]
    fn byte_round_trip() {
        let packed = pack_logic(&sample(true));
        let reparsed = unpack_logic(&packed, true, 0).unwrap();
        assert_eq!(pack_logic(&reparsed), packed);
    }

    #[test]
    fn zero_length_bytecode_and_no_messages() {
        let logic = LogicResource {
            bytecode: Vec::new(),
            messages: vec![None],
            mask_messages: false,
            vol_number: 3,
        };
        let packed = pack_logic(&logic);
        assert_eq!(unpack_logic(&packed, false, 3), Ok(logic));
    }

    #[test]
    fn truncation_is_reported() {
        let packed = pack_logic(&sample(false));
        assert_eq!(
            unpack_logic(&packed[..3], false, 0),
            Err(ResourceProblem::Truncated)
        );
        assert_eq!(
            unpack_logic(&packed[..packed.len() - 4], false, 0),
            Err(ResourceProblem::Truncated)
        );
        assert_eq!(unpack_logic(&[], false, 0), Err(ResourceProblem::Truncated));
    }
}
