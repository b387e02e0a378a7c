//! The diff-string micro-bytecode: whitespace-separated ASCII tokens of a
//! symbol and a hex number.
//!
//! `@N` sets the byte-pool cursor, `-N` skips source bytes, `=N` copies
//! source bytes, `+N` copies pool bytes, `~N` copies source bytes XORed
//! with pool bytes (both cursors advance). Reading past the end of either
//! the source or the pool is fatal.

use crate::diff::DiffOp;
use crate::patch::PatchError;

/// Translate an edit script into diff-string tokens, appending literal and
/// XOR payloads to the shared pool. Emission order is significant: pool
/// offsets are positional, so the `@` cursor is emitted once, before the
/// first pool-consuming token.
pub fn ops_to_diff_string(ops: &[DiffOp], source: &[u8], pool: &mut Vec<u8>) -> String {
    let mut out = String::new();
    let mut source_pos = 0usize;
    let mut cursor_emitted = false;

    let mut push_token = |out: &mut String, symbol: char, value: usize| {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push(symbol);
        out.push_str(&format!("{:x}", value));
    };

    for op in ops {
        match op {
            DiffOp::Same { count } => {
                push_token(&mut out, '=', *count);
                source_pos += count;
            }
            DiffOp::Delete { count } => {
                push_token(&mut out, '-', *count);
                source_pos += count;
            }
            DiffOp::Insert { bytes } => {
                if !cursor_emitted {
                    push_token(&mut out, '@', pool.len());
                    cursor_emitted = true;
                }
                push_token(&mut out, '+', bytes.len());
                pool.extend_from_slice(bytes);
            }
            DiffOp::Replace { bytes } => {
                if !cursor_emitted {
                    push_token(&mut out, '@', pool.len());
                    cursor_emitted = true;
                }
                push_token(&mut out, '~', bytes.len());
                for (i, byte) in bytes.iter().enumerate() {
                    pool.push(source[source_pos + i] ^ byte);
                }
                source_pos += bytes.len();
            }
        }
    }
    out
}

/// Emit a whole buffer as a single pool copy (`@start +len`).
pub fn full_dump_string(bytes: &[u8], pool: &mut Vec<u8>) -> String {
    let out = format!("@{:x} +{:x}", pool.len(), bytes.len());
    pool.extend_from_slice(bytes);
    out
}

/// Apply a diff string to a source buffer against the byte pool.
pub fn apply_diff_string(source: &[u8], pool: &[u8], diff: &str) -> Result<Vec<u8>, PatchError> {
    let bytes = diff.as_bytes();
    let mut out = Vec::new();
    let mut source_pos = 0usize;
    let mut cursor = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }
        let symbol = bytes[i];
        i += 1;

        let digits_start = i;
        let mut value = 0usize;
        while i < bytes.len() && bytes[i].is_ascii_hexdigit() {
            let digit = (bytes[i] as char).to_digit(16).unwrap() as usize;
            value = value
                .checked_mul(16)
                .and_then(|v| v.checked_add(digit))
                .ok_or_else(|| PatchError::BadPatch("diff-string number overflow".to_string()))?;
            i += 1;
        }
        if i == digits_start {
            return Err(PatchError::BadPatch(format!(
                "expected hex number after '{}'",
                symbol as char
            )));
        }

        match symbol {
            b'@' => cursor = value,
            b'-' => {
                if source_pos + value > source.len() {
                    return Err(PatchError::ReadPastEnd);
                }
                source_pos += value;
            }
            b'=' => {
                if source_pos + value > source.len() {
                    return Err(PatchError::ReadPastEnd);
                }
                out.extend_from_slice(&source[source_pos..source_pos + value]);
                source_pos += value;
            }
            b'+' => {
                if cursor + value > pool.len() {
                    return Err(PatchError::ReadPastEnd);
                }
                out.extend_from_slice(&pool[cursor..cursor + value]);
                cursor += value;
            }
            b'~' => {
                if source_pos + value > source.len() || cursor + value > pool.len() {
                    return Err(PatchError::ReadPastEnd);
                }
                for j in 0..value {
                    out.push(source[source_pos + j] ^ pool[cursor + j]);
                }
                source_pos += value;
                cursor += value;
            }
            _ => {
                return Err(PatchError::BadPatch(format!(
                    "unknown token symbol '{}'",
                    symbol as char
                )))
            }
        }
    }
    Ok(out)
}
