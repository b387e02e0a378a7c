//! Codec for the parser word dictionary (`words.tok`).
//!
//! Words are stored front-coded: each record holds the length of the prefix
//! shared with the previous word, the remaining suffix bytes (each stored as
//! `char ^ 0x7f`, with the high bit set on the last one), and a big-endian
//! u16 word id. A 26-entry per-letter offset index precedes the records.

use indexmap::IndexMap;
use log::warn;

/// Decoded word dictionary. `words` keeps file order (lexicographic in a
/// well-formed file). `suffix` preserves any trailing bytes that did not
/// decode as word records, so malformed or extended dictionaries re-encode
/// byte-exactly: `None` means the file ended with the usual single zero
/// byte, `Some` holds the verbatim tail (possibly empty).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WordsFile {
    pub words: IndexMap<String, u16>,
    pub suffix: Option<Vec<u8>>,
}

const LETTER_INDEX_SIZE: usize = 26 * 2;

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count()
}

/// Decode a `words.tok` buffer. Total: malformed records never fail, the
/// unparseable remainder is preserved in `suffix` instead.
pub fn unpack_words(data: &[u8]) -> WordsFile {
    let mut pos = LETTER_INDEX_SIZE;
    let mut words = IndexMap::new();
    if pos >= data.len() {
        return WordsFile { words, suffix: None };
    }
    let mut last_word = String::new();
    while pos < data.len() {
        if data[pos] == 0 && pos + 1 == data.len() {
            // Clean terminator.
            return WordsFile { words, suffix: None };
        }
        let start_pos = pos;
        let prefix_len = data[pos] as usize;
        if prefix_len > last_word.len() {
            warn!(
                "words.tok: prefix length {} exceeds previous word at offset {}, keeping tail verbatim",
                prefix_len, start_pos
            );
            return WordsFile {
                words,
                suffix: Some(data[start_pos..].to_vec()),
            };
        }
        pos += 1;
        let mut word = last_word[..prefix_len].to_string();
        loop {
            if pos >= data.len() {
                break;
            }
            let byte = data[pos];
            pos += 1;
            if pos >= data.len() {
                break;
            }
            word.push((((byte & 0x7f) ^ 0x7f)) as char);
            if byte & 0x80 != 0 {
                break;
            }
        }
        if pos + 2 > data.len() || word.as_str() < last_word.as_str() {
            return WordsFile {
                words,
                suffix: Some(data[start_pos..].to_vec()),
            };
        }
        let word_num = ((data[pos] as u16) << 8) | data[pos + 1] as u16;
        pos += 2;
        words.insert(word.clone(), word_num);
        last_word = word;
    }
    WordsFile {
        words,
        suffix: Some(Vec::new()),
    }
}

/// Encode a word dictionary. Words are sorted, front-coded against their
/// predecessor, and the per-letter index rebuilt from first occurrences.
pub fn pack_words(file: &WordsFile) -> Result<Vec<u8>, String> {
    let mut word_list: Vec<&str> = file.words.keys().map(|w| w.as_str()).collect();
    word_list.sort_unstable();

    for word in &word_list {
        if word.bytes().any(|b| b & 0x80 != 0) {
            return Err(format!(
                "word list must contain only ASCII-7 characters: {:?}",
                word
            ));
        }
    }

    let mut encoded: Vec<Vec<u8>> = Vec::with_capacity(word_list.len());
    for (i, word) in word_list.iter().enumerate() {
        let prefix_len = if i == 0 {
            0
        } else {
            common_prefix_len(word, word_list[i - 1]).min(255)
        };
        if prefix_len == word.len() {
            return Err(format!("word list must contain only unique words: {:?}", word));
        }
        let mut codes = vec![prefix_len as u8];
        for byte in word.bytes().skip(prefix_len) {
            codes.push(byte ^ 0x7f);
        }
        *codes.last_mut().unwrap() |= 0x80;
        let num = file.words[*word];
        codes.push((num >> 8) as u8);
        codes.push((num & 0xff) as u8);
        encoded.push(codes);
    }

    let suffix: &[u8] = match &file.suffix {
        Some(bytes) => bytes,
        None => &[0],
    };
    let record_bytes: usize = encoded.iter().map(|codes| codes.len()).sum();
    let mut bytes = vec![0u8; LETTER_INDEX_SIZE + record_bytes + suffix.len()];

    let mut pos = LETTER_INDEX_SIZE;
    let mut last_first_letter = 0u8;
    for (i, codes) in encoded.iter().enumerate() {
        bytes[pos..pos + codes.len()].copy_from_slice(codes);
        let first_letter = word_list[i].as_bytes().first().copied().unwrap_or(0);
        if first_letter != last_first_letter && first_letter.is_ascii_lowercase() {
            if pos > 0xffff {
                return Err("words file too big".to_string());
            }
            let letter_index = (first_letter - b'a') as usize;
            bytes[letter_index * 2] = (pos >> 8) as u8;
            bytes[letter_index * 2 + 1] = (pos & 0xff) as u8;
            last_first_letter = first_letter;
        }
        pos += codes.len();
    }
    bytes[pos..pos + suffix.len()].copy_from_slice(suffix);
    Ok(bytes)
}
