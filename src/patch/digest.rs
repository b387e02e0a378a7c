//! Structural fingerprint of a decoded project.
//!
//! Only decoded semantic content is hashed: indices, shape integers and raw
//! bytes, in a fixed section order, with sentinels between entries. Fields
//! that record physical storage choices (volume numbers, compression and
//! masking flags, record lengths, packing mode, the words-file tail) are
//! left out, so the digest is invariant to how the project was stored.
//! Absent and invalid slots are skipped.

use crate::murmur::MurmurHash3;
use crate::project::Project;

const SENTINEL: [u8; 4] = [0xff; 4];

fn add_u32(hash: &mut MurmurHash3, value: u32) {
    hash.add(&value.to_le_bytes());
}

/// Compute the project digest as 8 lowercase hex digits.
pub fn project_digest(project: &Project) -> String {
    let mut hash = MurmurHash3::new(0);

    // Section order: logic, objects, pictures, sounds, views, words.
    for (index, slot) in project.logic.iter().enumerate() {
        let Some(logic) = slot.as_ref().and_then(|state| state.present()) else {
            continue;
        };
        add_u32(&mut hash, index as u32);
        add_u32(&mut hash, logic.bytecode.len() as u32);
        hash.add(&logic.bytecode);
        for (message_index, message) in logic.messages.iter().enumerate().skip(1) {
            if let Some(text) = message {
                add_u32(&mut hash, message_index as u32);
                add_u32(&mut hash, text.len() as u32);
                hash.add(text);
            }
        }
        hash.add(&SENTINEL);
    }
    hash.add(&SENTINEL);

    for (index, object) in project.objects.objects.iter().enumerate() {
        add_u32(&mut hash, index as u32);
        add_u32(&mut hash, object.starting_room as u32);
        add_u32(&mut hash, object.name.len() as u32);
        hash.add(&object.name);
        hash.add(&SENTINEL);
    }
    hash.add(&SENTINEL);

    for slots in [&project.pictures, &project.sounds] {
        for (index, slot) in slots.iter().enumerate() {
            let Some(raw) = slot.as_ref().and_then(|state| state.present()) else {
                continue;
            };
            add_u32(&mut hash, index as u32);
            add_u32(&mut hash, raw.data.len() as u32);
            hash.add(&raw.data);
            hash.add(&SENTINEL);
        }
        hash.add(&SENTINEL);
    }

    for (index, slot) in project.views.iter().enumerate() {
        let Some(view) = slot.as_ref().and_then(|state| state.present()) else {
            continue;
        };
        add_u32(&mut hash, index as u32);
        add_u32(&mut hash, view.signature as u32);
        match &view.description {
            Some(text) => {
                add_u32(&mut hash, 1);
                add_u32(&mut hash, text.len() as u32);
                hash.add(text);
            }
            None => add_u32(&mut hash, 0),
        }
        add_u32(&mut hash, view.loops.len() as u32);
        for view_loop in &view.loops {
            add_u32(&mut hash, view_loop.cels.len() as u32);
            for cel in &view_loop.cels {
                add_u32(&mut hash, cel.width as u32);
                add_u32(&mut hash, cel.height as u32);
                add_u32(&mut hash, cel.transparency_color as u32);
                hash.add(&cel.pixel_data);
            }
        }
        hash.add(&SENTINEL);
    }
    hash.add(&SENTINEL);

    // Words in sorted order, independent of map insertion history.
    let mut words: Vec<(&String, u16)> = project
        .words
        .words
        .iter()
        .map(|(word, id)| (word, *id))
        .collect();
    words.sort();
    for (word, id) in words {
        add_u32(&mut hash, word.len() as u32);
        hash.add(word.as_bytes());
        add_u32(&mut hash, id as u32);
        hash.add(&SENTINEL);
    }
    hash.add(&SENTINEL);

    hash.hex_digest()
}
