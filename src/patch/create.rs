//! Patch creation: compare two decoded projects and emit a patch document
//! plus the shared byte pool its diff strings reference.

use indexmap::IndexMap;
use log::info;

use crate::diff::diff_bytes;
use crate::patch::container::{
    CelDiff, LogicDiff, LoopDiff, ObjectDiff, PatchContainer, PatchObject, RawDiff, ViewDiff,
    FORMAT_VERSION, PATCH_TYPE,
};
use crate::patch::digest::project_digest;
use crate::patch::diffstr::{full_dump_string, ops_to_diff_string};
use crate::project::{Project, RawResource, ResourceSlots};
use crate::view::Cel;

/// The result of [`create_patch`]: the JSON-serializable container and the
/// concatenated byte pool every diff string indexes into.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedPatch {
    pub container: PatchContainer,
    pub pool: Vec<u8>,
}

fn diff_field(source: &[u8], target: &[u8], pool: &mut Vec<u8>) -> String {
    ops_to_diff_string(&diff_bytes(source, target), source, pool)
}

fn present<T>(slots: &ResourceSlots<T>, index: usize) -> Option<&T> {
    slots
        .get(index)
        .and_then(|slot| slot.as_ref())
        .and_then(|state| state.present())
}

/// Copy a cel's pixels onto a canvas of the given geometry, filled with the
/// cel's transparency color. Both patch creation and application run this
/// before diffing, so geometry changes do not inflate the delta.
pub(crate) fn recanvas(cel: &Cel, width: u8, height: u8) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let (sw, sh) = (cel.width as usize, cel.height as usize);
    let mut canvas = vec![cel.transparency_color; w * h];
    let cols = w.min(sw);
    for row in 0..h.min(sh) {
        canvas[row * w..row * w + cols].copy_from_slice(&cel.pixel_data[row * sw..row * sw + cols]);
    }
    canvas
}

fn diff_slots<T: PartialEq, D>(
    src: &ResourceSlots<T>,
    dst: &ResourceSlots<T>,
    pool: &mut Vec<u8>,
    mut make: impl FnMut(Option<&T>, &T, &mut Vec<u8>) -> D,
) -> Option<IndexMap<u32, Option<D>>> {
    let mut map = IndexMap::new();
    for index in 0..src.len().max(dst.len()) {
        let source = present(src, index);
        let target = present(dst, index);
        match (source, target) {
            (None, None) => {}
            (Some(_), None) => {
                map.insert(index as u32, None);
            }
            (source, Some(target)) => {
                if source == Some(target) {
                    continue;
                }
                map.insert(index as u32, Some(make(source, target, pool)));
            }
        }
    }
    if map.is_empty() {
        None
    } else {
        Some(map)
    }
}

fn words_diff(src: &Project, dst: &Project) -> Option<IndexMap<String, Option<u16>>> {
    let mut map = IndexMap::new();
    let mut added: Vec<(&String, u16)> = dst.words.words.iter().map(|(w, id)| (w, *id)).collect();
    added.sort();
    for (word, id) in added {
        if src.words.words.get(word) != Some(&id) {
            map.insert(word.clone(), Some(id));
        }
    }
    let mut removed: Vec<&String> = src
        .words
        .words
        .keys()
        .filter(|word| !dst.words.words.contains_key(*word))
        .collect();
    removed.sort();
    for word in removed {
        map.insert(word.clone(), None);
    }
    if map.is_empty() {
        None
    } else {
        Some(map)
    }
}

fn cel_diff(source: Option<&Cel>, target: &Cel, pool: &mut Vec<u8>) -> CelDiff {
    let canvas = match source {
        Some(cel) => recanvas(cel, target.width, target.height),
        None => Vec::new(),
    };
    CelDiff {
        width: (source.map(|c| c.width) != Some(target.width)).then_some(target.width),
        height: (source.map(|c| c.height) != Some(target.height)).then_some(target.height),
        transparency_color: (source.map(|c| c.transparency_color)
            != Some(target.transparency_color))
        .then_some(target.transparency_color),
        pixels: diff_field(&canvas, &target.pixel_data, pool),
    }
}

fn raw_diff(source: Option<&RawResource>, target: &RawResource, pool: &mut Vec<u8>) -> RawDiff {
    let data = if source.map(|r| &r.data) != Some(&target.data) {
        Some(match source {
            Some(from) => diff_field(&from.data, &target.data, pool),
            None => full_dump_string(&target.data, pool),
        })
    } else {
        None
    };
    RawDiff {
        data,
        was_compressed: (source.map(|r| r.was_compressed) != Some(target.was_compressed))
            .then_some(target.was_compressed),
        vol_number: (source.map(|r| r.vol_number) != Some(target.vol_number))
            .then_some(target.vol_number),
    }
}

fn objects_diff(
    src: &Project,
    dst: &Project,
    pool: &mut Vec<u8>,
) -> Option<IndexMap<u32, Option<ObjectDiff>>> {
    let mut map = IndexMap::new();
    let src_objects = &src.objects.objects;
    let dst_objects = &dst.objects.objects;
    for index in 0..src_objects.len().max(dst_objects.len()) {
        let source = src_objects.get(index);
        let target = dst_objects.get(index);
        match (source, target) {
            (None, None) => {}
            (Some(_), None) => {
                map.insert(index as u32, None);
            }
            (source, Some(target)) => {
                if source == Some(target) {
                    continue;
                }
                let name = if source.map(|o| &o.name) != Some(&target.name) {
                    Some(diff_field(
                        source.map(|o| o.name.as_slice()).unwrap_or(&[]),
                        &target.name,
                        pool,
                    ))
                } else {
                    None
                };
                let starting_room = (source.map(|o| o.starting_room)
                    != Some(target.starting_room))
                .then_some(target.starting_room);
                map.insert(index as u32, Some(ObjectDiff { name, starting_room }));
            }
        }
    }
    if map.is_empty() {
        None
    } else {
        Some(map)
    }
}

/// Build a patch transforming `src` into `dst`.
pub fn create_patch(src: &Project, dst: &Project) -> CreatedPatch {
    let mut pool = Vec::new();

    let logic = diff_slots(&src.logic, &dst.logic, &mut pool, |source, target, pool| {
        let source_bytecode = source.map(|l| l.bytecode.as_slice()).unwrap_or(&[]);
        let bytecode = (source.map(|l| &l.bytecode) != Some(&target.bytecode))
            .then(|| diff_field(source_bytecode, &target.bytecode, pool));

        let mut messages = IndexMap::new();
        let source_count = source.map(|l| l.messages.len()).unwrap_or(0);
        for index in 1..source_count.max(target.messages.len()) {
            let from = source
                .and_then(|l| l.messages.get(index))
                .and_then(|m| m.as_ref());
            let to = target.messages.get(index).and_then(|m| m.as_ref());
            match (from, to) {
                (None, None) => {}
                (Some(_), None) => {
                    messages.insert(index as u32, None);
                }
                (from, Some(text)) => {
                    if from.map(|t| t.as_slice()) == Some(text.as_slice()) {
                        continue;
                    }
                    let diff = diff_field(
                        from.map(|t| t.as_slice()).unwrap_or(&[]),
                        text,
                        pool,
                    );
                    messages.insert(index as u32, Some(diff));
                }
            }
        }

        LogicDiff {
            bytecode,
            messages: if messages.is_empty() { None } else { Some(messages) },
            mask_messages: (source.map(|l| l.mask_messages) != Some(target.mask_messages))
                .then_some(target.mask_messages),
            vol_number: (source.map(|l| l.vol_number) != Some(target.vol_number))
                .then_some(target.vol_number),
        }
    });

    let pictures = diff_slots(&src.pictures, &dst.pictures, &mut pool, raw_diff);
    let sounds = diff_slots(&src.sounds, &dst.sounds, &mut pool, raw_diff);

    let views = diff_slots(&src.views, &dst.views, &mut pool, |source, target, pool| {
        let description = if source.and_then(|v| v.description.as_ref()) != target.description.as_ref()
        {
            Some(target.description.as_ref().map(|text| {
                diff_field(
                    source
                        .and_then(|v| v.description.as_deref())
                        .unwrap_or(&[]),
                    text,
                    pool,
                )
            }))
        } else {
            None
        };

        let source_loops = source.map(|v| v.loops.as_slice()).unwrap_or(&[]);
        let mut loops = IndexMap::new();
        for index in 0..source_loops.len().max(target.loops.len()) {
            let from = source_loops.get(index);
            let to = target.loops.get(index);
            match (from, to) {
                (None, None) => {}
                (Some(_), None) => {
                    loops.insert(index as u32, None);
                }
                (from, Some(to)) => {
                    if from == Some(to) {
                        continue;
                    }
                    let from_cels = from.map(|l| l.cels.as_slice()).unwrap_or(&[]);
                    let mut cels = IndexMap::new();
                    for cel_index in 0..from_cels.len().max(to.cels.len()) {
                        let from_cel = from_cels.get(cel_index);
                        let to_cel = to.cels.get(cel_index);
                        match (from_cel, to_cel) {
                            (None, None) => {}
                            (Some(_), None) => {
                                cels.insert(cel_index as u32, None);
                            }
                            (from_cel, Some(to_cel)) => {
                                if from_cel == Some(to_cel) {
                                    continue;
                                }
                                cels.insert(
                                    cel_index as u32,
                                    Some(cel_diff(from_cel, to_cel, pool)),
                                );
                            }
                        }
                    }
                    loops.insert(index as u32, Some(LoopDiff { cels }));
                }
            }
        }

        ViewDiff {
            signature: (source.map(|v| v.signature) != Some(target.signature))
                .then_some(target.signature),
            description,
            loops: if loops.is_empty() { None } else { Some(loops) },
            vol_number: (source.map(|v| v.vol_number) != Some(target.vol_number))
                .then_some(target.vol_number),
        }
    });

    let objects = objects_diff(src, dst, &mut pool);
    let words = words_diff(src, dst);

    let patch = PatchObject {
        hash_original: project_digest(src),
        hash_patched: project_digest(dst),
        words,
        logic,
        pictures,
        sounds,
        views,
        objects,
    };
    info!(
        "created patch {} -> {} ({} pool bytes)",
        patch.hash_original,
        patch.hash_patched,
        pool.len()
    );

    CreatedPatch {
        container: PatchContainer {
            format_version: FORMAT_VERSION,
            patch_type: PATCH_TYPE.to_string(),
            patches: vec![patch],
        },
        pool,
    }
}
