//! Patch application: reconstruct a target project from a source project,
//! a patch container, and its byte pool, then verify the result's digest.

use indexmap::IndexMap;
use log::{debug, info};

use crate::logic::LogicResource;
use crate::objects::ObjectInfo;
use crate::patch::container::{
    LogicDiff, ObjectDiff, PatchContainer, PatchObject, RawDiff, ViewDiff, FORMAT_VERSION,
    PATCH_TYPE,
};
use crate::patch::create::recanvas;
use crate::patch::digest::project_digest;
use crate::patch::diffstr::apply_diff_string;
use crate::patch::PatchError;
use crate::project::{Project, RawResource, ResourceSlots, ResourceState};
use crate::view::{Cel, ViewLoop, ViewResource};

fn existing<T>(slots: &ResourceSlots<T>, index: usize) -> Option<&T> {
    slots
        .get(index)
        .and_then(|slot| slot.as_ref())
        .and_then(|state| state.present())
}

fn ensure_len<T>(slots: &mut Vec<Option<T>>, len: usize) {
    if slots.len() < len {
        slots.resize_with(len, || None);
    }
}

/// Drop trailing `None` entries, then require the rest to be dense.
fn trim_and_check<T>(mut list: Vec<Option<T>>) -> Result<Vec<T>, PatchError> {
    while matches!(list.last(), Some(None)) {
        list.pop();
    }
    list.into_iter()
        .map(|slot| slot.ok_or(PatchError::IndexGaps))
        .collect()
}

fn trim_trailing<T>(slots: &mut Vec<Option<T>>) {
    while matches!(slots.last(), Some(None)) {
        slots.pop();
    }
}

fn apply_logic(
    slots: &mut ResourceSlots<LogicResource>,
    changes: &IndexMap<u32, Option<LogicDiff>>,
    pool: &[u8],
) -> Result<(), PatchError> {
    for (&index, change) in changes {
        let index = index as usize;
        ensure_len(slots, index + 1);
        let change = match change {
            None => {
                slots[index] = None;
                continue;
            }
            Some(change) => change,
        };
        let current = existing(slots, index);

        let bytecode = match &change.bytecode {
            Some(diff) => apply_diff_string(
                current.map(|l| l.bytecode.as_slice()).unwrap_or(&[]),
                pool,
                diff,
            )?,
            None => current.map(|l| l.bytecode.clone()).unwrap_or_default(),
        };

        let mut messages = current.map(|l| l.messages.clone()).unwrap_or_else(|| vec![None]);
        if let Some(message_changes) = &change.messages {
            for (&message_index, message_change) in message_changes {
                let message_index = message_index as usize;
                if messages.len() <= message_index {
                    messages.resize(message_index + 1, None);
                }
                match message_change {
                    None => messages[message_index] = None,
                    Some(diff) => {
                        let base = current
                            .and_then(|l| l.messages.get(message_index))
                            .and_then(|m| m.as_deref())
                            .unwrap_or(&[]);
                        messages[message_index] = Some(apply_diff_string(base, pool, diff)?);
                    }
                }
            }
            // Deleted trailing messages shrink the table; slot 0 stays.
            while messages.len() > 1 && messages.last() == Some(&None) {
                messages.pop();
            }
        }

        let resource = LogicResource {
            bytecode,
            messages,
            mask_messages: change
                .mask_messages
                .or_else(|| current.map(|l| l.mask_messages))
                .unwrap_or(false),
            vol_number: change
                .vol_number
                .or_else(|| current.map(|l| l.vol_number))
                .unwrap_or(0),
        };
        slots[index] = Some(ResourceState::Present(resource));
    }
    trim_trailing(slots);
    Ok(())
}

fn apply_raw(
    slots: &mut ResourceSlots<RawResource>,
    changes: &IndexMap<u32, Option<RawDiff>>,
    pool: &[u8],
) -> Result<(), PatchError> {
    for (&index, change) in changes {
        let index = index as usize;
        ensure_len(slots, index + 1);
        let change = match change {
            None => {
                slots[index] = None;
                continue;
            }
            Some(change) => change,
        };
        let current = existing(slots, index);
        let data = match &change.data {
            Some(diff) => apply_diff_string(
                current.map(|r| r.data.as_slice()).unwrap_or(&[]),
                pool,
                diff,
            )?,
            None => current.map(|r| r.data.clone()).unwrap_or_default(),
        };
        let resource = RawResource {
            data,
            was_compressed: change
                .was_compressed
                .or_else(|| current.map(|r| r.was_compressed))
                .unwrap_or(false),
            vol_number: change
                .vol_number
                .or_else(|| current.map(|r| r.vol_number))
                .unwrap_or(0),
        };
        slots[index] = Some(ResourceState::Present(resource));
    }
    trim_trailing(slots);
    Ok(())
}

fn apply_views(
    slots: &mut ResourceSlots<ViewResource>,
    changes: &IndexMap<u32, Option<ViewDiff>>,
    pool: &[u8],
) -> Result<(), PatchError> {
    for (&index, change) in changes {
        let index = index as usize;
        ensure_len(slots, index + 1);
        let change = match change {
            None => {
                slots[index] = None;
                continue;
            }
            Some(change) => change,
        };
        let current = existing(slots, index);

        let description = match &change.description {
            None => current.and_then(|v| v.description.clone()),
            Some(None) => None,
            Some(Some(diff)) => Some(apply_diff_string(
                current.and_then(|v| v.description.as_deref()).unwrap_or(&[]),
                pool,
                diff,
            )?),
        };

        let mut loops: Vec<Option<ViewLoop>> = current
            .map(|v| v.loops.iter().cloned().map(Some).collect())
            .unwrap_or_default();
        if let Some(loop_changes) = &change.loops {
            for (&loop_index, loop_change) in loop_changes {
                let loop_index = loop_index as usize;
                ensure_len(&mut loops, loop_index + 1);
                let loop_change = match loop_change {
                    None => {
                        loops[loop_index] = None;
                        continue;
                    }
                    Some(loop_change) => loop_change,
                };
                let current_loop = current.and_then(|v| v.loops.get(loop_index));
                let mut cels: Vec<Option<Cel>> = current_loop
                    .map(|l| l.cels.iter().cloned().map(Some).collect())
                    .unwrap_or_default();
                for (&cel_index, cel_change) in &loop_change.cels {
                    let cel_index = cel_index as usize;
                    ensure_len(&mut cels, cel_index + 1);
                    let cel_change = match cel_change {
                        None => {
                            cels[cel_index] = None;
                            continue;
                        }
                        Some(cel_change) => cel_change,
                    };
                    let current_cel = current_loop.and_then(|l| l.cels.get(cel_index));
                    let width = cel_change
                        .width
                        .or_else(|| current_cel.map(|c| c.width))
                        .unwrap_or(0);
                    let height = cel_change
                        .height
                        .or_else(|| current_cel.map(|c| c.height))
                        .unwrap_or(0);
                    let transparency_color = cel_change
                        .transparency_color
                        .or_else(|| current_cel.map(|c| c.transparency_color))
                        .unwrap_or(0);
                    let canvas = match current_cel {
                        Some(cel) => recanvas(cel, width, height),
                        None => Vec::new(),
                    };
                    let pixel_data = apply_diff_string(&canvas, pool, &cel_change.pixels)?;
                    cels[cel_index] = Some(Cel {
                        width,
                        height,
                        transparency_color,
                        pixel_data,
                    });
                }
                loops[loop_index] = Some(ViewLoop {
                    cels: trim_and_check(cels)?,
                });
            }
        }

        let resource = ViewResource {
            signature: change
                .signature
                .or_else(|| current.map(|v| v.signature))
                .unwrap_or(0x0101),
            description,
            loops: trim_and_check(loops)?,
            vol_number: change
                .vol_number
                .or_else(|| current.map(|v| v.vol_number))
                .unwrap_or(0),
        };
        slots[index] = Some(ResourceState::Present(resource));
    }
    trim_trailing(slots);
    Ok(())
}

fn apply_objects(
    project: &mut Project,
    changes: &IndexMap<u32, Option<ObjectDiff>>,
    pool: &[u8],
) -> Result<(), PatchError> {
    let mut list: Vec<Option<ObjectInfo>> = project
        .objects
        .objects
        .iter()
        .cloned()
        .map(Some)
        .collect();
    for (&index, change) in changes {
        let index = index as usize;
        ensure_len(&mut list, index + 1);
        let change = match change {
            None => {
                list[index] = None;
                continue;
            }
            Some(change) => change,
        };
        let current = project.objects.objects.get(index);
        let name = match &change.name {
            Some(diff) => apply_diff_string(
                current.map(|o| o.name.as_slice()).unwrap_or(&[]),
                pool,
                diff,
            )?,
            None => current.map(|o| o.name.clone()).unwrap_or_default(),
        };
        let starting_room = change
            .starting_room
            .or_else(|| current.map(|o| o.starting_room))
            .unwrap_or(0);
        list[index] = Some(ObjectInfo {
            name,
            starting_room,
        });
    }
    project.objects.objects = trim_and_check(list)?;
    Ok(())
}

/// Find the patch object matching `digest`, if any.
fn matching_patch<'a>(container: &'a PatchContainer, digest: &str) -> Option<&'a PatchObject> {
    container
        .patches
        .iter()
        .find(|patch| patch.hash_original == digest)
}

/// Apply a patch container to a source project, producing the
/// reconstructed target. The recomputed digest must equal `hashPatched`;
/// that check is the sole correctness gate.
pub fn apply_patch(
    src: &Project,
    container: &PatchContainer,
    pool: &[u8],
) -> Result<Project, PatchError> {
    if container.format_version != FORMAT_VERSION {
        return Err(PatchError::BadPatch(format!(
            "unsupported format version {}",
            container.format_version
        )));
    }
    if container.patch_type != PATCH_TYPE {
        return Err(PatchError::BadPatch(format!(
            "unsupported patch type {:?}",
            container.patch_type
        )));
    }

    let digest = project_digest(src);
    let patch = matching_patch(container, &digest).ok_or(PatchError::NoMatchingPatch)?;
    debug!("applying patch {} -> {}", patch.hash_original, patch.hash_patched);

    let mut out = src.clone();

    if let Some(word_changes) = &patch.words {
        for (word, change) in word_changes {
            match change {
                Some(id) => {
                    out.words.words.insert(word.clone(), *id);
                }
                None => {
                    out.words.words.shift_remove(word);
                }
            }
        }
    }
    if let Some(changes) = &patch.logic {
        apply_logic(&mut out.logic, changes, pool)?;
    }
    if let Some(changes) = &patch.pictures {
        apply_raw(&mut out.pictures, changes, pool)?;
    }
    if let Some(changes) = &patch.sounds {
        apply_raw(&mut out.sounds, changes, pool)?;
    }
    if let Some(changes) = &patch.views {
        apply_views(&mut out.views, changes, pool)?;
    }
    if let Some(changes) = &patch.objects {
        apply_objects(&mut out, changes, pool)?;
    }

    let actual = project_digest(&out);
    if actual != patch.hash_patched {
        return Err(PatchError::HashMismatch {
            expected: patch.hash_patched.clone(),
            actual,
        });
    }
    info!("patch applied, digest {}", actual);
    Ok(out)
}
