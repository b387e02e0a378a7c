//! The decoded form of one game's resource bundle, and the conversions
//! between it and the raw directory/volume files.

use std::collections::BTreeMap;
use std::fmt;

use log::{debug, info, warn};

use crate::filestore::FileStore;
use crate::logic::{pack_logic, unpack_logic, LogicResource};
use crate::objects::{pack_objects, unpack_objects, ObjectsFile};
use crate::util::u16_le;
use crate::view::{pack_view, unpack_view, ViewResource};
use crate::volume::{
    build_directory, parse_directory, read_entry, write_entry, DirEntry, EntryCompression,
    VolumeCache,
};
use crate::words::{pack_words, unpack_words, WordsFile};

/// Why a resource failed to decode. Structural decode failures are data,
/// not errors: the slot is kept, tagged, and can be re-encoded verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceProblem {
    MissingContainer,
    Truncated,
    InvalidSignature,
    VolNumberMismatch,
    CompressionError,
    UnknownSignature,
    PixelDataExceedsRow,
}

impl fmt::Display for ResourceProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            ResourceProblem::MissingContainer => "missing-container",
            ResourceProblem::Truncated => "truncated",
            ResourceProblem::InvalidSignature => "invalid-signature",
            ResourceProblem::VolNumberMismatch => "vol-number-mismatch",
            ResourceProblem::CompressionError => "compression-error",
            ResourceProblem::UnknownSignature => "unknown-signature",
            ResourceProblem::PixelDataExceedsRow => "pixel-data-exceeds-row",
        };
        write!(f, "{}", tag)
    }
}

/// A resource that could not be decoded, with enough raw context to be
/// preserved across an encode round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidResource {
    pub problem: ResourceProblem,
    pub vol_number: u8,
    pub offset: u32,
    /// The raw entry bytes as captured from the volume (empty when the
    /// container itself was missing).
    pub data: Vec<u8>,
}

/// One occupied resource slot: decoded, or carried as an invalid marker.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceState<T> {
    Present(T),
    Invalid(InvalidResource),
}

impl<T> ResourceState<T> {
    pub fn present(&self) -> Option<&T> {
        match self {
            ResourceState::Present(value) => Some(value),
            ResourceState::Invalid(_) => None,
        }
    }
}

/// A sparse, 0-indexed resource array. A `None` slot means "no resource N";
/// gaps are legal.
pub type ResourceSlots<T> = Vec<Option<ResourceState<T>>>;

/// A picture or sound resource: carried as opaque bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResource {
    pub data: Vec<u8>,
    pub was_compressed: bool,
    pub vol_number: u8,
}

/// How the directories were stored on disk.
#[derive(Debug, Clone, PartialEq)]
pub enum PackedDirs {
    /// Four separate directory files (logdir, picdir, viewdir, snddir).
    Separate,
    /// One packed directory file with four section offsets.
    Packed {
        basename: String,
        prefix: String,
        suppress_vol_prefix: bool,
    },
}

impl PackedDirs {
    pub fn is_packed(&self) -> bool {
        matches!(self, PackedDirs::Packed { .. })
    }

    fn vol_prefix(&self) -> &str {
        match self {
            PackedDirs::Packed {
                prefix,
                suppress_vol_prefix: false,
                ..
            } => prefix,
            _ => "",
        }
    }
}

/// The decoded form of one game's resource bundle: an immutable value
/// snapshot produced by [`decode_project`] and consumed by the patch layer
/// and [`encode_project`].
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub words: WordsFile,
    pub objects: ObjectsFile,
    pub packed_dirs: PackedDirs,
    pub logic: ResourceSlots<LogicResource>,
    pub pictures: ResourceSlots<RawResource>,
    pub sounds: ResourceSlots<RawResource>,
    pub views: ResourceSlots<ViewResource>,
}

const SEPARATE_DIR_NAMES: [&str; 4] = ["logdir", "picdir", "viewdir", "snddir"];

fn load_slots<T>(
    cache: &mut VolumeCache<'_>,
    entries: &[Option<DirEntry>],
    packed: bool,
    mut decode: impl FnMut(crate::volume::VolumeEntry, u8, u32) -> ResourceState<T>,
) -> ResourceSlots<T> {
    entries
        .iter()
        .map(|slot| {
            let entry = (*slot)?;
            let vol_data = match cache.get(entry.vol) {
                Some(data) => data,
                None => {
                    return Some(ResourceState::Invalid(InvalidResource {
                        problem: ResourceProblem::MissingContainer,
                        vol_number: entry.vol,
                        offset: entry.offset,
                        data: Vec::new(),
                    }))
                }
            };
            match read_entry(vol_data, entry.offset as usize, entry.vol, packed) {
                Ok(volume_entry) => Some(decode(volume_entry, entry.vol, entry.offset)),
                Err((problem, raw)) => Some(ResourceState::Invalid(InvalidResource {
                    problem,
                    vol_number: entry.vol,
                    offset: entry.offset,
                    data: raw,
                })),
            }
        })
        .collect()
}

/// Decode a whole project from a file store. Individual corrupt resources
/// become invalid markers; only a missing directory layout is an error.
pub fn decode_project(store: &dyn FileStore) -> Result<Project, String> {
    let words = match store.read("words.tok") {
        Some(data) => unpack_words(&data),
        None => {
            warn!("words.tok not found, starting with an empty dictionary");
            WordsFile::default()
        }
    };
    let objects = match store.read("object") {
        Some(data) => unpack_objects(&data),
        None => {
            warn!("object file not found, starting with an empty table");
            ObjectsFile::default()
        }
    };

    let names: Vec<String> = store
        .names()
        .iter()
        .map(|name| name.to_ascii_lowercase())
        .collect();
    let has = |name: &str| names.iter().any(|n| n == name);

    let (packed_dirs, dirs) = if SEPARATE_DIR_NAMES.iter().all(|&name| has(name)) {
        let mut dirs = Vec::with_capacity(4);
        for name in SEPARATE_DIR_NAMES {
            let data = store
                .read(name)
                .ok_or_else(|| format!("directory file {} disappeared during load", name))?;
            dirs.push(parse_directory(&data));
        }
        (PackedDirs::Separate, dirs)
    } else if let Some(basename) = names
        .iter()
        .find(|name| name.ends_with("dir") && !SEPARATE_DIR_NAMES.contains(&name.as_str()))
    {
        let data = store
            .read(basename)
            .ok_or_else(|| format!("directory file {} disappeared during load", basename))?;
        if data.len() < 8 {
            return Err(format!("packed directory file {} is too short", basename));
        }
        let prefix = basename[..basename.len() - 3].to_string();
        let suppress_vol_prefix =
            !names.iter().any(|n| n.starts_with(&format!("{}vol.", prefix)));

        // Sections appear in header order; an empty section shares its
        // successor's offset.
        let offsets: Vec<usize> = (0..4)
            .map(|i| u16_le(&data, i * 2).unwrap() as usize)
            .collect();
        let mut dirs = Vec::with_capacity(4);
        for i in 0..4 {
            let start = offsets[i].min(data.len());
            let end = if i + 1 < 4 {
                offsets[i + 1].clamp(start, data.len())
            } else {
                data.len()
            };
            dirs.push(parse_directory(&data[start..end]));
        }
        (
            PackedDirs::Packed {
                basename: basename.clone(),
                prefix,
                suppress_vol_prefix,
            },
            dirs,
        )
    } else {
        return Err("no AGI directory files found".to_string());
    };

    let packed = packed_dirs.is_packed();
    let mut cache = VolumeCache::new(store, packed_dirs.vol_prefix());
    let mut dirs = dirs.into_iter();
    let logic_entries = dirs.next().unwrap();
    let picture_entries = dirs.next().unwrap();
    let view_entries = dirs.next().unwrap();
    let sound_entries = dirs.next().unwrap();

    let logic = load_slots(&mut cache, &logic_entries, packed, |entry, vol, offset| {
        // Message text is obfuscated whenever the logic is stored
        // uncompressed, which is always the case in legacy volumes.
        let mask = !packed || entry.compression == EntryCompression::Stored;
        match unpack_logic(&entry.data, mask, vol) {
            Ok(resource) => ResourceState::Present(resource),
            Err(problem) => ResourceState::Invalid(InvalidResource {
                problem,
                vol_number: vol,
                offset,
                data: entry.data,
            }),
        }
    });
    let pictures = load_slots(&mut cache, &picture_entries, packed, |entry, vol, _| {
        ResourceState::Present(RawResource {
            data: entry.data,
            was_compressed: entry.compression != EntryCompression::Stored,
            vol_number: vol,
        })
    });
    let views = load_slots(&mut cache, &view_entries, packed, |entry, vol, offset| {
        match unpack_view(&entry.data, vol) {
            Ok(resource) => ResourceState::Present(resource),
            Err(problem) => ResourceState::Invalid(InvalidResource {
                problem,
                vol_number: vol,
                offset,
                data: entry.data,
            }),
        }
    });
    let sounds = load_slots(&mut cache, &sound_entries, packed, |entry, vol, _| {
        ResourceState::Present(RawResource {
            data: entry.data,
            was_compressed: entry.compression != EntryCompression::Stored,
            vol_number: vol,
        })
    });

    info!(
        "decoded project: {} words, {} objects, {} logic, {} pictures, {} sounds, {} views",
        words.words.len(),
        objects.objects.len(),
        logic.iter().flatten().count(),
        pictures.iter().flatten().count(),
        sounds.iter().flatten().count(),
        views.iter().flatten().count(),
    );

    Ok(Project {
        words,
        objects,
        packed_dirs,
        logic,
        pictures,
        sounds,
        views,
    })
}

fn encode_slots<T>(
    volumes: &mut BTreeMap<u8, Vec<u8>>,
    slots: &[Option<ResourceState<T>>],
    packed: bool,
    mut encode: impl FnMut(&T) -> Result<(Vec<u8>, EntryCompression, u8), String>,
) -> Result<Vec<Option<DirEntry>>, String> {
    let mut dir = Vec::with_capacity(slots.len());
    for slot in slots {
        match slot {
            None => dir.push(None),
            Some(ResourceState::Invalid(invalid)) => {
                if invalid.data.is_empty() {
                    warn!(
                        "dropping invalid resource ({}) with no raw bytes to carry",
                        invalid.problem
                    );
                    dir.push(None);
                } else {
                    // Re-emit the captured entry verbatim, header included.
                    let vol_buf = volumes.entry(invalid.vol_number).or_default();
                    let offset = vol_buf.len() as u32;
                    vol_buf.extend_from_slice(&invalid.data);
                    dir.push(Some(DirEntry {
                        vol: invalid.vol_number,
                        offset,
                    }));
                }
            }
            Some(ResourceState::Present(resource)) => {
                let (data, compression, vol) = encode(resource)?;
                let vol_buf = volumes.entry(vol).or_default();
                let offset = vol_buf.len() as u32;
                write_entry(vol_buf, &data, vol, packed, compression)?;
                dir.push(Some(DirEntry { vol, offset }));
            }
        }
    }
    Ok(dir)
}

/// Encode a project back to raw directory and volume files.
pub fn encode_project(project: &Project, store: &mut dyn FileStore) -> Result<(), String> {
    store.write("words.tok", pack_words(&project.words)?)?;
    store.write("object", pack_objects(&project.objects))?;

    let packed = project.packed_dirs.is_packed();
    let mut volumes: BTreeMap<u8, Vec<u8>> = BTreeMap::new();

    let logic_dir = encode_slots(&mut volumes, &project.logic, packed, |logic| {
        let compression = if logic.mask_messages {
            EntryCompression::Stored
        } else {
            EntryCompression::Lzw
        };
        Ok((pack_logic(logic), compression, logic.vol_number))
    })?;
    let picture_dir = encode_slots(&mut volumes, &project.pictures, packed, |raw| {
        let compression = if raw.was_compressed {
            EntryCompression::Pic
        } else {
            EntryCompression::Stored
        };
        Ok((raw.data.clone(), compression, raw.vol_number))
    })?;
    let view_dir = encode_slots(&mut volumes, &project.views, packed, |view| {
        Ok((pack_view(view)?, EntryCompression::Lzw, view.vol_number))
    })?;
    let sound_dir = encode_slots(&mut volumes, &project.sounds, packed, |raw| {
        let compression = if raw.was_compressed {
            EntryCompression::Lzw
        } else {
            EntryCompression::Stored
        };
        Ok((raw.data.clone(), compression, raw.vol_number))
    })?;

    match &project.packed_dirs {
        PackedDirs::Separate => {
            store.write("logdir", build_directory(&logic_dir)?)?;
            store.write("picdir", build_directory(&picture_dir)?)?;
            store.write("viewdir", build_directory(&view_dir)?)?;
            store.write("snddir", build_directory(&sound_dir)?)?;
        }
        PackedDirs::Packed { basename, .. } => {
            let sections = [
                build_directory(&logic_dir)?,
                build_directory(&picture_dir)?,
                build_directory(&view_dir)?,
                build_directory(&sound_dir)?,
            ];
            let mut data = vec![0u8; 8];
            for (i, section) in sections.iter().enumerate() {
                let offset = data.len();
                if offset > 0xffff {
                    return Err("packed directory file too big".to_string());
                }
                data[i * 2] = (offset & 0xff) as u8;
                data[i * 2 + 1] = (offset >> 8) as u8;
                data.extend_from_slice(section);
            }
            store.write(basename, data)?;
        }
    }

    let prefix = project.packed_dirs.vol_prefix();
    for (vol, data) in volumes {
        let name = format!("{}vol.{}", prefix, vol);
        debug!("writing {} ({} bytes)", name, data.len());
        store.write(&name, data)?;
    }
    Ok(())
}
