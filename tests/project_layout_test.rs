//! Whole-project encode/decode through an in-memory store, in both the
//! separate-directory and packed-directory layouts, plus digest stability
//! across physical layouts and corrupt-resource handling.

use std::cell::RefCell;
use std::collections::HashMap;

use agipatch::filestore::{FileStore, MemStore};
use agipatch::logic::LogicResource;
use agipatch::objects::{ObjectInfo, ObjectsFile};
use agipatch::patch::project_digest;
use agipatch::project::{
    decode_project, encode_project, PackedDirs, Project, RawResource, ResourceProblem,
    ResourceState,
};
use agipatch::view::{Cel, ViewLoop, ViewResource};
use agipatch::words::WordsFile;
use indexmap::IndexMap;
use test_log::test;

fn slot<T>(value: T) -> Option<ResourceState<T>> {
    Some(ResourceState::Present(value))
}

/// A semantically fixed project; `packed` selects the physical layout and
/// the storage flags that go with it.
fn sample_project(packed: bool) -> Project {
    let mut words = IndexMap::new();
    words.insert("close".to_string(), 2u16);
    words.insert("look".to_string(), 4);
    words.insert("open".to_string(), 1);

    // Repetitive payloads so the packed layout genuinely compresses; the
    // compression choice must not be visible in the digest.
    let bytecode: Vec<u8> = b"\x0c\x00\x16\x01".iter().cycle().copied().take(400).collect();
    let sound: Vec<u8> = b"\x08\x09\x0a".iter().cycle().copied().take(300).collect();
    let picture = vec![
        0xf0, 0x01, 0x10, 0x11, 0x12, 0xf2, 0x03, 0x21, 0x22, 0xf0, 0x02, 0x31, 0x32, 0x33,
        0xf2, 0x01, 0x41, 0xff,
    ];

    Project {
        words: WordsFile { words, suffix: None },
        objects: ObjectsFile {
            objects: vec![
                ObjectInfo { name: b"?".to_vec(), starting_room: 0 },
                ObjectInfo { name: b"magic chicken".to_vec(), starting_room: 17 },
            ],
            masked: true,
            record_len: 3,
            suppress_final_terminator: false,
        },
        packed_dirs: if packed {
            PackedDirs::Packed {
                basename: "kqdir".to_string(),
                prefix: "kq".to_string(),
                suppress_vol_prefix: false,
            }
        } else {
            PackedDirs::Separate
        },
        logic: vec![
            slot(LogicResource {
                bytecode,
                messages: vec![None, Some(b"You open the door.".to_vec())],
                // Uncompressed logic keeps its messages masked, so the flag
                // follows the layout.
                mask_messages: !packed,
                vol_number: 0,
            }),
            None,
        ],
        pictures: vec![slot(RawResource {
            data: picture,
            was_compressed: packed,
            vol_number: 0,
        })],
        sounds: vec![
            None,
            slot(RawResource {
                data: sound,
                was_compressed: packed,
                vol_number: 1,
            }),
        ],
        views: vec![slot(ViewResource {
            signature: 0x0102,
            description: Some(b"A chicken.".to_vec()),
            loops: vec![
                ViewLoop {
                    cels: vec![Cel {
                        width: 3,
                        height: 2,
                        transparency_color: 0,
                        pixel_data: vec![1, 2, 3, 4, 5, 6],
                    }],
                },
                ViewLoop {
                    cels: vec![Cel {
                        width: 3,
                        height: 2,
                        transparency_color: 0,
                        pixel_data: vec![3, 2, 1, 6, 5, 4],
                    }],
                },
            ],
            vol_number: 0,
        })],
    }
}

#[test]
fn separate_layout_round_trips() {
    let project = sample_project(false);
    let mut store = MemStore::new();
    encode_project(&project, &mut store).unwrap();

    let names = store.names();
    for expected in ["logdir", "picdir", "viewdir", "snddir", "object", "words.tok", "vol.0", "vol.1"] {
        assert!(names.contains(&expected.to_string()), "missing {}", expected);
    }

    let decoded = decode_project(&store).unwrap();
    assert_eq!(decoded, project);
}

#[test]
fn packed_layout_round_trips() {
    let project = sample_project(true);
    let mut store = MemStore::new();
    encode_project(&project, &mut store).unwrap();

    let names = store.names();
    assert!(names.contains(&"kqdir".to_string()));
    assert!(names.contains(&"kqvol.0".to_string()));
    assert!(names.contains(&"kqvol.1".to_string()));
    assert!(!names.contains(&"logdir".to_string()));

    let decoded = decode_project(&store).unwrap();
    assert_eq!(decoded, project);
}

#[test]
fn digest_ignores_physical_layout() {
    // Same semantic content, different storage: separate+uncompressed vs
    // packed+compressed, different volume assignment.
    let separate = sample_project(false);
    let mut packed = sample_project(true);
    if let Some(ResourceState::Present(logic)) = packed.logic[0].as_mut() {
        logic.vol_number = 2;
    }
    assert_eq!(project_digest(&separate), project_digest(&packed));
}

#[test]
fn digest_reflects_semantic_changes() {
    let project = sample_project(false);
    let base = project_digest(&project);

    let mut changed = project.clone();
    changed.words.words.insert("pull".to_string(), 9);
    assert_ne!(project_digest(&changed), base);

    let mut changed = project.clone();
    if let Some(ResourceState::Present(logic)) = changed.logic[0].as_mut() {
        logic.bytecode[0] ^= 1;
    }
    assert_ne!(project_digest(&changed), base);

    let mut changed = project.clone();
    changed.objects.objects[1].starting_room = 18;
    assert_ne!(project_digest(&changed), base);

    // Moving a resource to a different index changes the digest too.
    let mut changed = project.clone();
    changed.pictures.insert(0, None);
    assert_ne!(project_digest(&changed), base);
}

#[test]
fn digest_skips_invalid_and_absent_slots() {
    let project = sample_project(false);
    let base = project_digest(&project);

    let mut with_invalid = project.clone();
    with_invalid.sounds[0] = Some(ResourceState::Invalid(
        agipatch::project::InvalidResource {
            problem: ResourceProblem::Truncated,
            vol_number: 0,
            offset: 123,
            data: vec![1, 2, 3],
        },
    ));
    assert_eq!(project_digest(&with_invalid), base);
}

#[test]
fn corrupt_entry_becomes_invalid_marker() {
    let project = sample_project(false);
    let mut store = MemStore::new();
    encode_project(&project, &mut store).unwrap();

    // Smash the magic of the first entry in vol.0.
    let mut vol = store.read("vol.0").unwrap();
    vol[0] = 0x99;
    store.write("vol.0", vol).unwrap();

    let decoded = decode_project(&store).unwrap();
    match &decoded.logic[0] {
        Some(ResourceState::Invalid(invalid)) => {
            assert_eq!(invalid.problem, ResourceProblem::InvalidSignature);
            assert!(!invalid.data.is_empty());
        }
        other => panic!("expected invalid logic, got {:?}", other),
    }
    // The corruption does not spill into other resources.
    assert!(decoded.views[0].as_ref().unwrap().present().is_some());
    assert!(decoded.sounds[1].as_ref().unwrap().present().is_some());
}

#[test]
fn missing_volume_becomes_invalid_marker() {
    let project = sample_project(false);
    let mut store = MemStore::new();
    encode_project(&project, &mut store).unwrap();

    // Rebuild the store without vol.1 (which holds the sound).
    let mut broken = MemStore::new();
    for name in store.names() {
        if name != "vol.1" {
            broken.write(&name, store.read(&name).unwrap()).unwrap();
        }
    }

    let decoded = decode_project(&broken).unwrap();
    match &decoded.sounds[1] {
        Some(ResourceState::Invalid(invalid)) => {
            assert_eq!(invalid.problem, ResourceProblem::MissingContainer);
        }
        other => panic!("expected invalid sound, got {:?}", other),
    }
    assert!(decoded.logic[0].as_ref().unwrap().present().is_some());
}

/// Counts reads per name to observe volume memoization.
struct CountingStore {
    inner: MemStore,
    reads: RefCell<HashMap<String, usize>>,
}

impl FileStore for CountingStore {
    fn read(&self, name: &str) -> Option<Vec<u8>> {
        *self
            .reads
            .borrow_mut()
            .entry(name.to_ascii_lowercase())
            .or_insert(0) += 1;
        self.inner.read(name)
    }

    fn write(&mut self, name: &str, data: Vec<u8>) -> Result<(), String> {
        self.inner.write(name, data)
    }

    fn names(&self) -> Vec<String> {
        self.inner.names()
    }
}

#[test]
fn each_volume_is_loaded_once() {
    let mut project = sample_project(false);
    // Both the logic and the picture and the view live in vol.0.
    if let Some(ResourceState::Present(sound)) = project.sounds[1].as_mut() {
        sound.vol_number = 0;
    }
    let mut store = MemStore::new();
    encode_project(&project, &mut store).unwrap();

    let counting = CountingStore {
        inner: store,
        reads: RefCell::new(HashMap::new()),
    };
    decode_project(&counting).unwrap();
    assert_eq!(counting.reads.borrow().get("vol.0"), Some(&1));
}
