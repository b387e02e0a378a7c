//! The serde model of `patch.json`.
//!
//! One distributable patch may target several known source variants, so the
//! container holds a list of patch objects; the applier picks the first
//! whose `hashOriginal` matches. Diff maps are keyed by resource index and
//! a `null` value deletes the slot. Omitted scalar fields inherit from the
//! resource being patched.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const FORMAT_VERSION: u32 = 1;
pub const PATCH_TYPE: &str = "agi";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchContainer {
    #[serde(rename = "formatVersion")]
    pub format_version: u32,
    #[serde(rename = "type")]
    pub patch_type: String,
    pub patches: Vec<PatchObject>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PatchObject {
    #[serde(rename = "hashOriginal")]
    pub hash_original: String,
    #[serde(rename = "hashPatched")]
    pub hash_patched: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub words: Option<IndexMap<String, Option<u16>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logic: Option<IndexMap<u32, Option<LogicDiff>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pictures: Option<IndexMap<u32, Option<RawDiff>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sounds: Option<IndexMap<u32, Option<RawDiff>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub views: Option<IndexMap<u32, Option<ViewDiff>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objects: Option<IndexMap<u32, Option<ObjectDiff>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LogicDiff {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytecode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<IndexMap<u32, Option<String>>>,
    #[serde(
        rename = "maskMessages",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub mask_messages: Option<bool>,
    #[serde(rename = "vol", default, skip_serializing_if = "Option::is_none")]
    pub vol_number: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RawDiff {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(rename = "compressed", default, skip_serializing_if = "Option::is_none")]
    pub was_compressed: Option<bool>,
    #[serde(rename = "vol", default, skip_serializing_if = "Option::is_none")]
    pub vol_number: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ViewDiff {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<u16>,
    /// Absent: keep the existing description. `null`: remove it. A string:
    /// a diff against the existing description bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loops: Option<IndexMap<u32, Option<LoopDiff>>>,
    #[serde(rename = "vol", default, skip_serializing_if = "Option::is_none")]
    pub vol_number: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LoopDiff {
    pub cels: IndexMap<u32, Option<CelDiff>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CelDiff {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u8>,
    #[serde(
        rename = "transparency",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub transparency_color: Option<u8>,
    /// Diff against the source cel re-canvased to this cel's geometry.
    pub pixels: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ObjectDiff {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "room", default, skip_serializing_if = "Option::is_none")]
    pub starting_room: Option<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip() {
        let mut words = IndexMap::new();
        words.insert("look".to_string(), Some(4u16));
        words.insert("gone".to_string(), None);
        let container = PatchContainer {
            format_version: FORMAT_VERSION,
            patch_type: PATCH_TYPE.to_string(),
            patches: vec![PatchObject {
                hash_original: "00c0ffee".to_string(),
                hash_patched: "deadbeef".to_string(),
                words: Some(words),
                ..PatchObject::default()
            }],
        };
        let json = serde_json::to_string_pretty(&container).unwrap();
        let parsed: PatchContainer = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, container);
        // Deletions serialize as JSON null.
        assert!(json.contains("\"gone\": null"));
        // Empty sections stay out of the document entirely.
        assert!(!json.contains("\"logic\""));
    }

    #[test]
    fn integer_keys_become_json_object_keys() {
        let mut logic = IndexMap::new();
        logic.insert(
            3u32,
            Some(LogicDiff {
                bytecode: Some("=4".to_string()),
                ..LogicDiff::default()
            }),
        );
        let object = PatchObject {
            hash_original: "0".repeat(8),
            hash_patched: "0".repeat(8),
            logic: Some(logic),
            ..PatchObject::default()
        };
        let json = serde_json::to_string(&object).unwrap();
        assert!(json.contains("\"3\":"), "json: {}", json);
        let parsed: PatchObject = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, object);
    }
}
