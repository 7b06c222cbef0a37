//! On-disk records and the JSON encoding of values and payloads.
//!
//! | Value | JSON |
//! |-------|------|
//! | null | `null` |
//! | Integer | `{"kd": "intv", "int": N}` |
//! | String | `{"kd": "strv", "str": "..."}` |
//! | Node | `{"kd": "nodv", "conid": I, "sons": [...]}` |
//! | Set | `{"kd": "setv", "elemids": [I, ...]}` |
//! | Item | `{"kd": "itrv", "id": I}` |
//!
//! Payloads are objects tagged by `payloadkind`; see the constants below.
//! Encoding takes a `keep` predicate telling which items are persisted:
//! references to other items become `null`, a node whose connective is not
//! kept becomes `null`, and sets drop such members.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json, json};

use crate::model::{ItemId, Payload, Value};

// ============================================================================
// Tags and field names
// ============================================================================

pub const KIND: &str = "kd";
pub const INT_TAG: &str = "intv";
pub const STR_TAG: &str = "strv";
pub const NODE_TAG: &str = "nodv";
pub const SET_TAG: &str = "setv";
pub const ITEM_TAG: &str = "itrv";

pub const INT_FIELD: &str = "int";
pub const STR_FIELD: &str = "str";
pub const CONNECTIVE_FIELD: &str = "conid";
pub const SONS_FIELD: &str = "sons";
pub const ELEMENTS_FIELD: &str = "elemids";
pub const ITEM_FIELD: &str = "id";

pub const PAYLOAD_KIND: &str = "payloadkind";
pub const VECTOR_TAG: &str = "vector";
pub const BUFFER_TAG: &str = "buffer";
pub const QUEUE_TAG: &str = "queue";
/// Spelled as the files have always spelled it.
pub const DICTIONARY_TAG: &str = "dictionnary";
pub const CLOSURE_TAG: &str = "closure";

pub const VECTOR_FIELD: &str = "payloadvector";
pub const BUFFER_LEN_FIELD: &str = "payloadbuflen";
pub const BUFFER_FIELD: &str = "payloadbuffer";
pub const QUEUE_FIELD: &str = "payloadqueue";
pub const DICTIONARY_LEN_FIELD: &str = "payloaddictlen";
pub const DICTIONARY_FIELD: &str = "payloaddictionnary";
pub const CLOSURE_FUN_FIELD: &str = "payloadclofun";
pub const CLOSURE_VALUES_FIELD: &str = "payloadcloval";

// ============================================================================
// Records
// ============================================================================

/// Top-level object of a data file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFile {
    pub version: String,
    pub itemcont: Vec<ItemRecord>,
}

/// One item of a data file. Values and payloads stay as raw JSON here; the
/// loader decodes them against the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub item: u64,
    #[serde(default)]
    pub itemattrs: Vec<AttrRecord>,
    #[serde(default)]
    pub itemcontent: Json,
    #[serde(default)]
    pub itempayload: Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttrRecord {
    pub atid: u64,
    pub val: Json,
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode a value, pruning every item `keep` rejects.
pub fn encode_value(value: &Value, keep: &dyn Fn(ItemId) -> bool) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Int(n) => json!({ KIND: INT_TAG, INT_FIELD: n }),
        Value::Str(s) => json!({ KIND: STR_TAG, STR_FIELD: s.as_ref() }),
        Value::Item(id) if keep(*id) => json!({ KIND: ITEM_TAG, ITEM_FIELD: id.0 }),
        Value::Item(_) => Json::Null,
        Value::Node(node) => {
            if !keep(node.connective()) {
                return Json::Null;
            }
            let sons: Vec<Json> = node.sons().iter().map(|s| encode_value(s, keep)).collect();
            json!({ KIND: NODE_TAG, CONNECTIVE_FIELD: node.connective().0, SONS_FIELD: sons })
        }
        Value::Set(set) => {
            let ids: Vec<u64> = set.iter().filter(|id| keep(*id)).map(|id| id.0).collect();
            json!({ KIND: SET_TAG, ELEMENTS_FIELD: ids })
        }
    }
}

/// Encode a payload; `None` encodes as `null`.
pub fn encode_payload(payload: &Payload, keep: &dyn Fn(ItemId) -> bool) -> Json {
    match payload {
        Payload::None => Json::Null,
        Payload::Vector(v) => json!({
            PAYLOAD_KIND: VECTOR_TAG,
            VECTOR_FIELD: encode_all(v.iter(), keep),
        }),
        Payload::Buffer(text) => {
            let lines: Vec<&str> = text.split('\n').collect();
            json!({
                PAYLOAD_KIND: BUFFER_TAG,
                BUFFER_LEN_FIELD: text.len(),
                BUFFER_FIELD: lines,
            })
        }
        Payload::Queue(q) => json!({
            PAYLOAD_KIND: QUEUE_TAG,
            QUEUE_FIELD: encode_all(q.iter(), keep),
        }),
        Payload::Dictionary(dict) => {
            let mut entries = Map::new();
            for (key, value) in dict.sorted_entries() {
                entries.insert(key.to_owned(), encode_value(value, keep));
            }
            json!({
                PAYLOAD_KIND: DICTIONARY_TAG,
                DICTIONARY_LEN_FIELD: dict.len(),
                DICTIONARY_FIELD: entries,
            })
        }
        Payload::Closure(clo) => json!({
            PAYLOAD_KIND: CLOSURE_TAG,
            CLOSURE_FUN_FIELD: clo.function().name(),
            CLOSURE_VALUES_FIELD: encode_all(clo.captures().iter(), keep),
        }),
    }
}

fn encode_all<'a>(values: impl Iterator<Item = &'a Value>, keep: &dyn Fn(ItemId) -> bool) -> Vec<Json> {
    values.map(|v| encode_value(v, keep)).collect()
}
