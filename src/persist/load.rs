//! Load engine: manifest, then modules, then data files.
//!
//! Items are created by id on first reference (as a record, an attribute
//! key, or a value) and populated when their own record is read, so forward
//! references and cycles need no second pass. All of this happens in a
//! staging table owned by the [`Loader`]; the store only receives the items
//! once every file has been read. Every check that rejects the input reports
//! the source line it sits on, see [`Error::Format`].

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use hashbrown::{HashMap, HashSet};
use serde_json::{Map, Value as Json};

use super::codec::*;
use super::manifest::Manifest;
use super::{FORMAT_VERSION, LoadSummary};
use crate::closure::ClosureRegistry;
use crate::config::StoreConfig;
use crate::model::{Dataspace, Item, ItemId, Value, is_plain_name};
use crate::plugin::PluginHost;
use crate::store::Store;
use crate::{Error, Result};

/// `Error::Format` for the file being read, tagged with the line of the check.
macro_rules! format_error {
    ($loader:expr, $($arg:tt)+) => {
        Error::Format {
            path: $loader.path.clone(),
            line: line!(),
            message: format!($($arg)+),
        }
    };
}

/// Tables of one load. Dropped when the load ends, whatever the outcome.
pub struct Loader<'a> {
    store: &'a mut Store,
    config: &'a StoreConfig,
    dir: PathBuf,
    /// File being read, for error messages.
    path: PathBuf,
    space: Option<Dataspace>,
    /// Items decoded so far, placeholders included.
    staged: HashMap<ItemId, Item>,
    /// Ids whose record has been read.
    defined: HashSet<ItemId>,
    /// Ids mentioned anywhere.
    referenced: BTreeSet<ItemId>,
}

impl<'a> Loader<'a> {
    pub fn new(store: &'a mut Store, config: &'a StoreConfig, dir: &Path) -> Self {
        Self {
            store,
            config,
            dir: dir.to_path_buf(),
            path: dir.to_path_buf(),
            space: None,
            staged: HashMap::new(),
            defined: HashSet::new(),
            referenced: BTreeSet::new(),
        }
    }

    pub fn run(mut self, plugins: &mut PluginHost) -> Result<LoadSummary> {
        let manifest_path = self.config.manifest_path(&self.dir);
        let text = std::fs::read_to_string(&manifest_path).map_err(|e| Error::Config {
            path: manifest_path.clone(),
            message: format!("cannot read manifest: {e}"),
        })?;
        self.path = manifest_path.clone();
        let manifest = Manifest::parse(&manifest_path, &text)?;

        let mut summary = LoadSummary::default();
        for module in manifest.modules() {
            if plugins.is_loaded(module) {
                tracing::debug!(module = module, "module already resident");
            } else {
                plugins.load_module(module)?;
            }
            summary.modules.push(module.to_owned());
        }

        for space in manifest.data() {
            if !is_plain_name(space) {
                return Err(Error::Config {
                    path: manifest_path.clone(),
                    message: format!("invalid dataspace name {space:?}"),
                });
            }
            if space == self.store.transient().name() {
                return Err(Error::Config {
                    path: manifest_path.clone(),
                    message: format!("dataspace {space:?} is transient and cannot be loaded"),
                });
            }
            summary.items += self.load_data(space, plugins.closures())?;
            summary.dataspaces.push(space.to_owned());
        }

        let top = manifest.top();
        if let Some(top) = top {
            if !self.defined.contains(&top) {
                return Err(Error::Semantic(format!(
                    "top item #{top} is not defined by any data file"
                )));
            }
        }

        self.store.merge_loaded(std::mem::take(&mut self.staged))?;
        if let Some(top) = top {
            self.store.set_top(top)?;
            summary.top = Some(top);
        }

        summary.unresolved = self
            .referenced
            .iter()
            .copied()
            .filter(|id| self.store.item(*id).is_some_and(|item| item.dataspace().is_none()))
            .collect();
        for id in &summary.unresolved {
            tracing::warn!(item = %id, "item referenced but never defined");
        }

        tracing::info!(
            dir = %self.dir.display(),
            modules = summary.modules.len(),
            dataspaces = summary.dataspaces.len(),
            items = summary.items,
            unresolved = summary.unresolved.len(),
            "loaded store"
        );
        Ok(summary)
    }

    /// Read `<space>.<ext>`; returns the number of records.
    fn load_data(&mut self, space: &str, closures: &ClosureRegistry) -> Result<usize> {
        self.path = self.config.data_path(&self.dir, space);
        tracing::debug!(path = %self.path.display(), "reading data file");
        let text = std::fs::read_to_string(&self.path).map_err(|e| Error::Config {
            path: self.path.clone(),
            message: format!("cannot read data file: {e}"),
        })?;
        let data: DataFile =
            serde_json::from_str(&text).map_err(|e| format_error!(self, "malformed data file: {e}"))?;
        if data.version != FORMAT_VERSION {
            return Err(format_error!(
                self,
                "version {:?} but expected {FORMAT_VERSION:?}",
                data.version
            ));
        }

        self.space = Some(self.store.dataspace(space));
        let count = data.itemcont.len();
        for record in &data.itemcont {
            self.load_record(record, closures)?;
        }
        self.space = None;
        Ok(count)
    }

    fn load_record(&mut self, record: &ItemRecord, closures: &ClosureRegistry) -> Result<()> {
        let id = self.reference(record.item)?;
        tracing::trace!(item = %id, "loading item");

        let space = self.space.clone().ok_or_else(|| format_error!(self, "item #{id} outside a data file"))?;
        let in_store = self.store.item(id).and_then(|item| item.dataspace()).cloned();
        let assigned = match in_store {
            Some(existing) => Err(existing),
            None => self.staged_item(id).assign_dataspace(space.clone()),
        };
        if let Err(existing) = assigned {
            return Err(Error::Semantic(format!(
                "duplicate dataspace for item #{id}: in {existing}, read again from {space}"
            )));
        }
        self.defined.insert(id);

        for attr in &record.itemattrs {
            let key = self.reference(attr.atid)?;
            let value = self.decode_value(&attr.val)?;
            if value.is_null() {
                continue;
            }
            self.staged_item(id).put_attr(key, value);
        }

        let content = self.decode_value(&record.itemcontent)?;
        self.staged_item(id).set_content(content);

        self.decode_payload(id, &record.itempayload, closures)
    }

    /// Staged item of that id, or a bare placeholder created on first reference.
    fn staged_item(&mut self, id: ItemId) -> &mut Item {
        self.staged.entry(id).or_insert_with(|| Item::new(id))
    }

    /// Id of a referenced item, created as a placeholder if new.
    fn reference(&mut self, raw: u64) -> Result<ItemId> {
        if raw == 0 {
            return Err(format_error!(self, "non-positive item id"));
        }
        let id = ItemId(raw);
        if id > ItemId::MAX {
            return Err(format_error!(self, "item id {raw} exceeds {}", ItemId::MAX));
        }
        self.staged_item(id);
        self.referenced.insert(id);
        Ok(id)
    }

    fn reference_json(&mut self, json: &Json) -> Result<ItemId> {
        let raw = json.as_u64().ok_or_else(|| format_error!(self, "expected an item id, got {json}"))?;
        self.reference(raw)
    }

    fn field<'j>(&self, obj: &'j Map<String, Json>, key: &str) -> Result<&'j Json> {
        obj.get(key).ok_or_else(|| format_error!(self, "missing field {key:?}"))
    }

    fn array_field<'j>(&self, obj: &'j Map<String, Json>, key: &str) -> Result<&'j Vec<Json>> {
        self.field(obj, key)?
            .as_array()
            .ok_or_else(|| format_error!(self, "field {key:?} is not an array"))
    }

    fn decode_value(&mut self, json: &Json) -> Result<Value> {
        let obj = match json {
            Json::Null => return Ok(Value::Null),
            Json::Number(n) => {
                return n.as_i64().map(Value::Int).ok_or_else(|| format_error!(self, "integer out of range: {n}"));
            }
            Json::String(s) => return Ok(Value::string(s)),
            Json::Object(obj) => obj,
            other => return Err(format_error!(self, "unexpected value {other}")),
        };

        let kind = self
            .field(obj, KIND)?
            .as_str()
            .ok_or_else(|| format_error!(self, "value kind is not a string"))?;
        match kind {
            INT_TAG => self
                .field(obj, INT_FIELD)?
                .as_i64()
                .map(Value::Int)
                .ok_or_else(|| format_error!(self, "bad integer value")),
            STR_TAG => self
                .field(obj, STR_FIELD)?
                .as_str()
                .map(Value::string)
                .ok_or_else(|| format_error!(self, "bad string value")),
            ITEM_TAG => {
                let id = self.reference_json(self.field(obj, ITEM_FIELD)?)?;
                Ok(Value::Item(id))
            }
            NODE_TAG => {
                let conn = self.reference_json(self.field(obj, CONNECTIVE_FIELD)?)?;
                let sons = self
                    .array_field(obj, SONS_FIELD)?
                    .iter()
                    .map(|son| self.decode_value(son))
                    .collect::<Result<Vec<Value>>>()?;
                Ok(Value::node(conn, sons))
            }
            SET_TAG => {
                let members = self
                    .array_field(obj, ELEMENTS_FIELD)?
                    .iter()
                    .map(|elem| self.reference_json(elem))
                    .collect::<Result<Vec<ItemId>>>()?;
                Ok(Value::set(members))
            }
            other => Err(format_error!(self, "unknown value kind {other:?}")),
        }
    }

    fn decode_values(&mut self, values: &[Json]) -> Result<Vec<Value>> {
        values.iter().map(|v| self.decode_value(v)).collect()
    }

    fn decode_payload(&mut self, id: ItemId, json: &Json, closures: &ClosureRegistry) -> Result<()> {
        let obj = match json {
            Json::Null => {
                self.staged_item(id).clear_payload();
                return Ok(());
            }
            Json::Object(obj) => obj,
            other => return Err(format_error!(self, "item #{id}: payload is not an object: {other}")),
        };
        let kind = self
            .field(obj, PAYLOAD_KIND)?
            .as_str()
            .ok_or_else(|| format_error!(self, "item #{id}: payload kind is not a string"))?;

        match kind {
            VECTOR_TAG => {
                let values = self.decode_values(self.array_field(obj, VECTOR_FIELD)?)?;
                let item = self.staged_item(id);
                item.make_vector(values.len());
                for value in values {
                    item.vector_append(value)?;
                }
            }
            QUEUE_TAG => {
                let values = self.decode_values(self.array_field(obj, QUEUE_FIELD)?)?;
                let item = self.staged_item(id);
                item.make_queue();
                for value in values {
                    item.queue_append(value)?;
                }
            }
            BUFFER_TAG => {
                let len = self
                    .field(obj, BUFFER_LEN_FIELD)?
                    .as_u64()
                    .ok_or_else(|| format_error!(self, "item #{id}: bad buffer length"))?;
                let lines = self
                    .array_field(obj, BUFFER_FIELD)?
                    .iter()
                    .map(|line| line.as_str().ok_or_else(|| format_error!(self, "item #{id}: buffer line is not a string")))
                    .collect::<Result<Vec<&str>>>()?;
                let item = self.staged_item(id);
                item.make_buffer(usize::try_from(len).unwrap_or(0).saturating_add(2));
                item.append_buffer(&lines.join("\n"))?;
            }
            DICTIONARY_TAG => {
                let len = self
                    .field(obj, DICTIONARY_LEN_FIELD)?
                    .as_u64()
                    .and_then(|n| usize::try_from(n).ok())
                    .ok_or_else(|| format_error!(self, "item #{id}: bad dictionary length"))?;
                let entries = self
                    .field(obj, DICTIONARY_FIELD)?
                    .as_object()
                    .ok_or_else(|| format_error!(self, "item #{id}: dictionary entries are not an object"))?;
                let mut decoded = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let value = self.decode_value(value)?;
                    if !value.is_null() {
                        decoded.push((key.as_str(), value));
                    }
                }
                let item = self.staged_item(id);
                item.make_dictionary(len + len / 8 + 5);
                for (key, value) in decoded {
                    item.dictionary_put(key, value)?;
                }
            }
            CLOSURE_TAG => {
                let name = self
                    .field(obj, CLOSURE_FUN_FIELD)?
                    .as_str()
                    .ok_or_else(|| format_error!(self, "item #{id}: closure function name is not a string"))?;
                let fun = closures.find(name).ok_or_else(|| {
                    Error::Semantic(format!(
                        "item #{id}: closure function `{name}` is not registered by any loaded module"
                    ))
                })?;
                let raw = self.array_field(obj, CLOSURE_VALUES_FIELD)?;
                if raw.len() != fun.arity() {
                    return Err(format_error!(
                        self,
                        "item #{id}: closure `{name}` has {} captured values, its arity is {}",
                        raw.len(),
                        fun.arity()
                    ));
                }
                let captures = self.decode_values(raw)?;
                self.staged_item(id).make_closure(fun, captures);
            }
            other => return Err(format_error!(self, "item #{id}: unknown payload kind {other:?}")),
        }
        Ok(())
    }
}
