//! Dump engine: reachability scan from the top item, then emission.
//!
//! The scan is breadth-first. An item is *kept* when it exists and lives in
//! a persistent dataspace; items without a dataspace count as transient.
//! Transience is contagious through construction and absorbed at container
//! boundaries:
//!
//! - a node whose connective is not kept is not scanned and encodes as `null`
//! - a set drops members that are not kept
//! - an attribute whose key is not kept is neither scanned nor written, and
//!   one whose value encodes as `null` is not written
//!
//! Items are emitted in discovery order, attributes in ascending key order.

use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use hashbrown::HashSet;

use super::codec::{AttrRecord, DataFile, ItemRecord, encode_payload, encode_value};
use super::manifest::{Directive, Manifest};
use super::{DumpSummary, FORMAT_VERSION};
use crate::config::StoreConfig;
use crate::model::{Item, ItemId, Value};
use crate::plugin::PluginHost;
use crate::store::Store;
use crate::{Error, Result};

/// Scan state of one dump. Dropped when the dump ends, whatever the outcome.
pub struct Dumper<'a> {
    store: &'a Store,
    config: &'a StoreConfig,
    seen: HashSet<ItemId>,
    queue: VecDeque<ItemId>,
    order: Vec<ItemId>,
}

impl<'a> Dumper<'a> {
    pub fn new(store: &'a Store, config: &'a StoreConfig) -> Self {
        Self {
            store,
            config,
            seen: HashSet::new(),
            queue: VecDeque::new(),
            order: Vec::new(),
        }
    }

    /// Queue `id` for scanning. Returns true when the item is skipped, i.e. it
    /// is missing or not persistent. An item already queued is not skipped.
    fn enqueue(&mut self, id: ItemId) -> bool {
        if self.seen.contains(&id) {
            return false;
        }
        if !self.store.is_persistent(id) {
            return true;
        }
        self.seen.insert(id);
        self.queue.push_back(id);
        self.order.push(id);
        false
    }

    fn scan_value(&mut self, value: &Value) {
        match value {
            Value::Null | Value::Int(_) | Value::Str(_) => {}
            Value::Item(id) => {
                self.enqueue(*id);
            }
            Value::Node(node) => {
                if self.enqueue(node.connective()) {
                    return;
                }
                for son in node.sons() {
                    self.scan_value(son);
                }
            }
            Value::Set(set) => {
                for id in set.iter() {
                    self.enqueue(id);
                }
            }
        }
    }

    fn scan_item(&mut self, item: &Item) {
        self.scan_value(item.content());
        for key in item.sorted_attr_keys() {
            if self.enqueue(key) {
                continue;
            }
            if let Some(value) = item.get_attr(key) {
                self.scan_value(value);
            }
        }
        for value in item.payload().values() {
            self.scan_value(value);
        }
    }

    /// Scan everything reachable from `top`, in breadth-first order.
    pub fn scan(&mut self, top: ItemId) -> Result<&[ItemId]> {
        if self.enqueue(top) {
            return Err(Error::Semantic(format!("top item #{top} is missing or transient")));
        }
        let store = self.store;
        while let Some(id) = self.queue.pop_front() {
            let item = store.get(id)?;
            self.scan_item(item);
        }
        Ok(&self.order)
    }

    fn is_kept(&self, id: ItemId) -> bool {
        self.seen.contains(&id)
    }

    /// Record of a scanned item.
    pub fn encode_item(&self, item: &Item) -> ItemRecord {
        let keep = |id: ItemId| self.is_kept(id);
        let itemattrs = item
            .sorted_attr_keys()
            .into_iter()
            .filter(|key| keep(*key))
            .filter_map(|key| {
                let val = encode_value(item.get_attr(key)?, &keep);
                (!val.is_null()).then_some(AttrRecord { atid: key.0, val })
            })
            .collect();
        ItemRecord {
            item: item.id().0,
            itemattrs,
            itemcontent: encode_value(item.content(), &keep),
            itempayload: encode_payload(item.payload(), &keep),
        }
    }

    /// Scan, encode and write the state directory.
    pub fn run(mut self, plugins: &PluginHost, dir: &Path) -> Result<DumpSummary> {
        let top = self
            .store
            .top()
            .ok_or_else(|| Error::Semantic("cannot dump a store without a top item".into()))?;
        self.scan(top)?;

        let mut files: BTreeMap<String, Vec<ItemRecord>> = BTreeMap::new();
        for &id in &self.order {
            let item = self.store.get(id)?;
            let Some(space) = item.dataspace() else { continue };
            if !space.has_file_name() {
                return Err(Error::Semantic(format!(
                    "dataspace {space} of item #{id} cannot name a data file"
                )));
            }
            tracing::trace!(item = %id, dataspace = %space, "encoding item");
            files.entry(space.name().to_owned()).or_default().push(self.encode_item(item));
        }

        let mut manifest = Manifest::new();
        for module in plugins.modules() {
            manifest.directives.push(Directive::Module(module.name.clone()));
        }
        for space in files.keys() {
            manifest.directives.push(Directive::Data(space.clone()));
        }
        manifest.directives.push(Directive::TopDict(top));

        let mut outputs = Vec::with_capacity(files.len() + 1);
        for (space, records) in files.iter_mut() {
            let data = DataFile { version: FORMAT_VERSION.to_owned(), itemcont: std::mem::take(records) };
            let mut text = serde_json::to_string_pretty(&data)?;
            text.push('\n');
            outputs.push((self.config.data_path(dir, space), text));
        }
        outputs.push((self.config.manifest_path(dir), manifest.render()));

        create_state_dir(dir)?;
        write_all_or_nothing(&outputs)?;

        let summary = DumpSummary {
            items: self.order.len(),
            dataspaces: files.into_keys().collect(),
            top,
        };
        tracing::info!(
            dir = %dir.display(),
            items = summary.items,
            dataspaces = summary.dataspaces.len(),
            top = %top,
            "dumped store"
        );
        Ok(summary)
    }
}

/// Create the directory (and parents) if absent, owner-only on Unix.
fn create_state_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir).map_err(|e| Error::Config {
        path: dir.to_path_buf(),
        message: format!("cannot create dump directory: {e}"),
    })
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write every file to a temporary sibling, then rename them all into place.
/// On a write error the temporaries are removed and no target is touched; on
/// a rename error the temporaries not yet renamed are removed.
fn write_all_or_nothing(outputs: &[(PathBuf, String)]) -> Result<()> {
    let mut written: Vec<PathBuf> = Vec::with_capacity(outputs.len());
    for (path, text) in outputs {
        let tmp = temporary_path(path);
        if let Err(e) = fs::write(&tmp, text) {
            let _ = fs::remove_file(&tmp);
            for done in &written {
                let _ = fs::remove_file(done);
            }
            return Err(e.into());
        }
        written.push(tmp);
    }
    for (i, (tmp, (path, _))) in written.iter().zip(outputs).enumerate() {
        if let Err(e) = fs::rename(tmp, path) {
            for pending in &written[i..] {
                let _ = fs::remove_file(pending);
            }
            return Err(e.into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn scan_order(store: &Store, top: ItemId) -> Vec<ItemId> {
        let config = StoreConfig::default();
        let mut dumper = Dumper::new(store, &config);
        dumper.scan(top).unwrap().to_vec()
    }

    #[test]
    fn test_scan_is_breadth_first() {
        let mut store = Store::new();
        let a = store.make_item_in("s").unwrap();
        let b = store.make_item_in("s").unwrap();
        let c = store.make_item_in("s").unwrap();
        let d = store.make_item_in("s").unwrap();
        store.set_content(a, Value::item(b)).unwrap();
        store.put_attr(a, c, Value::int(1)).unwrap();
        store.set_content(b, Value::item(d)).unwrap();
        assert_eq!(scan_order(&store, a), vec![a, b, c, d]);
    }

    #[test]
    fn test_scan_terminates_on_cycles() {
        let mut store = Store::new();
        let a = store.make_item_in("s").unwrap();
        let b = store.make_item_in("s").unwrap();
        store.put_attr(a, a, Value::item(b)).unwrap();
        store.put_attr(b, a, Value::item(a)).unwrap();
        assert_eq!(scan_order(&store, a), vec![a, b]);
    }

    #[test]
    fn test_transient_items_not_scanned() {
        let mut store = Store::new();
        let scratch = store.transient().clone();
        let a = store.make_item_in("s").unwrap();
        let t = store.make_item(&scratch).unwrap();
        let hidden = store.make_item_in("s").unwrap();
        store.set_content(t, Value::item(hidden)).unwrap();
        store.put_attr(a, a, Value::item(t)).unwrap();
        store.put_attr(a, t, Value::item(hidden)).unwrap();
        assert_eq!(scan_order(&store, a), vec![a]);
    }

    #[test]
    fn test_node_sons_scanned_when_connective_seen() {
        let mut store = Store::new();
        let a = store.make_item_in("s").unwrap();
        let b = store.make_item_in("s").unwrap();
        store.set_content(a, Value::node(a, [Value::item(b)])).unwrap();
        assert_eq!(scan_order(&store, a), vec![a, b]);
    }

    #[test]
    fn test_transient_connective_hides_sons() {
        let mut store = Store::new();
        let scratch = store.transient().clone();
        let a = store.make_item_in("s").unwrap();
        let conn = store.make_item(&scratch).unwrap();
        let son = store.make_item_in("s").unwrap();
        store.set_content(a, Value::node(conn, [Value::item(son)])).unwrap();
        assert_eq!(scan_order(&store, a), vec![a]);
    }

    #[test]
    fn test_encode_item_elides_transient_attributes() {
        let mut store = Store::new();
        let scratch = store.transient().clone();
        let a = store.make_item_in("s").unwrap();
        let t = store.make_item(&scratch).unwrap();
        let k = store.make_item_in("s").unwrap();
        store.put_attr(a, t, Value::int(1)).unwrap();
        store.put_attr(a, k, Value::item(t)).unwrap();
        store.put_attr(a, a, Value::int(2)).unwrap();

        let config = StoreConfig::default();
        let mut dumper = Dumper::new(&store, &config);
        dumper.scan(a).unwrap();
        let record = dumper.encode_item(store.get(a).unwrap());
        assert_eq!(
            record.itemattrs,
            vec![AttrRecord { atid: a.0, val: json!({"kd": "intv", "int": 2}) }]
        );
    }

    #[test]
    fn test_dump_requires_persistent_top() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::new();
        let plugins = PluginHost::new(".");
        assert!(store.dump(dir.path(), &plugins).is_err());

        let scratch = store.transient().clone();
        let t = store.make_item(&scratch).unwrap();
        store.set_top(t).unwrap();
        let err = store.dump(dir.path(), &plugins).unwrap_err();
        assert!(err.to_string().contains("missing or transient"), "{err}");
    }

    #[test]
    fn test_unusable_dataspace_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::new();
        let a = store.make_item_in("../escape").unwrap();
        store.set_top(a).unwrap();
        let err = store.dump(dir.path(), &PluginHost::new(".")).unwrap_err();
        assert!(matches!(err, Error::Semantic(_)));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_failed_rename_removes_pending_temporaries() {
        let dir = tempfile::tempdir().unwrap();
        let blocked = dir.path().join("blocked");
        fs::create_dir(&blocked).unwrap();
        fs::write(blocked.join("occupant"), "x").unwrap();
        let outputs = vec![
            (dir.path().join("first"), "1".to_string()),
            (blocked.clone(), "2".to_string()),
            (dir.path().join("last"), "3".to_string()),
        ];

        assert!(write_all_or_nothing(&outputs).is_err());
        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["blocked".to_string(), "first".to_string()]);
        assert!(blocked.join("occupant").exists());
    }

    #[test]
    fn test_dump_leaves_no_temporaries() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("state");
        let mut store = Store::new();
        let a = store.make_item_in("s").unwrap();
        store.set_top(a).unwrap();
        let summary = store.dump(&target, &PluginHost::new(".")).unwrap();
        assert_eq!(summary.dataspaces, vec!["s".to_string()]);

        let mut names: Vec<String> = fs::read_dir(&target)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["MANIFEST".to_string(), "s.json".to_string()]);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&target).unwrap().permissions().mode();
            assert_eq!(mode & 0o077, 0);
        }
    }
}
