//! Edge cases: empty containers, manifest quirks, transient connectives,
//! malformed files and non-default layouts.

use std::path::Path;

use hashbrown::HashSet;
use itemgraph::closure::ClosureRegistry;
use itemgraph::{ClosureFn, Error, ItemId, PluginHost, Session, Store, StoreConfig, Value};
use pretty_assertions::assert_eq;
use serde_json::{Value as Json, json};

fn tick(_: &mut Store, _: ItemId) -> itemgraph::Result<()> {
    Ok(())
}

fn ticker_module(reg: &mut ClosureRegistry) -> itemgraph::Result<()> {
    reg.register(ClosureFn::action("tick", 0, tick))?;
    reg.register(ClosureFn::action("tick2", 2, tick))?;
    Ok(())
}

fn ticker_host(root: &Path) -> PluginHost {
    let mut host = PluginHost::new(root);
    host.register_builtin("ticker", ticker_module);
    host
}

fn read_json(path: &Path) -> Json {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

fn write_state(dir: &Path, manifest: &str, files: &[(&str, Json)]) {
    std::fs::write(dir.join("MANIFEST"), manifest).unwrap();
    for (space, data) in files {
        std::fs::write(dir.join(format!("{space}.json")), data.to_string()).unwrap();
    }
}

// ============================================================================
// Empty containers
// ============================================================================

#[test]
fn test_empty_containers_roundtrip() {
    let modules = tempfile::tempdir().unwrap();
    let mut plugins = ticker_host(modules.path());
    plugins.load_module("ticker").unwrap();
    let tick_fn = plugins.closures().find("tick").unwrap();

    let mut store = Store::new();
    let root = store.make_item_in("s").unwrap();
    let vector = store.make_item_in("s").unwrap();
    let queue = store.make_item_in("s").unwrap();
    let dict = store.make_item_in("s").unwrap();
    let clo = store.make_item_in("s").unwrap();
    let buffer = store.make_item_in("s").unwrap();
    for key in [vector, queue, dict, clo, buffer] {
        store.put_attr(root, key, Value::int(0)).unwrap();
    }
    store.get_mut(vector).unwrap().make_vector(0);
    store.get_mut(queue).unwrap().make_queue();
    store.get_mut(dict).unwrap().make_dictionary(0);
    store.get_mut(buffer).unwrap().make_buffer(0);
    store.make_closure(clo, tick_fn, []).unwrap();
    store.set_content(root, Value::set(Vec::<ItemId>::new())).unwrap();
    store.set_top(root).unwrap();

    let dir = tempfile::tempdir().unwrap();
    store.dump(dir.path(), &plugins).unwrap();

    let mut loaded = Store::new();
    loaded.load(dir.path(), &mut ticker_host(modules.path())).unwrap();
    for id in [root, vector, queue, dict, clo, buffer] {
        assert_eq!(loaded.get(id).unwrap(), store.get(id).unwrap(), "item #{id}");
    }
    assert_eq!(loaded.get(buffer).unwrap().buffer_str().unwrap(), "");
    assert_eq!(loaded.get(root).unwrap().content().as_set().unwrap().len(), 0);
}

// ============================================================================
// Manifest quirks
// ============================================================================

#[test]
fn test_manifest_comments_blank_and_unknown_lines() {
    let dir = tempfile::tempdir().unwrap();
    let data = json!({"version": "2011A", "itemcont": [
        {"item": 4, "itemattrs": [], "itemcontent": {"kd": "intv", "int": 4}, "itempayload": null}
    ]});
    write_state(
        dir.path(),
        "# written by hand\n\n   # indented comment\n\tDATA s\nCOLOR blue\n  TOPDICT 4\n",
        &[("s", data)],
    );
    let mut store = Store::new();
    let summary = store.load(dir.path(), &mut PluginHost::new(dir.path())).unwrap();
    assert_eq!(summary.dataspaces, vec!["s".to_string()]);
    assert_eq!(store.top(), Some(ItemId(4)));
    assert_eq!(store.content(ItemId(4)), Some(&Value::int(4)));
}

#[test]
fn test_manifest_without_data_loads_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write_state(dir.path(), "# empty\n", &[]);
    let mut store = Store::new();
    let summary = store.load(dir.path(), &mut PluginHost::new(dir.path())).unwrap();
    assert_eq!(summary.items, 0);
    assert_eq!(summary.top, None);
    assert!(store.is_empty());
}

// ============================================================================
// Transient connectives
// ============================================================================

#[test]
fn test_transient_connective_loads_as_null() {
    let modules = tempfile::tempdir().unwrap();
    let mut store = Store::new();
    let scratch = store.transient().clone();
    let root = store.make_item_in("s").unwrap();
    let conn = store.make_item(&scratch).unwrap();
    let kept = store.make_item_in("s").unwrap();
    let v = store.make_item_in("s").unwrap();

    store.set_content(root, Value::node(conn, [Value::item(kept)])).unwrap();
    store.put_attr(root, v, Value::int(1)).unwrap();
    let it = store.get_mut(v).unwrap();
    it.make_vector(2);
    it.vector_append(Value::node(conn, [Value::int(1)])).unwrap();
    it.vector_append(Value::set([root, conn, kept])).unwrap();
    store.set_top(root).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let summary = store.dump(dir.path(), &PluginHost::new(modules.path())).unwrap();
    // root, v, and `kept` through the set; never through the pruned node.
    assert_eq!(summary.items, 3);

    let mut loaded = Store::new();
    loaded.load(dir.path(), &mut PluginHost::new(modules.path())).unwrap();
    assert_eq!(loaded.content(root), None);
    let vector = loaded.get(v).unwrap().vector().unwrap().to_vec();
    assert_eq!(vector, vec![Value::Null, Value::set([root, kept])]);
    assert!(!loaded.contains(conn));
}

// ============================================================================
// Emission
// ============================================================================

#[test]
fn test_no_id_emitted_twice() {
    let modules = tempfile::tempdir().unwrap();
    let mut store = Store::new();
    let ids: Vec<ItemId> = (0..20).map(|i| store.make_item_in(if i % 2 == 0 { "even" } else { "odd" }).unwrap()).collect();
    for (i, &id) in ids.iter().enumerate() {
        let next = ids[(i + 1) % ids.len()];
        let skip = ids[(i + 7) % ids.len()];
        store.put_attr(id, next, Value::item(skip)).unwrap();
        store.set_content(id, Value::node(next, [Value::item(id), Value::set([skip, next])])).unwrap();
    }
    store.set_top(ids[0]).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let summary = store.dump(dir.path(), &PluginHost::new(modules.path())).unwrap();
    assert_eq!(summary.items, 20);

    let mut seen = HashSet::new();
    for space in ["even", "odd"] {
        let data = read_json(&dir.path().join(format!("{space}.json")));
        for record in data["itemcont"].as_array().unwrap() {
            assert!(seen.insert(record["item"].as_u64().unwrap()), "duplicate {record}");
        }
    }
    assert_eq!(seen.len(), 20);
}

#[test]
fn test_attributes_emitted_in_ascending_order() {
    let modules = tempfile::tempdir().unwrap();
    let mut store = Store::new();
    let root = store.make_item_in("s").unwrap();
    let keys: Vec<ItemId> = (0..6).map(|_| store.make_item_in("s").unwrap()).collect();
    for key in keys.iter().rev() {
        store.put_attr(root, *key, Value::int(key.0 as i64)).unwrap();
    }
    store.set_top(root).unwrap();

    let dir = tempfile::tempdir().unwrap();
    store.dump(dir.path(), &PluginHost::new(modules.path())).unwrap();
    let data = read_json(&dir.path().join("s.json"));
    let atids: Vec<u64> = data["itemcont"][0]["itemattrs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["atid"].as_u64().unwrap())
        .collect();
    assert_eq!(atids, keys.iter().map(|k| k.0).collect::<Vec<_>>());
}

#[test]
fn test_dump_load_dump_is_stable() {
    let modules = tempfile::tempdir().unwrap();
    let mut store = Store::new();
    let root = store.make_item_in("a").unwrap();
    let other = store.make_item_in("b").unwrap();
    store.put_attr(root, other, Value::node(root, [Value::string("x"), Value::item(other)])).unwrap();
    let it = store.get_mut(other).unwrap();
    it.make_dictionary(3);
    it.dictionary_put("z", Value::int(1)).unwrap();
    it.dictionary_put("a", Value::set([root, other])).unwrap();
    store.set_top(root).unwrap();

    let first = tempfile::tempdir().unwrap();
    store.dump(first.path(), &PluginHost::new(modules.path())).unwrap();
    let mut loaded = Store::new();
    loaded.load(first.path(), &mut PluginHost::new(modules.path())).unwrap();
    let second = tempfile::tempdir().unwrap();
    loaded.dump(second.path(), &PluginHost::new(modules.path())).unwrap();

    for file in ["a.json", "b.json"] {
        assert_eq!(read_json(&first.path().join(file)), read_json(&second.path().join(file)), "{file}");
    }
}

#[test]
fn test_redump_overwrites_previous_state() {
    let modules = tempfile::tempdir().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let mut store = Store::new();
    let root = store.make_item_in("s").unwrap();
    store.set_top(root).unwrap();
    store.dump(dir.path(), &PluginHost::new(modules.path())).unwrap();

    store.set_content(root, Value::string("second")).unwrap();
    store.dump(dir.path(), &PluginHost::new(modules.path())).unwrap();

    let mut loaded = Store::new();
    loaded.load(dir.path(), &mut PluginHost::new(modules.path())).unwrap();
    assert_eq!(loaded.content(root), Some(&Value::string("second")));
}

// ============================================================================
// Malformed input
// ============================================================================

#[test]
fn test_closure_capture_count_must_match_arity() {
    let dir = tempfile::tempdir().unwrap();
    let data = json!({"version": "2011A", "itemcont": [{"item": 1, "itemattrs": [], "itemcontent": null, "itempayload": {
        "payloadkind": "closure", "payloadclofun": "tick2", "payloadcloval": [{"kd": "intv", "int": 1}]
    }}]});
    write_state(dir.path(), "MODULE ticker\nDATA s\n", &[("s", data)]);
    let err = Store::new().load(dir.path(), &mut ticker_host(dir.path())).unwrap_err();
    assert!(matches!(err, Error::Format { ref message, .. } if message.contains("arity")), "{err}");
}

#[test]
fn test_invalid_module_name_in_manifest() {
    let dir = tempfile::tempdir().unwrap();
    write_state(dir.path(), "MODULE no-dashes\n", &[]);
    let err = Store::new().load(dir.path(), &mut PluginHost::new(dir.path())).unwrap_err();
    assert!(matches!(err, Error::Module { .. }), "{err}");
}

#[test]
fn test_malformed_json_is_format_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("MANIFEST"), "DATA s\n").unwrap();
    std::fs::write(dir.path().join("s.json"), "{\"version\": \"2011A\", \"itemcont\": [").unwrap();
    let err = Store::new().load(dir.path(), &mut PluginHost::new(dir.path())).unwrap_err();
    assert!(matches!(err, Error::Format { .. }), "{err}");
}

#[test]
fn test_wrong_field_type_is_format_error() {
    let dir = tempfile::tempdir().unwrap();
    let data = json!({"version": "2011A", "itemcont": [{"item": 1, "itemattrs": [], "itemcontent": {"kd": "nodv", "conid": 1, "sons": 3}, "itempayload": null}]});
    write_state(dir.path(), "DATA s\n", &[("s", data)]);
    let err = Store::new().load(dir.path(), &mut PluginHost::new(dir.path())).unwrap_err();
    assert!(matches!(err, Error::Format { ref message, .. } if message.contains("sons")), "{err}");
}

// ============================================================================
// Non-default layout
// ============================================================================

#[test]
fn test_custom_layout_through_session() {
    let state = tempfile::tempdir().unwrap();
    let config = StoreConfig::default()
        .with_state_dir(state.path())
        .with_module_root(state.path())
        .with_manifest_name("INDEX")
        .with_data_extension("dat")
        .with_transient_dataspace("scratch");

    let mut session = Session::new(config.clone());
    let store = session.store_mut();
    let root = store.make_item_in("main").unwrap();
    let tmp = store.make_item_in("scratch").unwrap();
    store.put_attr(root, tmp, Value::int(1)).unwrap();
    store.put_attr(root, root, Value::int(2)).unwrap();
    store.set_top(root).unwrap();
    session.dump().unwrap();

    assert!(state.path().join("INDEX").is_file());
    assert!(state.path().join("main.dat").is_file());
    assert!(!state.path().join("scratch.dat").exists());

    let reopened = Session::open(config).unwrap();
    assert_eq!(reopened.store().get_attr(root, root), Some(&Value::int(2)));
    assert_eq!(reopened.store().get(root).unwrap().attr_count(), 1);
}
