//! # Persistence
//!
//! Dump and load of a [`Store`] to and from a state directory.
//!
//! | Step | Dump | Load |
//! |------|------|------|
//! | 1 | breadth-first scan from the top item | parse the manifest |
//! | 2 | encode every reached item | load modules in declared order |
//! | 3 | write one data file per dataspace | read data files, creating items by id |
//! | 4 | write the manifest | bind the top item |
//!
//! Both directions operate on a quiescent store. A failed load leaves the
//! store as it was (modules it loaded stay resident in the plugin host); a
//! failed dump leaves the directory as it was.

pub mod codec;
pub mod dump;
pub mod load;
pub mod manifest;

use std::path::Path;

use crate::config::StoreConfig;
use crate::model::ItemId;
use crate::plugin::PluginHost;
use crate::store::Store;
use crate::Result;

/// Format compatibility tag written into, and required from, every data file.
pub const FORMAT_VERSION: &str = "2011A";

pub const DEFAULT_MANIFEST_NAME: &str = "MANIFEST";

pub const DEFAULT_DATA_EXTENSION: &str = "json";

/// What a dump wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpSummary {
    pub items: usize,
    /// Dataspaces written, sorted by name.
    pub dataspaces: Vec<String>,
    pub top: ItemId,
}

/// What a load read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoadSummary {
    /// Modules loaded, in manifest order.
    pub modules: Vec<String>,
    /// Dataspaces read, in manifest order.
    pub dataspaces: Vec<String>,
    pub items: usize,
    pub top: Option<ItemId>,
    /// Ids referenced by some record but never defined by one, sorted.
    pub unresolved: Vec<ItemId>,
}

/// Write everything reachable from the store's top item under `dir`.
pub fn dump(store: &Store, plugins: &PluginHost, dir: &Path, config: &StoreConfig) -> Result<DumpSummary> {
    dump::Dumper::new(store, config).run(plugins, dir)
}

/// Read the state directory `dir` into `store`, loading the modules it names
/// into `plugins` first.
pub fn load(
    store: &mut Store,
    plugins: &mut PluginHost,
    dir: &Path,
    config: &StoreConfig,
) -> Result<LoadSummary> {
    load::Loader::new(store, config, dir).run(plugins)
}

impl Store {
    /// [`dump`] with the default file layout.
    pub fn dump(&self, dir: impl AsRef<Path>, plugins: &PluginHost) -> Result<DumpSummary> {
        dump(self, plugins, dir.as_ref(), &StoreConfig::default())
    }

    /// [`load`] with the default file layout.
    pub fn load(&mut self, dir: impl AsRef<Path>, plugins: &mut PluginHost) -> Result<LoadSummary> {
        load(self, plugins, dir.as_ref(), &StoreConfig::default())
    }
}
