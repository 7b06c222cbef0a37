//! # itemgraph: Persistent Reflective Item Store
//!
//! A graph of uniquely identified *items* carrying attributes, a content value
//! and one typed payload, persisted as human-readable JSON files grouped by
//! named *dataspaces*.
//!
//! ## Design Principles
//!
//! 1. **Arena of ids**: the [`Store`] owns every item; values refer to items
//!    by [`ItemId`], so cycles are plain data
//! 2. **Closed value universe**: [`Value`] is an exhaustive enum
//! 3. **Reachability decides persistence**: a dump walks from the top item and
//!    prunes anything in the transient dataspace
//! 4. **Closures persist by name**: plugin modules register the functions
//!    before data is read back
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use itemgraph::{Session, StoreConfig, Value};
//!
//! # fn example() -> itemgraph::Result<()> {
//! let mut session = Session::new(StoreConfig::default().with_state_dir("state"));
//! let store = session.store_mut();
//! let root = store.make_item_in("main")?;
//! store.put_attr(root, root, Value::string("self"))?;
//! store.set_top(root)?;
//! session.dump()?;
//!
//! let reopened = Session::open(StoreConfig::default().with_state_dir("state"))?;
//! assert_eq!(reopened.store().top(), Some(root));
//! # Ok(())
//! # }
//! ```
//!
//! ## On-disk Layout
//!
//! | File | Content |
//! |------|---------|
//! | `MANIFEST` | `MODULE`, `DATA` and `TOPDICT` directives |
//! | `<dataspace>.json` | `{"version": "2011A", "itemcont": [...]}` |

use std::path::{Path, PathBuf};

// ============================================================================
// Modules
// ============================================================================

pub mod closure;
pub mod config;
pub mod model;
pub mod persist;
pub mod plugin;
pub mod store;

// ============================================================================
// Re-exports
// ============================================================================

pub use model::{
    Dataspace, Item, ItemId, ItemSet, Node, Payload, PayloadKind, Value, ValueKind,
};

pub use closure::{ClosureFn, ClosureKind, ClosureRegistry};
pub use config::StoreConfig;
pub use persist::{DumpSummary, FORMAT_VERSION, LoadSummary};
pub use plugin::{ModuleInit, PluginHost};
pub use store::Store;

// ============================================================================
// Session handle
// ============================================================================

/// The primary entry point: one store, the plugins its closures need, and
/// the configuration saying where both live on disk.
#[derive(Debug)]
pub struct Session {
    config: StoreConfig,
    store: Store,
    plugins: PluginHost,
}

impl Session {
    /// An empty session. Nothing is read from disk.
    pub fn new(config: StoreConfig) -> Self {
        let store = Store::with_transient_dataspace(&config.transient_dataspace);
        let plugins = PluginHost::new(&config.module_root);
        Self { config, store, plugins }
    }

    /// A session loaded from `config.state_dir`.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let mut session = Self::new(config);
        session.load()?;
        Ok(session)
    }

    /// Load the configured state directory into this session.
    pub fn load(&mut self) -> Result<LoadSummary> {
        let dir = self.config.state_dir.clone();
        self.load_from(&dir)
    }

    pub fn load_from(&mut self, dir: impl AsRef<Path>) -> Result<LoadSummary> {
        persist::load(&mut self.store, &mut self.plugins, dir.as_ref(), &self.config)
    }

    /// Dump everything reachable from the top item into the state directory.
    pub fn dump(&self) -> Result<DumpSummary> {
        self.dump_to(&self.config.state_dir)
    }

    pub fn dump_to(&self, dir: impl AsRef<Path>) -> Result<DumpSummary> {
        persist::dump(&self.store, &self.plugins, dir.as_ref(), &self.config)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    pub fn plugins(&self) -> &PluginHost {
        &self.plugins
    }

    /// Register built-in modules or closure functions here before loading.
    pub fn plugins_mut(&mut self) -> &mut PluginHost {
        &mut self.plugins
    }

    /// Register a closure function outside any module.
    pub fn register_closure_function(&mut self, fun: ClosureFn) -> Result<()> {
        self.plugins.register_closure_function(fun)
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error at {}: {message}", path.display())]
    Config { path: PathBuf, message: String },

    #[error("Format error in {} (check at line {line}): {message}", path.display())]
    Format { path: PathBuf, line: u32, message: String },

    #[error("Semantic error: {0}")]
    Semantic(String),

    #[error("Payload mismatch on item #{item}: expected {expected}, found {found}")]
    PayloadMismatch { item: ItemId, expected: &'static str, found: &'static str },

    #[error("Index {index} out of range on item #{item} (length {len})")]
    OutOfRange { item: ItemId, index: usize, len: usize },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Module {name} failed: {reason}")]
    Module { name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
