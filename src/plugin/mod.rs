//! # Plugin modules
//!
//! Modules publish closure-function descriptors into the host's
//! [`ClosureRegistry`]. The manifest names them in `MODULE` lines, and they
//! are all loaded before any data file is parsed, so that closure payloads
//! can be rebound by name.
//!
//! ## Where modules come from
//!
//! | Origin | How it is found |
//! |--------|-----------------|
//! | Built-in | registered with [`PluginHost::register_builtin`] |
//! | Native | `<root>/src/<lib>` then `<root>/module/<lib>`, where `<lib>` is the platform file name (`lib<m>.so`, `<m>.dll`, `lib<m>.dylib`) |
//!
//! A native module exports [`MODULE_INIT_SYMBOL`] with the [`ModuleInit`]
//! signature; use [`declare_module!`](crate::declare_module) to emit it. It
//! has to be built by the same compiler as the host, since the registry
//! crosses the boundary as a Rust type. Opened libraries stay resident for
//! the life of the process.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use hashbrown::HashMap;
use libloading::Library;
use parking_lot::Mutex;

use crate::closure::{ClosureFn, ClosureRegistry};
use crate::model::is_plain_name;
use crate::{Error, Result};

/// Initialization entry point of a module.
pub type ModuleInit = fn(&mut ClosureRegistry) -> Result<()>;

/// Symbol a native module exports.
pub const MODULE_INIT_SYMBOL: &str = "itemgraph_module_init";

/// Subdirectories of the module root searched, in order.
pub const MODULE_SEARCH_DIRS: [&str; 2] = ["src", "module"];

/// Native libraries opened by any host. Never unloaded.
static RESIDENT_LIBRARIES: LazyLock<Mutex<Vec<Library>>> = LazyLock::new(|| Mutex::new(Vec::new()));

/// Emit the init symbol of a native module.
///
/// ```rust,ignore
/// fn init(reg: &mut itemgraph::ClosureRegistry) -> itemgraph::Result<()> {
///     reg.register(itemgraph::ClosureFn::two_values("greet", 2, greet))?;
///     Ok(())
/// }
/// itemgraph::declare_module!(init);
/// ```
#[macro_export]
macro_rules! declare_module {
    ($init:path) => {
        #[unsafe(no_mangle)]
        pub fn itemgraph_module_init(
            registry: &mut $crate::closure::ClosureRegistry,
        ) -> $crate::Result<()> {
            $init(registry)
        }
    };
}

/// How a loaded module was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOrigin {
    Builtin,
    Native(PathBuf),
}

#[derive(Debug, Clone)]
pub struct LoadedModule {
    pub name: String,
    pub origin: ModuleOrigin,
    /// Closure functions the module registered, sorted.
    pub functions: Vec<String>,
}

// ============================================================================
// PluginHost
// ============================================================================

/// Module registry plus the closure-function registry modules write into.
#[derive(Debug)]
pub struct PluginHost {
    root: PathBuf,
    builtins: HashMap<String, ModuleInit>,
    loaded: Vec<LoadedModule>,
    closures: ClosureRegistry,
}

impl PluginHost {
    /// A host searching native modules under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            builtins: HashMap::new(),
            loaded: Vec::new(),
            closures: ClosureRegistry::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Make a statically linked module loadable by name.
    pub fn register_builtin(&mut self, name: impl Into<String>, init: ModuleInit) {
        self.builtins.insert(name.into(), init);
    }

    /// Loaded modules, in load order.
    pub fn modules(&self) -> &[LoadedModule] {
        &self.loaded
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.iter().any(|m| m.name == name)
    }

    pub fn closures(&self) -> &ClosureRegistry {
        &self.closures
    }

    /// Register a closure function directly, outside any module.
    pub fn register_closure_function(&mut self, fun: ClosureFn) -> Result<()> {
        self.closures.register(fun).map(|_| ())
    }

    /// Load module `name`, running its init so its closure functions are
    /// registered. Loading the same name twice is refused.
    pub fn load_module(&mut self, name: &str) -> Result<()> {
        let fail = |reason: String| Error::Module { name: name.to_owned(), reason };

        if name.is_empty() {
            return Err(fail("empty module name".into()));
        }
        if !is_plain_name(name) {
            return Err(fail(format!("invalid character in module name {name}")));
        }
        if let Some(existing) = self.loaded.iter().find(|m| m.name == name) {
            return Err(fail(format!("module {name} already loaded as {:?}", existing.origin)));
        }

        let (origin, init) = match self.builtins.get(name).copied() {
            Some(init) => (ModuleOrigin::Builtin, init),
            None => {
                let (path, init) = self.open_native(name)?;
                (ModuleOrigin::Native(path), init)
            }
        };

        // Only a module whose init succeeds leaves functions behind.
        let mut scratch = ClosureRegistry::new();
        init(&mut scratch).map_err(|e| fail(format!("initialization failed: {e}")))?;
        let functions = self.closures.absorb(scratch).map_err(|e| fail(e.to_string()))?;
        tracing::debug!(module = name, origin = ?origin, functions = ?functions, "loaded module");
        self.loaded.push(LoadedModule { name: name.to_owned(), origin, functions });
        Ok(())
    }

    /// Candidate paths of a native module, in search order.
    pub fn candidate_paths(&self, name: &str) -> Vec<PathBuf> {
        let file = libloading::library_filename(name);
        MODULE_SEARCH_DIRS.iter().map(|dir| self.root.join(dir).join(&file)).collect()
    }

    /// Open the first loadable candidate, keep it resident and resolve its
    /// init symbol.
    fn open_native(&self, name: &str) -> Result<(PathBuf, ModuleInit)> {
        let fail = |reason: String| Error::Module { name: name.to_owned(), reason };

        if !self.root.is_dir() {
            return Err(fail(format!(
                "when loading module dirpath {} is not a directory",
                self.root.display()
            )));
        }

        let mut last_error = String::from("no candidate file exists");
        for path in self.candidate_paths(name) {
            if !path.parent().is_some_and(Path::is_dir) {
                continue;
            }
            // SAFETY: running a module's initializers is what loading it means.
            let library = match unsafe { Library::new(&path) } {
                Ok(library) => library,
                Err(e) => {
                    last_error = format!("{}: {e}", path.display());
                    continue;
                }
            };
            // SAFETY: the symbol is emitted by `declare_module!` with this signature.
            let init: ModuleInit = unsafe {
                *library
                    .get::<ModuleInit>(MODULE_INIT_SYMBOL.as_bytes())
                    .map_err(|e| fail(format!("{} lacks {MODULE_INIT_SYMBOL}: {e}", path.display())))?
            };
            RESIDENT_LIBRARIES.lock().push(library);
            return Ok((path, init));
        }

        Err(fail(format!(
            "failed to load module {name} in src/ or module/ of {} : {last_error}",
            self.root.display()
        )))
    }
}
