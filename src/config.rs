//! Store configuration.
//!
//! Every field has a default, so a partial JSON document is a valid
//! configuration:
//!
//! ```json
//! { "state_dir": "/var/lib/workbench", "module_root": "/opt/workbench" }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::DEFAULT_TRANSIENT_DATASPACE;
use crate::persist::{DEFAULT_DATA_EXTENSION, DEFAULT_MANIFEST_NAME};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory dumped to and loaded from.
    pub state_dir: PathBuf,
    /// Directory whose `src/` and `module/` subdirectories hold native modules.
    pub module_root: PathBuf,
    pub manifest_name: String,
    /// Extension of the per-dataspace data files, without the dot.
    pub data_extension: String,
    /// Name of the dataspace whose items are never persisted.
    pub transient_dataspace: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("."),
            module_root: PathBuf::from("."),
            manifest_name: DEFAULT_MANIFEST_NAME.to_owned(),
            data_extension: DEFAULT_DATA_EXTENSION.to_owned(),
            transient_dataspace: DEFAULT_TRANSIENT_DATASPACE.to_owned(),
        }
    }
}

impl StoreConfig {
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }

    pub fn with_module_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.module_root = dir.into();
        self
    }

    pub fn with_manifest_name(mut self, name: impl Into<String>) -> Self {
        self.manifest_name = name.into();
        self
    }

    pub fn with_data_extension(mut self, ext: impl Into<String>) -> Self {
        self.data_extension = ext.into();
        self
    }

    pub fn with_transient_dataspace(mut self, name: impl Into<String>) -> Self {
        self.transient_dataspace = name.into();
        self
    }

    /// Read a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn manifest_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.manifest_name)
    }

    /// `<dir>/<dataspace>.<ext>`
    pub fn data_path(&self, dir: &Path, dataspace: &str) -> PathBuf {
        dir.join(format!("{dataspace}.{}", self.data_extension))
    }
}
