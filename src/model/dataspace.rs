//! Dataspaces: named partitions of items controlling persistence.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Name of the non-persistent dataspace unless configured otherwise.
pub const DEFAULT_TRANSIENT_DATASPACE: &str = "transient";

/// Handle to a dataspace. Cheap to clone; compares by name.
#[derive(Clone)]
pub struct Dataspace(Arc<DataspaceInner>);

struct DataspaceInner {
    name: Arc<str>,
    transient: bool,
}

impl Dataspace {
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// True for the designated dataspace whose items are never persisted.
    pub fn is_transient(&self) -> bool {
        self.0.transient
    }

    /// True when the name is usable as a data file stem.
    pub fn has_file_name(&self) -> bool {
        is_plain_name(self.name())
    }
}

impl PartialEq for Dataspace {
    fn eq(&self, other: &Self) -> bool {
        self.0.name == other.0.name
    }
}

impl Eq for Dataspace {}

impl fmt::Debug for Dataspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_transient() {
            write!(f, "Dataspace({}, transient)", self.name())
        } else {
            write!(f, "Dataspace({})", self.name())
        }
    }
}

impl fmt::Display for Dataspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `[A-Za-z0-9_]+`, the shape shared by module and dataspace names.
pub fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

// ============================================================================
// Registry
// ============================================================================

/// Mapping `name → dataspace`, creating entries on first lookup.
#[derive(Debug)]
pub struct DataspaceRegistry {
    spaces: BTreeMap<Arc<str>, Dataspace>,
    transient: Dataspace,
}

impl DataspaceRegistry {
    pub fn new(transient_name: &str) -> Self {
        let name: Arc<str> = Arc::from(transient_name);
        let transient = Dataspace(Arc::new(DataspaceInner { name: Arc::clone(&name), transient: true }));
        let mut spaces = BTreeMap::new();
        spaces.insert(name, transient.clone());
        Self { spaces, transient }
    }

    /// Return the dataspace of that name, creating it if needed.
    pub fn get_or_create(&mut self, name: &str) -> Dataspace {
        if let Some(space) = self.spaces.get(name) {
            return space.clone();
        }
        let name: Arc<str> = Arc::from(name);
        let space = Dataspace(Arc::new(DataspaceInner { name: Arc::clone(&name), transient: false }));
        self.spaces.insert(name, space.clone());
        space
    }

    pub fn get(&self, name: &str) -> Option<&Dataspace> {
        self.spaces.get(name)
    }

    pub fn transient(&self) -> &Dataspace {
        &self.transient
    }

    /// All known dataspaces, ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = &Dataspace> {
        self.spaces.values()
    }

    pub fn len(&self) -> usize {
        self.spaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }
}

impl Default for DataspaceRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_TRANSIENT_DATASPACE)
    }
}
