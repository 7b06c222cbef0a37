//! # Item store
//!
//! The context object holding every item of a session, keyed by id, together
//! with the roots the rest of the crate needs: the top item, the dataspace
//! registry (which knows the transient dataspace) and the id counter.
//!
//! ## Limitations
//!
//! - **Single-threaded**: mutation goes through `&mut Store`; dump and load
//!   assume nobody else touches the store meanwhile.
//! - **No reclamation**: items are never freed while the store lives. Items
//!   nobody reaches simply do not get dumped.

use std::sync::Arc;

use hashbrown::HashMap;

use crate::closure::{ClosureFn, ClosureRoutine};
use crate::model::*;
use crate::{Error, Result};

/// All items of a session plus their roots.
#[derive(Debug)]
pub struct Store {
    items: HashMap<ItemId, Item>,
    dataspaces: DataspaceRegistry,
    last_id: u64,
    top: Option<ItemId>,
}

impl Store {
    pub fn new() -> Self {
        Self::with_transient_dataspace(DEFAULT_TRANSIENT_DATASPACE)
    }

    /// A store whose transient dataspace has the given name.
    pub fn with_transient_dataspace(name: &str) -> Self {
        Self {
            items: HashMap::new(),
            dataspaces: DataspaceRegistry::new(name),
            last_id: 0,
            top: None,
        }
    }

    // ========================================================================
    // Dataspaces
    // ========================================================================

    /// Return (creating if needed) the dataspace of that name.
    pub fn dataspace(&mut self, name: &str) -> Dataspace {
        self.dataspaces.get_or_create(name)
    }

    pub fn transient(&self) -> &Dataspace {
        self.dataspaces.transient()
    }

    pub fn dataspaces(&self) -> &DataspaceRegistry {
        &self.dataspaces
    }

    // ========================================================================
    // Identity
    // ========================================================================

    /// Highest id allocated or observed so far.
    pub fn last_id(&self) -> u64 {
        self.last_id
    }

    /// Advance the counter so that later allocations never reuse `id`.
    pub(crate) fn observe_id(&mut self, id: ItemId) {
        self.last_id = self.last_id.max(id.0);
    }

    fn check_id(id: ItemId) -> Result<()> {
        if id.0 == 0 {
            return Err(Error::Semantic("item ids start at 1".into()));
        }
        if id > ItemId::MAX {
            return Err(Error::Semantic(format!("item id #{id} exceeds #{}", ItemId::MAX)));
        }
        Ok(())
    }

    // ========================================================================
    // Items
    // ========================================================================

    /// Allocate a fresh item in `space`. Fails once the id space up to
    /// [`ItemId::MAX`] is used up.
    pub fn make_item(&mut self, space: &Dataspace) -> Result<ItemId> {
        let id = self
            .last_id
            .checked_add(1)
            .map(ItemId)
            .filter(|id| *id <= ItemId::MAX)
            .ok_or_else(|| Error::Semantic(format!("item ids exhausted after #{}", self.last_id)))?;
        self.last_id = id.0;
        self.items.insert(id, Item::in_dataspace(id, space.clone()));
        Ok(id)
    }

    /// Allocate a fresh item in the dataspace called `name`.
    pub fn make_item_in(&mut self, name: &str) -> Result<ItemId> {
        let space = self.dataspace(name);
        self.make_item(&space)
    }

    /// Create an item with a chosen id in `space`. The id must be free.
    pub fn make_item_with_id(&mut self, id: ItemId, space: &Dataspace) -> Result<ItemId> {
        Self::check_id(id)?;
        if self.contains(id) {
            return Err(Error::Semantic(format!("item #{id} already exists")));
        }
        self.observe_id(id);
        self.items.insert(id, Item::in_dataspace(id, space.clone()));
        Ok(id)
    }

    /// Take over the items of a completed load.
    ///
    /// Items with a dataspace replace whatever the store holds under their
    /// id; bare placeholders are only added where the id is still free.
    pub(crate) fn merge_loaded(&mut self, staged: HashMap<ItemId, Item>) -> Result<()> {
        for id in staged.keys() {
            Self::check_id(*id)?;
        }
        for (id, item) in staged {
            self.observe_id(id);
            if item.dataspace().is_some() {
                self.items.insert(id, item);
            } else {
                self.items.entry(id).or_insert(item);
            }
        }
        Ok(())
    }

    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    pub fn item_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        self.items.get_mut(&id)
    }

    /// Like [`Store::item`], but an unknown id is an error.
    pub fn get(&self, id: ItemId) -> Result<&Item> {
        self.items.get(&id).ok_or_else(|| Error::NotFound(format!("item #{id}")))
    }

    /// Like [`Store::item_mut`], but an unknown id is an error.
    pub fn get_mut(&mut self, id: ItemId) -> Result<&mut Item> {
        self.items.get_mut(&id).ok_or_else(|| Error::NotFound(format!("item #{id}")))
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.items.contains_key(&id)
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True if the item exists and lives in a persistent dataspace.
    pub fn is_persistent(&self, id: ItemId) -> bool {
        self.items.get(&id).is_some_and(Item::is_persistent)
    }

    // ========================================================================
    // Top item
    // ========================================================================

    /// The root from which dumps compute reachability.
    pub fn top(&self) -> Option<ItemId> {
        self.top
    }

    pub fn set_top(&mut self, id: ItemId) -> Result<()> {
        if !self.contains(id) {
            return Err(Error::NotFound(format!("top item #{id}")));
        }
        self.top = Some(id);
        Ok(())
    }

    // ========================================================================
    // Attributes and content
    // ========================================================================

    /// Insert or overwrite an attribute; `Null` removes it. Both the item and
    /// the key must exist.
    pub fn put_attr(&mut self, item: ItemId, key: ItemId, value: Value) -> Result<()> {
        if !self.contains(key) {
            return Err(Error::NotFound(format!("attribute key #{key}")));
        }
        self.get_mut(item)?.put_attr(key, value);
        Ok(())
    }

    pub fn get_attr(&self, item: ItemId, key: ItemId) -> Option<&Value> {
        self.items.get(&item)?.get_attr(key)
    }

    /// Idempotent: removing a missing attribute (or from a missing item) is fine.
    pub fn remove_attr(&mut self, item: ItemId, key: ItemId) -> Option<Value> {
        self.items.get_mut(&item)?.remove_attr(key)
    }

    pub fn set_content(&mut self, item: ItemId, value: Value) -> Result<()> {
        self.get_mut(item)?.set_content(value);
        Ok(())
    }

    /// Content of the item; `None` for missing items and null content.
    pub fn content(&self, item: ItemId) -> Option<&Value> {
        self.items.get(&item)?.content().non_null()
    }

    // ========================================================================
    // Closures
    // ========================================================================

    /// Give `item` a closure payload of `fun` with the given captures.
    pub fn make_closure(
        &mut self,
        item: ItemId,
        fun: Arc<ClosureFn>,
        captures: impl IntoIterator<Item = Value>,
    ) -> Result<()> {
        self.get_mut(item)?.make_closure(fun, captures);
        Ok(())
    }

    /// Call the closure held by `item` with `args`, dispatching on the
    /// function's call shape.
    pub fn apply_closure(&mut self, item: ItemId, args: &[Value]) -> Result<Value> {
        let fun = Arc::clone(self.get(item)?.closure_function()?);
        let expected = fun.kind().call_arity();
        if args.len() != expected {
            return Err(Error::Semantic(format!(
                "closure `{}` of item #{item} takes {expected} argument(s), got {}",
                fun.name(),
                args.len()
            )));
        }
        match fun.routine() {
            ClosureRoutine::OneValue(f) => f(self, item, &args[0]),
            ClosureRoutine::TwoValues(f) => f(self, item, &args[0], &args[1]),
            ClosureRoutine::Action(f) => f(self, item).map(|()| Value::Null),
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}
