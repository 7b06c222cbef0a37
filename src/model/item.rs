//! Items: identified mutable entities carrying attributes, content and a payload.

use std::fmt;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use super::{Dataspace, Payload, Value};

/// Item identity. Positive and unique within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemId(pub u64);

impl ItemId {
    /// Largest id a store hands out or accepts; ids fit a signed 64-bit integer.
    pub const MAX: ItemId = ItemId(i64::MAX as u64);
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Attribute table: key item → value. Never holds `Value::Null`.
pub type AttributeMap = HashMap<ItemId, Value>;

/// An item of the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    id: ItemId,
    dataspace: Option<Dataspace>,
    attributes: AttributeMap,
    content: Value,
    pub(crate) payload: Payload,
}

impl Item {
    /// A bare item: no dataspace, no attributes, null content, no payload.
    pub fn new(id: ItemId) -> Self {
        Self {
            id,
            dataspace: None,
            attributes: AttributeMap::new(),
            content: Value::Null,
            payload: Payload::None,
        }
    }

    pub fn in_dataspace(id: ItemId, dataspace: Dataspace) -> Self {
        let mut item = Self::new(id);
        item.dataspace = Some(dataspace);
        item
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn dataspace(&self) -> Option<&Dataspace> {
        self.dataspace.as_ref()
    }

    /// Items without a dataspace are treated like transient ones.
    pub fn is_persistent(&self) -> bool {
        self.dataspace.as_ref().is_some_and(|ds| !ds.is_transient())
    }

    /// Set the dataspace of an item that has none yet. Returns the current
    /// one, untouched, if it was already set.
    pub(crate) fn assign_dataspace(&mut self, dataspace: Dataspace) -> Result<(), Dataspace> {
        match &self.dataspace {
            Some(existing) => Err(existing.clone()),
            None => {
                self.dataspace = Some(dataspace);
                Ok(())
            }
        }
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    /// Insert or overwrite; a `Null` value removes the attribute.
    pub fn put_attr(&mut self, key: ItemId, value: Value) {
        if value.is_null() {
            self.attributes.remove(&key);
        } else {
            self.attributes.insert(key, value);
        }
    }

    pub fn get_attr(&self, key: ItemId) -> Option<&Value> {
        self.attributes.get(&key)
    }

    /// Idempotent; returns the removed value if there was one.
    pub fn remove_attr(&mut self, key: ItemId) -> Option<Value> {
        self.attributes.remove(&key)
    }

    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    /// Attribute keys in ascending id order.
    pub fn sorted_attr_keys(&self) -> Vec<ItemId> {
        let mut keys: Vec<ItemId> = self.attributes.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    pub fn attr_count(&self) -> usize {
        self.attributes.len()
    }

    // ========================================================================
    // Content
    // ========================================================================

    pub fn content(&self) -> &Value {
        &self.content
    }

    pub fn set_content(&mut self, value: Value) {
        self.content = value;
    }

    pub fn take_content(&mut self) -> Value {
        std::mem::take(&mut self.content)
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DataspaceRegistry;

    #[test]
    fn test_put_get_remove_attr() {
        let mut item = Item::new(ItemId(1));
        item.put_attr(ItemId(2), Value::int(5));
        assert_eq!(item.get_attr(ItemId(2)), Some(&Value::int(5)));

        item.put_attr(ItemId(2), Value::string("over"));
        assert_eq!(item.get_attr(ItemId(2)), Some(&Value::string("over")));
        assert_eq!(item.attr_count(), 1);

        assert_eq!(item.remove_attr(ItemId(2)), Some(Value::string("over")));
        assert_eq!(item.remove_attr(ItemId(2)), None);
        assert!(item.get_attr(ItemId(2)).is_none());
    }

    #[test]
    fn test_null_put_removes() {
        let mut item = Item::new(ItemId(1));
        item.put_attr(ItemId(3), Value::int(1));
        item.put_attr(ItemId(3), Value::Null);
        assert!(item.attributes().is_empty());
    }

    #[test]
    fn test_sorted_keys() {
        let mut item = Item::new(ItemId(1));
        for k in [9, 2, 7, 4] {
            item.put_attr(ItemId(k), Value::int(k as i64));
        }
        assert_eq!(item.sorted_attr_keys(), vec![ItemId(2), ItemId(4), ItemId(7), ItemId(9)]);
    }

    #[test]
    fn test_dataspace_assigned_once() {
        let mut reg = DataspaceRegistry::default();
        let s = reg.get_or_create("s");
        let mut item = Item::new(ItemId(1));
        assert!(!item.is_persistent());
        assert!(item.assign_dataspace(s.clone()).is_ok());
        assert!(item.is_persistent());
        assert_eq!(item.assign_dataspace(reg.get_or_create("t")), Err(s));
    }

    #[test]
    fn test_transient_item_not_persistent() {
        let reg = DataspaceRegistry::default();
        let item = Item::in_dataspace(ItemId(1), reg.transient().clone());
        assert!(!item.is_persistent());
    }
}
