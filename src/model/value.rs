//! The closed value universe: integers, strings, nodes, sets and item references.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use super::ItemId;

/// Sons of a node. Most nodes are small, so they stay inline.
pub type Sons = SmallVec<[Value; 4]>;

/// A value stored in attributes, contents, payloads and node sons.
///
/// Values are immutable once built; only the items they refer to are mutable.
/// Items are referenced by identity, so equality on `Item` compares ids while
/// every other kind compares structurally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Value {
    /// Absence of a value.
    #[default]
    Null,
    Int(i64),
    Str(Arc<str>),
    Node(Arc<Node>),
    Set(Arc<ItemSet>),
    Item(ItemId),
}

/// Kind tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Int,
    Str,
    Node,
    Set,
    Item,
}

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Int => "integer",
            ValueKind::Str => "string",
            ValueKind::Node => "node",
            ValueKind::Set => "set",
            ValueKind::Item => "item",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Node
// ============================================================================

/// A constructed term: a connective item applied to a fixed sequence of sons.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Node {
    conn: ItemId,
    sons: Sons,
}

impl Node {
    pub fn new(conn: ItemId, sons: impl IntoIterator<Item = Value>) -> Self {
        Self { conn, sons: sons.into_iter().collect() }
    }

    pub fn connective(&self) -> ItemId {
        self.conn
    }

    pub fn arity(&self) -> usize {
        self.sons.len()
    }

    pub fn sons(&self) -> &[Value] {
        &self.sons
    }

    pub fn son(&self, index: usize) -> Option<&Value> {
        self.sons.get(index)
    }
}

// ============================================================================
// ItemSet
// ============================================================================

/// Immutable set of items, deduplicated and sorted by ascending identity.
///
/// Two sets holding the same items are laid out identically, so they compare
/// equal and serialize to the same id list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ItemSet {
    members: Vec<ItemId>,
}

impl ItemSet {
    pub fn new(items: impl IntoIterator<Item = ItemId>) -> Self {
        let mut members: Vec<ItemId> = items.into_iter().collect();
        members.sort_unstable();
        members.dedup();
        Self { members }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, item: ItemId) -> bool {
        self.members.binary_search(&item).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.members.iter().copied()
    }

    pub fn as_slice(&self) -> &[ItemId] {
        &self.members
    }
}

impl FromIterator<ItemId> for ItemSet {
    fn from_iter<I: IntoIterator<Item = ItemId>>(iter: I) -> Self {
        Self::new(iter)
    }
}

// ============================================================================
// Constructors and type checking
// ============================================================================

impl Value {
    pub fn int(n: i64) -> Self {
        Value::Int(n)
    }

    pub fn string(s: impl AsRef<str>) -> Self {
        Value::Str(Arc::from(s.as_ref()))
    }

    /// Build a node; its arity is the number of sons given.
    pub fn node(conn: ItemId, sons: impl IntoIterator<Item = Value>) -> Self {
        Value::Node(Arc::new(Node::new(conn, sons)))
    }

    /// Build a set; duplicates are dropped and members sorted by identity.
    pub fn set(items: impl IntoIterator<Item = ItemId>) -> Self {
        Value::Set(Arc::new(ItemSet::new(items)))
    }

    pub fn item(id: ItemId) -> Self {
        Value::Item(id)
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Int(_) => ValueKind::Int,
            Value::Str(_) => ValueKind::Str,
            Value::Node(_) => ValueKind::Node,
            Value::Set(_) => ValueKind::Set,
            Value::Item(_) => ValueKind::Item,
        }
    }

    pub fn is_null(&self) -> bool { matches!(self, Value::Null) }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_item(&self) -> Option<ItemId> {
        match self {
            Value::Item(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Value::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&ItemSet> {
        match self {
            Value::Set(s) => Some(s),
            _ => None,
        }
    }

    /// `Null` becomes `None`, anything else `Some(self)`.
    pub fn non_null(&self) -> Option<&Value> {
        if self.is_null() { None } else { Some(self) }
    }
}

// ============================================================================
// Conversions (From impls)
// ============================================================================

impl From<i32> for Value { fn from(v: i32) -> Self { Value::Int(v as i64) } }
impl From<i64> for Value { fn from(v: i64) -> Self { Value::Int(v) } }
impl From<&str> for Value { fn from(v: &str) -> Self { Value::string(v) } }
impl From<String> for Value { fn from(v: String) -> Self { Value::Str(Arc::from(v)) } }
impl From<ItemId> for Value { fn from(v: ItemId) -> Self { Value::Item(v) } }
impl From<Node> for Value { fn from(v: Node) -> Self { Value::Node(Arc::new(v)) } }
impl From<ItemSet> for Value { fn from(v: ItemSet) -> Self { Value::Set(Arc::new(v)) } }
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self { v.map(Into::into).unwrap_or(Value::Null) }
}

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
            Value::Item(id) => write!(f, "#{id}"),
            Value::Node(n) => {
                write!(f, "*{}(", n.conn)?;
                for (i, son) in n.sons.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{son}")?;
                }
                write!(f, ")")
            }
            Value::Set(s) => {
                write!(f, "{{")?;
                for (i, id) in s.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{id}")?;
                }
                write!(f, "}}")
            }
        }
    }
}
