//! Item payloads: exactly one typed container per item.
//!
//! | Kind | Container |
//! |------|-----------|
//! | `None` | nothing |
//! | `Vector` | random-access values |
//! | `Buffer` | UTF-8 text |
//! | `Queue` | FIFO of values |
//! | `Dictionary` | string → value, with reserved capacity |
//! | `Closure` | named function + fixed-arity captures |
//!
//! The `make_*`/`reserve_*` operations switch an item to their kind, dropping
//! whatever payload it had. Every other operation requires the payload to
//! already be of its kind and fails with [`Error::PayloadMismatch`] otherwise.

use std::collections::VecDeque;
use std::sync::Arc;

use hashbrown::HashMap;
use smallvec::SmallVec;

use super::{Item, Value};
use crate::closure::ClosureFn;
use crate::{Error, Result};

/// Captured values of a closure.
pub type Captures = SmallVec<[Value; 4]>;

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Payload {
    #[default]
    None,
    Vector(Vec<Value>),
    Buffer(String),
    Queue(VecDeque<Value>),
    Dictionary(Dictionary),
    Closure(Closure),
}

/// Payload kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    None,
    Vector,
    Buffer,
    Queue,
    Dictionary,
    Closure,
}

impl PayloadKind {
    pub fn name(self) -> &'static str {
        match self {
            PayloadKind::None => "none",
            PayloadKind::Vector => "vector",
            PayloadKind::Buffer => "buffer",
            PayloadKind::Queue => "queue",
            PayloadKind::Dictionary => "dictionary",
            PayloadKind::Closure => "closure",
        }
    }
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::None => PayloadKind::None,
            Payload::Vector(_) => PayloadKind::Vector,
            Payload::Buffer(_) => PayloadKind::Buffer,
            Payload::Queue(_) => PayloadKind::Queue,
            Payload::Dictionary(_) => PayloadKind::Dictionary,
            Payload::Closure(_) => PayloadKind::Closure,
        }
    }

    /// Values held by the payload, in container order. Buffers hold none.
    pub fn values(&self) -> Box<dyn Iterator<Item = &Value> + '_> {
        match self {
            Payload::None | Payload::Buffer(_) => Box::new(std::iter::empty()),
            Payload::Vector(v) => Box::new(v.iter()),
            Payload::Queue(q) => Box::new(q.iter()),
            Payload::Dictionary(d) => Box::new(d.entries.values()),
            Payload::Closure(c) => Box::new(c.captures.iter()),
        }
    }
}

// ============================================================================
// Dictionary
// ============================================================================

/// String-keyed dictionary that remembers the capacity reserved for it.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    entries: HashMap<String, Value>,
    capacity: usize,
}

impl Dictionary {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: HashMap::with_capacity(capacity), capacity }
    }

    pub fn reserve(&mut self, capacity: usize) {
        if capacity > self.capacity {
            self.entries.reserve(capacity.saturating_sub(self.entries.len()));
            self.capacity = capacity;
        }
    }

    /// `Null` removes the key. The reserved capacity doubles when full.
    pub fn put(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if value.is_null() {
            self.entries.remove(&key);
            return;
        }
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            let grown = (self.capacity * 2).max(4);
            self.reserve(grown);
        }
        self.entries.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries sorted by key.
    pub fn sorted_entries(&self) -> Vec<(&str, &Value)> {
        let mut entries: Vec<(&str, &Value)> =
            self.entries.iter().map(|(k, v)| (k.as_str(), v)).collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
        entries
    }
}

/// Equal when the entries are; reserved capacity is not part of the value.
impl PartialEq for Dictionary {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

// ============================================================================
// Closure
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    fun: Arc<ClosureFn>,
    captures: Captures,
}

impl Closure {
    /// Captures are padded with `Null` (or truncated) to the function's arity.
    pub fn new(fun: Arc<ClosureFn>, captures: impl IntoIterator<Item = Value>) -> Self {
        let arity = fun.arity();
        let mut captures: Captures = captures.into_iter().take(arity).collect();
        captures.resize(arity, Value::Null);
        Self { fun, captures }
    }

    pub fn function(&self) -> &Arc<ClosureFn> {
        &self.fun
    }

    pub fn captures(&self) -> &[Value] {
        &self.captures
    }
}

// ============================================================================
// Payload operations on items
// ============================================================================

impl Item {
    pub fn payload_kind(&self) -> PayloadKind {
        self.payload.kind()
    }

    pub fn clear_payload(&mut self) {
        self.payload = Payload::None;
    }

    fn mismatch(&self, expected: PayloadKind) -> Error {
        Error::PayloadMismatch {
            item: self.id(),
            expected: expected.name(),
            found: self.payload.kind().name(),
        }
    }

    // --- vector ---

    pub fn make_vector(&mut self, capacity: usize) {
        self.payload = Payload::Vector(Vec::with_capacity(capacity));
    }

    pub fn reserve_vector(&mut self, additional: usize) {
        match &mut self.payload {
            Payload::Vector(v) => v.reserve(additional),
            _ => self.make_vector(additional),
        }
    }

    /// Set the vector length, padding with `Null` or truncating.
    pub fn resize_vector(&mut self, len: usize) {
        if !matches!(self.payload, Payload::Vector(_)) {
            self.make_vector(len);
        }
        if let Payload::Vector(v) = &mut self.payload {
            v.resize(len, Value::Null);
        }
    }

    pub fn vector(&self) -> Result<&[Value]> {
        match &self.payload {
            Payload::Vector(v) => Ok(v),
            _ => Err(self.mismatch(PayloadKind::Vector)),
        }
    }

    pub fn vector_len(&self) -> Result<usize> {
        self.vector().map(<[Value]>::len)
    }

    pub fn vector_nth(&self, index: usize) -> Result<Option<&Value>> {
        self.vector().map(|v| v.get(index))
    }

    pub fn vector_set_nth(&mut self, index: usize, value: Value) -> Result<()> {
        let id = self.id();
        let Payload::Vector(v) = &mut self.payload else {
            return Err(self.mismatch(PayloadKind::Vector));
        };
        let len = v.len();
        let slot = v.get_mut(index).ok_or(Error::OutOfRange { item: id, index, len })?;
        *slot = value;
        Ok(())
    }

    pub fn vector_append(&mut self, value: Value) -> Result<()> {
        match &mut self.payload {
            Payload::Vector(v) => {
                v.push(value);
                Ok(())
            }
            _ => Err(self.mismatch(PayloadKind::Vector)),
        }
    }

    // --- buffer ---

    pub fn make_buffer(&mut self, capacity: usize) {
        self.payload = Payload::Buffer(String::with_capacity(capacity));
    }

    pub fn reserve_buffer(&mut self, additional: usize) {
        match &mut self.payload {
            Payload::Buffer(b) => b.reserve(additional),
            _ => self.make_buffer(additional),
        }
    }

    pub fn append_buffer(&mut self, text: &str) -> Result<()> {
        match &mut self.payload {
            Payload::Buffer(b) => {
                b.push_str(text);
                Ok(())
            }
            _ => Err(self.mismatch(PayloadKind::Buffer)),
        }
    }

    pub fn buffer_str(&self) -> Result<&str> {
        match &self.payload {
            Payload::Buffer(b) => Ok(b),
            _ => Err(self.mismatch(PayloadKind::Buffer)),
        }
    }

    // --- queue ---

    pub fn make_queue(&mut self) {
        self.payload = Payload::Queue(VecDeque::new());
    }

    pub fn queue_append(&mut self, value: Value) -> Result<()> {
        match &mut self.payload {
            Payload::Queue(q) => {
                q.push_back(value);
                Ok(())
            }
            _ => Err(self.mismatch(PayloadKind::Queue)),
        }
    }

    /// Pop the head of the queue; `None` when empty.
    pub fn queue_pop(&mut self) -> Result<Option<Value>> {
        match &mut self.payload {
            Payload::Queue(q) => Ok(q.pop_front()),
            _ => Err(self.mismatch(PayloadKind::Queue)),
        }
    }

    pub fn queue_len(&self) -> Result<usize> {
        match &self.payload {
            Payload::Queue(q) => Ok(q.len()),
            _ => Err(self.mismatch(PayloadKind::Queue)),
        }
    }

    // --- dictionary ---

    pub fn make_dictionary(&mut self, capacity: usize) {
        self.payload = Payload::Dictionary(Dictionary::with_capacity(capacity));
    }

    pub fn reserve_dictionary(&mut self, capacity: usize) {
        match &mut self.payload {
            Payload::Dictionary(d) => d.reserve(capacity),
            _ => self.make_dictionary(capacity),
        }
    }

    fn dictionary(&self) -> Result<&Dictionary> {
        match &self.payload {
            Payload::Dictionary(d) => Ok(d),
            _ => Err(self.mismatch(PayloadKind::Dictionary)),
        }
    }

    pub fn dictionary_put(&mut self, key: &str, value: Value) -> Result<()> {
        match &mut self.payload {
            Payload::Dictionary(d) => {
                d.put(key, value);
                Ok(())
            }
            _ => Err(self.mismatch(PayloadKind::Dictionary)),
        }
    }

    pub fn dictionary_get(&self, key: &str) -> Result<Option<&Value>> {
        self.dictionary().map(|d| d.get(key))
    }

    pub fn dictionary_remove(&mut self, key: &str) -> Result<Option<Value>> {
        match &mut self.payload {
            Payload::Dictionary(d) => Ok(d.remove(key)),
            _ => Err(self.mismatch(PayloadKind::Dictionary)),
        }
    }

    pub fn dictionary_len(&self) -> Result<usize> {
        self.dictionary().map(Dictionary::len)
    }

    pub fn dictionary_capacity(&self) -> Result<usize> {
        self.dictionary().map(Dictionary::capacity)
    }

    // --- closure ---

    /// Turn the payload into a closure of `fun`; missing captures are `Null`.
    pub fn make_closure(&mut self, fun: Arc<ClosureFn>, captures: impl IntoIterator<Item = Value>) {
        self.payload = Payload::Closure(Closure::new(fun, captures));
    }

    pub fn closure(&self) -> Result<&Closure> {
        match &self.payload {
            Payload::Closure(c) => Ok(c),
            _ => Err(self.mismatch(PayloadKind::Closure)),
        }
    }

    pub fn closure_function(&self) -> Result<&Arc<ClosureFn>> {
        self.closure().map(Closure::function)
    }

    pub fn closure_nth(&self, index: usize) -> Result<&Value> {
        let closure = self.closure()?;
        closure.captures.get(index).ok_or(Error::OutOfRange {
            item: self.id(),
            index,
            len: closure.captures.len(),
        })
    }

    pub fn closure_set_nth(&mut self, index: usize, value: Value) -> Result<()> {
        let id = self.id();
        let Payload::Closure(c) = &mut self.payload else {
            return Err(self.mismatch(PayloadKind::Closure));
        };
        let len = c.captures.len();
        let slot = c.captures.get_mut(index).ok_or(Error::OutOfRange { item: id, index, len })?;
        *slot = value;
        Ok(())
    }
}
