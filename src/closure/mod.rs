//! # Closure functions
//!
//! A closure payload couples captured values with a *named* native function.
//! Only the name is persisted; on load the name is looked up in the
//! [`ClosureRegistry`], which plugin modules fill before any data is read.
//!
//! | Kind | Routine signature |
//! |------|-------------------|
//! | `OneValue` | `(store, closure item, arg) → value` |
//! | `TwoValues` | `(store, closure item, arg1, arg2) → value` |
//! | `Action` | `(store, closure item) → ()` |

use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;

use crate::model::{ItemId, Value};
use crate::store::Store;
use crate::{Error, Result};

pub type OneValueFn = fn(&mut Store, ItemId, &Value) -> Result<Value>;
pub type TwoValuesFn = fn(&mut Store, ItemId, &Value, &Value) -> Result<Value>;
pub type ActionFn = fn(&mut Store, ItemId) -> Result<()>;

/// Call shape of a closure function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClosureKind {
    OneValue,
    TwoValues,
    Action,
}

impl ClosureKind {
    /// Number of call arguments (not captures) the routine takes.
    pub fn call_arity(self) -> usize {
        match self {
            ClosureKind::OneValue => 1,
            ClosureKind::TwoValues => 2,
            ClosureKind::Action => 0,
        }
    }
}

/// The executable part of a closure function.
#[derive(Clone, Copy)]
pub enum ClosureRoutine {
    OneValue(OneValueFn),
    TwoValues(TwoValuesFn),
    Action(ActionFn),
}

/// Descriptor published by a plugin: `{name, arity, kind, fn}`.
///
/// `arity` is the number of captured values a closure of this function holds.
#[derive(Clone)]
pub struct ClosureFn {
    name: String,
    arity: usize,
    routine: ClosureRoutine,
}

impl ClosureFn {
    pub fn new(name: impl Into<String>, arity: usize, routine: ClosureRoutine) -> Self {
        Self { name: name.into(), arity, routine }
    }

    pub fn one_value(name: impl Into<String>, arity: usize, f: OneValueFn) -> Self {
        Self::new(name, arity, ClosureRoutine::OneValue(f))
    }

    pub fn two_values(name: impl Into<String>, arity: usize, f: TwoValuesFn) -> Self {
        Self::new(name, arity, ClosureRoutine::TwoValues(f))
    }

    pub fn action(name: impl Into<String>, arity: usize, f: ActionFn) -> Self {
        Self::new(name, arity, ClosureRoutine::Action(f))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn kind(&self) -> ClosureKind {
        match self.routine {
            ClosureRoutine::OneValue(_) => ClosureKind::OneValue,
            ClosureRoutine::TwoValues(_) => ClosureKind::TwoValues,
            ClosureRoutine::Action(_) => ClosureKind::Action,
        }
    }

    pub fn routine(&self) -> ClosureRoutine {
        self.routine
    }
}

/// Two descriptors are the same function when name and arity agree.
impl PartialEq for ClosureFn {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.arity == other.arity
    }
}

impl fmt::Debug for ClosureFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosureFn")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("kind", &self.kind())
            .finish()
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Mapping `name → descriptor`, written while modules load.
#[derive(Debug, Default)]
pub struct ClosureRegistry {
    functions: HashMap<String, Arc<ClosureFn>>,
}

impl ClosureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a descriptor. A name can only be registered once.
    pub fn register(&mut self, fun: ClosureFn) -> Result<Arc<ClosureFn>> {
        if self.functions.contains_key(fun.name()) {
            return Err(Error::Semantic(format!(
                "closure function `{}` is already registered",
                fun.name()
            )));
        }
        tracing::debug!(name = fun.name(), arity = fun.arity, kind = ?fun.kind(), "registered closure function");
        let fun = Arc::new(fun);
        self.functions.insert(fun.name.clone(), Arc::clone(&fun));
        Ok(fun)
    }

    /// Move every descriptor of `other` in, or none of them if a name is
    /// already taken. Returns the names moved, sorted.
    pub fn absorb(&mut self, other: ClosureRegistry) -> Result<Vec<String>> {
        if let Some(taken) = other.names().into_iter().find(|name| self.contains(name)) {
            return Err(Error::Semantic(format!("closure function `{taken}` is already registered")));
        }
        let mut names: Vec<String> = other.functions.keys().cloned().collect();
        names.sort_unstable();
        self.functions.extend(other.functions);
        Ok(names)
    }

    pub fn find(&self, name: &str) -> Option<Arc<ClosureFn>> {
        self.functions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
