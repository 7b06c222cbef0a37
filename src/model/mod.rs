//! # Item Graph Model
//!
//! The data that the store keeps and the dumper writes: values, items,
//! payloads and dataspaces.
//!
//! Design rule: this module is pure data without I/O or file formats. Items
//! refer to each other by [`ItemId`] only; the [`Store`](crate::store::Store)
//! owns every item and resolves ids, which keeps cyclic graphs free of
//! ownership cycles.

pub mod dataspace;
pub mod item;
pub mod payload;
pub mod value;

pub use dataspace::{Dataspace, DataspaceRegistry, DEFAULT_TRANSIENT_DATASPACE, is_plain_name};
pub use item::{AttributeMap, Item, ItemId};
pub use payload::{Captures, Closure, Dictionary, Payload, PayloadKind};
pub use value::{ItemSet, Node, Sons, Value, ValueKind};
