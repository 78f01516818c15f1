//! Managed value and object substrate of the Ember engine.
//!
//! Ember targets hosts with tens of kilobytes of heap: every reference
//! inside the managed heap is a 16-bit offset from the arena base, so
//! the whole object graph fits 512 KiB with 8-byte alignment. This crate
//! implements the layers everything else is built on: the
//! compressed-pointer arena, the 32-bit tagged value, the string store
//! with its interning tables, the property store and its hashmap
//! accelerator, the object layer, the mark-sweep collector, and the
//! number codec whose printed forms must parse back bit-exactly.
//!
//! The bytecode compiler and interpreter, the built-in library, regexp,
//! snapshots and the module loader are external collaborators; this
//! crate defines the contracts they consume.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

pub mod consts;
pub mod error;
pub mod gc;
pub mod host;
pub mod number;
pub mod string;

mod api;
mod context;
mod heap;
mod object;
mod value;

pub use context::{Engine, EngineConfig};
pub use object::{ClassId, NativeFunction, NativeInfo, PropertyRef};
pub use value::Value;

pub mod prelude {
    //! Everything a typical embedder needs.

    pub use ember_types::{
        Cp, DirectStringKind, ErrorKind, LexicalEnvKind, ObjectFlags, ObjectKind, PathStyle,
        PropertyFlags, SimpleValue, StringContainer, ValueTag,
    };

    pub use crate::context::{Engine, EngineConfig};
    pub use crate::error::{EngineError, FatalReason};
    pub use crate::gc::GcPressure;
    pub use crate::host::{DefaultHost, HostPort};
    pub use crate::number::{number_to_int32, number_to_uint32, parse_number, print_number};
    pub use crate::object::{ClassId, NativeFunction, NativeInfo, PropertyRef};
    pub use crate::string::{magic_string_value, MagicString, StringBuilder};
    pub use crate::value::Value;
}
