//! Layout Compiler: turns a class's field declarations into a fixed-size byte
//! schema, and encodes/decodes field values at their offsets.
//!
//! # Invariants
//! - Offsets are strictly increasing in declaration order and never overlap.
//! - The sum of field sizes equals the schema's total byte length.
//! - A schema is compiled once, at registration, and is immutable afterwards.
//! - Size and kind errors surface at registration, never at runtime.

pub mod codec;
mod error;
mod field;
mod schema;
mod value;

pub use codec::{decode, encode};
pub use error::LayoutError;
pub use field::{FieldDecl, FieldDescriptor, FieldKind};
pub use schema::{Schema, SchemaRegistry, compile};
pub use value::FieldValue;
