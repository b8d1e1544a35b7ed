//! Field-descriptor-driven decode/encode engine for query-language
//! response payloads.
//!
//! A server response arrives as an untyped token tree
//! (`serde_json::Value`). A compile-time-known field selection (a
//! fragment) dictates the shape of the strongly typed, immutable value
//! tree it decodes into, and the same descriptors drive the re-encode
//! back to the wire shape.
//!
//! Data flow:
//!
//! ```text
//! token object ── Reader(FieldTable) ── Mapper ──► TypedNode
//! TypedNode ── Mapper(FieldTable) ── Writer ──► token object
//! ```
//!
//! Design goals:
//! - Absent, null, and present are three distinct states, on the wire
//!   and in the value tree.
//! - Decode is all-or-nothing; encode is total over well-formed nodes;
//!   `decode(encode(v)) == v`.
//! - Descriptor tables, mapper graphs, and the scalar registry are
//!   built once and shared read-only across threads.

pub mod cli;
pub mod field;
pub mod fragment;
pub mod input;
pub mod jq_exec;
pub mod mapper;
pub mod reader;
pub mod scalar;
pub mod value;
pub mod writer;

pub use field::{FieldDescriptor, FieldKind, FieldTable, TableError, TypeConditions};
pub use fragment::{BundleError, Fragment, FragmentBundle, TypeSpec};
pub use mapper::{decode, decode_default, encode, encode_default, Mapper};
pub use reader::{DecodeError, Reader};
pub use scalar::{default_registry, CustomValue, ScalarCodec, ScalarError, ScalarLit, ScalarRegistry};
pub use value::{NodeBuilder, Slot, TypedList, TypedNode, TypedValue};
pub use writer::Writer;
