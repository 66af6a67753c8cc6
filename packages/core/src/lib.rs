//! Datapipe core — schema-checked records, the binding protocol, predicate
//! expressions, pipe capability traits, and the in-memory pipes/combinators.
//!
//! Concrete backends (relational, block, delimited file) live in
//! `datapipe-backends`; this crate is the model they all share.

pub mod binding;
pub mod collection;
pub mod combinators;
pub mod entity;
pub mod error;
pub mod expr;
pub mod pipe;
pub mod record;
pub mod schema;
pub mod value;

pub use binding::{Binding, SourceHandle, SourceSubscription};
pub use collection::CollectionPipe;
pub use combinators::{Distribute, Merge};
pub use entity::{Entity, EntityDescriptor, EntityDescriptorBuilder};
pub use error::PipeError;
pub use expr::{eval, field, index, lit, mentions_placeholder, BinaryOp, Expr, UnaryOp};
pub use pipe::{stream_filtered, AddPipe, Pipe, QueryPipe, RecordStream};
pub use record::{DataPort, Record, RecordSubscription};
pub use schema::{Schema, SchemaError};
pub use value::{Value, ValueKind};
