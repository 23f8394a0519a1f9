//! Core abstractions shared by the copy and export pipelines.
//!
//! - [`schema`]: table and field descriptors with role lookups
//! - [`value`]: cell values and identifier-map keys
//! - [`identifier`]: GUID formatting and field-name quoting
//! - [`traits`]: the [`Store`] trait

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use identifier::{format_guid, parse_guid, FieldDelimiter};
pub use schema::{tables, Field, FieldRole, FieldType, GeometryTable, TableSchema};
pub use traits::Store;
pub use value::{Identifier, Row, Value};
