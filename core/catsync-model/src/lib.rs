//! Resource catalog schema model for catsync.
//!
//! The remote catalog describes every resource it serves with a schema
//! document. This crate turns that document into typed values:
//! - [`Schema`]: the ordered set of resources plus an O(1) column type lookup
//! - [`Resource`]: a named, schema-described collection (one storage table)
//! - [`Attribute`]: one column with its [`AttributeType`] and key role
//!
//! The schema is built once per run and is read-only afterwards; storage
//! provisioning and ingestion only ever borrow it.

mod attribute_type;
mod error;
mod schema;

pub use attribute_type::AttributeType;
pub use error::{SchemaParseError, SchemaResult};
pub use schema::{Attribute, Resource, Schema};
