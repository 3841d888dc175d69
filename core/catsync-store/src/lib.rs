//! SQLite storage layer for catsync.
//!
//! Maps the catalog [`Schema`](catsync_model::Schema) onto physical tables and
//! applies streamed records to them.
//!
//! # Architecture
//!
//! - [`provision`] derives `CREATE TABLE IF NOT EXISTS` statements from the schema
//! - [`BatchWriter`] applies insert / upsert / delete batches, one transaction
//!   per batch, reporting a [`BatchOutcome`] instead of failing the caller
//! - [`StateReader`] answers "latest local change" and "local item count"
//! - [`values`] coerces incoming JSON values to the declared column types
//!
//! [`SqliteStore`] implements all of the above over a single connection.

mod error;
mod ident;
pub mod provision;
mod sqlite;
mod state;
pub mod values;
mod writer;

pub use error::{StorageError, StorageResult};
pub use ident::quote_ident;
pub use sqlite::SqliteStore;
pub use state::StateReader;
pub use writer::{BatchOutcome, BatchWriter, Row};
