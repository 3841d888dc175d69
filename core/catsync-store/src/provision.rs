//! Schema-driven table provisioning.

use crate::error::{StorageError, StorageResult};
use crate::ident::quote_ident;
use catsync_model::{Attribute, AttributeType, Resource, Schema};
use rusqlite::Connection;
use tracing::{debug, error, info};

/// Random RFC 4122 version-4 uuid, as a SQLite expression.
const RANDOM_UUID_DEFAULT: &str = "(lower(hex(randomblob(4)) || '-' || hex(randomblob(2)) || '-4' \
     || substr(hex(randomblob(2)), 2) || '-' || substr('89ab', 1 + (abs(random()) % 4), 1) \
     || substr(hex(randomblob(2)), 2) || '-' || hex(randomblob(6))))";

/// Declared SQLite column type for an attribute type.
pub fn column_type_name(ty: AttributeType) -> &'static str {
    match ty {
        AttributeType::Int64 => "BIGINT",
        AttributeType::Int32 | AttributeType::Int16 | AttributeType::Int | AttributeType::NullInt16 => {
            "INT"
        }
        AttributeType::String => "VARCHAR",
        AttributeType::Float64 | AttributeType::Float32 => "REAL",
        AttributeType::Uuid => "UUID",
        AttributeType::Time | AttributeType::DateTime => "TIMESTAMP",
        AttributeType::Date => "DATE",
        // JSON array text
        AttributeType::StringArray => "TEXT",
        AttributeType::Bytes => "BLOB",
        AttributeType::Bool => "BOOLEAN",
        AttributeType::Json => "JSON",
    }
}

/// Column definition for one attribute.
///
/// Integer keys become auto-incrementing rowid aliases (SQLite only allows
/// `AUTOINCREMENT` on a column declared exactly `INTEGER PRIMARY KEY`); uuid
/// keys get a random-uuid default.
pub fn column_definition(attr: &Attribute) -> StorageResult<String> {
    let name = quote_ident(&attr.name)?;
    if !attr.is_primary_key {
        return Ok(format!("{name} {}", column_type_name(attr.attribute_type)));
    }

    let definition = match attr.attribute_type {
        t if t.is_integer() => format!("{name} INTEGER PRIMARY KEY AUTOINCREMENT"),
        AttributeType::Uuid => format!("{name} UUID PRIMARY KEY DEFAULT {RANDOM_UUID_DEFAULT}"),
        other => format!("{name} {} PRIMARY KEY", column_type_name(other)),
    };
    Ok(definition)
}

/// `CREATE TABLE IF NOT EXISTS` for a resource, columns in declared order.
pub fn create_table_sql(resource: &Resource) -> StorageResult<String> {
    let table = quote_ident(&resource.name)?;
    let columns = resource
        .attributes
        .iter()
        .map(column_definition)
        .collect::<StorageResult<Vec<_>>>()?;
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {table} ({})",
        columns.join(", ")
    ))
}

/// Idempotently creates one table per resource.
///
/// Tables are created independently: a failure for one resource does not
/// stop the others, but every failure is reported in the returned error.
pub fn ensure_tables(conn: &Connection, schema: &Schema) -> StorageResult<()> {
    let mut failed = Vec::new();

    for resource in schema.resources() {
        let result = create_table_sql(resource)
            .and_then(|sql| {
                debug!(resource = %resource.name, %sql, "ensuring table");
                conn.execute_batch(&sql).map_err(StorageError::from)
            });

        if let Err(e) = result {
            error!(resource = %resource.name, error = %e, "table creation failed");
            failed.push((resource.name.clone(), e.to_string()));
        }
    }

    if failed.is_empty() {
        info!(tables = schema.resources().len(), "storage provisioned");
        Ok(())
    } else {
        Err(StorageError::Provisioning { failed })
    }
}

/// Physical columns of a table as `(name, declared type)`, in table order.
pub fn table_columns(conn: &Connection, table: &str) -> StorageResult<Vec<(String, String)>> {
    let table = quote_ident(table)?;
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let columns = stmt
        .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}
