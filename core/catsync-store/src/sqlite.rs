//! SQLite-backed implementation of the storage traits.

use crate::error::{StorageError, StorageResult};
use crate::ident::quote_ident;
use crate::provision;
use crate::state::StateReader;
use crate::values::{parse_timestamp, to_sql_value};
use crate::writer::{BatchOutcome, BatchWriter, Row};
use catsync_model::{Attribute, Resource, Schema};
use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params_from_iter};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error};

/// Local relational store for synchronized resources.
///
/// Holds the catalog schema so writes can resolve key columns and coerce
/// values to the declared column types.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    schema: Arc<Schema>,
}

#[derive(Clone, Copy, Debug)]
enum WriteMode {
    Insert,
    Upsert,
}

impl SqliteStore {
    /// Opens (or creates) a store from a connection string: a file path,
    /// optionally prefixed with `sqlite://`, or `:memory:`.
    pub fn open(connection_string: &str, schema: Arc<Schema>) -> StorageResult<Self> {
        let path = connection_string
            .strip_prefix("sqlite://")
            .or_else(|| connection_string.strip_prefix("sqlite:"))
            .unwrap_or(connection_string);

        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        Ok(Self::from_connection(conn, schema))
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory(schema: Arc<Schema>) -> StorageResult<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?, schema))
    }

    fn from_connection(conn: Connection, schema: Arc<Schema>) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            schema,
        }
    }

    /// The schema this store was opened with.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Idempotently creates a table for every resource of the schema.
    pub fn ensure_tables(&self) -> StorageResult<()> {
        let conn = self.lock()?;
        provision::ensure_tables(&conn, &self.schema)
    }

    /// Physical `(name, declared type)` columns of a resource's table.
    pub fn table_columns(&self, resource: &str) -> StorageResult<Vec<(String, String)>> {
        let conn = self.lock()?;
        provision::table_columns(&conn, resource)
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    fn resource(&self, name: &str) -> StorageResult<&Resource> {
        self.schema
            .resource(name)
            .ok_or_else(|| StorageError::UnknownResource(name.to_string()))
    }

    /// The conflict / delete key: the declared primary key, else `id`.
    fn key_attribute<'a>(&self, resource: &'a Resource) -> StorageResult<&'a Attribute> {
        resource
            .primary_key()
            .or_else(|| resource.attribute("id"))
            .ok_or_else(|| StorageError::MissingPrimaryKey(resource.name.clone()))
    }

    fn coerce(&self, resource: &str, attr: &Attribute, value: &Value) -> StorageResult<SqlValue> {
        to_sql_value(attr.attribute_type, value).map_err(|reason| StorageError::InvalidValue {
            resource: resource.to_string(),
            column: attr.name.clone(),
            reason,
        })
    }

    fn write_rows(&self, resource: &str, rows: &[Row], mode: WriteMode) -> StorageResult<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let res = self.resource(resource)?;
        let table = quote_ident(&res.name)?;
        let key = match mode {
            WriteMode::Upsert => Some(self.key_attribute(res)?),
            WriteMode::Insert => None,
        };

        // Each row writes exactly the columns it carries; one statement per
        // distinct column set.
        let mut statements: Vec<String> = Vec::new();
        let mut by_columns: HashMap<Vec<&str>, usize> = HashMap::new();
        let mut bound = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(column) = row
                .keys()
                .find(|k| self.schema.column_type(resource, k).is_none())
            {
                return Err(StorageError::UnknownColumn {
                    resource: resource.to_string(),
                    column: column.clone(),
                });
            }

            let columns: Vec<&Attribute> = res
                .attributes
                .iter()
                .filter(|a| row.contains_key(&a.name))
                .collect();
            let values = columns
                .iter()
                .map(|a| self.coerce(resource, a, row.get(&a.name).unwrap_or(&Value::Null)))
                .collect::<StorageResult<Vec<_>>>()?;

            let names: Vec<&str> = columns.iter().map(|a| a.name.as_str()).collect();
            let index = match by_columns.get(&names) {
                Some(&index) => index,
                None => {
                    statements.push(write_sql(&table, &columns, key)?);
                    by_columns.insert(names, statements.len() - 1);
                    statements.len() - 1
                }
            };
            bound.push((index, values));
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut prepared = statements
                .iter()
                .map(|sql| tx.prepare(sql))
                .collect::<Result<Vec<_>, _>>()?;
            for (index, values) in &bound {
                prepared[*index].execute(params_from_iter(values.iter()))?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    fn delete_rows(&self, resource: &str, ids: &[Value]) -> StorageResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let res = self.resource(resource)?;
        let key = self.key_attribute(res)?;
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1",
            quote_ident(&res.name)?,
            quote_ident(&key.name)?
        );

        let bound = ids
            .iter()
            .map(|id| self.coerce(resource, key, id))
            .collect::<StorageResult<Vec<_>>>()?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for id in &bound {
                stmt.execute([id])?;
            }
        }
        tx.commit()?;
        Ok(ids.len())
    }

    fn outcome(op: &str, resource: &str, rows: usize, result: StorageResult<usize>) -> BatchOutcome {
        match result {
            Ok(applied) => {
                debug!(resource, op, rows = applied, "batch committed");
                BatchOutcome::Committed { rows: applied }
            }
            Err(e) => {
                error!(resource, op, rows, error = %e, "batch rolled back");
                BatchOutcome::Failed {
                    rows,
                    error: e.to_string(),
                }
            }
        }
    }
}

/// `INSERT` for one column set; with a key, an upsert on that key.
///
/// Columns absent from the set keep their default on insert and their stored
/// value on conflict.
fn write_sql(table: &str, columns: &[&Attribute], key: Option<&Attribute>) -> StorageResult<String> {
    if columns.is_empty() {
        return Ok(format!("INSERT INTO {table} DEFAULT VALUES"));
    }

    let quoted = columns
        .iter()
        .map(|a| quote_ident(&a.name))
        .collect::<StorageResult<Vec<_>>>()?;
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let mut sql = format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders})",
        quoted.join(", ")
    );

    if let Some(key) = key {
        let key_quoted = quote_ident(&key.name)?;
        let updates = columns
            .iter()
            .zip(&quoted)
            .filter(|(a, _)| a.name != key.name)
            .map(|(_, q)| format!("{q} = excluded.{q}"))
            .collect::<Vec<_>>();
        if updates.is_empty() {
            sql.push_str(&format!(" ON CONFLICT ({key_quoted}) DO NOTHING"));
        } else {
            sql.push_str(&format!(
                " ON CONFLICT ({key_quoted}) DO UPDATE SET {}",
                updates.join(", ")
            ));
        }
    }
    Ok(sql)
}

impl BatchWriter for SqliteStore {
    fn insert_batch(&self, resource: &str, rows: &[Row]) -> BatchOutcome {
        let result = self.write_rows(resource, rows, WriteMode::Insert);
        Self::outcome("insert", resource, rows.len(), result)
    }

    fn upsert_batch(&self, resource: &str, rows: &[Row]) -> BatchOutcome {
        let result = self.write_rows(resource, rows, WriteMode::Upsert);
        Self::outcome("upsert", resource, rows.len(), result)
    }

    fn delete_batch(&self, resource: &str, ids: &[Value]) -> BatchOutcome {
        let result = self.delete_rows(resource, ids);
        Self::outcome("delete", resource, ids.len(), result)
    }
}

impl StateReader for SqliteStore {
    fn latest_state(&self, resource: &str) -> StorageResult<Option<DateTime<Utc>>> {
        let res = self.resource(resource)?;
        let table = quote_ident(&res.name)?;
        let selects = ["created_at", "updated_at"]
            .into_iter()
            .filter(|c| res.attribute(c).is_some())
            .map(|c| -> StorageResult<String> {
                Ok(format!("SELECT {} AS ts FROM {table}", quote_ident(c)?))
            })
            .collect::<StorageResult<Vec<_>>>()?;
        if selects.is_empty() {
            return Err(StorageError::NoChangeTracking(resource.to_string()));
        }

        let sql = format!("SELECT MAX(ts) FROM ({})", selects.join(" UNION ALL "));
        let conn = self.lock()?;
        let latest: Option<String> = conn.query_row(&sql, [], |row| row.get(0))?;
        drop(conn);

        latest
            .map(|text| {
                parse_timestamp(&text).ok_or_else(|| StorageError::InvalidValue {
                    resource: resource.to_string(),
                    column: "created_at/updated_at".to_string(),
                    reason: format!("unparsable stored timestamp {text:?}"),
                })
            })
            .transpose()
    }

    fn total_items(&self, resource: &str) -> StorageResult<u64> {
        let table = quote_ident(&self.resource(resource)?.name)?;
        let conn = self.lock()?;
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })?;
        Ok(count.max(0) as u64)
    }
}
