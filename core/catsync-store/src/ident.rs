use crate::error::{StorageError, StorageResult};

/// Validates an identifier and returns it double-quoted for use in SQL text.
///
/// Resource and column names come from the catalog schema and double as
/// table and column names, so they are restricted to `[A-Za-z_][A-Za-z0-9_]*`.
pub fn quote_ident(name: &str) -> StorageResult<String> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if !valid {
        return Err(StorageError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{name}\""))
}
