//! Error types for schema parsing.

use thiserror::Error;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaParseError>;

/// Errors raised while turning a schema document into a [`crate::Schema`].
#[derive(Debug, Error)]
pub enum SchemaParseError {
    /// The document is not valid JSON.
    #[error("invalid schema JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A required field is absent.
    #[error("missing field `{field}` in {context}")]
    MissingField { field: String, context: String },

    /// A field has the wrong JSON shape.
    #[error("unexpected shape for {context}: expected {expected}")]
    UnexpectedShape { context: String, expected: &'static str },

    /// The attribute type tag is not part of the catalog.
    #[error("unknown attribute type `{type_tag}` for {resource}.{attribute}")]
    UnknownType {
        resource: String,
        attribute: String,
        type_tag: String,
    },

    /// Two resources share a name.
    #[error("duplicate resource `{0}`")]
    DuplicateResource(String),

    /// Two attributes of one resource share a name.
    #[error("duplicate attribute `{attribute}` in resource `{resource}`")]
    DuplicateAttribute { resource: String, attribute: String },
}

impl SchemaParseError {
    pub(crate) fn missing(field: &str, context: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.to_string(),
            context: context.into(),
        }
    }

    pub(crate) fn shape(context: impl Into<String>, expected: &'static str) -> Self {
        Self::UnexpectedShape {
            context: context.into(),
            expected,
        }
    }
}
