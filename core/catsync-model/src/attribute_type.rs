use std::fmt;
use std::str::FromStr;

/// Semantic type of an attribute, as declared by the remote catalog.
///
/// The catalog uses Go-flavoured type tags (`int64`, `[]string`,
/// `database.nullint16`, ...). Parsing is case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    Int64,
    Int32,
    Int16,
    Int,
    NullInt16,
    String,
    Float64,
    Float32,
    Uuid,
    Time,
    DateTime,
    Date,
    StringArray,
    Bytes,
    Bool,
    Json,
}

impl AttributeType {
    /// Every type in the catalog.
    pub const ALL: [AttributeType; 16] = [
        Self::Int64,
        Self::Int32,
        Self::Int16,
        Self::Int,
        Self::NullInt16,
        Self::String,
        Self::Float64,
        Self::Float32,
        Self::Uuid,
        Self::Time,
        Self::DateTime,
        Self::Date,
        Self::StringArray,
        Self::Bytes,
        Self::Bool,
        Self::Json,
    ];

    /// The catalog's type tag for this type.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Int64 => "int64",
            Self::Int32 => "int32",
            Self::Int16 => "int16",
            Self::Int => "int",
            Self::NullInt16 => "database.nullint16",
            Self::String => "string",
            Self::Float64 => "float64",
            Self::Float32 => "float32",
            Self::Uuid => "uuid",
            Self::Time => "time",
            Self::DateTime => "datetime",
            Self::Date => "date",
            Self::StringArray => "[]string",
            Self::Bytes => "bytes",
            Self::Bool => "bool",
            Self::Json => "json",
        }
    }

    /// Returns true for every integer width.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Self::Int64 | Self::Int32 | Self::Int16 | Self::Int | Self::NullInt16
        )
    }

    /// Returns true for the point-in-time types (`time`, `datetime`).
    pub fn is_timestamp(self) -> bool {
        matches!(self, Self::Time | Self::DateTime)
    }
}

impl FromStr for AttributeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.tag() == lowered)
            .ok_or_else(|| s.to_string())
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
