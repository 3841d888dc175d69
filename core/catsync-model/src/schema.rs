use crate::attribute_type::AttributeType;
use crate::error::{SchemaParseError, SchemaResult};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// One column of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub attribute_type: AttributeType,
    pub is_primary_key: bool,
    /// Reference to another resource's attribute, kept as declared.
    pub foreign_key: Option<String>,
}

impl Attribute {
    /// Creates a plain (non-key) attribute.
    pub fn new(name: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attribute_type,
            is_primary_key: false,
            foreign_key: None,
        }
    }

    /// Creates a primary-key attribute.
    pub fn primary_key(name: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self {
            is_primary_key: true,
            ..Self::new(name, attribute_type)
        }
    }
}

/// A named, schema-described collection of records. Maps to one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub name: String,
    /// Declared order; determines column order at table creation.
    pub attributes: Vec<Attribute>,
    pub allowed_query_modes: Vec<String>,
}

impl Resource {
    pub fn new(name: impl Into<String>, attributes: Vec<Attribute>) -> Self {
        Self {
            name: name.into(),
            attributes,
            allowed_query_modes: Vec::new(),
        }
    }

    /// The primary-key attribute. Composite keys are not modelled; the first
    /// attribute flagged as key wins.
    pub fn primary_key(&self) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.is_primary_key)
    }

    /// Looks up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Returns true if the catalog allows the given query mode for this resource.
    pub fn allows(&self, mode: &str) -> bool {
        self.allowed_query_modes.iter().any(|m| m == mode)
    }
}

/// The full catalog schema.
///
/// Built once from the server's schema response. The resource → column →
/// type lookup is derived at construction and never goes stale because the
/// schema is immutable afterwards.
#[derive(Debug, Clone)]
pub struct Schema {
    resources: Vec<Resource>,
    lookup: HashMap<String, HashMap<String, AttributeType>>,
}

impl Schema {
    /// Builds a schema from resources, rejecting duplicate names.
    pub fn new(resources: Vec<Resource>) -> SchemaResult<Self> {
        let mut lookup = HashMap::with_capacity(resources.len());
        for resource in &resources {
            let mut columns = HashMap::with_capacity(resource.attributes.len());
            for attr in &resource.attributes {
                if columns
                    .insert(attr.name.clone(), attr.attribute_type)
                    .is_some()
                {
                    return Err(SchemaParseError::DuplicateAttribute {
                        resource: resource.name.clone(),
                        attribute: attr.name.clone(),
                    });
                }
            }
            if lookup.insert(resource.name.clone(), columns).is_some() {
                return Err(SchemaParseError::DuplicateResource(resource.name.clone()));
            }
        }
        Ok(Self { resources, lookup })
    }

    /// Parses the raw schema document:
    ///
    /// ```json
    /// {"resources": {"promotions": {
    ///     "attributes": [{"id": {"primary_key": true, "foreign_key": null, "type": "uuid"}}],
    ///     "allowedQueryModes": ["full", "delta"]}}}
    /// ```
    pub fn parse(document: &Value) -> SchemaResult<Self> {
        let resources = document
            .get("resources")
            .ok_or_else(|| SchemaParseError::missing("resources", "schema document"))?
            .as_object()
            .ok_or_else(|| SchemaParseError::shape("resources", "object"))?;

        let parsed = resources
            .iter()
            .map(|(name, body)| parse_resource(name, body))
            .collect::<SchemaResult<Vec<_>>>()?;

        Self::new(parsed)
    }

    /// Parses a schema document from JSON text.
    pub fn from_json_str(text: &str) -> SchemaResult<Self> {
        let document: Value = serde_json::from_str(text)?;
        Self::parse(&document)
    }

    /// All resources in document order.
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Looks up a resource by name.
    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Resolves the declared type of `resource.column`.
    pub fn column_type(&self, resource: &str, column: &str) -> Option<AttributeType> {
        self.lookup.get(resource)?.get(column).copied()
    }
}

fn parse_resource(name: &str, body: &Value) -> SchemaResult<Resource> {
    let context = format!("resource `{name}`");
    let body = body
        .as_object()
        .ok_or_else(|| SchemaParseError::shape(context.clone(), "object"))?;

    let raw_attributes = body
        .get("attributes")
        .ok_or_else(|| SchemaParseError::missing("attributes", context.clone()))?
        .as_array()
        .ok_or_else(|| SchemaParseError::shape(format!("{context} attributes"), "array"))?;

    // Each entry is a single-key object: {"<attribute name>": {...}}.
    let mut attributes = Vec::with_capacity(raw_attributes.len());
    for entry in raw_attributes {
        let entry = entry.as_object().ok_or_else(|| {
            SchemaParseError::shape(format!("{context} attribute entry"), "object")
        })?;
        for (attr_name, definition) in entry {
            attributes.push(parse_attribute(name, attr_name, definition)?);
        }
    }

    let allowed_query_modes = match body.get("allowedQueryModes") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(modes)) => modes
            .iter()
            .map(|m| {
                m.as_str().map(str::to_string).ok_or_else(|| {
                    SchemaParseError::shape(format!("{context} allowedQueryModes"), "string array")
                })
            })
            .collect::<SchemaResult<Vec<_>>>()?,
        Some(_) => {
            return Err(SchemaParseError::shape(
                format!("{context} allowedQueryModes"),
                "string array",
            ));
        }
    };

    Ok(Resource {
        name: name.to_string(),
        attributes,
        allowed_query_modes,
    })
}

fn parse_attribute(resource: &str, name: &str, definition: &Value) -> SchemaResult<Attribute> {
    let context = format!("attribute `{resource}.{name}`");
    let definition: &Map<String, Value> = definition
        .as_object()
        .ok_or_else(|| SchemaParseError::shape(context.clone(), "object"))?;

    let type_tag = definition
        .get("type")
        .ok_or_else(|| SchemaParseError::missing("type", context.clone()))?
        .as_str()
        .ok_or_else(|| SchemaParseError::shape(format!("{context} type"), "string"))?;

    let attribute_type =
        type_tag
            .parse::<AttributeType>()
            .map_err(|type_tag| SchemaParseError::UnknownType {
                resource: resource.to_string(),
                attribute: name.to_string(),
                type_tag,
            })?;

    let is_primary_key = match definition.get("primary_key") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(_) => {
            return Err(SchemaParseError::shape(
                format!("{context} primary_key"),
                "boolean",
            ));
        }
    };

    let foreign_key = match definition.get("foreign_key") {
        None | Some(Value::Null) | Some(Value::Bool(false)) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    };

    Ok(Attribute {
        name: name.to_string(),
        attribute_type,
        is_primary_key,
        foreign_key,
    })
}
