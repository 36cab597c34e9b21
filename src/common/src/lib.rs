extern crate log;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlparser::ast as sqlast;
use sqlparser::parser::ParserError;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::io;
pub mod ast;
pub mod logical_plan;
pub use ast::AggOp;
pub mod catalog;
pub mod database;
pub mod ids;
pub mod sql_parser;
pub mod table;
pub mod testutil;

/// Custom error type.
#[derive(Debug, Clone, PartialEq)]
pub enum CrustyError {
    /// IO Errors.
    IOError(String),
    /// Custom errors.
    CrustyError(String),
    /// SQL text the front end could not parse.
    ParseError(String),
    /// Validation errors.
    ValidationError(String),
    /// Query shapes that are well formed but not valid SQL semantics.
    SemanticError(String),
    /// Constructs the planner refuses to transform.
    UnsupportedConstruct(String),
    /// Catalog lookup failures, passed through unmodified.
    CatalogError(String),
}

impl fmt::Display for CrustyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                CrustyError::ValidationError(s) => format!("Validation Error: {}", s),
                CrustyError::SemanticError(s) => format!("Semantic Error: {}", s),
                CrustyError::UnsupportedConstruct(s) => format!("Unsupported: {}", s),
                CrustyError::CatalogError(s) => format!("Catalog Error: {}", s),
                CrustyError::ParseError(s) => format!("Parse Error: {}", s),
                CrustyError::CrustyError(s) => format!("Crusty Error: {}", s),
                CrustyError::IOError(s) => s.to_string(),
            }
        )
    }
}

// Implement std::convert::From for AppError; from io::Error
impl From<io::Error> for CrustyError {
    fn from(error: io::Error) -> Self {
        CrustyError::IOError(error.to_string())
    }
}

impl From<ParserError> for CrustyError {
    fn from(error: ParserError) -> Self {
        CrustyError::ParseError(error.to_string())
    }
}

impl Error for CrustyError {}

/// Handle schemas.
#[derive(PartialEq, Clone, Debug)]
pub struct TableSchema {
    /// Attributes of the schema.
    attributes: Vec<Attribute>,
    /// Mapping from attribute name to order in the schema.
    name_map: HashMap<String, usize>,
}

impl Serialize for TableSchema {
    /// Custom serialize to avoid serializing name_map.
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.attributes.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TableSchema {
    /// Custom deserialize to avoid serializing name_map.
    fn deserialize<D>(deserializer: D) -> Result<TableSchema, D::Error>
    where
        D: Deserializer<'de>,
    {
        let attrs = Vec::deserialize(deserializer)?;
        Ok(TableSchema::new(attrs))
    }
}

impl TableSchema {
    /// Create a new schema.
    ///
    /// Attribute names are stored lowercase so lookups match unquoted SQL identifiers.
    ///
    /// # Arguments
    ///
    /// * `attributes` - Attributes of the schema in the order that they are in the schema.
    pub fn new(attributes: Vec<Attribute>) -> Self {
        let attributes: Vec<Attribute> = attributes
            .into_iter()
            .map(|mut attr| {
                attr.name = attr.name.to_lowercase();
                attr
            })
            .collect();
        let mut name_map = HashMap::new();
        for (i, attr) in attributes.iter().enumerate() {
            name_map.insert(attr.name().to_string(), i);
        }
        Self {
            attributes,
            name_map,
        }
    }

    /// Create a new schema with the given names and dtypes.
    ///
    /// # Arguments
    ///
    /// * `names` - Names of the new schema.
    /// * `dtypes` - Dypes of the new schema.
    pub fn from_vecs(names: Vec<&str>, dtypes: Vec<DataType>) -> Self {
        let mut attrs = Vec::new();
        for (name, dtype) in names.iter().zip(dtypes.iter()) {
            attrs.push(Attribute::new(name.to_string(), dtype.clone()));
        }
        TableSchema::new(attrs)
    }

    /// Get the attribute with the given name.
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the attribute to look for.
    pub fn get_attribute(&self, name: &str) -> Option<&Attribute> {
        self.name_map
            .get(&name.to_lowercase())
            .and_then(|i| self.attributes.get(*i))
    }

    /// Check if the attribute name is in the schema.
    pub fn contains(&self, name: &str) -> bool {
        self.name_map.contains_key(&name.to_lowercase())
    }

    /// Get an iterator of the attributes.
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter()
    }

    /// Names of the attributes in schema order.
    pub fn column_names(&self) -> Vec<String> {
        self.attributes.iter().map(|a| a.name.clone()).collect()
    }

    /// Returns the length of the schema.
    pub fn size(&self) -> usize {
        self.attributes.len()
    }
}

/// Handle attributes. Pairs the name with the dtype.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
pub struct Attribute {
    /// Attribute name.
    pub name: String,
    /// Attribute dtype.
    pub dtype: DataType,
    /// Whether inserts must supply a value for this attribute.
    #[serde(default)]
    pub not_null: bool,
}

impl Attribute {
    /// Create a new nullable attribute with the given name and dtype.
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the attribute.
    /// * `dtype` - Dtype of the attribute.
    pub fn new(name: String, dtype: DataType) -> Self {
        Self {
            name,
            dtype,
            not_null: false,
        }
    }

    /// Create a new attribute that rejects missing values.
    pub fn new_not_null(name: String, dtype: DataType) -> Self {
        Self {
            name,
            dtype,
            not_null: true,
        }
    }

    /// Returns the name of the attribute.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the dtype of the attribute.
    pub fn dtype(&self) -> &DataType {
        &self.dtype
    }
}

/// Enumerate the supported dtypes.
#[derive(PartialEq, Serialize, Deserialize, Clone, Debug)]
pub enum DataType {
    Int,
    String,
}

/// Retrieve the name from the command parser object.
///
/// # Argument
///
/// * `name` - Name object from the command parser.
pub fn get_name(name: &sqlast::ObjectName) -> Result<String, CrustyError> {
    match name.0.as_slice() {
        [single] => Ok(single.to_lowercase()),
        _ => Err(CrustyError::ValidationError(format!(
            "qualified name {} not supported here",
            name
        ))),
    }
}

/// Retrieve the dtype from the command parser object.
///
/// # Argument
///
/// * `dtype` - Name object from the command parser.
pub fn get_attr(dtype: &sqlast::DataType) -> Result<DataType, CrustyError> {
    match dtype {
        sqlast::DataType::Int => Ok(DataType::Int),
        sqlast::DataType::Varchar(_) => Ok(DataType::String),
        _ => Err(CrustyError::ValidationError(format!(
            "Unsupported data type {}",
            dtype
        ))),
    }
}
