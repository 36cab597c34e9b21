use crate::TableSchema;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Snapshot of a catalog table handed to plan nodes.
pub type TableHandle = Arc<Table>;

/// Table implementation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Table id.
    pub id: u64,
    /// Table schema.
    pub schema: TableSchema,
}

impl Table {
    /// Creates a new table with the given name and schema.
    ///
    /// # Arguments
    ///
    /// * `name` - Name of table. Stored lowercase.
    /// * `schema` - Schema of the table.
    pub fn new(name: String, schema: TableSchema) -> Self {
        let name = name.to_lowercase();
        let table_id = Table::get_table_id(&name);

        Table {
            name,
            id: table_id,
            schema,
        }
    }

    /// Creates table id of the table by hashing the lowercase table name.
    ///
    /// # Arguments
    ///
    /// * `name` - Name of table to get the id for.
    pub fn get_table_id(name: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        name.to_lowercase().hash(&mut hasher);
        hasher.finish()
    }
}
