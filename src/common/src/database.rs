use crate::catalog;
use crate::table::*;
use crate::{CrustyError, TableSchema};
use catalog::Catalog;
use log::info;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// In-memory catalog of one database.
#[derive(Clone)]
pub struct Database {
    /// Name of the database.
    pub name: String,
    /// Locks for the tables.
    pub tables: Arc<RwLock<HashMap<u64, Arc<RwLock<Table>>>>>,
}

impl Database {
    /// Initialize a new database with a given name.
    ///
    /// # Arguments
    ///
    /// * `name` - Name for the new database.
    pub fn new(name: String) -> Self {
        Database {
            name,
            tables: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registers a new table.
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the table.
    /// * `schema` - Schema of the table.
    pub fn create_table(&self, name: &str, schema: TableSchema) -> Result<(), CrustyError> {
        let table_id = Table::get_table_id(name);
        let mut tables = self
            .tables
            .write()
            .map_err(|_| CrustyError::CrustyError(String::from("Catalog lock poisoned")))?;
        if tables.contains_key(&table_id) {
            return Err(CrustyError::CatalogError(format!(
                "relation \"{}\" already exists",
                name.to_lowercase()
            )));
        }
        let table = Table::new(name.to_string(), schema);
        info!("Created table {} in database {}", table.name, self.name);
        tables.insert(table_id, Arc::new(RwLock::new(table)));
        Ok(())
    }

    /// Removes a table.
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the table.
    /// * `if_exists` - Succeed silently when the table is missing.
    pub fn drop_table(&self, name: &str, if_exists: bool) -> Result<(), CrustyError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| CrustyError::CrustyError(String::from("Catalog lock poisoned")))?;
        match tables.remove(&Table::get_table_id(name)) {
            Some(_) => {
                info!("Dropped table {} from database {}", name, self.name);
                Ok(())
            }
            None if if_exists => Ok(()),
            None => Err(CrustyError::CatalogError(format!(
                "relation \"{}\" does not exist",
                name.to_lowercase()
            ))),
        }
    }
}

impl Catalog for Database {
    /// Gets the tables from the catalog of the database.
    fn get_tables(&self) -> Arc<RwLock<HashMap<u64, Arc<RwLock<Table>>>>> {
        self.tables.clone()
    }

    fn get_database_name(&self) -> &str {
        &self.name
    }
}
