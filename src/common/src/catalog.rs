use crate::ids::TransactionId;
use crate::table::*;
use crate::CrustyError;
use log::trace;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Functions needed to implement a catalog. It keeps track of all available tables in the database and their associated schemas.
pub trait Catalog {
    /// Get tables from catalog.
    fn get_tables(&self) -> Arc<RwLock<HashMap<u64, Arc<RwLock<Table>>>>>;

    /// Name of the database this catalog describes.
    fn get_database_name(&self) -> &str;

    /// Get the table pointer for the catalog.
    ///
    /// # Arguments
    ///
    /// * `table_id` - Id of table to get the pointer for.
    fn get_table_ptr(&self, table_id: u64) -> Result<Arc<RwLock<Table>>, CrustyError> {
        let tables = self.get_tables();
        let tables_ref = tables
            .read()
            .map_err(|_| CrustyError::CrustyError(String::from("Catalog lock poisoned")))?;
        match tables_ref.get(&table_id) {
            Some(table_ptr) => Ok(Arc::clone(table_ptr)),
            _ => Err(CrustyError::CatalogError(String::from("Table not found"))),
        }
    }

    /// Resolves a table name to a snapshot of the table for the given transaction.
    ///
    /// # Arguments
    ///
    /// * `database_name` - Optional database qualifier; must match this catalog.
    /// * `table_name` - Name of the table, matched case-insensitively.
    /// * `tid` - Transaction the lookup runs under.
    fn lookup_table(
        &self,
        database_name: Option<&str>,
        table_name: &str,
        tid: TransactionId,
    ) -> Result<TableHandle, CrustyError> {
        if let Some(db) = database_name {
            if !db.eq_ignore_ascii_case(self.get_database_name()) {
                return Err(CrustyError::CatalogError(format!(
                    "database \"{}\" does not exist",
                    db
                )));
            }
        }
        trace!("{} looking up table {}", tid, table_name);
        let table_ptr = self
            .get_table_ptr(Table::get_table_id(table_name))
            .map_err(|_| {
                CrustyError::CatalogError(format!(
                    "relation \"{}\" does not exist",
                    table_name.to_lowercase()
                ))
            })?;
        let table = table_ptr
            .read()
            .map_err(|_| CrustyError::CrustyError(String::from("Table lock poisoned")))?;
        Ok(Arc::new(table.clone()))
    }
}
