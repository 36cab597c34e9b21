use crate::database::Database;
use crate::{Attribute, DataType, TableSchema};

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a new table schema of IntFields with the given column names.
pub fn get_int_table_schema(columns: &[&str]) -> TableSchema {
    let attrs = columns
        .iter()
        .map(|name| Attribute::new(name.to_string(), DataType::Int))
        .collect();
    TableSchema::new(attrs)
}

/// Creates a database named `testdb` holding one all-int table per entry.
///
/// # Arguments
///
/// * `tables` - Pairs of table name and column names.
pub fn create_test_database(tables: &[(&str, &[&str])]) -> Database {
    let db = Database::new(String::from("testdb"));
    for (name, columns) in tables {
        db.create_table(name, get_int_table_schema(columns))
            .expect("duplicate test table");
    }
    db
}
