use crate::schema::Schema;
use std::collections::HashMap;

/// Schema registry for the tables known to a connection. Lookups are
/// case-insensitive, matching SQLite's identifier rules.
#[derive(Debug, Default)]
pub struct Catalog {
    tables: HashMap<String, TableEntry>,
}

#[derive(Debug, Clone)]
pub struct TableEntry {
    pub name: String,
    pub schema: Schema,
}

impl Catalog {
    pub fn new() -> Self {
        Self { tables: HashMap::new() }
    }

    /// Registers `name`, replacing any table whose name differs only in case.
    pub fn replace_table(&mut self, name: &str, schema: Schema) {
        self.tables.insert(name.to_uppercase(), TableEntry { name: name.to_string(), schema });
    }

    pub fn get_table(&self, name: &str) -> Option<&TableEntry> {
        self.tables.get(&name.to_uppercase())
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.values().map(|t| t.name.clone()).collect();
        names.sort();
        names
    }
}
