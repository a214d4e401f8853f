//! Table schema as reported by the store.

use std::collections::HashMap;

use crate::models::column_type::ColumnType;

/// One column of a table schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaColumn {
    pub name: String,
    pub column_type: ColumnType,
}

/// Ordered column list of a table, as currently known to the store.
///
/// The store owns the truth; this is a per-call snapshot and is never
/// cached across reconcile attempts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSchema {
    columns: Vec<SchemaColumn>,
    by_name: HashMap<String, usize>,
}

impl TableSchema {
    /// Build a schema from `(name, type)` pairs in column order.
    pub fn new(columns: impl IntoIterator<Item = (String, ColumnType)>) -> Self {
        let mut schema = Self::default();
        for (name, column_type) in columns {
            schema.upsert(name, column_type);
        }
        schema
    }

    /// Look up a column type by name.
    pub fn get(&self, name: &str) -> Option<&ColumnType> {
        self.by_name.get(name).map(|i| &self.columns[*i].column_type)
    }

    /// Insert a column or replace the type of an existing one, keeping
    /// column order stable.
    pub fn upsert(&mut self, name: impl Into<String>, column_type: ColumnType) {
        let name = name.into();
        match self.by_name.get(&name) {
            Some(i) => self.columns[*i].column_type = column_type,
            None => {
                self.by_name.insert(name.clone(), self.columns.len());
                self.columns.push(SchemaColumn { name, column_type });
            }
        }
    }

    /// Columns in store order.
    pub fn columns(&self) -> &[SchemaColumn] {
        &self.columns
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the schema has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
