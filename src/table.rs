use crate::column::ScalarValue;
use crate::error::{PivotError, Result};
use crate::schema::Schema;
use serde::{Deserialize, Serialize};

/// Materialized query result: a schema plus rows aligned to its columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRep {
    pub schema: Schema,
    #[serde(rename = "rowData")]
    pub row_data: Vec<Vec<ScalarValue>>,
}

impl TableRep {
    pub fn new(schema: Schema, row_data: Vec<Vec<ScalarValue>>) -> Self {
        Self { schema, row_data }
    }

    pub fn row_count(&self) -> usize { self.row_data.len() }

    /// All values of one column, in row order.
    pub fn get_column(&self, id: &str) -> Result<Vec<ScalarValue>> {
        let idx = self.schema.find_column_index(id)
            .ok_or_else(|| PivotError::SchemaError(format!("Unknown column '{}'", id)))?;
        self.row_data
            .iter()
            .enumerate()
            .map(|(i, row)| {
                row.get(idx).cloned().ok_or_else(|| {
                    PivotError::SchemaError(format!("Row {} has {} values", i, row.len()))
                })
            })
            .collect()
    }

    pub fn get_value(&self, row: usize, id: &str) -> Result<&ScalarValue> {
        let idx = self.schema.find_column_index(id)
            .ok_or_else(|| PivotError::SchemaError(format!("Unknown column '{}'", id)))?;
        self.row_data.get(row)
            .and_then(|r| r.get(idx))
            .ok_or_else(|| PivotError::SchemaError(format!("Row {} out of range", row)))
    }
}
