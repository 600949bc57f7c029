use crate::column::ScalarValue;
use crate::error::{PivotError, Result};
use crate::schema::{ColumnDef, DataType, Schema};
use std::path::Path;
use tracing::debug;

/// Parsed CSV contents with inferred column types.
#[derive(Debug, Clone)]
pub struct CsvTable {
    pub schema: Schema,
    pub rows: Vec<Vec<ScalarValue>>,
}

#[derive(Debug, Clone)]
pub struct CsvReader {
    pub delimiter: char,
    pub has_header: bool,
}

impl Default for CsvReader {
    fn default() -> Self { Self::new() }
}

impl CsvReader {
    pub fn new() -> Self { Self { delimiter: ',', has_header: true } }
    pub fn with_delimiter(mut self, delimiter: char) -> Self { self.delimiter = delimiter; self }
    pub fn with_header(mut self, has_header: bool) -> Self { self.has_header = has_header; self }

    pub fn read_path(&self, path: impl AsRef<Path>) -> Result<CsvTable> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .map_err(|e| PivotError::IoError(format!("{}: {}", path.display(), e)))?;
        self.read_str(&data)
    }

    /// Column types are inferred per column: integer if every non-empty
    /// cell parses as one, else real, else text. Empty cells are NULL.
    pub fn read_str(&self, data: &str) -> Result<CsvTable> {
        let mut lines = data.lines();
        let headers: Vec<String> = if self.has_header {
            match lines.next() {
                Some(line) => self.split_line(line).into_iter().map(|h| h.trim().to_string()).collect(),
                None => return Err(PivotError::IoError("Empty CSV".to_string())),
            }
        } else {
            Vec::new()
        };

        let mut raw_rows: Vec<Vec<String>> = Vec::new();
        for line in lines {
            if line.trim().is_empty() { continue; }
            raw_rows.push(self.split_line(line));
        }

        let col_count = if !headers.is_empty() {
            headers.len()
        } else {
            raw_rows.first().map_or(0, Vec::len)
        };
        let col_names: Vec<String> = if !headers.is_empty() {
            headers
        } else {
            (0..col_count).map(|i| format!("col{}", i)).collect()
        };

        for (i, row) in raw_rows.iter_mut().enumerate() {
            if row.len() > col_count {
                return Err(PivotError::IoError(format!(
                    "Row {} has {} fields, expected {}", i + 1, row.len(), col_count
                )));
            }
            row.resize(col_count, String::new());
        }

        let types: Vec<DataType> = (0..col_count)
            .map(|c| infer_type(raw_rows.iter().map(|r| r[c].as_str())))
            .collect();
        let schema = Schema::new(col_names.iter()
            .zip(&types)
            .map(|(name, t)| ColumnDef::new(name, *t))
            .collect())?;

        let rows = raw_rows.into_iter()
            .map(|row| row.into_iter()
                .zip(&types)
                .map(|(cell, t)| parse_cell(cell, t))
                .collect())
            .collect::<Vec<Vec<ScalarValue>>>();
        debug!(columns = col_count, rows = rows.len(), "parsed csv");
        Ok(CsvTable { schema, rows })
    }

    fn split_line(&self, line: &str) -> Vec<String> {
        let mut result = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '"' {
                if in_quotes && chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = !in_quotes;
                }
            } else if c == self.delimiter && !in_quotes {
                result.push(std::mem::take(&mut current));
            } else {
                current.push(c);
            }
        }
        result.push(current);
        result
    }
}

fn infer_type<'a>(cells: impl Iterator<Item = &'a str>) -> DataType {
    let mut non_empty = cells.filter(|c| !c.trim().is_empty()).peekable();
    if non_empty.peek().is_none() {
        return DataType::Utf8;
    }
    let cells: Vec<&str> = non_empty.map(str::trim).collect();
    if cells.iter().all(|c| c.parse::<i64>().is_ok()) {
        DataType::Int64
    } else if cells.iter().all(|c| c.parse::<f64>().is_ok()) {
        DataType::Float64
    } else {
        DataType::Utf8
    }
}

fn parse_cell(cell: String, data_type: &DataType) -> ScalarValue {
    if cell.trim().is_empty() {
        return ScalarValue::Null;
    }
    match data_type {
        DataType::Int64 => cell.trim().parse().map(ScalarValue::Int64).unwrap_or(ScalarValue::Null),
        DataType::Float64 => cell.trim().parse().map(ScalarValue::Float64).unwrap_or(ScalarValue::Null),
        _ => ScalarValue::Utf8(cell),
    }
}
