use crate::error::{PivotError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    #[serde(rename = "boolean")]
    Boolean,
    #[serde(rename = "integer")]
    Int64,
    #[serde(rename = "real")]
    Float64,
    #[serde(rename = "text")]
    Utf8,
}

impl DataType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int64 | DataType::Float64)
    }

    /// Common type of two columns under the integer -> real widening rule.
    pub fn widen(&self, other: &DataType) -> Option<DataType> {
        match (self, other) {
            (a, b) if a == b => Some(*a),
            (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => {
                Some(DataType::Float64)
            }
            _ => None,
        }
    }

    /// Whether a value of type `self` may be stored in a column declared `target`.
    pub fn casts_to(&self, target: &DataType) -> bool {
        self == target
            || *target == DataType::Utf8
            || (*self == DataType::Int64 && *target == DataType::Float64)
    }

    pub fn sql_name(&self) -> &'static str {
        match self {
            DataType::Boolean => "INTEGER",
            DataType::Int64 => "INTEGER",
            DataType::Float64 => "REAL",
            DataType::Utf8 => "TEXT",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Boolean => write!(f, "boolean"),
            DataType::Int64 => write!(f, "integer"),
            DataType::Float64 => write!(f, "real"),
            DataType::Utf8 => write!(f, "text"),
        }
    }
}

impl FromStr for DataType {
    type Err = PivotError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "boolean" | "bool" => Ok(DataType::Boolean),
            "integer" | "int" => Ok(DataType::Int64),
            "real" | "float" | "double" => Ok(DataType::Float64),
            "text" | "varchar" | "string" => Ok(DataType::Utf8),
            other => Err(PivotError::SchemaError(format!("Unrecognized column type '{}'", other))),
        }
    }
}

/// Per-column metadata as exposed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub id: String,
    pub data_type: DataType,
    pub display_name: String,
}

impl ColumnDef {
    pub fn new(id: &str, data_type: DataType) -> Self {
        Self { id: id.to_string(), data_type, display_name: id.to_string() }
    }

    pub fn with_display_name(mut self, display_name: &str) -> Self {
        self.display_name = display_name.to_string();
        self
    }

    pub fn metadata(&self) -> ColumnMetadata {
        ColumnMetadata { data_type: self.data_type, display_name: self.display_name.clone() }
    }
}

/// Ordered column list. Column ids are unique, compared case-insensitively
/// the way the backing engine resolves identifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SchemaRep", into = "SchemaRep")]
pub struct Schema {
    columns: Vec<ColumnDef>,
}

impl Schema {
    pub fn new(columns: Vec<ColumnDef>) -> Result<Self> {
        for (i, col) in columns.iter().enumerate() {
            if col.id.is_empty() {
                return Err(PivotError::SchemaError("Empty column id".to_string()));
            }
            if columns[..i].iter().any(|c| c.id.eq_ignore_ascii_case(&col.id)) {
                return Err(PivotError::SchemaError(format!("Duplicate column id '{}'", col.id)));
            }
        }
        Ok(Self { columns })
    }

    /// Builds a schema from an id list plus a `(type name, display name)` map.
    /// Display names default to the id.
    pub fn from_metadata(ids: &[&str], metadata: &BTreeMap<String, (String, Option<String>)>) -> Result<Self> {
        let mut columns = Vec::with_capacity(ids.len());
        for id in ids {
            let (type_name, display_name) = metadata
                .get(*id)
                .ok_or_else(|| PivotError::SchemaError(format!("No metadata for column '{}'", id)))?;
            let mut def = ColumnDef::new(id, type_name.parse()?);
            if let Some(name) = display_name {
                def = def.with_display_name(name);
            }
            columns.push(def);
        }
        Self::new(columns)
    }

    pub fn columns(&self) -> &[ColumnDef] { &self.columns }
    pub fn column_count(&self) -> usize { self.columns.len() }

    pub fn column_ids(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.id.clone()).collect()
    }

    pub fn find_column_index(&self, id: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.id.eq_ignore_ascii_case(id))
    }

    pub fn find_column(&self, id: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.id.eq_ignore_ascii_case(id))
    }

    pub fn has_column(&self, id: &str) -> bool { self.find_column_index(id).is_some() }

    pub fn column_type(&self, id: &str) -> Option<DataType> {
        self.find_column(id).map(|c| c.data_type)
    }

    pub fn column_metadata(&self, id: &str) -> Option<ColumnMetadata> {
        self.find_column(id).map(ColumnDef::metadata)
    }
}

#[derive(Serialize, Deserialize)]
struct SchemaRep {
    columns: Vec<String>,
    #[serde(rename = "columnMetadata")]
    column_metadata: BTreeMap<String, ColumnMetadata>,
}

impl From<Schema> for SchemaRep {
    fn from(schema: Schema) -> Self {
        let column_metadata = schema.columns.iter()
            .map(|c| (c.id.clone(), c.metadata()))
            .collect();
        SchemaRep { columns: schema.column_ids(), column_metadata }
    }
}

impl TryFrom<SchemaRep> for Schema {
    type Error = PivotError;

    fn try_from(rep: SchemaRep) -> Result<Self> {
        let columns = rep.columns.iter()
            .map(|id| {
                let md = rep.column_metadata.get(id).ok_or_else(|| {
                    PivotError::SchemaError(format!("No metadata for column '{}'", id))
                })?;
                Ok(ColumnDef {
                    id: id.clone(),
                    data_type: md.data_type,
                    display_name: md.display_name.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Schema::new(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_ids_rejected() {
        let err = Schema::new(vec![
            ColumnDef::new("Name", DataType::Utf8),
            ColumnDef::new("name", DataType::Utf8),
        ])
        .unwrap_err();
        assert!(matches!(err, PivotError::SchemaError(_)));
    }

    #[test]
    fn unknown_type_rejected() {
        let mut md = BTreeMap::new();
        md.insert("x".to_string(), ("blob".to_string(), None));
        let err = Schema::from_metadata(&["x"], &md).unwrap_err();
        assert!(matches!(err, PivotError::SchemaError(_)));
    }

    #[test]
    fn metadata_shape() {
        let mut md = BTreeMap::new();
        md.insert("Base".to_string(), ("integer".to_string(), Some("Base Pay".to_string())));
        md.insert("Name".to_string(), ("text".to_string(), None));
        let schema = Schema::from_metadata(&["Name", "Base"], &md).unwrap();
        assert_eq!(schema.column_ids(), vec!["Name", "Base"]);
        assert_eq!(schema.column_type("base"), Some(DataType::Int64));

        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json["columns"], serde_json::json!(["Name", "Base"]));
        assert_eq!(json["columnMetadata"]["Base"],
                   serde_json::json!({"type": "integer", "displayName": "Base Pay"}));
        let back: Schema = serde_json::from_value(json).unwrap();
        assert_eq!(back, schema);
    }

    #[test]
    fn widening() {
        assert_eq!(DataType::Int64.widen(&DataType::Float64), Some(DataType::Float64));
        assert_eq!(DataType::Utf8.widen(&DataType::Int64), None);
        assert!(DataType::Boolean.casts_to(&DataType::Utf8));
        assert!(!DataType::Float64.casts_to(&DataType::Int64));
    }
}
