//! SQLite backing engine.
//!
//! A `SqliteConnection` owns one `async_sqlite::Client`, which runs the
//! database on a background thread and answers requests asynchronously, so
//! concurrent `eval_query` calls never block the caller's executor.

use crate::column::ScalarValue;
use crate::connection::Connection;
use crate::csv::{CsvReader, CsvTable};
use crate::error::{PivotError, Result};
use crate::query::QueryExp;
use crate::schema::{DataType, Schema};
use crate::sql::ast::quote_ident;
use crate::sql::{Catalog, QueryCompiler};
use crate::table::TableRep;
use async_sqlite::rusqlite::types::Value;
use async_sqlite::rusqlite::{self, OpenFlags};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SqliteOptions {
    /// Database file; `None` opens a private in-memory database.
    pub path: Option<PathBuf>,
    /// Log every compiled statement at info level.
    pub show_queries: bool,
    pub read_only: bool,
}

impl SqliteOptions {
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_show_queries(mut self, show_queries: bool) -> Self {
        self.show_queries = show_queries;
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }
}

pub struct SqliteConnection {
    client: async_sqlite::Client,
    catalog: RwLock<Catalog>,
    options: SqliteOptions,
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.options.path {
            Some(path) => write!(f, "SqliteConnection({})", path.to_string_lossy()),
            None => write!(f, "SqliteConnection(:memory:)"),
        }
    }
}

impl SqliteConnection {
    pub async fn open(options: SqliteOptions) -> Result<Self> {
        let mut builder = async_sqlite::ClientBuilder::new();
        if options.read_only {
            builder = builder.flags(OpenFlags::SQLITE_OPEN_READ_ONLY);
        }
        if let Some(path) = &options.path {
            builder = builder.path(path);
        }
        let client = builder.open().await.map_err(|e| {
            PivotError::IoError(format!("Failed to open sqlite database: {}", e))
        })?;
        debug!(?options, "opened sqlite connection");
        Ok(Self { client, catalog: RwLock::new(Catalog::new()), options })
    }

    pub async fn open_in_memory() -> Result<Self> {
        Self::open(SqliteOptions::default()).await
    }

    pub fn options(&self) -> &SqliteOptions { &self.options }

    /// Runs a statement that returns no rows; yields the number of rows changed.
    pub async fn execute(&self, sql: impl Into<String>) -> Result<usize> {
        let sql = sql.into();
        self.log_statement(&sql);
        let stmt = sql.clone();
        self.client
            .conn(move |conn| conn.execute(&stmt, []))
            .await
            .map_err(|e| PivotError::eval(e, sql))
    }

    /// Makes a table created outside of `import_*` available to `table_query`.
    pub fn register_table(&self, name: &str, schema: Schema) {
        self.catalog.write().replace_table(name, schema);
    }

    pub fn table_names(&self) -> Vec<String> {
        self.catalog.read().table_names()
    }

    pub async fn import_csv(&self, name: &str, path: impl AsRef<Path>) -> Result<QueryExp> {
        let table = CsvReader::new().read_path(path)?;
        self.import_table(name, table).await
    }

    pub async fn import_csv_str(&self, name: &str, data: &str) -> Result<QueryExp> {
        let table = CsvReader::new().read_str(data)?;
        self.import_table(name, table).await
    }

    /// Creates `name` and fills it in one transaction, then registers its schema.
    pub async fn import_table(&self, name: &str, table: CsvTable) -> Result<QueryExp> {
        let query = QueryExp::table(name, table.schema.clone())?;
        let columns = table.schema.columns().iter()
            .map(|c| format!("{} {}", quote_ident(&c.id), c.data_type.sql_name()))
            .collect::<Vec<_>>();
        let create = format!("CREATE TABLE {} ({})", quote_ident(name), columns.join(", "));
        let insert = format!(
            "INSERT INTO {} VALUES ({})",
            quote_ident(name),
            vec!["?"; columns.len()].join(", ")
        );
        let rows: Vec<Vec<Value>> = table.rows.into_iter()
            .map(|row| row.into_iter().map(to_sql_value).collect())
            .collect();
        let row_count = rows.len();

        self.log_statement(&create);
        let stmts = (create.clone(), insert);
        self.client
            .conn(move |conn| {
                let (create, insert) = stmts;
                let tx = conn.unchecked_transaction()?;
                tx.execute(&create, [])?;
                {
                    let mut stmt = tx.prepare(&insert)?;
                    for row in &rows {
                        stmt.execute(rusqlite::params_from_iter(row.iter()))?;
                    }
                }
                tx.commit()
            })
            .await
            .map_err(|e| PivotError::eval(e, create))?;

        info!(table = name, rows = row_count, columns = columns.len(), "imported table");
        self.catalog.write().replace_table(name, table.schema);
        Ok(query)
    }

    fn log_statement(&self, sql: &str) {
        if self.options.show_queries {
            info!(%sql, "sqlite");
        } else {
            debug!(%sql, "sqlite");
        }
    }

    /// Runs a query and collects every row as raw sqlite values.
    async fn query_all(&self, sql: &str) -> Result<Vec<Vec<Value>>> {
        self.log_statement(sql);
        let stmt = sql.to_string();
        self.client
            .conn(move |conn| {
                let mut stmt = conn.prepare(&stmt)?;
                let num_cols = stmt.column_count();
                let rows = stmt
                    .query([])?
                    .mapped(|r| {
                        (0..num_cols)
                            .map(|idx| Ok(Value::from(r.get_ref(idx)?)))
                            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
                    })
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                Ok(rows)
            })
            .await
            .map_err(|e| PivotError::eval(e, sql))
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    async fn eval_query(&self, query: &QueryExp) -> Result<TableRep> {
        let sql = QueryCompiler::compile(query)?;
        let start = Instant::now();
        let rows = self.query_all(&sql).await?;
        let schema = query.schema().clone();
        let row_data = rows.into_iter()
            .map(|row| convert_row(row, &schema))
            .collect::<std::result::Result<Vec<_>, String>>()
            .map_err(|msg| PivotError::eval(msg, sql.as_str()))?;
        debug!(rows = row_data.len(), elapsed = ?start.elapsed(), "evaluated query");
        Ok(TableRep::new(schema, row_data))
    }

    async fn row_count(&self, query: &QueryExp) -> Result<usize> {
        let sql = QueryCompiler::compile_row_count(query)?;
        let rows = self.query_all(&sql).await?;
        match rows.first().and_then(|r| r.first()) {
            Some(Value::Integer(n)) if *n >= 0 => Ok(*n as usize),
            other => Err(PivotError::eval(format!("Unexpected row count {:?}", other), sql)),
        }
    }

    async fn table_query(&self, table_name: &str) -> Result<QueryExp> {
        let entry = self.catalog.read().get_table(table_name).cloned().ok_or_else(|| {
            PivotError::QueryBuildError(format!("Unknown table '{}'", table_name))
        })?;
        QueryExp::table(&entry.name, entry.schema)
    }
}

fn to_sql_value(value: ScalarValue) -> Value {
    match value {
        ScalarValue::Null => Value::Null,
        ScalarValue::Boolean(b) => Value::Integer(b as i64),
        ScalarValue::Int64(i) => Value::Integer(i),
        ScalarValue::Float64(v) => Value::Real(v),
        ScalarValue::Utf8(s) => Value::Text(s),
    }
}

fn convert_row(row: Vec<Value>, schema: &Schema) -> std::result::Result<Vec<ScalarValue>, String> {
    if row.len() != schema.column_count() {
        return Err(format!(
            "Result has {} columns, schema expects {}", row.len(), schema.column_count()
        ));
    }
    row.into_iter()
        .zip(schema.columns())
        .map(|(value, col)| {
            convert_value(value, &col.data_type)
                .map_err(|msg| format!("Column '{}': {}", col.id, msg))
        })
        .collect()
}

/// Converts one sqlite cell to the declared column type.
fn convert_value(value: Value, data_type: &DataType) -> std::result::Result<ScalarValue, String> {
    match (value, data_type) {
        (Value::Null, _) => Ok(ScalarValue::Null),
        (Value::Integer(i), DataType::Boolean) => Ok(ScalarValue::Boolean(i != 0)),
        (Value::Integer(i), DataType::Int64) => Ok(ScalarValue::Int64(i)),
        (Value::Integer(i), DataType::Float64) => Ok(ScalarValue::Float64(i as f64)),
        (Value::Integer(i), DataType::Utf8) => Ok(ScalarValue::Utf8(i.to_string())),
        (Value::Real(v), DataType::Float64) => Ok(ScalarValue::Float64(v)),
        (Value::Real(v), DataType::Int64) if v.fract() == 0.0 => Ok(ScalarValue::Int64(v as i64)),
        (Value::Real(v), DataType::Utf8) => Ok(ScalarValue::Utf8(v.to_string())),
        (Value::Text(s), t) => ScalarValue::Utf8(s).coerce_to(t).map_err(|e| e.to_string()),
        (Value::Blob(_), t) => Err(format!("Cannot convert blob to {}", t)),
        (other, t) => Err(format!("Cannot convert {:?} to {}", other, t)),
    }
}
