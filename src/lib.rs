pub mod aggtree;
pub mod column;
pub mod connection;
pub mod csv;
pub mod error;
pub mod expr;
pub mod pivot;
pub mod query;
pub mod schema;
pub mod sql;
pub mod sqlite;
pub mod table;

pub use aggtree::{AggTree, OpenPaths, PivotSpec};
pub use column::ScalarValue;
pub use connection::Connection;
pub use error::{PivotError, Result};
pub use pivot::PivotTreeModel;
pub use query::{AggFn, ColumnMapping, JoinType, QueryExp, SortKey};
pub use schema::{ColumnDef, DataType, Schema};
pub use sqlite::{SqliteConnection, SqliteOptions};
pub use table::TableRep;
