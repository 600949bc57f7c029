#![allow(dead_code)]

use pivot_query::{QueryExp, SqliteConnection, SqliteOptions};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub const BART_CSV: &str = include_str!("../data/barttest.csv");

pub const TCOE_TOTAL: i64 = 4638335;
pub const BASE_TOTAL: i64 = 3423754;

pub fn init_logging() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::WARN.into())
        .from_env_lossy();
    let subscriber = FmtSubscriber::builder()
        .with_test_writer()
        .with_env_filter(env_filter)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// In-memory connection holding the 23-row `barttest` table.
pub async fn bart_connection() -> (Arc<SqliteConnection>, QueryExp) {
    init_logging();
    let conn = SqliteConnection::open(SqliteOptions::default())
        .await
        .expect("open in-memory sqlite");
    let table = conn.import_csv_str("barttest", BART_CSV).await.expect("import barttest");
    (Arc::new(conn), table)
}
