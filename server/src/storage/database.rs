//! Relational backend on SQLite
//!
//! All statements run on one connection, serialised by a mutex and executed
//! on the blocking pool. Each statement is atomic on its own; a batch is not
//! wrapped in a cross-row transaction.

use async_trait::async_trait;
use metrics_core::{MetricKind, MetricRecord};
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, ErrorCode, OptionalExtension};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{merge_batch, MetricStorage, StorageError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS metrics (
    name  TEXT PRIMARY KEY,
    mtype TEXT NOT NULL,
    delta INTEGER,
    value REAL
);
";

// Counter rows add the incoming delta to what is stored; the row's kind
// always follows the incoming record.
const UPSERT_CONFLICT: &str = "
ON CONFLICT(name) DO UPDATE SET
    mtype = excluded.mtype,
    delta = CASE WHEN excluded.mtype = 'counter'
                 THEN COALESCE(metrics.delta, 0) + excluded.delta
                 ELSE excluded.delta END,
    value = CASE WHEN excluded.mtype = 'gauge'
                 THEN excluded.value
                 ELSE metrics.value END";

// Snapshot rows replace whatever is stored.
const RESTORE_CONFLICT: &str = "
ON CONFLICT(name) DO UPDATE SET
    mtype = excluded.mtype,
    delta = excluded.delta,
    value = excluded.value";

const PARAMS_PER_ROW: usize = 4;
// SQLITE_MAX_VARIABLE_NUMBER of older builds
const MAX_BOUND_PARAMS: usize = 999;
const MAX_ROWS_PER_STATEMENT: usize = MAX_BOUND_PARAMS / PARAMS_PER_ROW;

/// Delays between open attempts; only transient failures are retried
const OPEN_RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(3),
    Duration::from_secs(5),
];

/// SQLite-backed metric store
pub struct SqliteStorage {
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteStorage {
    /// Open the database named by `dsn` and create the schema if needed
    pub async fn open(dsn: &str) -> Result<Self, StorageError> {
        let path = dsn.strip_prefix("sqlite://").unwrap_or(dsn).to_string();
        let mut attempt = 0;
        loop {
            let target = path.clone();
            match tokio::task::spawn_blocking(move || open_connection(&target)).await? {
                Ok(conn) => {
                    info!("Opened metrics database {}", path);
                    return Ok(Self {
                        conn: Arc::new(Mutex::new(Some(conn))),
                    });
                }
                Err(e) if is_transient(&e) && attempt < OPEN_RETRY_DELAYS.len() => {
                    let delay = OPEN_RETRY_DELAYS[attempt];
                    warn!(
                        "Database open failed ({}), retrying in {:?} (attempt {}/{})",
                        e,
                        delay,
                        attempt + 1,
                        OPEN_RETRY_DELAYS.len()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            let conn = guard.as_ref().ok_or(StorageError::Closed)?;
            f(conn)
        })
        .await?
    }
}

fn open_connection(path: &str) -> Result<Connection, StorageError> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

fn is_transient(err: &StorageError) -> bool {
    match err {
        StorageError::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
            e.code,
            ErrorCode::CannotOpen | ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
        ),
        _ => false,
    }
}

fn upsert_rows(conn: &Connection, rows: &[MetricRecord]) -> Result<(), StorageError> {
    write_rows(conn, rows, UPSERT_CONFLICT)
}

fn write_rows(
    conn: &Connection,
    rows: &[MetricRecord],
    on_conflict: &str,
) -> Result<(), StorageError> {
    for chunk in rows.chunks(MAX_ROWS_PER_STATEMENT) {
        let placeholders = vec!["(?, ?, ?, ?)"; chunk.len()].join(", ");
        let sql = format!(
            "INSERT INTO metrics (name, mtype, delta, value) VALUES {} {}",
            placeholders, on_conflict
        );

        let mut params = Vec::with_capacity(chunk.len() * PARAMS_PER_ROW);
        for record in chunk {
            params.push(Value::Text(record.id.clone()));
            params.push(Value::Text(record.kind.as_str().to_string()));
            params.push(record.delta.map_or(Value::Null, Value::Integer));
            params.push(record.value.map_or(Value::Null, Value::Real));
        }

        let changed = conn.execute(&sql, params_from_iter(params.iter()))?;
        debug!("Wrote {} metric rows", changed);
    }
    Ok(())
}

fn row_to_record(
    name: String,
    mtype: String,
    delta: Option<i64>,
    value: Option<f64>,
) -> Option<MetricRecord> {
    match mtype.parse::<MetricKind>() {
        Ok(MetricKind::Gauge) => value.map(|v| MetricRecord::gauge(name, v)),
        Ok(MetricKind::Counter) => delta.map(|d| MetricRecord::counter(name, d)),
        Err(_) => {
            warn!("Ignoring metric {} with unknown type {}", name, mtype);
            None
        }
    }
}

#[async_trait]
impl MetricStorage for SqliteStorage {
    async fn set_gauge(&self, name: &str, value: f64) -> Result<(), StorageError> {
        let record = MetricRecord::gauge(name, value);
        self.with_conn(move |conn| upsert_rows(conn, &[record])).await
    }

    async fn set_counter(&self, name: &str, delta: i64) -> Result<(), StorageError> {
        let record = MetricRecord::counter(name, delta);
        self.with_conn(move |conn| upsert_rows(conn, &[record])).await
    }

    async fn get_gauge(&self, name: &str) -> Result<f64, StorageError> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let value: Option<Option<f64>> = conn
                .query_row(
                    "SELECT value FROM metrics WHERE name = ?1 AND mtype = 'gauge'",
                    [&name],
                    |row| row.get(0),
                )
                .optional()?;
            value.flatten().ok_or(StorageError::NotFound(name))
        })
        .await
    }

    async fn get_counter(&self, name: &str) -> Result<i64, StorageError> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let delta: Option<Option<i64>> = conn
                .query_row(
                    "SELECT delta FROM metrics WHERE name = ?1 AND mtype = 'counter'",
                    [&name],
                    |row| row.get(0),
                )
                .optional()?;
            delta.flatten().ok_or(StorageError::NotFound(name))
        })
        .await
    }

    async fn insert_batch(&self, batch: &[MetricRecord]) -> Result<(), StorageError> {
        let merged = merge_batch(batch);
        if merged.is_empty() {
            return Ok(());
        }
        self.with_conn(move |conn| upsert_rows(conn, &merged)).await
    }

    async fn restore(&self, records: &[MetricRecord]) -> Result<(), StorageError> {
        let rows: Vec<MetricRecord> = records
            .iter()
            .filter(|r| r.validate().is_ok())
            .cloned()
            .collect();
        if rows.is_empty() {
            return Ok(());
        }
        self.with_conn(move |conn| write_rows(conn, &rows, RESTORE_CONFLICT))
            .await
    }

    async fn get_all(&self) -> Result<Vec<MetricRecord>, StorageError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT name, mtype, delta, value FROM metrics")?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                    row.get::<_, Option<f64>>(3)?,
                ))
            })?;

            let mut records = Vec::new();
            for row in rows {
                let (name, mtype, delta, value) = row?;
                if let Some(record) = row_to_record(name, mtype, delta, value) {
                    records.push(record);
                }
            }
            Ok(records)
        })
        .await
    }

    async fn ping(&self) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> Result<(), StorageError> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            if let Some(conn) = conn.lock().take() {
                conn.close().map_err(|(_, e)| StorageError::Database(e))?;
                info!("Closed metrics database");
            }
            Ok(())
        })
        .await?
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
