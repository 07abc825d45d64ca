//! Embedded SQLite store.
//!
//! One `series` row per key records the packed record layout (schema descriptor)
//! and the next write sequence number; `series_rows` holds one blob per record.
//! Reads order by `(epoch, seq)`.
//!
//! Every mutation runs inside a single **`BEGIN IMMEDIATE`** transaction via
//! `SqliteConnection::immediate_transaction`, so [`SeriesStore::replace`] is
//! atomic here: a crash or failed write leaves the previous series intact.
//!
//! Diesel is synchronous. Calls run on the blocking pool against one shared
//! connection.

use std::{
    collections::{BTreeSet, HashSet},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use diesel::{
    QueryableByName,
    prelude::*,
    sql_types::Text,
};
use tracing::debug;

use crate::{
    db::{connection::connect_sqlite, migrate},
    error::{Error, Result},
    key::SeriesKey,
    record::{RecordSchema, RowBatch},
    schema::{series, series_rows},
    store::{QueryRequest, SeriesStore, last_per_epoch},
};

/// Rows per multi-row INSERT, well under SQLite's bound-parameter limit.
const INSERT_CHUNK: usize = 1_000;

#[derive(Insertable)]
#[diesel(table_name = series)]
struct NewSeries<'a> {
    series_key: &'a str,
    symbol: &'a str,
    timeframe: &'a str,
    attribute_group: &'a str,
    layout: &'a str,
    next_seq: i64,
}

#[derive(Insertable)]
#[diesel(table_name = series_rows)]
struct NewRow<'a> {
    series_key: &'a str,
    seq: i64,
    epoch: i64,
    record: &'a [u8],
}

#[derive(QueryableByName)]
struct Version {
    #[diesel(sql_type = Text)]
    version: String,
}

/// Failure inside a transaction: a database error or a store-level rejection.
enum TxError {
    Diesel(diesel::result::Error),
    Store(Error),
}

impl From<diesel::result::Error> for TxError {
    fn from(e: diesel::result::Error) -> Self {
        TxError::Diesel(e)
    }
}

impl From<Error> for TxError {
    fn from(e: Error) -> Self {
        TxError::Store(e)
    }
}

impl TxError {
    fn into_error(self, wrap: impl FnOnce(String) -> Error) -> Error {
        match self {
            TxError::Store(e) => e,
            TxError::Diesel(e) => wrap(e.to_string()),
        }
    }
}

pub struct SqliteStore {
    conn: Arc<Mutex<SqliteConnection>>,
    database_url: String,
}

impl SqliteStore {
    /// Opens (creating if needed) the database and applies pending migrations.
    pub fn open(database_url: &str) -> Result<Self> {
        let mut conn = connect_sqlite(database_url)?;
        migrate::run_pending(&mut conn)?;
        debug!(database_url, "sqlite store ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            database_url: database_url.to_string(),
        })
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| Error::Connection {
                message: "sqlite connection poisoned by an earlier panic".to_string(),
            })?;
            f(&mut guard)
        })
        .await
        .map_err(|e| Error::Connection {
            message: format!("sqlite worker failed: {e}"),
        })?
    }
}

fn write_rows(
    conn: &mut SqliteConnection,
    key: &str,
    rows: &RowBatch,
    variable_length: bool,
) -> std::result::Result<(), TxError> {
    let layout = rows.schema().descriptor();
    let existing: Option<(String, i64)> = series::table
        .find(key)
        .select((series::layout, series::next_seq))
        .first(conn)
        .optional()?;

    let mut next_seq = match existing {
        Some((stored, _)) if stored != layout => {
            return Err(Error::StoreWrite {
                key: key.to_string(),
                message: format!("layout {layout} does not match stored {stored}"),
            }
            .into());
        }
        Some((_, next_seq)) => next_seq,
        None => {
            let parsed = SeriesKey::parse(key).map_err(|e| Error::StoreWrite {
                key: key.to_string(),
                message: e.to_string(),
            })?;
            diesel::insert_into(series::table)
                .values(&NewSeries {
                    series_key: key,
                    symbol: &parsed.symbol,
                    timeframe: &parsed.timeframe,
                    attribute_group: &parsed.attribute_group,
                    layout: &layout,
                    next_seq: 0,
                })
                .execute(conn)?;
            0
        }
    };

    let keep: Vec<usize> = if variable_length {
        (0..rows.len()).collect()
    } else {
        let keep = last_per_epoch(rows);
        let epochs: HashSet<i64> = keep.iter().map(|&i| rows.epoch(i)).collect();
        let epochs: Vec<i64> = epochs.into_iter().collect();
        for chunk in epochs.chunks(INSERT_CHUNK) {
            diesel::delete(
                series_rows::table
                    .filter(series_rows::series_key.eq(key))
                    .filter(series_rows::epoch.eq_any(chunk)),
            )
            .execute(conn)?;
        }
        keep
    };

    for chunk in keep.chunks(INSERT_CHUNK) {
        let values: Vec<NewRow<'_>> = chunk
            .iter()
            .map(|&i| {
                let row = NewRow {
                    series_key: key,
                    seq: next_seq,
                    epoch: rows.epoch(i),
                    record: rows.record(i),
                };
                next_seq += 1;
                row
            })
            .collect();
        diesel::insert_into(series_rows::table)
            .values(&values)
            .execute(conn)?;
    }

    diesel::update(series::table.find(key))
        .set(series::next_seq.eq(next_seq))
        .execute(conn)?;
    Ok(())
}

fn destroy_series(conn: &mut SqliteConnection, key: &str) -> QueryResult<()> {
    diesel::delete(series_rows::table.filter(series_rows::series_key.eq(key))).execute(conn)?;
    diesel::delete(series::table.find(key)).execute(conn)?;
    Ok(())
}

#[async_trait]
impl SeriesStore for SqliteStore {
    async fn write(&self, key: &str, rows: &RowBatch, variable_length: bool) -> Result<()> {
        let key = key.to_string();
        let rows = rows.clone();
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| write_rows(conn, &key, &rows, variable_length))
                .map_err(|e| {
                    e.into_error(|message| Error::StoreWrite {
                        key: key.clone(),
                        message,
                    })
                })
        })
        .await
    }

    async fn destroy(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| destroy_series(conn, &key))
                .map_err(|e| Error::StoreDestroy {
                    key: key.clone(),
                    message: e.to_string(),
                })
        })
        .await
    }

    async fn query(&self, request: &QueryRequest) -> Result<Option<RowBatch>> {
        let request = request.clone();
        self.with_conn(move |conn| {
            let key = request.key();
            let failed = |e: diesel::result::Error| Error::StoreQuery {
                key: key.clone(),
                message: e.to_string(),
            };

            let Some(layout) = series::table
                .find(&key)
                .select(series::layout)
                .first::<String>(conn)
                .optional()
                .map_err(failed)?
            else {
                return Ok(None);
            };
            let schema = Arc::new(RecordSchema::parse_descriptor(&layout)?);

            let mut q = series_rows::table
                .filter(series_rows::series_key.eq(&key))
                .select(series_rows::record)
                .into_boxed();
            if let Some(start) = request.start {
                q = q.filter(series_rows::epoch.ge(start));
            }
            if let Some(end) = request.end {
                q = q.filter(series_rows::epoch.le(end));
            }
            let records: Vec<Vec<u8>> = q
                .order((series_rows::epoch.asc(), series_rows::seq.asc()))
                .load(conn)
                .map_err(failed)?;

            let mut batch = RowBatch::with_capacity(Arc::clone(&schema), records.len());
            for record in &records {
                if record.len() != schema.record_size() {
                    return Err(Error::layout(format!(
                        "{key}: stored record of {} bytes under layout {layout}",
                        record.len()
                    )));
                }
                batch.push_raw(record);
            }
            Ok(Some(batch))
        })
        .await
    }

    async fn list_symbols(&self) -> Result<BTreeSet<String>> {
        self.with_conn(|conn| {
            series::table
                .select(series::symbol)
                .distinct()
                .load::<String>(conn)
                .map(|symbols| symbols.into_iter().collect())
                .map_err(|e| Error::StoreQuery {
                    key: "*".to_string(),
                    message: e.to_string(),
                })
        })
        .await
    }

    async fn server_version(&self) -> Result<String> {
        self.with_conn(|conn| {
            diesel::sql_query("SELECT sqlite_version() AS version")
                .get_result::<Version>(conn)
                .map(|v| format!("sqlite {}", v.version))
                .map_err(|e| Error::Connection {
                    message: e.to_string(),
                })
        })
        .await
    }

    /// Destroy and rewrite in one immediate transaction.
    async fn replace(&self, key: &str, rows: &RowBatch) -> Result<()> {
        let key = key.to_string();
        let rows = rows.clone();
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| {
                destroy_series(conn, &key)?;
                write_rows(conn, &key, &rows, true)
            })
            .map_err(|e| {
                e.into_error(|message| Error::StoreWrite {
                    key: key.clone(),
                    message,
                })
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Value;

    fn batch(schema: &Arc<RecordSchema>, rows: &[(i64, f32)]) -> RowBatch {
        let mut b = RowBatch::new(Arc::clone(schema));
        for &(e, c) in rows {
            b.push(&[
                Value::I64(e),
                Value::F32(c),
                Value::F32(c),
                Value::F32(c),
                Value::F32(c),
                Value::I32(1),
                Value::F32(c),
            ])
            .unwrap();
        }
        b
    }

    #[tokio::test]
    async fn in_memory_database_round_trips() {
        let store = SqliteStore::open(":memory:").unwrap();
        let schema = Arc::new(RecordSchema::ohlcv());
        let key = SeriesKey::resolve("A", "1Min").unwrap();

        store
            .write(&key.to_string(), &batch(&schema, &[(60, 1.0), (120, 2.0)]), false)
            .await
            .unwrap();

        let got = store.query(&QueryRequest::all(&key)).await.unwrap().unwrap();
        assert_eq!(got, batch(&schema, &[(60, 1.0), (120, 2.0)]));
        assert!(store.server_version().await.unwrap().starts_with("sqlite 3."));
    }

    #[tokio::test]
    async fn failed_symbol_listing_is_a_query_error() {
        let store = SqliteStore::open(":memory:").unwrap();
        store
            .with_conn(|conn| {
                for table in ["series_rows", "series"] {
                    diesel::sql_query(format!("DROP TABLE {table}"))
                        .execute(conn)
                        .map_err(|e| Error::Connection {
                            message: e.to_string(),
                        })?;
                }
                Ok(())
            })
            .await
            .unwrap();

        let err = store.list_symbols().await.unwrap_err();
        assert!(matches!(&err, Error::StoreQuery { key, .. } if key == "*"));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn missing_series_queries_as_none() {
        let store = SqliteStore::open(":memory:").unwrap();
        let key = SeriesKey::resolve("NOPE", "1D").unwrap();
        assert!(store.query(&QueryRequest::all(&key)).await.unwrap().is_none());
    }
}
