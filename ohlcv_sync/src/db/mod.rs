//! Database utilities for the SQLite store.
//!
//! - [`connection::connect_sqlite`] opens a connection and applies WAL journaling,
//!   foreign_keys=ON, and a 5000ms busy_timeout.
//! - [`migrate::run_pending`] / [`migrate::run_sqlite`] apply the embedded Diesel
//!   migrations.
//!
//! Example:
//! ```no_run
//! use ohlcv_sync::db::{connection, migrate};
//!
//! let db_path = std::env::temp_dir().join("ohlcv_sync_example.db");
//! migrate::run_sqlite(db_path.to_str().unwrap()).expect("migrations");
//! let _conn = connection::connect_sqlite(db_path.to_str().unwrap()).expect("connect");
//! ```

pub mod connection;
pub mod migrate;
