//! OHLCV series ingestion and retention.
//!
//! Bars arrive either one at a time from a stream ([`StreamBar`]) or in bulk from
//! a historical feed ([`BarFrame`]). They are normalized into fixed-width records
//! ([`record`]), filed under `{symbol}/{timeframe}/{attribute_group}` keys ([`key`]),
//! and written to a [`store::SeriesStore`]. A [`trim::RetentionTrimmer`] caps each
//! series at a per-timeframe length; [`query::SeriesQuery`] reads bars back.
//!
//! [`engine::SeriesEngine`] wires all of this over a single store.
//!
//! [`StreamBar`]: market_data_ingestor::models::bar::StreamBar
//! [`BarFrame`]: market_data_ingestor::models::bar_frame::BarFrame

pub mod backfill;
pub mod bar;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod key;
pub mod locks;
pub mod logging;
pub mod normalize;
pub mod query;
pub mod record;
pub mod schema;
pub mod store;
pub mod trim;
pub mod writer;

pub use error::{Error, Result};
