//! Bar normalization: raw feed records to packed schema records.
//!
//! Field lookup is driven by the schema. Each schema field name is matched against
//! source names case-insensitively with underscores ignored, through a small alias
//! table (`Open` matches `open`, `o`, `OPEN`; `TradeCount` matches `trade_count`,
//! `trades`, `n`). `Epoch` and `Nanoseconds` always come from the bar timestamp.
//!
//! Coercion is strict. A float only lands in an integer field when it is integral
//! and in range, and a missing value needs a field default. Nothing is dropped
//! silently.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use market_data_ingestor::models::{
    bar::StreamBar,
    bar_frame::{BarFrame, Cell, RowView},
};

use crate::{
    error::{Error, Result},
    record::{Field, FieldType, RecordSchema, RowBatch, Value},
};

const NANOS_PER_SEC: i64 = 1_000_000_000;

const ALIASES: &[&[&str]] = &[
    &["open", "o"],
    &["high", "h"],
    &["low", "l"],
    &["close", "c"],
    &["volume", "v"],
    &["vwap", "vw"],
    &["tradecount", "trades", "n"],
];

const TIMESTAMP_COLUMNS: &[&str] = &["t", "timestamp", "time"];

pub(crate) fn canonical(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn aliases_of(canon: &str) -> Option<&'static [&'static str]> {
    ALIASES.iter().copied().find(|set| set.contains(&canon))
}

/// Whether a source column/field name answers to the given schema field.
fn matches_field(field_canon: &str, source: &str) -> bool {
    let source = canonical(source);
    match aliases_of(field_canon) {
        Some(set) => set.contains(&source.as_str()),
        None => source == field_canon,
    }
}

/// The timestamp of one bar, split for the `Epoch` and `Nanoseconds` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    epoch: i64,
    nanos: i64,
}

/// A frame row that failed to normalize.
#[derive(Debug)]
pub struct RejectedRow {
    /// Zero-based position within the frame.
    pub row: usize,
    pub source: Error,
}

/// Converts raw bars into records of one schema.
#[derive(Debug, Clone)]
pub struct BarNormalizer {
    schema: Arc<RecordSchema>,
    canon: Vec<String>,
}

impl BarNormalizer {
    pub fn new(schema: Arc<RecordSchema>) -> Self {
        let canon = schema.fields().iter().map(|f| canonical(&f.name)).collect();
        Self { schema, canon }
    }

    pub fn schema(&self) -> &Arc<RecordSchema> {
        &self.schema
    }

    /// Normalizes one streamed bar. Sub-second precision is dropped from `Epoch`.
    pub fn normalize_stream(&self, bar: &StreamBar) -> Result<Vec<Value>> {
        let stamp = Stamp {
            epoch: bar.timestamp.timestamp(),
            nanos: i64::from(bar.timestamp.timestamp_subsec_nanos()),
        };
        let cells = bar.cells();
        self.build(stamp, |canon| {
            cells
                .iter()
                .find(|(name, _)| matches_field(canon, name))
                .map(|(_, cell)| *cell)
        })
    }

    /// Normalizes one row of a tabular batch.
    ///
    /// The timestamp comes from the frame index or, failing that, a `t`,
    /// `timestamp` or `time` column (a datetime, or integer nanoseconds).
    pub fn normalize_row(&self, row: RowView<'_>) -> Result<Vec<Value>> {
        let stamp = match row.index() {
            Some(ts) => stamp_from_datetime(ts)?,
            None => {
                let cell = row
                    .cells()
                    .find(|(name, _)| TIMESTAMP_COLUMNS.contains(&canonical(name).as_str()))
                    .map(|(_, cell)| cell)
                    .ok_or_else(|| Error::mismatch("Epoch", "row has no timestamp index or column"))?;
                stamp_from_cell(cell)?
            }
        };
        self.build(stamp, |canon| {
            row.cells()
                .find(|(name, _)| matches_field(canon, name))
                .map(|(_, cell)| cell)
        })
    }

    /// Normalizes every row of `frame`, stopping at the first failure.
    pub fn normalize_frame(&self, frame: &BarFrame) -> Result<RowBatch, RejectedRow> {
        let mut batch = RowBatch::with_capacity(Arc::clone(&self.schema), frame.len());
        for row in frame.rows() {
            let position = row.position();
            self.normalize_row(row)
                .and_then(|values| batch.push(&values))
                .map_err(|source| RejectedRow {
                    row: position,
                    source,
                })?;
        }
        Ok(batch)
    }

    fn build(&self, stamp: Stamp, lookup: impl Fn(&str) -> Option<Cell>) -> Result<Vec<Value>> {
        self.schema
            .fields()
            .iter()
            .zip(&self.canon)
            .map(|(field, canon)| match canon.as_str() {
                "epoch" => coerce(field, Cell::Int(stamp.epoch)),
                "nanoseconds" => coerce(field, Cell::Int(stamp.nanos)),
                _ => coerce(field, lookup(canon).unwrap_or(Cell::Null)),
            })
            .collect()
    }
}

fn stamp_from_datetime(ts: DateTime<Utc>) -> Result<Stamp> {
    let ns = ts
        .timestamp_nanos_opt()
        .ok_or_else(|| Error::mismatch("Epoch", format!("timestamp {ts} out of nanosecond range")))?;
    Ok(stamp_from_nanos(ns))
}

fn stamp_from_nanos(ns: i64) -> Stamp {
    Stamp {
        epoch: ns.div_euclid(NANOS_PER_SEC),
        nanos: ns.rem_euclid(NANOS_PER_SEC),
    }
}

fn stamp_from_cell(cell: Cell) -> Result<Stamp> {
    match cell {
        Cell::Time(ts) => stamp_from_datetime(ts),
        Cell::Int(ns) => Ok(stamp_from_nanos(ns)),
        Cell::Float(_) => Err(Error::mismatch("Epoch", "timestamp column holds a float")),
        Cell::Null => Err(Error::mismatch("Epoch", "timestamp is null")),
    }
}

fn coerce(field: &Field, cell: Cell) -> Result<Value> {
    let cell = match (cell, field.default) {
        (Cell::Null, Some(default)) => Cell::Float(default),
        (cell, _) => cell,
    };

    match (field.ty, cell) {
        (_, Cell::Null) => Err(Error::mismatch(&field.name, "missing and no default")),
        (_, Cell::Time(_)) => Err(Error::mismatch(&field.name, "timestamp in a numeric field")),

        (FieldType::I32, Cell::Int(v)) => i32::try_from(v)
            .map(Value::I32)
            .map_err(|_| Error::mismatch(&field.name, format!("{v} does not fit i4"))),
        (FieldType::I32, Cell::Float(v)) => integral(field, v, f64::from(i32::MIN), f64::from(i32::MAX))
            .map(|v| Value::I32(v as i32)),

        (FieldType::I64, Cell::Int(v)) => Ok(Value::I64(v)),
        // 2^63 is exactly representable; i64::MAX is not.
        (FieldType::I64, Cell::Float(v)) => {
            integral(field, v, -9_223_372_036_854_775_808.0, 9_223_372_036_854_775_807.0)
                .map(|v| Value::I64(v as i64))
        }

        (FieldType::F32, Cell::Int(v)) => Ok(Value::F32(v as f32)),
        (FieldType::F32, Cell::Float(v)) => {
            if v.is_finite() && v.abs() > f64::from(f32::MAX) {
                Err(Error::mismatch(&field.name, format!("{v} does not fit f4")))
            } else {
                Ok(Value::F32(v as f32))
            }
        }

        (FieldType::F64, Cell::Int(v)) => Ok(Value::F64(v as f64)),
        (FieldType::F64, Cell::Float(v)) => Ok(Value::F64(v)),
    }
}

fn integral(field: &Field, v: f64, min: f64, max: f64) -> Result<f64> {
    if !v.is_finite() || v.fract() != 0.0 {
        return Err(Error::mismatch(
            &field.name,
            format!("{v} is not an integer value for {}", field.ty),
        ));
    }
    if v < min || v >= max + 1.0 {
        return Err(Error::mismatch(&field.name, format!("{v} does not fit {}", field.ty)));
    }
    Ok(v)
}
