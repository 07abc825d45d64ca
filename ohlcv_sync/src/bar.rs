use serde::Serialize;

#[cfg(test)]
use crate::record::{FieldType, Value};
use crate::{
    error::{Error, Result},
    normalize::canonical,
    record::{RecordSchema, RowBatch},
};

/// One decoded OHLCV observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bar {
    pub epoch: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nanoseconds: Option<i32>,
    pub open: f32,
    pub high: f32,
    pub low: f32,
    pub close: f32,
    pub volume: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade_count: Option<i64>,
    pub vwap: f32,
}

/// Field positions of a schema, resolved once per batch. Only `Close` is
/// required; missing prices fall back to the close and missing volume to zero.
struct Layout {
    nanoseconds: Option<usize>,
    open: Option<usize>,
    high: Option<usize>,
    low: Option<usize>,
    close: usize,
    volume: Option<usize>,
    trade_count: Option<usize>,
    vwap: Option<usize>,
}

fn find(schema: &RecordSchema, names: &[&str]) -> Option<usize> {
    schema
        .fields()
        .iter()
        .position(|f| names.contains(&canonical(&f.name).as_str()))
}

fn require(schema: &RecordSchema, name: &str) -> Result<usize> {
    find(schema, &[name]).ok_or_else(|| {
        Error::layout(format!("schema {} has no {name} field", schema.descriptor()))
    })
}

impl Layout {
    fn of(schema: &RecordSchema) -> Result<Self> {
        Ok(Self {
            nanoseconds: find(schema, &["nanoseconds"]),
            open: find(schema, &["open"]),
            high: find(schema, &["high"]),
            low: find(schema, &["low"]),
            close: require(schema, "close")?,
            volume: find(schema, &["volume"]),
            trade_count: find(schema, &["tradecount", "trades"]),
            vwap: find(schema, &["vwap"]),
        })
    }
}

impl Bar {
    /// Fails unless records of `schema` can be decoded into bars.
    pub fn check_schema(schema: &RecordSchema) -> Result<()> {
        Layout::of(schema).map(|_| ())
    }

    /// Decodes every record of `batch`, in stored order.
    pub fn decode_all(batch: &RowBatch) -> Result<Vec<Bar>> {
        let layout = Layout::of(batch.schema())?;
        Ok((0..batch.len())
            .map(|i| {
                let v = batch.values(i);
                let f = |pos: usize| v[pos].as_f64() as f32;
                let close = f(layout.close);
                let price = |pos: Option<usize>| pos.map_or(close, f);
                Bar {
                    epoch: batch.epoch(i),
                    nanoseconds: layout.nanoseconds.map(|p| v[p].as_i64() as i32),
                    open: price(layout.open),
                    high: price(layout.high),
                    low: price(layout.low),
                    close,
                    volume: layout.volume.map_or(0, |p| v[p].as_i64()),
                    trade_count: layout.trade_count.map(|p| v[p].as_i64()),
                    vwap: price(layout.vwap),
                }
            })
            .collect())
    }

    /// Encodes this bar under `schema`. Fields the bar does not carry are zero.
    #[cfg(test)]
    pub(crate) fn to_values(&self, schema: &RecordSchema) -> Vec<Value> {
        schema
            .fields()
            .iter()
            .map(|field| {
                let n = match canonical(&field.name).as_str() {
                    "epoch" => self.epoch as f64,
                    "nanoseconds" => f64::from(self.nanoseconds.unwrap_or(0)),
                    "open" => f64::from(self.open),
                    "high" => f64::from(self.high),
                    "low" => f64::from(self.low),
                    "close" => f64::from(self.close),
                    "volume" => self.volume as f64,
                    "tradecount" | "trades" => self.trade_count.unwrap_or(0) as f64,
                    "vwap" => f64::from(self.vwap),
                    _ => field.default.unwrap_or(0.0),
                };
                match field.ty {
                    FieldType::I32 => Value::I32(n as i32),
                    FieldType::I64 if canonical(&field.name) == "epoch" => {
                        Value::I64(self.epoch)
                    }
                    FieldType::I64 => Value::I64(n as i64),
                    FieldType::F32 => Value::F32(n as f32),
                    FieldType::F64 => Value::F64(n),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::record::{EPOCH_FIELD, Field};

    fn sample() -> Bar {
        Bar {
            epoch: 1_700_000_000,
            nanoseconds: None,
            open: 1.5,
            high: 2.25,
            low: 1.0,
            close: 2.0,
            volume: 1234,
            trade_count: None,
            vwap: 1.75,
        }
    }

    #[test]
    fn decodes_ohlcv_records() {
        let schema = Arc::new(RecordSchema::ohlcv());
        let mut batch = RowBatch::new(Arc::clone(&schema));
        batch.push(&sample().to_values(&schema)).unwrap();

        assert_eq!(Bar::decode_all(&batch).unwrap(), vec![sample()]);
    }

    #[test]
    fn extended_records_keep_optional_fields() {
        let schema = Arc::new(RecordSchema::ohlcv_extended());
        let bar = Bar {
            nanoseconds: Some(5),
            trade_count: Some(9),
            ..sample()
        };
        let mut batch = RowBatch::new(Arc::clone(&schema));
        batch.push(&bar.to_values(&schema)).unwrap();

        assert_eq!(Bar::decode_all(&batch).unwrap(), vec![bar]);
    }

    #[test]
    fn schema_without_close_cannot_decode() {
        let schema = Arc::new(
            RecordSchema::new(vec![
                Field::new(EPOCH_FIELD, FieldType::I64),
                Field::new("Open", FieldType::F32),
            ])
            .unwrap(),
        );
        assert!(Bar::check_schema(&schema).is_err());
        let err = Bar::decode_all(&RowBatch::new(schema)).unwrap_err();
        assert!(err.to_string().contains("close"));
    }

    #[test]
    fn close_only_records_fill_missing_fields() {
        let schema =
            Arc::new(RecordSchema::parse_descriptor("Epoch:i8,Close:f8,Volume:i8").unwrap());
        Bar::check_schema(&schema).unwrap();
        let mut batch = RowBatch::new(Arc::clone(&schema));
        batch.push(&sample().to_values(&schema)).unwrap();

        let bar = Bar::decode_all(&batch).unwrap()[0];
        assert_eq!((bar.open, bar.high, bar.low, bar.vwap), (2.0, 2.0, 2.0, 2.0));
        assert_eq!(bar.volume, 1234);

        let schema = Arc::new(RecordSchema::parse_descriptor("Epoch:i8,Close:f4").unwrap());
        let mut batch = RowBatch::new(Arc::clone(&schema));
        batch.push(&sample().to_values(&schema)).unwrap();
        assert_eq!(Bar::decode_all(&batch).unwrap()[0].volume, 0);
    }
}
