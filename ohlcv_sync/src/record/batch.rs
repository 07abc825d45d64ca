use std::sync::Arc;

use crate::{
    error::{Error, Result},
    record::{schema::RecordSchema, value::Value},
};

/// Contiguous packed records sharing one schema.
#[derive(Debug, Clone, PartialEq)]
pub struct RowBatch {
    schema: Arc<RecordSchema>,
    data: Vec<u8>,
}

impl RowBatch {
    pub fn new(schema: Arc<RecordSchema>) -> Self {
        Self {
            schema,
            data: Vec::new(),
        }
    }

    pub fn with_capacity(schema: Arc<RecordSchema>, rows: usize) -> Self {
        let data = Vec::with_capacity(rows * schema.record_size());
        Self { schema, data }
    }

    /// Wraps already-packed bytes. Fails if `data` is not a whole number of records.
    pub fn from_bytes(schema: Arc<RecordSchema>, data: Vec<u8>) -> Result<Self> {
        if data.len() % schema.record_size() != 0 {
            return Err(Error::layout(format!(
                "{} bytes is not a multiple of the {}-byte record size",
                data.len(),
                schema.record_size()
            )));
        }
        Ok(Self { schema, data })
    }

    pub fn schema(&self) -> &Arc<RecordSchema> {
        &self.schema
    }

    /// Appends one record; `values` must match the schema field-for-field.
    pub fn push(&mut self, values: &[Value]) -> Result<()> {
        let fields = self.schema.fields();
        if values.len() != fields.len() {
            return Err(Error::layout(format!(
                "record has {} values, schema has {} fields",
                values.len(),
                fields.len()
            )));
        }
        if let Some((f, v)) = fields.iter().zip(values).find(|(f, v)| f.ty != v.ty()) {
            return Err(Error::layout(format!(
                "field {} expects {}, got {}",
                f.name,
                f.ty,
                v.ty()
            )));
        }
        for v in values {
            v.write_le(&mut self.data);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.schema.record_size()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw bytes of record `i`. Panics if out of bounds.
    pub fn record(&self, i: usize) -> &[u8] {
        let size = self.schema.record_size();
        &self.data[i * size..(i + 1) * size]
    }

    pub fn epoch(&self, i: usize) -> i64 {
        let rec = self.record(i);
        let mut b = [0u8; 8];
        b.copy_from_slice(&rec[..8]);
        i64::from_le_bytes(b)
    }

    pub fn epochs(&self) -> impl Iterator<Item = i64> + '_ {
        (0..self.len()).map(|i| self.epoch(i))
    }

    /// Decodes record `i` in field order.
    pub fn values(&self, i: usize) -> Vec<Value> {
        let rec = self.record(i);
        let mut offset = 0;
        self.schema
            .fields()
            .iter()
            .map(|f| {
                let w = f.ty.width();
                let v = Value::read_le(f.ty, &rec[offset..offset + w]);
                offset += w;
                v
            })
            .collect()
    }

    /// The last `n` records (all of them if `n >= len`), order preserved.
    pub fn tail(&self, n: usize) -> RowBatch {
        let skip = self.len().saturating_sub(n) * self.schema.record_size();
        RowBatch {
            schema: Arc::clone(&self.schema),
            data: self.data[skip..].to_vec(),
        }
    }

    /// Records whose epoch satisfies `keep`, order preserved.
    pub fn filter_epochs(&self, mut keep: impl FnMut(i64) -> bool) -> RowBatch {
        let mut out = RowBatch::new(Arc::clone(&self.schema));
        for i in 0..self.len() {
            if keep(self.epoch(i)) {
                out.data.extend_from_slice(self.record(i));
            }
        }
        out
    }

    /// Appends every record of `other`, which must share this layout.
    pub fn extend(&mut self, other: &RowBatch) -> Result<()> {
        if !self.schema.same_layout(&other.schema) {
            return Err(Error::layout(format!(
                "cannot append {} records to {} records",
                other.schema.descriptor(),
                self.schema.descriptor()
            )));
        }
        self.data.extend_from_slice(&other.data);
        Ok(())
    }

    pub(crate) fn push_raw(&mut self, record: &[u8]) {
        debug_assert_eq!(record.len(), self.schema.record_size());
        self.data.extend_from_slice(record);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}
