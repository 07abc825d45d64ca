//! Record schema: ordered, fixed-width, little-endian fields.
//!
//! Every schema starts with `Epoch:i8` (seconds since the Unix epoch). The schema is
//! rendered to a descriptor string such as `Epoch:i8,Open:f4,Volume:i4`, which the
//! SQLite store persists next to each series to detect layout drift.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    record::value::FieldType,
};

pub const EPOCH_FIELD: &str = "Epoch";

/// One named field of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: FieldType,
    /// Value used when a bar does not carry this field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<f64>,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
        }
    }

    pub fn with_default(mut self, default: f64) -> Self {
        self.default = Some(default);
        self
    }
}

/// Validated, ordered field list.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSchema {
    fields: Vec<Field>,
    record_size: usize,
}

impl RecordSchema {
    /// Validates and builds a schema.
    ///
    /// The first field must be `Epoch` of type `i8`; names must be non-empty, unique
    /// (case-insensitively), and free of `:` and `,`.
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        match fields.first() {
            Some(f) if f.name == EPOCH_FIELD && f.ty == FieldType::I64 => {}
            Some(f) => {
                return Err(Error::layout(format!(
                    "first field must be {EPOCH_FIELD}:i8, got {}:{}",
                    f.name, f.ty
                )));
            }
            None => return Err(Error::layout("schema has no fields")),
        }

        let mut seen = HashSet::new();
        for f in &fields {
            if f.name.is_empty() || f.name.contains([':', ',']) {
                return Err(Error::layout(format!("invalid field name {:?}", f.name)));
            }
            if !seen.insert(f.name.to_ascii_lowercase()) {
                return Err(Error::layout(format!("duplicate field {:?}", f.name)));
            }
        }

        let record_size = fields.iter().map(|f| f.ty.width()).sum();
        Ok(Self {
            fields,
            record_size,
        })
    }

    /// Epoch i8, Open/High/Low/Close f4, Volume i4, VWAP f4.
    pub fn ohlcv() -> Self {
        Self::preset_unchecked(&[
            ("Open", FieldType::F32),
            ("High", FieldType::F32),
            ("Low", FieldType::F32),
            ("Close", FieldType::F32),
            ("Volume", FieldType::I32),
            ("VWAP", FieldType::F32),
        ])
    }

    /// Same as [`RecordSchema::ohlcv`] with a float volume.
    pub fn ohlcv_float_volume() -> Self {
        Self::preset_unchecked(&[
            ("Open", FieldType::F32),
            ("High", FieldType::F32),
            ("Low", FieldType::F32),
            ("Close", FieldType::F32),
            ("Volume", FieldType::F32),
            ("VWAP", FieldType::F32),
        ])
    }

    /// Adds sub-second precision and trade counts; volume widened to i8.
    pub fn ohlcv_extended() -> Self {
        Self::preset_unchecked(&[
            ("Nanoseconds", FieldType::I32),
            ("Open", FieldType::F32),
            ("High", FieldType::F32),
            ("Low", FieldType::F32),
            ("Close", FieldType::F32),
            ("Volume", FieldType::I64),
            ("TradeCount", FieldType::I32),
            ("VWAP", FieldType::F32),
        ])
    }

    /// Looks up a preset by its config name.
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "ohlcv" => Some(Self::ohlcv()),
            "ohlcv_float_volume" => Some(Self::ohlcv_float_volume()),
            "ohlcv_extended" => Some(Self::ohlcv_extended()),
            _ => None,
        }
    }

    fn preset_unchecked(rest: &[(&str, FieldType)]) -> Self {
        let fields: Vec<Field> = std::iter::once(Field::new(EPOCH_FIELD, FieldType::I64))
            .chain(rest.iter().map(|(n, t)| Field::new(*n, *t)))
            .collect();
        let record_size = fields.iter().map(|f| f.ty.width()).sum();
        Self {
            fields,
            record_size,
        }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Encoded size of one record in bytes.
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Position of a field by exact name.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// `Name:code` pairs joined by commas.
    pub fn descriptor(&self) -> String {
        self.fields
            .iter()
            .map(|f| format!("{}:{}", f.name, f.ty))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parses a descriptor produced by [`RecordSchema::descriptor`].
    ///
    /// Defaults are not part of the descriptor and come back as `None`.
    pub fn parse_descriptor(s: &str) -> Result<Self> {
        let fields = s
            .split(',')
            .map(|part| {
                let (name, code) = part
                    .split_once(':')
                    .ok_or_else(|| Error::layout(format!("malformed descriptor entry {part:?}")))?;
                let ty = FieldType::from_code(code.trim())
                    .ok_or_else(|| Error::layout(format!("unknown type code {code:?}")))?;
                Ok(Field::new(name.trim(), ty))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(fields)
    }

    /// Same field names and types in the same order; defaults are ignored.
    pub fn same_layout(&self, other: &RecordSchema) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(a, b)| a.name == b.name && a.ty == b.ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid_schemas() {
        for name in ["ohlcv", "ohlcv_float_volume", "ohlcv_extended"] {
            let preset = RecordSchema::preset(name).unwrap();
            let rebuilt = RecordSchema::new(preset.fields().to_vec()).unwrap();
            assert_eq!(preset, rebuilt, "{name}");
        }
        assert!(RecordSchema::preset("bogus").is_none());
    }

    #[test]
    fn ohlcv_descriptor_and_size() {
        let s = RecordSchema::ohlcv();
        assert_eq!(
            s.descriptor(),
            "Epoch:i8,Open:f4,High:f4,Low:f4,Close:f4,Volume:i4,VWAP:f4"
        );
        assert_eq!(s.record_size(), 8 + 4 * 6);
        assert_eq!(RecordSchema::parse_descriptor(&s.descriptor()).unwrap(), s);
    }

    #[test]
    fn epoch_must_lead() {
        let err = RecordSchema::new(vec![
            Field::new("Open", FieldType::F32),
            Field::new(EPOCH_FIELD, FieldType::I64),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::RecordLayout { .. }));

        let err = RecordSchema::new(vec![Field::new(EPOCH_FIELD, FieldType::I32)]).unwrap_err();
        assert!(err.to_string().contains("Epoch:i8"));
    }

    #[test]
    fn duplicate_names_are_rejected_case_insensitively() {
        let err = RecordSchema::new(vec![
            Field::new(EPOCH_FIELD, FieldType::I64),
            Field::new("Open", FieldType::F32),
            Field::new("open", FieldType::F64),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn malformed_descriptors_fail() {
        assert!(RecordSchema::parse_descriptor("Epoch:i8,Open").is_err());
        assert!(RecordSchema::parse_descriptor("Epoch:i8,Open:u2").is_err());
        assert!(RecordSchema::parse_descriptor("").is_err());
    }

    #[test]
    fn layout_comparison_ignores_defaults() {
        let a = RecordSchema::ohlcv();
        let mut fields = a.fields().to_vec();
        fields[6] = fields[6].clone().with_default(0.0);
        let b = RecordSchema::new(fields).unwrap();
        assert_ne!(a, b);
        assert!(a.same_layout(&b));
    }
}
