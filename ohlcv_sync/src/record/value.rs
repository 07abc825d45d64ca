use std::fmt;

use serde::{Deserialize, Serialize};

/// Storage type of one schema field, spelled with numpy-style codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    #[serde(rename = "i4")]
    I32,
    #[serde(rename = "i8")]
    I64,
    #[serde(rename = "f4")]
    F32,
    #[serde(rename = "f8")]
    F64,
}

impl FieldType {
    pub const fn code(self) -> &'static str {
        match self {
            FieldType::I32 => "i4",
            FieldType::I64 => "i8",
            FieldType::F32 => "f4",
            FieldType::F64 => "f8",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "i4" => Some(FieldType::I32),
            "i8" => Some(FieldType::I64),
            "f4" => Some(FieldType::F32),
            "f8" => Some(FieldType::F64),
            _ => None,
        }
    }

    /// Encoded width in bytes.
    pub const fn width(self) -> usize {
        match self {
            FieldType::I32 | FieldType::F32 => 4,
            FieldType::I64 | FieldType::F64 => 8,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A typed field value inside a packed record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Value {
    pub const fn ty(self) -> FieldType {
        match self {
            Value::I32(_) => FieldType::I32,
            Value::I64(_) => FieldType::I64,
            Value::F32(_) => FieldType::F32,
            Value::F64(_) => FieldType::F64,
        }
    }

    /// Widened numeric view.
    pub fn as_f64(self) -> f64 {
        match self {
            Value::I32(v) => f64::from(v),
            Value::I64(v) => v as f64,
            Value::F32(v) => f64::from(v),
            Value::F64(v) => v,
        }
    }

    /// Integer view; floats are truncated toward zero.
    pub fn as_i64(self) -> i64 {
        match self {
            Value::I32(v) => i64::from(v),
            Value::I64(v) => v,
            Value::F32(v) => v as i64,
            Value::F64(v) => v as i64,
        }
    }

    pub(crate) fn write_le(self, out: &mut Vec<u8>) {
        match self {
            Value::I32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::I64(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::F32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::F64(v) => out.extend_from_slice(&v.to_le_bytes()),
        }
    }

    /// Decodes one value; `bytes` must be exactly `ty.width()` long.
    pub(crate) fn read_le(ty: FieldType, bytes: &[u8]) -> Self {
        let mut b8 = [0u8; 8];
        b8[..bytes.len()].copy_from_slice(bytes);
        let b4 = [b8[0], b8[1], b8[2], b8[3]];
        match ty {
            FieldType::I32 => Value::I32(i32::from_le_bytes(b4)),
            FieldType::I64 => Value::I64(i64::from_le_bytes(b8)),
            FieldType::F32 => Value::F32(f32::from_le_bytes(b4)),
            FieldType::F64 => Value::F64(f64::from_le_bytes(b8)),
        }
    }
}
