//! Fixed-width binary record format used for every stored bar.

mod batch;
mod schema;
mod value;

pub use batch::RowBatch;
pub use schema::{EPOCH_FIELD, Field, RecordSchema};
pub use value::{FieldType, Value};
