pub mod error;
pub mod types;
pub mod value;

pub use error::{MigrateError, Result};
pub use types::{EntityDef, FieldDef, Record, Schema};
pub use value::{DataType, Value};
