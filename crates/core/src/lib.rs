pub mod coerce;
pub mod error;
pub mod field_spec;
pub mod field_value;
pub mod ids;
pub mod record;

pub use error::CoreError;
pub use field_spec::{BooleanLabels, FieldKind, FieldRegistry, FieldSpec};
pub use field_value::FieldValue;
pub use ids::RecordId;
pub use record::{Patch, Record};
