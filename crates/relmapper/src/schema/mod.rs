//! Column and table descriptors, and the numeric type table.

pub mod column;
pub mod numeric;
pub mod table;

pub use column::{ColumnDefault, ColumnDescriptor, ColumnMetadata};
pub use table::TableDescriptor;
