//! Data models for the click-link client library.

pub mod column_type;
pub mod row;
pub mod table_ref;
pub mod table_schema;
pub mod value;

pub use column_type::ColumnType;
pub use row::Row;
pub use table_ref::TableRef;
pub use table_schema::{SchemaColumn, TableSchema};
pub use value::Value;
