//! Client library for ClickHouse-compatible column-oriented analytical
//! stores.
//!
//! click-link speaks the store's HTTP protocol and its typed tabular wire
//! format, and adds the client-side layers that make pushing arbitrary
//! documents practical:
//!
//! - a codec for `TabSeparatedWithNamesAndTypes` ([`formatter`])
//! - a column type lattice with inference and generalization
//!   ([`models::ColumnType`])
//! - a document flattener turning nested records into dotted-path columns
//!   ([`flatten`])
//! - a schema reconciler that extends tables with `ADD`/`MODIFY COLUMN`
//!   as documents require ([`Cursor::store_documents`])
//! - a filterable result cache for repeated lookups over one result set
//!   ([`Cursor::cached_select`])
//!
//! # Example
//!
//! ```rust,no_run
//! use click_link::Connection;
//! use serde_json::json;
//!
//! # async fn example() -> click_link::Result<()> {
//! let connection = Connection::builder()
//!     .base_url("http://localhost:8123")
//!     .build()?;
//!
//! let mut cursor = connection.cursor();
//!
//! // Documents extend the table schema as needed
//! let documents = vec![
//!     json!({"id": 1, "offer": {"price": 9.5}}).into(),
//!     json!({"id": 2, "tags": ["new", "sale"]}).into(),
//! ];
//! cursor.store_documents("shop.offers", &documents).await?;
//!
//! // Plain selects decode into typed rows
//! cursor.select("SELECT id, tags FROM shop.offers").await?;
//! for row in cursor.fetch_all() {
//!     println!("{row:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod connection;
pub mod cursor;
pub mod error;
pub mod flatten;
pub mod formatter;
pub mod models;
pub mod timeouts;
pub mod transport;

pub use cache::{Condition, Filter, FilterableCache};
pub use connection::{Connection, ConnectionBuilder};
pub use cursor::{Cursor, StoreOptions, WIRE_FORMAT};
pub use error::{ClickLinkError, Result};
pub use flatten::{flatten, remove_nulls};
pub use formatter::Record;
pub use models::{ColumnType, Row, SchemaColumn, TableRef, TableSchema, Value};
pub use timeouts::ClickLinkTimeouts;
pub use transport::{HttpTransport, Transport};
