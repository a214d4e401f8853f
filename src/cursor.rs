//! Cursor: query execution, result iteration and schema management.
//!
//! A cursor shares its connection's transport and adds the client-side
//! smarts: the typed wire codec on selects, parameter binding, the
//! self-extending schema path ([`Cursor::store_documents`]) and the
//! filterable result cache ([`Cursor::cached_select`]).

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, info, warn};

use crate::cache::{Filter, FilterableCache};
use crate::error::{ClickLinkError, Result};
use crate::flatten::{flatten, remove_nulls};
use crate::formatter::{self, Record};
use crate::models::{ColumnType, Row, TableRef, TableSchema, Value};
use crate::transport::{HttpTransport, Transport};

/// Name of the typed tabular wire format used on every parsed select.
pub const WIRE_FORMAT: &str = "TabSeparatedWithNamesAndTypes";

/// Retry and propagation policy for schema-extending writes.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Attempts for the whole reconcile-and-insert cycle when the store
    /// reports a concurrent schema change. Default: 5
    pub max_attempts: u32,

    /// Wait between a schema change and the following insert, so the write
    /// does not race a not-yet-replicated schema. Default: 60 seconds
    pub propagation_delay: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            propagation_delay: Duration::from_secs(60),
        }
    }
}

/// A cursor over one store connection.
///
/// Prefer the specific verbs over raw command strings: [`select`](Self::select)
/// for queries, [`bulk_insert`](Self::bulk_insert) for batches,
/// [`ddl`](Self::ddl) for statements without a result, and
/// [`store_documents`](Self::store_documents) for nested documents that may
/// not fit the current table schema.
pub struct Cursor<T: Transport = HttpTransport> {
    transport: Arc<T>,
    cache: FilterableCache,
    last_result: Option<Vec<Row>>,
    raw_result: Option<Bytes>,
    row_index: usize,
    store_options: StoreOptions,
}

impl<T: Transport> Cursor<T> {
    /// Create a cursor over an explicitly owned transport handle.
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            cache: FilterableCache::new(),
            last_result: None,
            raw_result: None,
            row_index: 0,
            store_options: StoreOptions::default(),
        }
    }

    /// Override the retry/propagation policy for schema-extending writes.
    pub fn with_store_options(mut self, options: StoreOptions) -> Self {
        self.store_options = options;
        self
    }

    /// Execute a select query.
    ///
    /// `FORMAT TabSeparatedWithNamesAndTypes` is appended when the query
    /// names no format of its own, and the response is decoded into rows
    /// for [`fetch_all`](Self::fetch_all) / [`fetch_one`](Self::fetch_one).
    /// A query naming another format is executed as-is and its raw body is
    /// kept under [`raw_result`](Self::raw_result) instead.
    pub async fn select(&mut self, query: &str) -> Result<()> {
        let (command, parse) = match trailing_format(query) {
            None => (Cow::Owned(format!("{query} FORMAT {WIRE_FORMAT}")), true),
            Some(format) if format.eq_ignore_ascii_case(WIRE_FORMAT) => {
                (Cow::Borrowed(query), true)
            }
            Some(_) => (Cow::Borrowed(query), false),
        };
        debug!("[CURSOR] select: \"{}\"", preview(&command));
        let body = self.transport.execute(command.into_owned(), None).await?;
        if parse {
            let text = std::str::from_utf8(&body).map_err(|e| {
                ClickLinkError::Decode(format!("response is not valid UTF-8: {e}"))
            })?;
            self.last_result = Some(formatter::decode(text)?);
            self.raw_result = None;
        } else {
            self.last_result = None;
            self.raw_result = Some(body);
        }
        self.row_index = 0;
        Ok(())
    }

    /// Execute a select query with `?` placeholders bound to `params`.
    pub async fn select_with_params(&mut self, query: &str, params: &[Value]) -> Result<()> {
        let bound = bind(query, params)?;
        self.select(&bound).await
    }

    /// Execute a DDL statement or any other query without a result.
    /// Successful statements are committed by the store automatically.
    pub async fn ddl(&mut self, statement: &str) -> Result<()> {
        debug!("[CURSOR] ddl: \"{}\"", preview(statement));
        self.transport.execute(statement.to_string(), None).await?;
        self.clear_results();
        Ok(())
    }

    /// Execute a DDL statement with `?` placeholders bound to `params`.
    pub async fn ddl_with_params(&mut self, statement: &str, params: &[Value]) -> Result<()> {
        let bound = bind(statement, params)?;
        self.ddl(&bound).await
    }

    /// Execute an insert with the data packed inside the statement itself.
    /// [`bulk_insert`](Self::bulk_insert) is the better fit for batches.
    pub async fn insert(&mut self, statement: &str) -> Result<()> {
        self.ddl(statement).await
    }

    /// Insert a batch of records at once.
    ///
    /// When `schema` is omitted, field names and types are inferred from
    /// the first record.
    pub async fn bulk_insert<R: Record>(
        &mut self,
        table: &str,
        rows: &[R],
        schema: Option<(&[String], &[ColumnType])>,
    ) -> Result<()> {
        let table_ref = TableRef::parse(table)?;
        self.bulk_insert_ref(&table_ref, rows, schema).await
    }

    async fn bulk_insert_ref<R: Record>(
        &mut self,
        table_ref: &TableRef,
        rows: &[R],
        schema: Option<(&[String], &[ColumnType])>,
    ) -> Result<()> {
        let (fields, _types, body) = formatter::encode(rows, schema)?;
        let command = format!(
            "INSERT INTO {table_ref} ({}) FORMAT {WIRE_FORMAT}",
            fields.join(",")
        );
        debug!("[CURSOR] bulk insert of {} rows into {table_ref}", rows.len());
        self.transport
            .execute(command, Some(body.into_bytes()))
            .await?;
        self.clear_results();
        Ok(())
    }

    /// All rows of the last parsed select.
    pub fn fetch_all(&self) -> &[Row] {
        self.last_result.as_deref().unwrap_or_default()
    }

    /// Next row of the last parsed select, or `None` when exhausted.
    pub fn fetch_one(&mut self) -> Option<&Row> {
        let rows = self.last_result.as_ref()?;
        let row = rows.get(self.row_index)?;
        self.row_index += 1;
        Some(row)
    }

    /// Raw body of the last select that used a foreign FORMAT clause.
    pub fn raw_result(&self) -> Option<&Bytes> {
        self.raw_result.as_ref()
    }

    fn clear_results(&mut self) {
        self.last_result = None;
        self.raw_result = None;
        self.row_index = 0;
    }

    fn take_rows(&mut self) -> Vec<Row> {
        self.row_index = 0;
        self.last_result.take().unwrap_or_default()
    }

    /// Current schema of a table, read fresh from the store.
    pub async fn schema_of(&mut self, table: &str) -> Result<TableSchema> {
        let table_ref = TableRef::parse(table)?;
        self.schema_of_ref(&table_ref).await
    }

    async fn schema_of_ref(&mut self, table_ref: &TableRef) -> Result<TableSchema> {
        let query = bind(
            "SELECT name, type FROM system.columns WHERE database = ? AND table = ?",
            &[
                table_ref.database_or_default().into(),
                table_ref.table().into(),
            ],
        )?;
        self.select(&query).await?;
        let mut columns = Vec::new();
        for row in self.take_rows() {
            let name = row
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| ClickLinkError::Decode("schema row has no 'name'".into()))?
                .to_string();
            let column_type = row
                .get("type")
                .and_then(Value::as_str)
                .ok_or_else(|| ClickLinkError::Decode("schema row has no 'type'".into()))?
                .parse()?;
            columns.push((name, column_type));
        }
        Ok(TableSchema::new(columns))
    }

    /// Bring the table's schema up to what `fields`/`types` require,
    /// returning whether any DDL was issued.
    ///
    /// Missing columns are added; columns whose type differs are widened to
    /// the generalization of the current and required type (never
    /// narrowed). The schema is read fresh from the store, never cached.
    pub async fn ensure_schema(
        &mut self,
        table: &str,
        fields: &[String],
        types: &[ColumnType],
    ) -> Result<bool> {
        if fields.len() != types.len() {
            return Err(ClickLinkError::Configuration(format!(
                "{} fields but {} types",
                fields.len(),
                types.len()
            )));
        }
        let table_ref = TableRef::parse(table)?;
        let (_, changed) = self.reconcile(&table_ref, fields, types).await?;
        Ok(changed)
    }

    async fn reconcile(
        &mut self,
        table_ref: &TableRef,
        fields: &[String],
        types: &[ColumnType],
    ) -> Result<(TableSchema, bool)> {
        let mut schema = self.schema_of_ref(table_ref).await?;
        let mut adds = Vec::new();
        let mut modifies = Vec::new();
        for (field, required) in fields.iter().zip(types) {
            match schema.get(field) {
                None => adds.push((field.clone(), required.clone())),
                Some(existing) if existing != required => {
                    let generalized = existing.generalize(required);
                    if generalized != *existing {
                        modifies.push((field.clone(), generalized));
                    }
                }
                Some(_) => {}
            }
        }

        let changed = !adds.is_empty() || !modifies.is_empty();
        for (field, column_type) in &adds {
            info!("[STORE] extending {table_ref} with {field} {column_type}");
            self.ddl(&format!(
                "ALTER TABLE {table_ref} ADD COLUMN {field} {column_type}"
            ))
            .await?;
            schema.upsert(field.clone(), column_type.clone());
        }
        for (field, column_type) in &modifies {
            info!("[STORE] modifying {table_ref} column {field} to {column_type}");
            self.ddl(&format!(
                "ALTER TABLE {table_ref} MODIFY COLUMN {field} {column_type}"
            ))
            .await?;
            schema.upsert(field.clone(), column_type.clone());
        }
        if changed {
            self.ddl(&format!("OPTIMIZE TABLE {table_ref}")).await?;
        }
        Ok((schema, changed))
    }

    /// Store nested documents into a table, extending its schema as needed.
    ///
    /// Documents are cleaned of nulls, flattened into dotted-path columns,
    /// and their union schema is reconciled against the table before the
    /// batch is inserted. When a value contradicts the existing column
    /// type, the column is widened along the type lattice (ultimately to
    /// `String`, which accommodates anything). Returns whether the table
    /// schema changed.
    ///
    /// Concurrent writers racing on the same table's schema are handled
    /// optimistically: on a conflict report from the store, the whole
    /// reconcile-and-insert cycle restarts from a fresh schema read, up to
    /// [`StoreOptions::max_attempts`] times.
    pub async fn store_documents(&mut self, table: &str, documents: &[Value]) -> Result<bool> {
        let table_ref = TableRef::parse(table)?;
        let cleaned: Vec<Value> = documents.iter().filter_map(remove_nulls).collect();
        let flat: Vec<Row> = cleaned
            .iter()
            .map(flatten)
            .filter(|row| !row.is_empty())
            .collect();
        if flat.is_empty() {
            return Err(ClickLinkError::Encode(
                "no documents left to store after null removal".to_string(),
            ));
        }

        // Union schema across the batch, folding per-document conflicts
        // through the lattice
        let mut union_fields: Vec<String> = Vec::new();
        let mut union_types: HashMap<String, ColumnType> = HashMap::new();
        for row in &flat {
            for (field, value) in row.iter() {
                let inferred = ColumnType::infer(value, field)?;
                match union_types.get_mut(field) {
                    Some(existing) => {
                        if *existing != inferred {
                            *existing = existing.generalize(&inferred);
                        }
                    }
                    None => {
                        union_fields.push(field.clone());
                        union_types.insert(field.clone(), inferred);
                    }
                }
            }
        }
        let types: Vec<ColumnType> = union_fields
            .iter()
            .map(|field| union_types[field].clone())
            .collect();

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .reconcile_and_insert(&table_ref, &flat, &union_fields, &types)
                .await
            {
                Ok(changed) => return Ok(changed),
                Err(e) if e.is_schema_conflict() && attempt < self.store_options.max_attempts => {
                    warn!(
                        "[STORE] schema conflict on {table_ref} (attempt {attempt}/{}): {e}",
                        self.store_options.max_attempts
                    );
                }
                Err(e) if e.is_schema_conflict() => {
                    return Err(ClickLinkError::SchemaConflict {
                        table: table_ref.to_string(),
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn reconcile_and_insert(
        &mut self,
        table_ref: &TableRef,
        rows: &[Row],
        fields: &[String],
        types: &[ColumnType],
    ) -> Result<bool> {
        let (schema, changed) = self.reconcile(table_ref, fields, types).await?;
        if changed && !self.store_options.propagation_delay.is_zero() {
            debug!(
                "[STORE] waiting {:?} for schema propagation on {table_ref}",
                self.store_options.propagation_delay
            );
            tokio::time::sleep(self.store_options.propagation_delay).await;
        }

        // Encode against the post-DDL table types, not the inferred ones: an
        // existing wider column (say String) must shape the cell text. Only
        // fields present in the batch are named, so the store fills column
        // defaults for the rest.
        let present: HashSet<&str> = fields.iter().map(String::as_str).collect();
        let mut insert_fields = Vec::new();
        let mut insert_types = Vec::new();
        for column in schema.columns() {
            if present.contains(column.name.as_str()) {
                insert_fields.push(column.name.clone());
                insert_types.push(column.column_type.clone());
            }
        }
        self.bulk_insert_ref(table_ref, rows, Some((&insert_fields, &insert_types)))
            .await?;
        Ok(changed)
    }

    /// Select through the filterable result cache.
    ///
    /// On the first call for a given query and filter field set, the query
    /// runs unfiltered and its full result is cached and indexed by those
    /// fields; afterwards the filter is answered from memory. The cache is
    /// never invalidated — create a new cursor to see fresh data.
    pub async fn cached_select(&mut self, query: &str, filter: &Filter) -> Result<Vec<Row>> {
        let tag = FilterableCache::tag(query, filter);
        if !self.cache.has_dataset(&tag) {
            debug!("[CACHE] miss, populating \"{}\"", preview(query));
            self.select(query).await?;
            let rows = self.take_rows();
            self.cache.add_dataset(tag.clone(), &filter.fields(), rows);
        }
        self.cache.select(&tag, filter)
    }
}

fn preview(query: &str) -> String {
    if query.len() > 80 {
        let cut: String = query.chars().take(80).collect();
        format!("{}...", cut.replace('\n', " "))
    } else {
        query.replace('\n', " ")
    }
}

/// The format named by a trailing `FORMAT <name>` clause, if any.
fn trailing_format(query: &str) -> Option<&str> {
    let mut words = query.split_whitespace().rev();
    let last = words.next()?;
    let prev = words.next()?;
    prev.eq_ignore_ascii_case("format").then_some(last)
}

/// Substitute `?` placeholders (outside string literals) with escaped
/// parameter values.
fn bind(query: &str, params: &[Value]) -> Result<String> {
    let mut out = String::with_capacity(query.len());
    let mut remaining = params.iter();
    let mut in_quote = false;
    for c in query.chars() {
        match c {
            '\'' => {
                in_quote = !in_quote;
                out.push(c);
            }
            '?' if !in_quote => {
                let param = remaining.next().ok_or_else(|| {
                    ClickLinkError::Configuration(
                        "query has more placeholders than parameters".to_string(),
                    )
                })?;
                out.push_str(&escape_parameter(param));
            }
            other => out.push(other),
        }
    }
    if remaining.next().is_some() {
        return Err(ClickLinkError::Configuration(
            "query has fewer placeholders than parameters".to_string(),
        ));
    }
    Ok(out)
}

fn escape_parameter(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => i64::from(*b).to_string(),
        Value::Int(i) => i.to_string(),
        Value::UInt(u) => u.to_string(),
        Value::Float(f) => f.to_string(),
        Value::String(s) => quote_literal(s),
        Value::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
        Value::DateTime(dt) => format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S")),
        Value::Array(elements) => format!(
            "[{}]",
            elements
                .iter()
                .map(escape_parameter)
                .collect::<Vec<_>>()
                .join(",")
        ),
        object @ Value::Object(_) => {
            quote_literal(&serde_json::to_string(&object.to_json()).unwrap_or_default())
        }
    }
}

fn quote_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}
