//! Filterable result cache for repeated lookups over one query's result set.
//!
//! A dataset is cached once per tag (query text plus the sorted filter
//! field set) and indexed by those fields, so later filtered reads never go
//! back to the store. Entries live as long as the owning cursor; there is
//! no eviction or invalidation here.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;

use crate::error::{ClickLinkError, Result};
use crate::models::{Row, Value};

/// One filter condition on a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Exact match.
    Eq(Value),
    /// Match any of the listed values (OR within the field).
    AnyOf(Vec<Value>),
    /// Half-open range `[start, end)` over integers or dates, materialized
    /// against the indexed field.
    Range { start: Value, end: Value },
}

impl Condition {
    /// Exact-match condition.
    pub fn eq(value: impl Into<Value>) -> Self {
        Condition::Eq(value.into())
    }

    /// OR-match condition over the listed values.
    pub fn any_of<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Condition::AnyOf(values.into_iter().map(Into::into).collect())
    }

    /// Half-open range condition.
    pub fn range(start: impl Into<Value>, end: impl Into<Value>) -> Self {
        Condition::Range {
            start: start.into(),
            end: end.into(),
        }
    }
}

/// A conjunction of per-field conditions (AND across fields).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: BTreeMap<String, Condition>,
}

impl Filter {
    /// An empty filter (matches every row).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition on a field, consuming and returning the filter.
    pub fn with(mut self, field: impl Into<String>, condition: Condition) -> Self {
        self.conditions.insert(field.into(), condition);
        self
    }

    /// Filter field names, sorted.
    pub fn fields(&self) -> Vec<String> {
        self.conditions.keys().cloned().collect()
    }

    /// Iterate over `(field, condition)` pairs in field order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Condition)> {
        self.conditions.iter()
    }

    /// Whether the filter has no conditions.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

struct Dataset {
    rows: Vec<Row>,
    /// field -> canonical value key -> row positions
    index: HashMap<String, HashMap<String, Vec<usize>>>,
}

/// In-memory cache of query results indexed for filtered lookups.
#[derive(Default)]
pub struct FilterableCache {
    datasets: HashMap<String, Dataset>,
}

impl FilterableCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache tag for a query and the fields its filters will use.
    pub fn tag(query: &str, filter: &Filter) -> String {
        let mut tag = query.to_string();
        for field in filter.fields() {
            tag.push_str(&field);
        }
        tag
    }

    /// Whether a dataset is cached under this tag.
    pub fn has_dataset(&self, tag: &str) -> bool {
        self.datasets.contains_key(tag)
    }

    /// Cache a result set under a tag, indexing it by the given fields.
    ///
    /// Rows where an indexed field is absent, null, or compound simply never
    /// match a condition on that field.
    pub fn add_dataset(&mut self, tag: impl Into<String>, key_fields: &[String], rows: Vec<Row>) {
        let mut index: HashMap<String, HashMap<String, Vec<usize>>> = HashMap::new();
        for field in key_fields {
            let mut field_index: HashMap<String, Vec<usize>> = HashMap::new();
            for (position, row) in rows.iter().enumerate() {
                if let Some(key) = row.get(field).and_then(Value::index_key) {
                    field_index.entry(key).or_default().push(position);
                }
            }
            index.insert(field.clone(), field_index);
        }
        self.datasets.insert(tag.into(), Dataset { rows, index });
    }

    /// Rows of the tagged dataset satisfying the filter, in dataset order.
    pub fn select(&self, tag: &str, filter: &Filter) -> Result<Vec<Row>> {
        let dataset = self.datasets.get(tag).ok_or_else(|| {
            ClickLinkError::InvalidFilter(format!("no cached dataset under tag '{tag}'"))
        })?;

        let mut matched: Option<HashSet<usize>> = None;
        for (field, condition) in filter.iter() {
            let field_index = dataset.index.get(field).ok_or_else(|| {
                ClickLinkError::InvalidFilter(format!(
                    "field '{field}' is not indexed for this dataset"
                ))
            })?;
            let positions = Self::matching_positions(field, field_index, condition)?;
            matched = Some(match matched {
                None => positions,
                Some(previous) => previous.intersection(&positions).copied().collect(),
            });
        }

        let mut positions: Vec<usize> = match matched {
            Some(matched) => matched.into_iter().collect(),
            None => (0..dataset.rows.len()).collect(),
        };
        positions.sort_unstable();
        Ok(positions.iter().map(|p| dataset.rows[*p].clone()).collect())
    }

    fn matching_positions(
        field: &str,
        field_index: &HashMap<String, Vec<usize>>,
        condition: &Condition,
    ) -> Result<HashSet<usize>> {
        let lookup_all = |values: &[Value]| -> Result<HashSet<usize>> {
            let mut positions = HashSet::new();
            for value in values {
                let key = value.index_key().ok_or_else(|| {
                    ClickLinkError::InvalidFilter(format!(
                        "condition on '{field}' uses a value that cannot be matched: {value:?}"
                    ))
                })?;
                if let Some(found) = field_index.get(&key) {
                    positions.extend(found.iter().copied());
                }
            }
            Ok(positions)
        };

        match condition {
            Condition::Eq(value) => lookup_all(std::slice::from_ref(value)),
            Condition::AnyOf(values) => lookup_all(values),
            Condition::Range { start, end } => lookup_all(&materialize_range(field, start, end)?),
        }
    }
}

/// Expand a half-open range into the concrete values it covers: step 1 for
/// integers, one day for dates.
fn materialize_range(field: &str, start: &Value, end: &Value) -> Result<Vec<Value>> {
    match (start, end) {
        (Value::Date(start), Value::Date(end)) => {
            let end = *end;
            Ok(start
                .iter_days()
                .take_while(|day| *day < end)
                .map(Value::Date)
                .collect())
        }
        _ => match (start.as_i64(), end.as_i64()) {
            (Some(start), Some(end)) => Ok((start..end).map(Value::Int).collect()),
            _ => Err(ClickLinkError::InvalidFilter(format!(
                "range on '{field}' must use integers or dates, got {start:?}..{end:?}"
            ))),
        },
    }
}

impl From<std::ops::Range<NaiveDate>> for Condition {
    fn from(range: std::ops::Range<NaiveDate>) -> Self {
        Condition::range(range.start, range.end)
    }
}

impl From<std::ops::Range<i64>> for Condition {
    fn from(range: std::ops::Range<i64>) -> Self {
        Condition::range(range.start, range.end)
    }
}
