//! Codec for the `TabSeparatedWithNamesAndTypes` wire format.
//!
//! A body is line 1 = tab-joined field names, line 2 = tab-joined type
//! names, then one line per row of tab-joined formatted values, with a
//! trailing line terminator. [`encode`] and [`decode`] are exact inverses
//! for every supported [`ColumnType`].

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value as JsonValue;

use crate::error::{ClickLinkError, Result};
use crate::models::{ColumnType, Row, Value};

/// Record access for wire encoding.
///
/// Implemented for maps of [`Value`] and for JSON objects, so the codec
/// never branches on the concrete input type. Records with no fields (for
/// example scalars handed in by mistake) enumerate to nothing.
pub trait Record {
    /// Field names of this record.
    fn field_names(&self) -> Vec<String>;

    /// Value of a field, if present.
    fn get(&self, field: &str) -> Option<Value>;
}

impl Record for Row {
    fn field_names(&self) -> Vec<String> {
        Row::field_names(self)
    }

    fn get(&self, field: &str) -> Option<Value> {
        Row::get(self, field).cloned()
    }
}

impl Record for BTreeMap<String, Value> {
    fn field_names(&self) -> Vec<String> {
        self.keys().cloned().collect()
    }

    fn get(&self, field: &str) -> Option<Value> {
        BTreeMap::get(self, field).cloned()
    }
}

impl Record for Value {
    fn field_names(&self) -> Vec<String> {
        match self {
            Value::Object(fields) => fields.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    fn get(&self, field: &str) -> Option<Value> {
        match self {
            Value::Object(fields) => fields.get(field).cloned(),
            _ => None,
        }
    }
}

impl Record for JsonValue {
    fn field_names(&self) -> Vec<String> {
        match self {
            JsonValue::Object(fields) => fields.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    fn get(&self, field: &str) -> Option<Value> {
        match self {
            JsonValue::Object(fields) => fields.get(field).map(Value::from),
            _ => None,
        }
    }
}

/// Infer `(fields, types)` from a single record by enumerating its fields
/// and running single-value inference on each.
pub fn row_schema<R: Record>(row: &R) -> Result<(Vec<String>, Vec<ColumnType>)> {
    let fields = row.field_names();
    let mut types = Vec::with_capacity(fields.len());
    for field in &fields {
        let value = row.get(field).unwrap_or(Value::Null);
        types.push(ColumnType::infer(&value, field)?);
    }
    Ok((fields, types))
}

/// Encode rows into a wire body.
///
/// When `schema` is omitted it is inferred from the first row. Fields
/// missing from a row encode as the type's default (the store fills column
/// defaults for them on its side of nullable-free tables).
pub fn encode<R: Record>(
    rows: &[R],
    schema: Option<(&[String], &[ColumnType])>,
) -> Result<(Vec<String>, Vec<ColumnType>, String)> {
    if rows.is_empty() {
        return Err(ClickLinkError::Encode("no rows to encode".to_string()));
    }
    let (fields, types) = match schema {
        Some((fields, types)) => {
            if fields.len() != types.len() {
                return Err(ClickLinkError::Encode(format!(
                    "schema mismatch: {} fields but {} types",
                    fields.len(),
                    types.len()
                )));
            }
            (fields.to_vec(), types.to_vec())
        }
        None => row_schema(&rows[0])?,
    };

    let mut body = String::new();
    body.push_str(&fields.join("\t"));
    body.push('\n');
    body.push_str(
        &types
            .iter()
            .map(ColumnType::to_string)
            .collect::<Vec<_>>()
            .join("\t"),
    );
    body.push('\n');
    for row in rows {
        let mut first = true;
        for (field, column_type) in fields.iter().zip(&types) {
            if !first {
                body.push('\t');
            }
            first = false;
            let value = row.get(field).unwrap_or(Value::Null);
            body.push_str(&format_field(&value, column_type, false)?);
        }
        body.push('\n');
    }
    Ok((fields, types, body))
}

/// Decode a wire body into rows.
///
/// Bodies with fewer than three lines are malformed: even an empty result
/// set carries the name and type header rows.
pub fn decode(body: &str) -> Result<Vec<Row>> {
    let mut lines: Vec<&str> = body.split('\n').collect();
    if lines.len() < 3 {
        return Err(ClickLinkError::Decode(
            "response has no header rows".to_string(),
        ));
    }
    if lines.last() == Some(&"") {
        lines.pop();
    }

    let fields: Vec<&str> = lines[0].split('\t').collect();
    let types = lines[1]
        .split('\t')
        .map(str::parse)
        .collect::<Result<Vec<ColumnType>>>()?;
    if fields.len() != types.len() {
        return Err(ClickLinkError::Decode(format!(
            "header names {} columns but types row has {}",
            fields.len(),
            types.len()
        )));
    }

    let mut rows = Vec::with_capacity(lines.len() - 2);
    for line in &lines[2..] {
        let cells: Vec<&str> = line.split('\t').collect();
        if cells.len() != fields.len() {
            return Err(ClickLinkError::Decode(format!(
                "row has {} columns, header has {}",
                cells.len(),
                fields.len()
            )));
        }
        let mut row = Row::new();
        for ((field, column_type), cell) in fields.iter().zip(&types).zip(cells) {
            row.insert(*field, parse_field(cell, column_type)?);
        }
        rows.push(row);
    }
    Ok(rows)
}

fn date_cutoff() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 2).expect("static date")
}

/// Render one value as wire text under the given column type.
///
/// `in_array` switches on the quoting rules for string-like values inside
/// array literals.
pub fn format_field(value: &Value, column_type: &ColumnType, in_array: bool) -> Result<String> {
    match column_type {
        t if t.is_integer() => match value {
            Value::Null => Ok("0".to_string()),
            Value::Bool(b) => Ok(i64::from(*b).to_string()),
            Value::Int(i) => Ok(i.to_string()),
            Value::UInt(u) => Ok(u.to_string()),
            other => Err(unformattable(other, column_type)),
        },
        t if t.is_float() => match value {
            Value::Null => Ok("0.0".to_string()),
            Value::Float(f) => Ok(f.to_string()),
            Value::Int(i) => Ok(i.to_string()),
            Value::UInt(u) => Ok(u.to_string()),
            other => Err(unformattable(other, column_type)),
        },
        ColumnType::String => {
            // A String column can hold values of varying native type, so
            // anything is stringified before escaping.
            let text = match value {
                Value::Null => String::new(),
                Value::String(s) => s.clone(),
                Value::Bool(b) => i64::from(*b).to_string(),
                Value::Int(i) => i.to_string(),
                Value::UInt(u) => u.to_string(),
                Value::Float(f) => f.to_string(),
                Value::Date(d) => d.format("%Y-%m-%d").to_string(),
                Value::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
                compound => serde_json::to_string(&compound.to_json())
                    .map_err(|e| ClickLinkError::Encode(format!("json fallback failed: {e}")))?,
            };
            Ok(quote_in_array(escape_string(&text, in_array), in_array))
        }
        ColumnType::Date => {
            let text = match value {
                Value::Null => "0000-00-00".to_string(),
                Value::Date(d) if *d <= date_cutoff() => "0000-00-00".to_string(),
                Value::Date(d) => d.format("%Y-%m-%d").to_string(),
                other => return Err(unformattable(other, column_type)),
            };
            Ok(quote_in_array(text, in_array))
        }
        ColumnType::DateTime => {
            let cutoff = date_cutoff().and_hms_opt(0, 0, 0).expect("static datetime");
            let text = match value {
                Value::Null => "0000-00-00 00:00:00".to_string(),
                Value::DateTime(dt) if *dt <= cutoff => "0000-00-00 00:00:00".to_string(),
                Value::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
                other => return Err(unformattable(other, column_type)),
            };
            Ok(quote_in_array(text, in_array))
        }
        ColumnType::Array(element_type) => match value {
            Value::Null => Ok("[]".to_string()),
            Value::Array(elements) => {
                let rendered = elements
                    .iter()
                    .map(|e| format_field(e, element_type, true))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("[{}]", rendered.join(",")))
            }
            other => Err(unformattable(other, column_type)),
        },
        // All concrete types are covered above; the guards only exist to
        // group the integer and float widths.
        _ => Err(unformattable(value, column_type)),
    }
}

fn unformattable(value: &Value, column_type: &ColumnType) -> ClickLinkError {
    ClickLinkError::Encode(format!("value {value:?} cannot be formatted as {column_type}"))
}

fn quote_in_array(text: String, in_array: bool) -> String {
    if in_array {
        format!("'{text}'")
    } else {
        text
    }
}

fn escape_string(text: &str, in_array: bool) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            '\'' if in_array => escaped.push_str("\\'"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn unescape_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Parse one wire cell back into a value.
pub fn parse_field(text: &str, column_type: &ColumnType) -> Result<Value> {
    match column_type {
        ColumnType::Int8 | ColumnType::Int16 | ColumnType::Int32 | ColumnType::Int64 => text
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| unparsable(text, column_type)),
        ColumnType::UInt8 | ColumnType::UInt16 | ColumnType::UInt32 | ColumnType::UInt64 => text
            .parse::<u64>()
            .map(Value::UInt)
            .map_err(|_| unparsable(text, column_type)),
        ColumnType::Float32 | ColumnType::Float64 => text
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| unparsable(text, column_type)),
        ColumnType::String => Ok(Value::String(unescape_string(text))),
        ColumnType::Date => {
            let text = strip_quotes(text);
            if text == "0000-00-00" || text == "1970-01-01" {
                return Ok(Value::Null);
            }
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|_| unparsable(text, column_type))
        }
        ColumnType::DateTime => {
            let text = strip_quotes(text);
            if text == "0000-00-00 00:00:00" {
                return Ok(Value::Null);
            }
            NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
                .map(Value::DateTime)
                .map_err(|_| unparsable(text, column_type))
        }
        ColumnType::Array(element_type) => {
            if text == "[]" {
                return Ok(Value::Array(Vec::new()));
            }
            let inner = text
                .strip_prefix('[')
                .and_then(|t| t.strip_suffix(']'))
                .ok_or_else(|| unparsable(text, column_type))?;
            let mut elements = Vec::new();
            for token in split_array_elements(inner)? {
                let token = strip_element_quotes(&token);
                elements.push(parse_field(token, element_type)?);
            }
            Ok(Value::Array(elements))
        }
    }
}

fn unparsable(text: &str, column_type: &ColumnType) -> ClickLinkError {
    ClickLinkError::Decode(format!("'{text}' is not a valid {column_type} value"))
}

fn strip_quotes(text: &str) -> &str {
    let text = text.strip_prefix('\'').unwrap_or(text);
    text.strip_suffix('\'').unwrap_or(text)
}

fn strip_element_quotes(token: &str) -> &str {
    if token.len() >= 2 && token.starts_with('\'') && token.ends_with('\'') {
        &token[1..token.len() - 1]
    } else {
        token
    }
}

/// Split the inside of an array literal on commas, re-joining tokens that
/// belong to one quoted element containing literal commas (`['abc','d,ef']`).
fn split_array_elements(inner: &str) -> Result<Vec<String>> {
    let mut parts: Vec<String> = Vec::new();
    let mut acc: Option<String> = None;
    for token in inner.split(',') {
        let stripped = token.trim();
        match &mut acc {
            Some(buf) => {
                buf.push(',');
                buf.push_str(token);
                if stripped.ends_with('\'') {
                    parts.push(acc.take().expect("accumulator is open"));
                }
            }
            None => {
                if stripped.starts_with('\'') && !stripped.ends_with('\'') {
                    acc = Some(token.to_string());
                } else {
                    parts.push(token.to_string());
                }
            }
        }
    }
    if acc.is_some() {
        return Err(ClickLinkError::Decode(format!(
            "unterminated quoted element in array '[{inner}]'"
        )));
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ty(s: &str) -> ColumnType {
        s.parse().unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn round_trip(row: Row) -> Row {
        let rows = vec![row];
        let (_, _, body) = encode(&rows, None).unwrap();
        let mut decoded = decode(&body).unwrap();
        assert_eq!(decoded.len(), 1);
        decoded.remove(0)
    }

    #[test]
    fn test_body_layout() {
        let mut row = Row::new();
        row.insert("id", 1i64);
        row.insert("name", "alice");
        let (fields, types, body) = encode(&[row], None).unwrap();
        assert_eq!(fields, vec!["id", "name"]);
        assert_eq!(types, vec![ty("Int64"), ty("String")]);
        assert_eq!(body, "id\tname\nInt64\tString\n1\talice\n");
    }

    #[test]
    fn test_scalar_round_trip() {
        let mut row = Row::new();
        row.insert("i", -42i64);
        row.insert("f", 3.25f64);
        row.insert("s", "plain");
        row.insert("d", date(2021, 7, 15));
        row.insert("dt", date(2021, 7, 15).and_hms_opt(8, 5, 59).unwrap());
        assert_eq!(round_trip(row.clone()), row);
    }

    #[test]
    fn test_string_escaping_round_trip() {
        let mut row = Row::new();
        row.insert("s", "tab\there\nand \\ backslash");
        assert_eq!(round_trip(row.clone()), row);

        // A literal backslash followed by the letter n must survive; a
        // sequential find-and-replace decoder would corrupt it.
        let mut tricky = Row::new();
        tricky.insert("s", "\\n is not a newline");
        assert_eq!(round_trip(tricky.clone()), tricky);
    }

    #[test]
    fn test_array_with_commas_round_trip() {
        let mut row = Row::new();
        row.insert("t", Value::from(vec!["abc", "d,ef"]));
        let rows = vec![row.clone()];
        let (_, types, body) = encode(&rows, None).unwrap();
        assert_eq!(types, vec![ty("Array(String)")]);
        assert_eq!(body.lines().last().unwrap(), "['abc','d,ef']");
        assert_eq!(decode(&body).unwrap()[0], row);
    }

    #[test]
    fn test_array_quote_escaping_round_trip() {
        let mut row = Row::new();
        row.insert("t", Value::from(vec!["it's", "a,b's"]));
        assert_eq!(round_trip(row.clone()), row);
    }

    #[test]
    fn test_numeric_arrays_round_trip() {
        let mut row = Row::new();
        row.insert("ints", Value::from(vec![1i64, 2, 3]));
        row.insert("floats", Value::from(vec![0.5f64, 2.0]));
        let decoded = round_trip(row);
        assert_eq!(
            decoded.get("ints"),
            Some(&Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]))
        );
        assert_eq!(
            decoded.get("floats"),
            Some(&Value::Array(vec![Value::Float(0.5), Value::Float(2.0)]))
        );
    }

    #[test]
    fn test_date_array_is_quoted() {
        let mut row = Row::new();
        row.insert(
            "ds",
            Value::Array(vec![date(2020, 1, 1).into(), date(2020, 6, 1).into()]),
        );
        let (_, _, body) = encode(&[row.clone()], None).unwrap();
        assert_eq!(body.lines().last().unwrap(), "['2020-01-01','2020-06-01']");
        assert_eq!(decode(&body).unwrap()[0], row);
    }

    #[test]
    fn test_null_defaults() {
        let fields = ["i".to_string(), "f".to_string(), "s".to_string(), "a".to_string()];
        let types = [ty("Int64"), ty("Float64"), ty("String"), ty("Array(Int64)")];
        let (_, _, body) = encode(&[Row::new()], Some((&fields, &types))).unwrap();
        assert_eq!(body.lines().last().unwrap(), "0\t0.0\t\t[]");
    }

    #[test]
    fn test_date_sentinels() {
        assert_eq!(
            format_field(&Value::Null, &ty("Date"), false).unwrap(),
            "0000-00-00"
        );
        assert_eq!(
            format_field(&Value::Date(date(1970, 1, 1)), &ty("Date"), false).unwrap(),
            "0000-00-00"
        );
        assert_eq!(
            format_field(&Value::Null, &ty("DateTime"), false).unwrap(),
            "0000-00-00 00:00:00"
        );
        assert_eq!(parse_field("0000-00-00", &ty("Date")).unwrap(), Value::Null);
        assert_eq!(parse_field("1970-01-01", &ty("Date")).unwrap(), Value::Null);
        assert_eq!(
            parse_field("0000-00-00 00:00:00", &ty("DateTime")).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_string_column_stringifies_other_scalars() {
        assert_eq!(
            format_field(&Value::Int(12), &ty("String"), false).unwrap(),
            "12"
        );
        assert_eq!(
            format_field(&Value::Bool(true), &ty("String"), false).unwrap(),
            "1"
        );
        assert_eq!(
            format_field(&Value::Date(date(2020, 2, 3)), &ty("String"), false).unwrap(),
            "2020-02-03"
        );
        let nested = Value::Object(
            [("a".to_string(), Value::Int(1))].into_iter().collect(),
        );
        assert_eq!(
            format_field(&nested, &ty("String"), false).unwrap(),
            "{\"a\":1}"
        );
    }

    #[test]
    fn test_decode_requires_header_rows() {
        assert!(matches!(
            decode("only\ntwo lines"),
            Err(ClickLinkError::Decode(_))
        ));
        // Header plus types with no data rows is a valid empty result
        assert_eq!(decode("id\nInt64\n").unwrap(), Vec::<Row>::new());
    }

    #[test]
    fn test_decode_rejects_unterminated_quote() {
        let body = "t\nArray(String)\n['abc,'def]\n";
        assert!(matches!(decode(body), Err(ClickLinkError::Decode(_))));
    }

    #[test]
    fn test_decode_rejects_ragged_rows() {
        let body = "a\tb\nInt64\tInt64\n1\n";
        assert!(matches!(decode(body), Err(ClickLinkError::Decode(_))));
    }

    #[test]
    fn test_encode_rejects_empty_and_mismatched_schema() {
        assert!(encode::<Row>(&[], None).is_err());
        let fields = ["a".to_string()];
        let types = [ty("Int64"), ty("Int64")];
        assert!(encode(&[Row::new()], Some((&fields, &types))).is_err());
    }

    #[test]
    fn test_encode_json_records() {
        let rows = vec![serde_json::json!({"id": 7, "name": "x"})];
        let (fields, types, body) = encode(&rows, None).unwrap();
        assert_eq!(fields, vec!["id", "name"]);
        assert_eq!(types, vec![ty("Int64"), ty("String")]);
        assert!(body.ends_with("7\tx\n"));
    }

    #[test]
    fn test_type_mismatch_is_an_encode_error() {
        assert!(format_field(&Value::from("x"), &ty("Int64"), false).is_err());
        assert!(format_field(&Value::Int(1), &ty("Date"), false).is_err());
    }
}
