//! Lenient reader for the stats API table format.
//!
//! Every endpoint answers with a document holding named tables, each a list
//! of column headers plus rows in the same column order:
//!
//! ```json
//! {"resultSets": [{"name": "Shot_Chart_Detail", "headers": ["GAME_ID", ...], "rowSet": [[...], ...]}]}
//! ```
//!
//! Missing or mistyped structure never fails; it reads as no tables, no rows
//! or no field.

use std::collections::HashMap;

use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows keyed by the declared header order, so upstream column reordering
    /// does not shift fields.
    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.rows.iter().map(|row| Record {
            fields: self
                .headers
                .iter()
                .map(String::as_str)
                .zip(row.iter())
                .collect(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Record<'a> {
    fields: HashMap<&'a str, &'a Value>,
}

impl Record<'_> {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).copied()
    }

    pub fn i64(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(as_i64_any)
    }

    pub fn f64(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(as_f64_any)
    }

    pub fn whole(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(as_whole_number)
    }

    pub fn string(&self, field: &str) -> Option<String> {
        self.get(field).and_then(as_string_any)
    }
}

/// All tables of a response document. Accepts both `resultSets` (array) and
/// `resultSet` (single object or array).
pub fn result_sets(doc: &Value) -> Vec<ResultSet> {
    let raw = doc.get("resultSets").or_else(|| doc.get("resultSet"));
    match raw {
        Some(Value::Array(items)) => items.iter().filter_map(parse_result_set).collect(),
        Some(item @ Value::Object(_)) => parse_result_set(item).into_iter().collect(),
        _ => Vec::new(),
    }
}

pub fn find_result_set<'a>(sets: &'a [ResultSet], name: &str) -> Option<&'a ResultSet> {
    sets.iter().find(|set| set.name.eq_ignore_ascii_case(name))
}

fn parse_result_set(v: &Value) -> Option<ResultSet> {
    let obj = v.as_object()?;
    let name = obj
        .get("name")
        .and_then(|n| n.as_str())
        .unwrap_or_default()
        .to_string();
    // Non-string headers keep their slot so rows stay aligned.
    let headers = obj
        .get("headers")
        .and_then(|h| h.as_array())
        .map(|arr| {
            arr.iter()
                .map(|h| h.as_str().unwrap_or_default().to_string())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    let rows = obj
        .get("rowSet")
        .and_then(|r| r.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|row| row.as_array().cloned())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    Some(ResultSet {
        name,
        headers,
        rows,
    })
}

pub fn as_i64_any(v: &Value) -> Option<i64> {
    if let Some(n) = v.as_i64() {
        return Some(n);
    }
    v.as_str()?.trim().parse::<i64>().ok()
}

pub fn as_f64_any(v: &Value) -> Option<f64> {
    if let Some(n) = v.as_f64() {
        return Some(n);
    }
    v.as_str()?.trim().parse::<f64>().ok()
}

/// Integers as-is, finite floats truncated toward zero.
pub fn as_whole_number(v: &Value) -> Option<i64> {
    if let Some(n) = as_i64_any(v) {
        return Some(n);
    }
    let f = as_f64_any(v)?;
    f.is_finite().then(|| f.trunc() as i64)
}

/// Identifiers arrive as numbers on some endpoints and strings on others.
pub fn as_string_any(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
