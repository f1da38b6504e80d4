//! Tabular renderings of category payloads. Every top-level key becomes a row,
//! nested objects flatten to dotted columns and arrays are kept as JSON.

use serde_json::{Map, Value};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Tsv,
}

impl TableFormat {
    pub fn delimiter(self) -> char {
        match self {
            TableFormat::Csv => ',',
            TableFormat::Tsv => '\t',
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            TableFormat::Csv => "text/csv; charset=utf-8",
            TableFormat::Tsv => "text/tab-separated-values; charset=utf-8",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            TableFormat::Csv => "csv",
            TableFormat::Tsv => "tsv",
        }
    }
}

impl FromStr for TableFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(TableFormat::Csv),
            "tsv" => Ok(TableFormat::Tsv),
            other => Err(format!("unsupported format '{}'", other)),
        }
    }
}

type Row = Vec<(String, Value)>;

fn flatten_into(out: &mut Row, prefix: &str, obj: &Map<String, Value>) {
    for (key, value) in obj {
        let full = if prefix.is_empty() { key.clone() } else { format!("{}.{}", prefix, key) };
        match value {
            Value::Object(inner) => flatten_into(out, &full, inner),
            Value::Array(_) => out.push((full, Value::String(value.to_string()))),
            other => out.push((full, other.clone())),
        }
    }
}

fn flatten_entry(value: &Value) -> Row {
    let mut row = Vec::new();
    match value {
        Value::Object(obj) => flatten_into(&mut row, "", obj),
        other => row.push(("value".to_string(), other.clone())),
    }
    row
}

fn escape(value: Option<&Value>, fmt: TableFormat) -> String {
    let text = match value {
        None | Some(Value::Null) => return String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    let needs_quotes = text.contains(fmt.delimiter()) || text.contains(['"', '\n', '\r']);
    if needs_quotes {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text
    }
}

fn render(leading: &[&str], rows: &[Row], fmt: TableFormat) -> String {
    if rows.is_empty() {
        return String::new();
    }

    let mut columns: Vec<&str> = leading.to_vec();
    for row in rows {
        for (key, _) in row {
            if !columns.contains(&key.as_str()) {
                columns.push(key);
            }
        }
    }

    let sep = fmt.delimiter().to_string();
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(
        columns
            .iter()
            .map(|c| escape(Some(&Value::String(c.to_string())), fmt))
            .collect::<Vec<_>>()
            .join(&sep),
    );
    for row in rows {
        let cells: Vec<String> = columns
            .iter()
            .map(|col| escape(row.iter().find(|(k, _)| k.as_str() == *col).map(|(_, v)| v), fmt))
            .collect();
        lines.push(cells.join(&sep));
    }
    lines.join("\n")
}

/// `{ Carrot: {...}, Tomato: {...} }` → one row per key, `id` first.
pub fn to_table(data: &Value, fmt: TableFormat) -> String {
    let Value::Object(entries) = data else {
        return String::new();
    };
    let rows: Vec<Row> = entries
        .iter()
        .map(|(key, value)| {
            let mut row = vec![("id".to_string(), Value::String(key.clone()))];
            row.extend(flatten_entry(value).into_iter().filter(|(k, _)| k != "id"));
            row
        })
        .collect();
    render(&["id"], &rows, fmt)
}

/// `{ plants: {...}, pets: {...} }` → rows from every category with a leading
/// `category` column.
pub fn combined_to_table(data: &Value, fmt: TableFormat) -> String {
    let Value::Object(categories) = data else {
        return String::new();
    };
    let mut rows: Vec<Row> = Vec::new();
    for (category, items) in categories {
        let Value::Object(items) = items else {
            continue;
        };
        for (key, value) in items {
            let mut row = vec![
                ("category".to_string(), Value::String(category.clone())),
                ("id".to_string(), Value::String(key.clone())),
            ];
            row.extend(flatten_entry(value).into_iter().filter(|(k, _)| k != "id" && k != "category"));
            rows.push(row);
        }
    }
    render(&["category", "id"], &rows, fmt)
}
