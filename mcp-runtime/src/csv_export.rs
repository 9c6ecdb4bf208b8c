//! SOQL result → CSV rendering for `export_data_csv`.

use serde_json::{Map, Value};

use crate::util::truncate_chars;

pub const PREVIEW_CHARS: usize = 500;

pub const NO_RECORDS_MESSAGE: &str = "No records found for the query. CSV file not created.";

/// Key Salesforce adds to every record; never exported.
const ATTRIBUTES_KEY: &str = "attributes";

#[derive(Debug, Clone, PartialEq)]
pub struct CsvExport {
    pub columns: Vec<String>,
    pub content: String,
    pub rows: usize,
}

/// Render records as CSV. Columns come from the first object record, in
/// order; entries that are not objects are skipped. Returns `None` when there
/// is nothing to export.
pub fn render_csv(records: &[Value]) -> Option<CsvExport> {
    let rows: Vec<&Map<String, Value>> = records.iter().filter_map(Value::as_object).collect();
    let first = rows.first()?;
    let columns: Vec<String> = first
        .keys()
        .filter(|key| key.as_str() != ATTRIBUTES_KEY)
        .cloned()
        .collect();

    let mut content = String::new();
    push_row(&mut content, columns.iter().map(|c| escape_cell(c)));
    for record in &rows {
        push_row(
            &mut content,
            columns
                .iter()
                .map(|column| escape_cell(&cell_text(record.get(column)))),
        );
    }

    Some(CsvExport {
        columns,
        content,
        rows: rows.len(),
    })
}

/// Tool text for a finished export.
pub fn export_summary(filename: &str, export: &CsvExport) -> String {
    let (preview, truncated) = truncate_chars(&export.content, PREVIEW_CHARS);
    format!(
        "CSV Export completed successfully!\n\nFilename: {filename}\nRecords exported: {}\nFields: {}\n\nCSV Content Preview (first {PREVIEW_CHARS} chars):\n{preview}{}",
        export.rows,
        export.columns.join(", "),
        if truncated { "..." } else { "" }
    )
}

fn push_row(out: &mut String, cells: impl Iterator<Item = String>) {
    for (i, cell) in cells.enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&cell);
    }
    out.push_str("\r\n");
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        // Relationship fields come back as nested records.
        Some(other) => other.to_string(),
    }
}

fn escape_cell(raw: &str) -> String {
    if raw.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}
