//! Small CSV reader/writer for the journal and feed lists.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// A CSV file with a header row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CsvTable {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn parse(content: &str) -> Self {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        let mut records = parse_records(content).into_iter();

        let headers = records
            .next()
            .map(|h| h.into_iter().map(|c| c.trim().to_string()).collect())
            .unwrap_or_default();
        let rows = records
            .filter(|r| !(r.len() == 1 && r[0].trim().is_empty()))
            .collect();

        Self { headers, rows }
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read CSV file: {}", path.display()))?;
        // Lists exported from spreadsheets are not always UTF-8
        let content = match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
        };
        Ok(Self::parse(&content))
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> impl Iterator<Item = CsvRow<'_>> {
        self.rows.iter().map(move |cells| CsvRow {
            headers: &self.headers,
            cells,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(cells.into_iter().map(Into::into).collect());
    }

    pub fn to_csv_string(&self) -> String {
        let mut csv = String::new();
        write_record(&mut csv, &self.headers);
        for row in &self.rows {
            write_record(&mut csv, row);
        }
        csv
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_csv_string())
            .with_context(|| format!("Failed to write CSV file: {}", path.display()))
    }
}

/// One data row, addressed by header name
pub struct CsvRow<'a> {
    headers: &'a [String],
    cells: &'a [String],
}

impl CsvRow<'_> {
    /// Trimmed cell value, empty when the column or cell is missing
    pub fn get(&self, column: &str) -> &str {
        self.headers
            .iter()
            .position(|h| h == column)
            .and_then(|i| self.cells.get(i))
            .map_or("", |c| c.trim())
    }
}

fn write_record(csv: &mut String, cells: &[String]) {
    let line: Vec<String> = cells.iter().map(|c| escape_csv(c)).collect();
    csv.push_str(&line.join(","));
    csv.push('\n');
}

pub fn escape_csv(text: &str) -> String {
    // If the text contains comma, quote, or newline, wrap in quotes and escape quotes
    if text.contains(',') || text.contains('"') || text.contains('\n') || text.contains('\r') {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

fn parse_records(content: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }

    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    records
}
