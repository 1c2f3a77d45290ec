//! Labelled tables for display and export
//!
//! Every result view (scores, inventories, contributions, Monte-Carlo
//! samples, sensitivity rankings) can be flattened into a [`Frame`] and
//! written as CSV, XLSX or JSON records.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::io::Write;
use std::path::Path;

use crate::core::error::CalcError;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Empty,
}

impl Cell {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Render for text output; NaN renders empty
    pub fn render(&self, precision: Option<usize>) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Number(v) if v.is_nan() => String::new(),
            Cell::Number(v) => match precision {
                Some(p) => format!("{:.*}", p, v),
                None => format!("{}", v),
            },
            Cell::Empty => String::new(),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Number(v)
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cell::Text(s) => serializer.serialize_str(s),
            Cell::Number(v) if v.is_finite() => serializer.serialize_f64(*v),
            Cell::Number(_) | Cell::Empty => serializer.serialize_none(),
        }
    }
}

/// Output file format, chosen from the path extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Xlsx,
    Json,
}

impl ExportFormat {
    pub fn from_path(path: &Path) -> Result<Self, CalcError> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref()
        {
            Some("csv") => Ok(ExportFormat::Csv),
            Some("xlsx") => Ok(ExportFormat::Xlsx),
            Some("json") => Ok(ExportFormat::Json),
            other => Err(CalcError::invalid(
                "export path",
                format!(
                    "unsupported extension '{}', expected .csv, .xlsx or .json",
                    other.unwrap_or("")
                ),
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub title: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Frame {
    pub fn new<S: Into<String>>(title: &str, columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            title: title.to_string(),
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Cell>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell by row index and column name
    pub fn get(&self, row: usize, column: &str) -> Option<&Cell> {
        let col = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(col))
    }

    /// Numeric cell by row index and column name
    pub fn number(&self, row: usize, column: &str) -> Option<f64> {
        self.get(row, column).and_then(Cell::as_f64)
    }

    /// Write CSV; `delimiter` is `b','` or `b'\t'`
    pub fn write_delimited<W: Write>(
        &self,
        writer: W,
        delimiter: u8,
        precision: Option<usize>,
    ) -> Result<(), CalcError> {
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_writer(writer);
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row.iter().map(|c| c.render(precision)))?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn to_csv_string(&self, precision: Option<usize>) -> Result<String, CalcError> {
        let mut buf = Vec::new();
        self.write_delimited(&mut buf, b',', precision)?;
        String::from_utf8(buf).map_err(|e| CalcError::Store(e.to_string()))
    }

    pub fn write_xlsx(&self, path: &Path) -> Result<(), CalcError> {
        let xlsx = |e: rust_xlsxwriter::XlsxError| CalcError::Store(format!("XLSX export: {}", e));
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let header = rust_xlsxwriter::Format::new().set_bold();
        let sheet = workbook.add_worksheet();
        if !self.title.is_empty() {
            // Sheet names are limited to 31 characters
            let name: String = self.title.chars().take(31).collect();
            sheet.set_name(name).map_err(xlsx)?;
        }
        for (c, name) in self.columns.iter().enumerate() {
            sheet
                .write_string_with_format(0, c as u16, name, &header)
                .map_err(xlsx)?;
        }
        for (r, row) in self.rows.iter().enumerate() {
            let r = (r + 1) as u32;
            for (c, cell) in row.iter().enumerate() {
                match cell {
                    Cell::Text(s) => {
                        sheet.write_string(r, c as u16, s).map_err(xlsx)?;
                    }
                    Cell::Number(v) if v.is_finite() => {
                        sheet.write_number(r, c as u16, *v).map_err(xlsx)?;
                    }
                    _ => {}
                }
            }
        }
        workbook.save(path).map_err(xlsx)?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, CalcError> {
        serde_json::to_string_pretty(self).map_err(|e| CalcError::Store(e.to_string()))
    }

    /// Export to a file; the format follows the extension
    pub fn export(&self, path: &Path, precision: Option<usize>) -> Result<(), CalcError> {
        match ExportFormat::from_path(path)? {
            ExportFormat::Csv => {
                let file = std::fs::File::create(path)?;
                self.write_delimited(file, b',', precision)
            }
            ExportFormat::Xlsx => self.write_xlsx(path),
            ExportFormat::Json => {
                std::fs::write(path, self.to_json()?)?;
                Ok(())
            }
        }
    }
}

/// Serialized as a list of records keyed by column name
impl Serialize for Frame {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct Record<'a>(&'a [String], &'a [Cell]);

        impl Serialize for Record<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(Some(self.0.len()))?;
                for (k, v) in self.0.iter().zip(self.1) {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }

        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for row in &self.rows {
            seq.serialize_element(&Record(&self.columns, row))?;
        }
        seq.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> Frame {
        let mut f = Frame::new("scores", ["name", "score"]);
        f.push_row(vec!["a, b".into(), 1.5.into()]);
        f.push_row(vec!["c".into(), f64::NAN.into()]);
        f
    }

    #[test]
    fn test_csv_quotes_and_blank_nan() {
        let csv = sample().to_csv_string(None).unwrap();
        assert_eq!(csv, "name,score\n\"a, b\",1.5\nc,\n");
    }

    #[test]
    fn test_precision() {
        assert_eq!(Cell::Number(1.0 / 3.0).render(Some(3)), "0.333");
        assert_eq!(Cell::Number(2.0).render(None), "2");
    }

    #[test]
    fn test_json_records() {
        let json = sample().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["name"], "a, b");
        assert_eq!(value[0]["score"], 1.5);
        assert!(value[1]["score"].is_null());
    }

    #[test]
    fn test_export_by_extension() {
        let tmp = tempdir().unwrap();
        let frame = sample();
        frame.export(&tmp.path().join("out.csv"), None).unwrap();
        frame.export(&tmp.path().join("out.xlsx"), None).unwrap();
        assert!(tmp.path().join("out.xlsx").exists());
        assert!(frame.export(&tmp.path().join("out.txt"), None).is_err());
    }

    #[test]
    fn test_lookup_by_column() {
        let frame = sample();
        assert_eq!(frame.number(0, "score"), Some(1.5));
        assert_eq!(frame.number(0, "name"), None);
        assert!(frame.get(5, "score").is_none());
    }
}
