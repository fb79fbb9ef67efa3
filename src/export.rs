//! Spreadsheet export.
//!
//! Rows are turned into a header line plus one line per row, either through
//! the on screen column accessors or by serializing the raw rows, and handed
//! to a [`SpreadsheetExporter`]. The xlsx implementation writes a single
//! sheet with a bold header row.

use std::fs;
use std::path::{Path, PathBuf};

use derive_setters::Setters;
use rust_xlsxwriter::{Format, Workbook};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument};

use crate::column::{CellValue, ColumnDefinition};
use crate::domain::TableError;

pub const DEFAULT_SHEET_NAME: &str = "Sheet1";
const MAX_COLUMN_WIDTH: usize = 60;
/// Worksheet limits of the xlsx format, header row included.
pub const MAX_SHEET_ROWS: usize = 1_048_576;
pub const MAX_SHEET_COLUMNS: usize = 16_384;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportMode {
    /// Map every row through the column accessors.
    #[default]
    Columns,
    /// Serialize rows as they are; headers are the object keys.
    RawRows,
}

#[derive(Debug, Clone, PartialEq, Eq, Setters)]
#[setters(prefix = "with_")]
pub struct ExportOptions {
    #[setters(into)]
    pub file_name: String,
    #[setters(strip_option, into)]
    pub sheet_name: Option<String>,
    pub mode: ExportMode,
    /// Leave out columns that only hold an interactive control.
    pub skip_controls: bool,
}

impl ExportOptions {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            sheet_name: None,
            mode: ExportMode::Columns,
            skip_controls: false,
        }
    }

    pub fn sheet(&self) -> &str {
        self.sheet_name.as_deref().unwrap_or(DEFAULT_SHEET_NAME)
    }
}

/// Header line plus data lines, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl ExportTable {
    pub fn from_columns<T>(columns: &[ColumnDefinition<T>], rows: &[&T], skip_controls: bool) -> Self {
        let columns: Vec<&ColumnDefinition<T>> = columns
            .iter()
            .filter(|c| !(skip_controls && c.control.is_some()))
            .collect();
        ExportTable {
            headers: columns.iter().map(|c| c.header_text()).collect(),
            rows: rows
                .iter()
                .map(|row| columns.iter().map(|c| c.value(row)).collect())
                .collect(),
        }
    }

    /// Headers are the union of object keys, in order of first appearance.
    pub fn from_raw_rows<T: Serialize>(rows: &[&T]) -> Result<Self, TableError> {
        let mut headers: Vec<String> = Vec::new();
        let mut objects = Vec::with_capacity(rows.len());
        for row in rows {
            let Value::Object(map) = serde_json::to_value(row)? else {
                return Err(TableError::NotAnObject);
            };
            for key in map.keys() {
                if !headers.contains(key) {
                    headers.push(key.clone());
                }
            }
            objects.push(map);
        }
        let rows = objects
            .iter()
            .map(|map| {
                headers
                    .iter()
                    .map(|h| map.get(h).map(json_to_cell).unwrap_or(CellValue::Empty))
                    .collect()
            })
            .collect();
        Ok(ExportTable { headers, rows })
    }
}

fn json_to_cell(value: &Value) -> CellValue {
    match value {
        Value::Null => CellValue::Empty,
        Value::Bool(b) => CellValue::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => CellValue::Integer(i),
            None => n.as_f64().map(CellValue::Number).unwrap_or(CellValue::Empty),
        },
        Value::String(s) => CellValue::Text(s.clone()),
        other => CellValue::Text(other.to_string()),
    }
}

/// A produced file, not yet delivered anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ExportedFile {
    /// Delivers the file into `dir`, returning the written path.
    pub fn save_in(&self, dir: &Path) -> Result<PathBuf, TableError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(&self.file_name);
        fs::write(&path, &self.bytes)?;
        info!("Saved export to {}", path.display());
        Ok(path)
    }
}

pub trait SpreadsheetExporter {
    fn export_rows(
        &self,
        headers: &[String],
        rows: &[Vec<CellValue>],
        file_name: &str,
        sheet_name: &str,
    ) -> Result<ExportedFile, TableError>;

    fn export_table(&self, table: &ExportTable, options: &ExportOptions) -> Result<ExportedFile, TableError> {
        self.export_rows(&table.headers, &table.rows, &options.file_name, options.sheet())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct XlsxExporter;

impl SpreadsheetExporter for XlsxExporter {
    #[instrument(skip(self, headers, rows))]
    fn export_rows(
        &self,
        headers: &[String],
        rows: &[Vec<CellValue>],
        file_name: &str,
        sheet_name: &str,
    ) -> Result<ExportedFile, TableError> {
        let columns = rows.iter().map(Vec::len).fold(headers.len(), usize::max);
        let too_large = || TableError::SheetTooLarge {
            rows: rows.len(),
            columns,
        };
        if rows.len() >= MAX_SHEET_ROWS || columns > MAX_SHEET_COLUMNS {
            return Err(too_large());
        }
        let sheet_col = |col: usize| u16::try_from(col).map_err(|_| too_large());

        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet_name)?;

        let bold = Format::new().set_bold();
        let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();

        for (col, header) in headers.iter().enumerate() {
            worksheet.write_string_with_format(0, sheet_col(col)?, header, &bold)?;
        }

        for (ridx, row) in rows.iter().enumerate() {
            let xrow = u32::try_from(ridx + 1).map_err(|_| too_large())?;
            for (col, value) in row.iter().enumerate() {
                let xcol = sheet_col(col)?;
                match value {
                    CellValue::Text(s) => {
                        worksheet.write_string(xrow, xcol, s)?;
                    }
                    CellValue::Integer(i) => {
                        worksheet.write_number(xrow, xcol, *i as f64)?;
                    }
                    CellValue::Number(n) if n.is_finite() => {
                        worksheet.write_number(xrow, xcol, *n)?;
                    }
                    CellValue::Number(n) => {
                        worksheet.write_string(xrow, xcol, n.to_string())?;
                    }
                    CellValue::Bool(b) => {
                        worksheet.write_boolean(xrow, xcol, *b)?;
                    }
                    CellValue::Empty => {}
                }
                let width = value.display().chars().count();
                match widths.get_mut(col) {
                    Some(w) => *w = (*w).max(width),
                    None => widths.push(width),
                }
            }
        }

        for (col, width) in widths.iter().enumerate() {
            let width = (*width).clamp(4, MAX_COLUMN_WIDTH) + 2;
            worksheet.set_column_width(sheet_col(col)?, width as f64)?;
        }

        let bytes = workbook.save_to_buffer()?;
        info!("Exported {} rows x {} columns", rows.len(), headers.len());
        Ok(ExportedFile {
            file_name: format!("{file_name}.xlsx"),
            bytes,
        })
    }
}
