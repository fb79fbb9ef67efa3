use std::io::Error;
use std::path::PathBuf;

use derive_setters::Setters;
use polars::error::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("io error: {0}")]
    IoError(#[from] Error),
    #[error("polars error: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("xlsx write error: {0}")]
    XlsxWrite(#[from] rust_xlsxwriter::XlsxError),
    #[error("xlsx read error: {0}")]
    XlsxRead(#[from] calamine::XlsxError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("loading failed: {0}")]
    LoadingFailed(String),
    #[error("file not found")]
    FileNotFound,
    #[error("permission denied")]
    PermissionDenied,
    #[error("unknown file type")]
    UnknownFileType,
    #[error("unknown column `{0}`")]
    UnknownColumn(String),
    #[error("page size must be at least 1")]
    InvalidPageSize,
    #[error("no data loaded yet")]
    NotReady,
    #[error("no spreadsheet exporter configured")]
    NoExporter,
    #[error("raw export needs rows that serialize to objects")]
    NotAnObject,
    #[error("{rows} rows x {columns} columns do not fit in one sheet")]
    SheetTooLarge { rows: usize, columns: usize },
}

/// Runtime configuration of the terminal viewer.
#[derive(Debug, Clone, Setters)]
#[setters(prefix = "with_")]
pub struct ViewerConfig {
    pub event_poll_time: u64,
    pub page_size: usize,
    pub max_column_width: usize,
    pub select_threshold: usize,
    pub export_dir: PathBuf,
    #[setters(strip_option)]
    pub export_name: Option<String>,
    pub sheet_name: String,
    /// Fetch every page from a paginating source instead of slicing locally.
    pub server_paging: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            event_poll_time: 100,
            page_size: crate::pagination::DEFAULT_PAGE_SIZE,
            max_column_width: 32,
            select_threshold: 12,
            export_dir: PathBuf::from("."),
            export_name: None,
            sheet_name: crate::export::DEFAULT_SHEET_NAME.to_string(),
            server_paging: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Filter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Quit,
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    NextPage,
    PreviousPage,
    FirstPage,
    LastPage,
    GrowPageSize,
    ShrinkPageSize,
    Filter,
    ClearFilters,
    SortAscending,
    SortDescending,
    Enter,
    CopyRow,
    ExportPage,
    ExportAll,
    Help,
    Exit,
    Resize(usize, usize),
    RawKey(ratatui::crossterm::event::KeyEvent),
}

pub const HELP_TEXT: &str = "\
 q          quit
 ↑/↓        select row
 ←/→        select column
 n, PgDn    next page
 p, PgUp    previous page
 g / G      first / last page
 + / -      grow / shrink page size
 f          filter current column (Tab cycles select options)
 c          clear all filters
 s / S      sort ascending / descending
 Enter      open record
 y          copy row to clipboard
 e / E      export page / all filtered rows to xlsx
 ?          this help
 Esc        close popup";
