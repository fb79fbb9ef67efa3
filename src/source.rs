//! Where rows come from.
//!
//! The table only ever sees snapshots: a [`QueryState`] either carries a full
//! replacement of the data or says that it is still loading or failed.
//! Besides the generic collaborator types this module loads dashboard
//! exports (CSV, Parquet, Arrow, XLSX) into [`Record`] rows.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use calamine::{Data, Reader, Xlsx, open_workbook};
use polars::prelude::*;
use rayon::prelude::*;
use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::{debug, info, instrument};

use crate::column::{CellValue, ColumnDefinition, FilterDescriptor, RowFields};
use crate::domain::TableError;
use crate::filter::{FilterState, filter_indices, select_options_from_values};
use crate::pagination::{PaginationState, page_range};
use crate::sort::{SortState, sort_indices};

/// Snapshot emitted by a data fetching collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState<D> {
    pub data: Option<D>,
    pub is_loading: bool,
    pub is_error: bool,
}

impl<D> QueryState<D> {
    pub fn ready(data: D) -> Self {
        Self {
            data: Some(data),
            is_loading: false,
            is_error: false,
        }
    }

    pub fn loading() -> Self {
        Self {
            data: None,
            is_loading: true,
            is_error: false,
        }
    }

    pub fn error() -> Self {
        Self {
            data: None,
            is_loading: false,
            is_error: true,
        }
    }
}

/// What a server paginated source is asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub pagination: PaginationState,
    pub filters: FilterState,
    pub sort: Option<SortState>,
}

/// One page as returned by a server paginated source.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerPage<T> {
    pub rows: Vec<T>,
    pub total: usize,
}

pub trait DataSource<T> {
    fn fetch(&mut self, request: &PageRequest) -> QueryState<ServerPage<T>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Csv,
    Parquet,
    Xlsx,
    Arrow,
}

#[derive(Debug)]
pub struct FileInfo {
    pub path: PathBuf,
    pub file_size: u64,
    pub file_type: FileType,
}

/// One row of a loaded file.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    names: Arc<[String]>,
    values: Vec<CellValue>,
}

impl Record {
    pub fn new(names: Arc<[String]>, values: Vec<CellValue>) -> Self {
        Self { names, values }
    }

    pub fn values(&self) -> &[CellValue] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.names.iter().map(String::as_str).zip(self.values.iter())
    }

    /// The row as one CSV line.
    pub fn to_csv_line(&self) -> String {
        self.values
            .iter()
            .map(|v| wrap_cell_content(&v.display()))
            .collect::<Vec<String>>()
            .join(",")
    }
}

fn wrap_cell_content(c: &str) -> String {
    let needs_escaping = c.contains('"');
    let needs_wrapping = c.chars().any(|c| c == ' ' || c == '\t' || c == ',' || c == '"');
    let mut out = String::from(c);
    if needs_escaping {
        out = out.replace('"', "\"\"");
    }
    if needs_wrapping {
        out = format!("\"{out}\"");
    }
    out
}

impl RowFields for Record {
    fn field(&self, key: &str) -> CellValue {
        self.names
            .iter()
            .position(|n| n == key)
            .and_then(|idx| self.values.get(idx))
            .cloned()
            .unwrap_or(CellValue::Empty)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// A loaded file: column names plus rows.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub name: String,
    pub names: Arc<[String]>,
    pub rows: Vec<Record>,
}

impl Dataset {
    pub fn from_columns(name: impl Into<String>, columns: Vec<(String, Vec<CellValue>)>) -> Self {
        let height = columns.first().map(|(_, d)| d.len()).unwrap_or(0);
        let names: Arc<[String]> = columns.iter().map(|(n, _)| n.clone()).collect();
        let mut data: Vec<std::vec::IntoIter<CellValue>> =
            columns.into_iter().map(|(_, d)| d.into_iter()).collect();
        let rows = (0..height)
            .map(|_| {
                let values = data
                    .iter_mut()
                    .map(|c| c.next().unwrap_or(CellValue::Empty))
                    .collect();
                Record::new(Arc::clone(&names), values)
            })
            .collect();
        Dataset {
            name: name.into(),
            names,
            rows,
        }
    }

    /// Keyed column definitions for every field. Columns with at most
    /// `select_threshold` distinct values get a select filter, the rest a
    /// text filter.
    pub fn column_definitions(&self, select_threshold: usize) -> Vec<ColumnDefinition<Record>> {
        self.names
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let values = self.rows.iter().map(|r| &r.values[idx]);
                let filter = match select_options_from_values(values, select_threshold) {
                    Some(options) => FilterDescriptor::Select(options),
                    None => FilterDescriptor::Text,
                };
                ColumnDefinition::keyed(name.clone(), name.clone())
                    .filter(filter)
                    .sortable()
            })
            .collect()
    }
}

pub fn detect_file_type(path: &Path) -> Result<FileType, TableError> {
    match path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_uppercase())
        .as_deref()
    {
        Some("CSV") => Ok(FileType::Csv),
        Some("PARQUET") | Some("PQ") => Ok(FileType::Parquet),
        Some("XLSX") => Ok(FileType::Xlsx),
        Some("ARROW") | Some("IPC") | Some("FEATHER") => Ok(FileType::Arrow),
        _ => Err(TableError::UnknownFileType),
    }
}

pub fn get_file_info(path: PathBuf) -> Result<FileInfo, TableError> {
    let metadata = fs::metadata(&path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => TableError::FileNotFound,
        ErrorKind::PermissionDenied => TableError::PermissionDenied,
        _ => TableError::IoError(e),
    })?;
    if !metadata.is_file() {
        return Err(TableError::LoadingFailed("Not a file!".into()));
    }
    let file_type = detect_file_type(&path)?;
    Ok(FileInfo {
        path,
        file_size: metadata.len(),
        file_type,
    })
}

#[instrument]
pub fn load_data_file(path: PathBuf) -> Result<Dataset, TableError> {
    let file_info = get_file_info(path)?;
    let start_time = Instant::now();
    let name = file_info
        .path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("???")
        .to_string();

    let columns = match file_info.file_type {
        FileType::Csv => load_frame(load_csv(&file_info.path)?)?,
        FileType::Parquet => load_frame(load_parquet(&file_info.path)?)?,
        FileType::Arrow => load_frame(load_arrow(&file_info.path)?)?,
        FileType::Xlsx => load_xlsx(&file_info.path)?,
    };
    let dataset = Dataset::from_columns(name, columns);

    info!(
        "Loaded {} rows x {} columns ({} bytes) in {}ms",
        dataset.rows.len(),
        dataset.names.len(),
        file_info.file_size,
        start_time.elapsed().as_millis()
    );
    Ok(dataset)
}

// Each column is converted in its own rayon task.
fn load_frame(frame: LazyFrame) -> Result<Vec<(String, Vec<CellValue>)>, TableError> {
    let df = Arc::new(frame.collect()?);
    let columns: Result<Vec<(String, Vec<CellValue>)>, PolarsError> = df
        .get_column_names()
        .par_iter()
        .map(|name| load_column(&df, name))
        .collect();
    Ok(columns?)
}

fn load_column(df: &DataFrame, col_name: &str) -> Result<(String, Vec<CellValue>), PolarsError> {
    let dtype = df.column(col_name)?.dtype().clone();
    let col = df.column(col_name)?.cast(&DataType::String)?;
    let series = col.str()?;

    let data = series
        .into_iter()
        .map(|value| match value {
            Some(s) => typed_value(&dtype, s),
            None => CellValue::Empty,
        })
        .collect();
    debug!("Column \"{col_name}\" {dtype:?}");
    Ok((col_name.to_string(), data))
}

fn typed_value(dtype: &DataType, s: &str) -> CellValue {
    if is_integer_type(dtype)
        && let Ok(i) = s.parse::<i64>()
    {
        return CellValue::Integer(i);
    }
    if matches!(dtype, DataType::Float32 | DataType::Float64)
        && let Ok(n) = s.parse::<f64>()
    {
        return CellValue::Number(n);
    }
    if matches!(dtype, DataType::Boolean)
        && let Ok(b) = s.parse::<bool>()
    {
        return CellValue::Bool(b);
    }
    CellValue::Text(s.replace("\r\n", " ↵ ").replace('\n', " ↵ "))
}

fn is_integer_type(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

fn load_csv(path: &Path) -> Result<LazyFrame, PolarsError> {
    LazyCsvReader::new(PlPath::Local(path.into()))
        .with_has_header(true)
        .finish()
}

fn load_parquet(path: &Path) -> Result<LazyFrame, PolarsError> {
    LazyFrame::scan_parquet(PlPath::Local(path.into()), ScanArgsParquet::default())
}

fn load_arrow(path: &Path) -> Result<LazyFrame, PolarsError> {
    LazyFrame::scan_ipc(
        PlPath::Local(path.into()),
        polars::io::ipc::IpcScanOptions,
        UnifiedScanArgs::default(),
    )
}

/// First sheet, first row as headers.
fn load_xlsx(path: &Path) -> Result<Vec<(String, Vec<CellValue>)>, TableError> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let Some(sheet_name) = workbook.sheet_names().first().cloned() else {
        return Err(TableError::LoadingFailed("Workbook contains no sheets".to_string()));
    };
    let range = workbook.worksheet_range(&sheet_name)?;
    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(Vec::new());
    };
    let mut columns: Vec<(String, Vec<CellValue>)> = header
        .iter()
        .enumerate()
        .map(|(idx, h)| match h {
            Data::Empty => (format!("column_{}", idx + 1), Vec::new()),
            other => (other.to_string(), Vec::new()),
        })
        .collect();
    for row in rows {
        for (idx, (_, data)) in columns.iter_mut().enumerate() {
            data.push(row.get(idx).map(xlsx_value).unwrap_or(CellValue::Empty));
        }
    }
    Ok(columns)
}

fn xlsx_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Integer(*i),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::Error(e) => CellValue::Text(format!("{e:?}")),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) => CellValue::Text(s.clone()),
        Data::DurationIso(s) => CellValue::Text(s.clone()),
    }
}

/// Serves a loaded dataset the way a paginating backend would: filter, sort
/// and slice on every request.
pub struct FileSource {
    dataset: Dataset,
    columns: Vec<ColumnDefinition<Record>>,
}

impl FileSource {
    pub fn new(dataset: Dataset, columns: Vec<ColumnDefinition<Record>>) -> Self {
        Self { dataset, columns }
    }

    fn page(&self, request: &PageRequest) -> Result<ServerPage<Record>, TableError> {
        let rows = &self.dataset.rows;
        let mut indices = filter_indices(rows, &self.columns, &request.filters, None)?;
        if let Some(sort) = &request.sort {
            sort_indices(rows, &mut indices, &self.columns, sort)?;
        }
        let range = page_range(indices.len(), request.pagination);
        Ok(ServerPage {
            rows: indices[range].iter().map(|&i| rows[i].clone()).collect(),
            total: indices.len(),
        })
    }
}

impl DataSource<Record> for FileSource {
    fn fetch(&mut self, request: &PageRequest) -> QueryState<ServerPage<Record>> {
        match self.page(request) {
            Ok(page) => QueryState::ready(page),
            Err(e) => {
                tracing::error!("Fetching page failed: {e}");
                QueryState::error()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> Dataset {
        Dataset::from_columns(
            "santri",
            vec![
                ("name".to_string(), vec!["Ali Hasan".into(), "Budi".into(), "Ratna Aliyah".into()]),
                ("status".to_string(), vec!["active".into(), "inactive".into(), "active".into()]),
                ("room".to_string(), vec![CellValue::Integer(3), CellValue::Integer(1), CellValue::Empty]),
            ],
        )
    }

    #[test]
    fn records_are_addressed_by_key() {
        let ds = dataset();
        assert_eq!(ds.rows.len(), 3);
        assert_eq!(ds.rows[1].field("name"), CellValue::from("Budi"));
        assert_eq!(ds.rows[2].field("room"), CellValue::Empty);
        assert_eq!(ds.rows[0].field("missing"), CellValue::Empty);
    }

    #[test]
    fn records_serialize_as_objects() {
        let ds = dataset();
        let json = serde_json::to_value(&ds.rows[0]).unwrap();
        assert_eq!(json["name"], "Ali Hasan");
        assert_eq!(json["room"], 3);
    }

    #[test]
    fn csv_line_quotes_when_needed() {
        let ds = dataset();
        assert_eq!(ds.rows[1].to_csv_line(), "Budi,inactive,1");
        assert_eq!(ds.rows[0].to_csv_line(), "\"Ali Hasan\",active,3");
        assert_eq!(wrap_cell_content("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn column_definitions_pick_filter_kind() {
        let ds = dataset();
        let cols = ds.column_definitions(2);
        assert_eq!(cols.len(), 3);
        assert_eq!(cols[0].filter, Some(FilterDescriptor::Text));
        assert!(matches!(&cols[1].filter, Some(FilterDescriptor::Select(o)) if o.len() == 2));
        assert!(cols.iter().all(|c| c.sortable));
    }

    #[test]
    fn file_type_detection() {
        assert_eq!(detect_file_type(Path::new("a/santri.CSV")).unwrap(), FileType::Csv);
        assert_eq!(detect_file_type(Path::new("x.pq")).unwrap(), FileType::Parquet);
        assert_eq!(detect_file_type(Path::new("x.feather")).unwrap(), FileType::Arrow);
        assert_eq!(detect_file_type(Path::new("x.xlsx")).unwrap(), FileType::Xlsx);
        assert!(matches!(detect_file_type(Path::new("x.pdf")), Err(TableError::UnknownFileType)));
    }

    #[test]
    fn missing_file() {
        let err = get_file_info(PathBuf::from("does/not/exist.csv")).unwrap_err();
        assert!(matches!(err, TableError::FileNotFound));
    }

    #[test]
    fn file_source_filters_sorts_and_slices() {
        let ds = dataset();
        let cols = ds.column_definitions(10);
        let mut source = FileSource::new(ds, cols);
        let request = PageRequest {
            pagination: PaginationState::try_with_page_size(1).unwrap().at_page(1),
            filters: FilterState::new().with("status", "active"),
            sort: Some(SortState::new("name", crate::sort::SortDirection::Descending)),
        };
        let state = source.fetch(&request);
        let page = state.data.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.rows.len(), 1);
        assert_eq!(page.rows[0].field("name"), CellValue::from("Ali Hasan"));

        let bad = PageRequest {
            filters: FilterState::new().with("nope", "x"),
            ..request
        };
        assert!(source.fetch(&bad).is_error);
    }
}
