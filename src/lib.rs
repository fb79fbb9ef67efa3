//! Paginated, filterable and exportable tables for pesantren dashboard data.
//!
//! The library half holds the pieces a dashboard page is built from:
//! a local [`pagination`] engine, generic [`column`] definitions, per column
//! [`filter`]ing and [`sort`]ing, the controlled [`table`] view, spreadsheet
//! [`export`], data [`source`]s and the hosting [`page`]. The terminal viewer
//! in `main.rs` hosts a page over a loaded file.

pub mod column;
pub mod controller;
pub mod domain;
pub mod export;
pub mod filter;
pub mod inputter;
pub mod model;
pub mod page;
pub mod pagination;
pub mod sort;
pub mod source;
pub mod table;
pub mod ui;

pub use column::{Accessor, CellControl, CellValue, ColumnDefinition, FilterDescriptor, Header, RowFields, SelectOption};
pub use domain::{TableError, ViewerConfig};
pub use export::{ExportMode, ExportOptions, ExportedFile, SpreadsheetExporter, XlsxExporter};
pub use filter::{FilterState, FilterableColumns};
pub use page::{ExportScope, PageEvent, PageSnapshot, Paging, TablePage};
pub use pagination::{LocalPaginator, PageInfo, PaginationState};
pub use sort::{SortDirection, SortState};
pub use source::{DataSource, Dataset, PageRequest, QueryState, Record, ServerPage};
pub use table::{ClickTarget, FilterChange, Interaction, TableCallbacks, TableView};
