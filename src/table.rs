//! The generic tabular view.
//!
//! `TableView` is a controlled component: it borrows everything it shows
//! (columns, one page of rows, pagination, filters, sort) from its host and
//! never changes any of it. User interactions are reported back through
//! [`TableCallbacks`], and the host decides what to do with them.

use std::num::NonZeroUsize;

use serde::Serialize;
use tracing::{debug, trace};

use crate::column::{ColumnDefinition, FilterDescriptor, SelectOption, find_column};
use crate::domain::TableError;
use crate::export::{ExportMode, ExportOptions, ExportTable, ExportedFile, SpreadsheetExporter};
use crate::filter::{FilterState, FilterableColumns, descriptor_for};
use crate::pagination::{PageInfo, PaginationState};
use crate::sort::{SortDirection, SortState};

/// Where a pointer activation landed within a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickTarget {
    Row,
    Cell(usize),
    /// The interactive control embedded in the given column.
    Control(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    Click { row: usize, target: ClickTarget },
    NextPage,
    PreviousPage,
    FirstPage,
    LastPage,
    GoToPage(usize),
    SetPageSize(NonZeroUsize),
    SetFilter { column_id: String, value: String },
    ClearFilters,
    ToggleSort { column_id: String },
    Export,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterChange {
    Set { column_id: String, value: String },
    Cleared { column_id: String },
    ClearAll,
}

type Callback<'c, A> = Box<dyn FnMut(A) + 'c>;

/// Handlers the host hands to [`TableView::dispatch`]. Only
/// `on_pagination_change` is mandatory.
pub struct TableCallbacks<'c, T> {
    on_pagination_change: Callback<'c, PaginationState>,
    on_filter_change: Option<Callback<'c, FilterChange>>,
    on_sort_change: Option<Callback<'c, Option<SortState>>>,
    on_row_click: Option<Box<dyn FnMut(&T) + 'c>>,
    on_control: Option<Box<dyn FnMut(&str, &T) + 'c>>,
    on_export: Option<Callback<'c, Result<ExportedFile, TableError>>>,
}

impl<'c, T> TableCallbacks<'c, T> {
    pub fn new(on_pagination_change: impl FnMut(PaginationState) + 'c) -> Self {
        Self {
            on_pagination_change: Box::new(on_pagination_change),
            on_filter_change: None,
            on_sort_change: None,
            on_row_click: None,
            on_control: None,
            on_export: None,
        }
    }

    pub fn on_filter_change(mut self, f: impl FnMut(FilterChange) + 'c) -> Self {
        self.on_filter_change = Some(Box::new(f));
        self
    }

    pub fn on_sort_change(mut self, f: impl FnMut(Option<SortState>) + 'c) -> Self {
        self.on_sort_change = Some(Box::new(f));
        self
    }

    pub fn on_row_click(mut self, f: impl FnMut(&T) + 'c) -> Self {
        self.on_row_click = Some(Box::new(f));
        self
    }

    pub fn on_control(mut self, f: impl FnMut(&str, &T) + 'c) -> Self {
        self.on_control = Some(Box::new(f));
        self
    }

    pub fn on_export(mut self, f: impl FnMut(Result<ExportedFile, TableError>) + 'c) -> Self {
        self.on_export = Some(Box::new(f));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedCell {
    Text(String),
    Control(String),
}

impl RenderedCell {
    pub fn text(&self) -> &str {
        match self {
            RenderedCell::Text(s) | RenderedCell::Control(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<RenderedCell>>,
}

/// Input rendered above a filterable column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterInput {
    Text { column_id: String, value: String },
    Select { column_id: String, options: Vec<SelectOption>, selected: Option<String> },
}

impl FilterInput {
    pub fn column_id(&self) -> &str {
        match self {
            FilterInput::Text { column_id, .. } | FilterInput::Select { column_id, .. } => column_id,
        }
    }
}

pub struct TableView<'a, T> {
    columns: &'a [ColumnDefinition<T>],
    data: &'a [T],
    page_count: usize,
    total_rows: Option<usize>,
    pagination: PaginationState,
    filters: Option<&'a FilterState>,
    filterable_columns: Option<&'a FilterableColumns>,
    sort: Option<&'a SortState>,
    export: Option<(&'a dyn SpreadsheetExporter, &'a ExportOptions)>,
    export_rows: Option<&'a [&'a T]>,
}

impl<'a, T> TableView<'a, T> {
    pub fn new(
        columns: &'a [ColumnDefinition<T>],
        data: &'a [T],
        page_count: usize,
        pagination: PaginationState,
    ) -> Self {
        Self {
            columns,
            data,
            page_count,
            total_rows: None,
            pagination,
            filters: None,
            filterable_columns: None,
            sort: None,
            export: None,
            export_rows: None,
        }
    }

    pub fn filters(mut self, filters: &'a FilterState) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn filterable_columns(mut self, filterable: &'a FilterableColumns) -> Self {
        self.filterable_columns = Some(filterable);
        self
    }

    pub fn sort(mut self, sort: Option<&'a SortState>) -> Self {
        self.sort = sort;
        self
    }

    pub fn export(mut self, exporter: &'a dyn SpreadsheetExporter, options: &'a ExportOptions) -> Self {
        self.export = Some((exporter, options));
        self
    }

    /// Rows exported instead of the rendered page.
    pub fn export_rows(mut self, rows: &'a [&'a T]) -> Self {
        self.export_rows = Some(rows);
        self
    }

    /// Total row count behind all pages, used for the page summary.
    pub fn total_rows(mut self, total: usize) -> Self {
        self.total_rows = Some(total);
        self
    }

    pub fn columns(&self) -> &'a [ColumnDefinition<T>] {
        self.columns
    }

    pub fn data(&self) -> &'a [T] {
        self.data
    }

    pub fn pagination(&self) -> PaginationState {
        self.pagination
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn page_info(&self) -> PageInfo {
        let total = self
            .total_rows
            .unwrap_or_else(|| self.pagination.offset() + self.data.len());
        PageInfo::new(total, self.page_count, self.pagination)
    }

    pub fn header_labels(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.header_text()).collect()
    }

    /// Header label with a sort marker for the sorted column.
    pub fn header_label(&self, column: &ColumnDefinition<T>) -> String {
        let label = column.header_text();
        match self.sort {
            Some(s) if s.column_id == column.id => match s.direction {
                SortDirection::Ascending => format!("{label} ▲"),
                SortDirection::Descending => format!("{label} ▼"),
            },
            _ => label,
        }
    }

    pub fn render_cell(&self, column: &ColumnDefinition<T>, row: &T) -> RenderedCell {
        match &column.control {
            Some(control) => RenderedCell::Control(control.label(row)),
            None => RenderedCell::Text(column.render(row)),
        }
    }

    pub fn render(&self) -> RenderedTable {
        RenderedTable {
            headers: self.columns.iter().map(|c| self.header_label(c)).collect(),
            rows: self
                .data
                .iter()
                .map(|row| self.columns.iter().map(|c| self.render_cell(c, row)).collect())
                .collect(),
        }
    }

    pub fn filter_descriptor(&self, column: &'a ColumnDefinition<T>) -> Option<&'a FilterDescriptor> {
        descriptor_for(column, self.filterable_columns)
    }

    pub fn filter_inputs(&self) -> Vec<FilterInput> {
        self.columns
            .iter()
            .filter_map(|column| {
                let current = self.filters.and_then(|f| f.get(&column.id)).map(str::to_string);
                match self.filter_descriptor(column)? {
                    FilterDescriptor::Text => Some(FilterInput::Text {
                        column_id: column.id.clone(),
                        value: current.unwrap_or_default(),
                    }),
                    FilterDescriptor::Select(options) => Some(FilterInput::Select {
                        column_id: column.id.clone(),
                        options: options.clone(),
                        selected: current,
                    }),
                }
            })
            .collect()
    }

    pub fn dispatch(&self, interaction: Interaction, callbacks: &mut TableCallbacks<'_, T>)
    where
        T: Serialize,
    {
        trace!("Dispatch {interaction:?}");
        match interaction {
            Interaction::Click { row, target } => self.click(row, target, callbacks),
            Interaction::NextPage => {
                (callbacks.on_pagination_change)(self.pagination.next(self.page_count))
            }
            Interaction::PreviousPage => (callbacks.on_pagination_change)(self.pagination.previous()),
            Interaction::FirstPage => (callbacks.on_pagination_change)(self.pagination.first()),
            Interaction::LastPage => {
                (callbacks.on_pagination_change)(self.pagination.last(self.page_count))
            }
            Interaction::GoToPage(page) => {
                (callbacks.on_pagination_change)(self.pagination.at_page(page).clamped(self.page_count))
            }
            Interaction::SetPageSize(size) => {
                (callbacks.on_pagination_change)(self.pagination.with_page_size(size))
            }
            Interaction::SetFilter { column_id, value } => {
                if let Some(f) = callbacks.on_filter_change.as_mut() {
                    if value.is_empty() {
                        f(FilterChange::Cleared { column_id });
                    } else {
                        f(FilterChange::Set { column_id, value });
                    }
                }
            }
            Interaction::ClearFilters => {
                if let Some(f) = callbacks.on_filter_change.as_mut() {
                    f(FilterChange::ClearAll);
                }
            }
            Interaction::ToggleSort { column_id } => {
                let sortable = find_column(self.columns, &column_id).is_some_and(|(_, c)| c.sortable);
                if !sortable {
                    debug!("Ignoring sort on column {column_id}");
                    return;
                }
                if let Some(f) = callbacks.on_sort_change.as_mut() {
                    f(SortState::toggle(self.sort, &column_id));
                }
            }
            Interaction::Export => {
                let result = self.export_file();
                if let Some(f) = callbacks.on_export.as_mut() {
                    f(result);
                }
            }
        }
    }

    fn click(&self, row: usize, target: ClickTarget, callbacks: &mut TableCallbacks<'_, T>) {
        let Some(item) = self.data.get(row) else {
            debug!("Click on missing row {row}");
            return;
        };
        if let ClickTarget::Control(col) = target
            && let Some(column) = self.columns.get(col).filter(|c| c.control.is_some())
        {
            // The control swallows the click
            if let Some(f) = callbacks.on_control.as_mut() {
                f(&column.id, item);
            }
            return;
        }
        if let Some(f) = callbacks.on_row_click.as_mut() {
            f(item);
        }
    }

    /// Builds the export table for the current rows.
    pub fn export_table(&self) -> Result<ExportTable, TableError>
    where
        T: Serialize,
    {
        let page: Vec<&T>;
        let rows: &[&T] = match self.export_rows {
            Some(rows) => rows,
            None => {
                page = self.data.iter().collect();
                &page
            }
        };
        let (mode, skip_controls) = self
            .export
            .map(|(_, o)| (o.mode, o.skip_controls))
            .unwrap_or((ExportMode::Columns, false));
        match mode {
            ExportMode::Columns => Ok(ExportTable::from_columns(self.columns, rows, skip_controls)),
            ExportMode::RawRows => ExportTable::from_raw_rows(rows),
        }
    }

    pub fn export_file(&self) -> Result<ExportedFile, TableError>
    where
        T: Serialize,
    {
        let Some((exporter, options)) = self.export else {
            return Err(TableError::NoExporter);
        };
        let table = self.export_table()?;
        exporter.export_table(&table, options)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::column::{CellControl, CellValue};
    use crate::export::XlsxExporter;

    #[derive(Debug, Clone, PartialEq, Serialize)]
    struct Staff {
        name: String,
        role: String,
    }

    fn staff() -> Vec<Staff> {
        ["Ustadz Ahmad:teacher", "Bu Siti:treasurer", "Pak Umar:teacher"]
            .iter()
            .map(|s| {
                let (name, role) = s.split_once(':').unwrap();
                Staff { name: name.into(), role: role.into() }
            })
            .collect()
    }

    fn columns() -> Vec<ColumnDefinition<Staff>> {
        vec![
            ColumnDefinition::new("name", "Name", |s: &Staff| s.name.as_str().into()).sortable(),
            ColumnDefinition::new("role", "Role", |s: &Staff| s.role.as_str().into())
                .filter(FilterDescriptor::select(["teacher", "treasurer"]))
                .cell(|_, v| v.display().to_uppercase()),
            ColumnDefinition::new("actions", "", |_: &Staff| CellValue::Empty)
                .control(CellControl::new(|_| "edit".to_string())),
        ]
    }

    fn size(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn renders_through_cell_and_control() {
        let data = staff();
        let cols = columns();
        let view = TableView::new(&cols, &data, 1, PaginationState::new(size(10)));
        let rendered = view.render();
        assert_eq!(rendered.headers, vec!["Name", "Role", ""]);
        assert_eq!(rendered.rows.len(), 3);
        assert_eq!(rendered.rows[1][1], RenderedCell::Text("TREASURER".into()));
        assert_eq!(rendered.rows[1][2], RenderedCell::Control("edit".into()));
    }

    #[test]
    fn row_click_is_isolated_from_controls() {
        let data = staff();
        let cols = columns();
        let view = TableView::new(&cols, &data, 1, PaginationState::new(size(10)));
        let clicked = RefCell::new(Vec::new());
        let controls = RefCell::new(Vec::new());
        let mut callbacks = TableCallbacks::new(|_| {})
            .on_row_click(|s: &Staff| clicked.borrow_mut().push(s.name.clone()))
            .on_control(|id, s: &Staff| controls.borrow_mut().push((id.to_string(), s.name.clone())));

        view.dispatch(Interaction::Click { row: 0, target: ClickTarget::Control(2) }, &mut callbacks);
        assert!(clicked.borrow().is_empty());
        assert_eq!(controls.borrow().len(), 1);

        view.dispatch(Interaction::Click { row: 0, target: ClickTarget::Cell(1) }, &mut callbacks);
        view.dispatch(Interaction::Click { row: 2, target: ClickTarget::Row }, &mut callbacks);
        drop(callbacks);
        assert_eq!(*clicked.borrow(), vec!["Ustadz Ahmad".to_string(), "Pak Umar".to_string()]);
    }

    #[test]
    fn pagination_is_reported_not_mutated() {
        let data = staff();
        let cols = columns();
        let state = PaginationState::new(size(1));
        let view = TableView::new(&cols, &data[..1], 3, state);
        let mut seen = Vec::new();
        {
            let mut callbacks = TableCallbacks::new(|p| seen.push(p));
            view.dispatch(Interaction::NextPage, &mut callbacks);
            view.dispatch(Interaction::LastPage, &mut callbacks);
            view.dispatch(Interaction::PreviousPage, &mut callbacks);
            view.dispatch(Interaction::GoToPage(9), &mut callbacks);
            view.dispatch(Interaction::SetPageSize(size(5)), &mut callbacks);
        }
        assert_eq!(view.pagination(), state);
        let pages: Vec<usize> = seen.iter().map(|p| p.page_index).collect();
        assert_eq!(pages, vec![1, 2, 0, 2, 0]);
        assert_eq!(seen[4].size(), 5);
    }

    #[test]
    fn filter_inputs_follow_descriptors() {
        let data = staff();
        let cols = columns();
        let filters = FilterState::new().with("role", "teacher");
        let mut filterable = FilterableColumns::new();
        filterable.insert("name".to_string(), FilterDescriptor::Text);
        let view = TableView::new(&cols, &data, 1, PaginationState::default())
            .filters(&filters)
            .filterable_columns(&filterable);
        let inputs = view.filter_inputs();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0], FilterInput::Text { column_id: "name".into(), value: String::new() });
        assert!(matches!(&inputs[1], FilterInput::Select { selected: Some(v), .. } if v == "teacher"));
    }

    #[test]
    fn filter_and_sort_interactions() {
        let data = staff();
        let cols = columns();
        let view = TableView::new(&cols, &data, 1, PaginationState::default());
        let mut filter_changes = Vec::new();
        let mut sorts = Vec::new();
        {
            let mut callbacks = TableCallbacks::new(|_| {})
                .on_filter_change(|c| filter_changes.push(c))
                .on_sort_change(|s| sorts.push(s));
            view.dispatch(Interaction::SetFilter { column_id: "role".into(), value: "teacher".into() }, &mut callbacks);
            view.dispatch(Interaction::SetFilter { column_id: "role".into(), value: String::new() }, &mut callbacks);
            view.dispatch(Interaction::ToggleSort { column_id: "name".into() }, &mut callbacks);
            view.dispatch(Interaction::ToggleSort { column_id: "role".into() }, &mut callbacks);
        }
        assert_eq!(filter_changes[1], FilterChange::Cleared { column_id: "role".into() });
        assert_eq!(sorts, vec![Some(SortState::new("name", SortDirection::Ascending))]);
    }

    #[test]
    fn export_reports_file_and_keeps_state() {
        let data = staff();
        let cols = columns();
        let options = ExportOptions::new("staff").with_skip_controls(true);
        let view = TableView::new(&cols, &data, 1, PaginationState::default()).export(&XlsxExporter, &options);
        let table = view.export_table().unwrap();
        assert_eq!(table.headers, vec!["Name", "Role"]);
        assert_eq!(table.rows.len(), 3);

        let mut files = Vec::new();
        {
            let mut callbacks = TableCallbacks::new(|_| {}).on_export(|r| files.push(r));
            view.dispatch(Interaction::Export, &mut callbacks);
        }
        let file = files.pop().unwrap().unwrap();
        assert_eq!(file.file_name, "staff.xlsx");
        assert!(!file.bytes.is_empty());
        assert_eq!(view.data().len(), 3);
    }

    #[test]
    fn export_without_exporter_fails() {
        let data = staff();
        let cols = columns();
        let view = TableView::new(&cols, &data, 1, PaginationState::default());
        assert!(matches!(view.export_file(), Err(TableError::NoExporter)));
    }
}
