//! The page that hosts a table.
//!
//! `TablePage` is the single writer of everything the table shows: the data
//! snapshot, filters, sort and pagination. The view only reports what the
//! user asked for; the page applies it, recomputes the derived rows and
//! notifies observers. Whenever the row set changes (new snapshot, new
//! filters, new page size) the page goes back to the first page.

use std::cell::RefCell;
use std::fmt;

use serde::Serialize;
use tracing::{debug, trace};

use crate::column::{ColumnDefinition, find_column};
use crate::domain::TableError;
use crate::export::{ExportOptions, ExportedFile, SpreadsheetExporter, XlsxExporter};
use crate::filter::{FilterState, FilterableColumns, filter_indices};
use crate::pagination::{LocalPaginator, PageInfo, PaginationState, page_count};
use crate::source::{DataSource, PageRequest, QueryState, ServerPage};
use crate::sort::{SortState, sort_indices};
use crate::table::{FilterChange, Interaction, TableCallbacks, TableView};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Paging {
    /// All rows are in memory and sliced locally.
    Local,
    /// Every page is fetched from the source.
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportScope {
    Page,
    AllRows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Empty,
    Loading,
    Error,
    Ready,
}

/// What observers get after every recompute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSnapshot {
    pub pagination: PaginationState,
    pub page_info: PageInfo,
    pub visible_rows: usize,
    pub source_rows: usize,
}

/// Results of an interaction that the page cannot handle itself.
#[derive(Debug)]
pub enum PageEvent<T> {
    RowClicked(T),
    ControlActivated { column_id: String, row: T },
    Exported(Result<ExportedFile, TableError>),
}

type Observer = Box<dyn FnMut(&PageSnapshot)>;

pub struct TablePage<T> {
    columns: Vec<ColumnDefinition<T>>,
    filterable: FilterableColumns,
    filters: FilterState,
    sort: Option<SortState>,
    pagination: PaginationState,
    paging: Paging,
    status: Status,
    source: Vec<T>,
    server_total: usize,
    paginator: LocalPaginator<T>,
    pending: Option<PageRequest>,
    exporter: Box<dyn SpreadsheetExporter>,
    export_options: ExportOptions,
    observers: Vec<Observer>,
}

impl<T: Clone + Sync + Serialize> TablePage<T> {
    pub fn new(columns: Vec<ColumnDefinition<T>>, pagination: PaginationState) -> Self {
        Self {
            columns,
            filterable: FilterableColumns::new(),
            filters: FilterState::new(),
            sort: None,
            pagination,
            paging: Paging::Local,
            status: Status::Empty,
            source: Vec::new(),
            server_total: 0,
            paginator: LocalPaginator::new(Vec::new(), pagination.page_size),
            pending: None,
            exporter: Box::new(XlsxExporter),
            export_options: ExportOptions::new("export"),
            observers: Vec::new(),
        }
    }

    pub fn server_paginated(mut self) -> Self {
        self.paging = Paging::Server;
        self.pending = Some(self.request());
        self
    }

    pub fn with_filterable_columns(mut self, filterable: FilterableColumns) -> Self {
        self.filterable = filterable;
        self
    }

    pub fn with_export(mut self, exporter: Box<dyn SpreadsheetExporter>, options: ExportOptions) -> Self {
        self.exporter = exporter;
        self.export_options = options;
        self
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&PageSnapshot) + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn columns(&self) -> &[ColumnDefinition<T>] {
        &self.columns
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    pub fn sort(&self) -> Option<&SortState> {
        self.sort.as_ref()
    }

    pub fn pagination(&self) -> PaginationState {
        self.pagination
    }

    pub fn paging(&self) -> Paging {
        self.paging
    }

    pub fn is_loading(&self) -> bool {
        self.status == Status::Loading
    }

    pub fn is_error(&self) -> bool {
        self.status == Status::Error
    }

    /// Rows of the current page.
    pub fn page_rows(&self) -> &[T] {
        match self.paging {
            Paging::Local => self.paginator.paginated_data(),
            Paging::Server => &self.source,
        }
    }

    /// Every row that passes the filters, in display order. For server
    /// paging only the current page is known.
    pub fn filtered_rows(&self) -> &[T] {
        match self.paging {
            Paging::Local => self.paginator.data(),
            Paging::Server => &self.source,
        }
    }

    pub fn total_rows(&self) -> usize {
        match self.paging {
            Paging::Local => self.paginator.data().len(),
            Paging::Server => self.server_total,
        }
    }

    pub fn page_count(&self) -> usize {
        match self.paging {
            Paging::Local => self.paginator.page_count(),
            Paging::Server => page_count(self.server_total, self.pagination.page_size),
        }
    }

    pub fn page_info(&self) -> PageInfo {
        PageInfo::new(self.total_rows(), self.page_count(), self.pagination)
    }

    /// The view over the current page, or nothing while there is no data.
    pub fn view(&self) -> Option<TableView<'_, T>> {
        if self.status != Status::Ready {
            return None;
        }
        Some(
            TableView::new(&self.columns, self.page_rows(), self.page_count(), self.pagination)
                .total_rows(self.total_rows())
                .filters(&self.filters)
                .filterable_columns(&self.filterable)
                .sort(self.sort.as_ref())
                .export(self.exporter.as_ref(), &self.export_options),
        )
    }

    /// Takes a full snapshot from the data collaborator (local paging).
    pub fn receive(&mut self, state: QueryState<Vec<T>>) -> Result<(), TableError> {
        match state {
            QueryState { is_error: true, .. } => self.status = Status::Error,
            QueryState { data: Some(data), .. } => {
                let rows = self.derive_rows(&data)?;
                self.source = data;
                self.status = Status::Ready;
                self.pagination = self.pagination.first();
                self.show(rows);
            }
            QueryState { is_loading: true, .. } => self.status = Status::Loading,
            QueryState { .. } => self.status = Status::Empty,
        }
        trace!("Received snapshot, status {:?}", self.status);
        Ok(())
    }

    /// Takes one page from a server paginated collaborator.
    pub fn receive_page(&mut self, state: QueryState<ServerPage<T>>) {
        match state {
            QueryState { is_error: true, .. } => self.status = Status::Error,
            QueryState { data: Some(page), .. } => {
                self.source = page.rows;
                self.server_total = page.total;
                self.status = Status::Ready;
                if !self.pagination.is_in_range(self.page_count()) {
                    debug!("Page {} vanished, going back to the first page", self.pagination.page_index);
                    self.pagination = self.pagination.first();
                    self.pending = Some(self.request());
                }
                self.notify();
            }
            QueryState { is_loading: true, .. } => self.status = Status::Loading,
            QueryState { .. } => self.status = Status::Empty,
        }
    }

    /// The request a server paginated page is waiting for, if any.
    pub fn pending_request(&self) -> Option<&PageRequest> {
        self.pending.as_ref()
    }

    /// Fetches the pending page, if there is one.
    pub fn refresh(&mut self, source: &mut dyn DataSource<T>) {
        if let Some(request) = self.pending.take() {
            self.status = Status::Loading;
            let state = source.fetch(&request);
            self.receive_page(state);
        }
    }

    pub fn set_pagination(&mut self, pagination: PaginationState) {
        if pagination == self.pagination {
            return;
        }
        self.pagination = pagination;
        match self.paging {
            Paging::Local => {
                self.paginator.set_pagination(pagination);
                self.notify();
            }
            Paging::Server => self.pending = Some(self.request()),
        }
    }

    /// Applies a filter change. A change on a column the table does not
    /// declare is rejected and leaves the page as it was.
    pub fn set_filter(&mut self, change: FilterChange) -> Result<(), TableError> {
        if let FilterChange::Set { column_id, .. } = &change {
            self.check_column(column_id)?;
        }
        match change {
            FilterChange::Set { column_id, value } => self.filters.set(column_id, value),
            FilterChange::Cleared { column_id } => {
                self.filters.remove(&column_id);
            }
            FilterChange::ClearAll => self.filters.clear(),
        }
        self.pagination = self.pagination.first();
        self.rows_changed()
    }

    pub fn set_sort(&mut self, sort: Option<SortState>) -> Result<(), TableError> {
        if let Some(sort) = &sort {
            self.check_column(&sort.column_id)?;
        }
        self.sort = sort;
        self.rows_changed()
    }

    fn check_column(&self, column_id: &str) -> Result<(), TableError> {
        match find_column(&self.columns, column_id) {
            Some(_) => Ok(()),
            None => Err(TableError::UnknownColumn(column_id.to_string())),
        }
    }

    fn rows_changed(&mut self) -> Result<(), TableError> {
        match self.paging {
            Paging::Local => self.recompute(),
            Paging::Server => {
                self.pending = Some(self.request());
                Ok(())
            }
        }
    }

    fn request(&self) -> PageRequest {
        PageRequest {
            pagination: self.pagination,
            filters: self.filters.clone(),
            sort: self.sort.clone(),
        }
    }

    /// Recomputes the filtered, sorted rows and the current page.
    pub fn recompute(&mut self) -> Result<(), TableError> {
        let rows = self.derive_rows(&self.source)?;
        self.show(rows);
        Ok(())
    }

    /// Filtered and sorted copy of `source`, nothing for server paging.
    fn derive_rows(&self, source: &[T]) -> Result<Vec<T>, TableError> {
        if self.paging == Paging::Server {
            return Ok(Vec::new());
        }
        let mut indices = filter_indices(source, &self.columns, &self.filters, Some(&self.filterable))?;
        if let Some(sort) = &self.sort {
            sort_indices(source, &mut indices, &self.columns, sort)?;
        }
        Ok(indices.into_iter().map(|i| source[i].clone()).collect())
    }

    fn show(&mut self, rows: Vec<T>) {
        if self.paging == Paging::Local {
            self.paginator.set_data(rows);
            self.paginator.set_pagination(self.pagination);
        }
        self.notify();
    }

    fn notify(&mut self) {
        let snapshot = PageSnapshot {
            pagination: self.pagination,
            page_info: self.page_info(),
            visible_rows: self.page_rows().len(),
            source_rows: self.source.len(),
        };
        for observer in self.observers.iter_mut() {
            observer(&snapshot);
        }
    }

    /// Runs one user interaction through the view and applies what it
    /// reports.
    pub fn interact(&mut self, interaction: Interaction) -> Result<Vec<PageEvent<T>>, TableError> {
        let mut pagination = None;
        let mut filter_changes = Vec::new();
        let mut sort_change = None;
        let events = RefCell::new(Vec::new());
        {
            let Some(view) = self.view() else {
                debug!("Ignoring {interaction:?} while no data is shown");
                return Ok(Vec::new());
            };
            let mut callbacks = TableCallbacks::new(|p| pagination = Some(p))
                .on_filter_change(|c| filter_changes.push(c))
                .on_sort_change(|s| sort_change = Some(s))
                .on_row_click(|row: &T| events.borrow_mut().push(PageEvent::RowClicked(row.clone())))
                .on_control(|column_id, row: &T| {
                    events.borrow_mut().push(PageEvent::ControlActivated {
                        column_id: column_id.to_string(),
                        row: row.clone(),
                    })
                })
                .on_export(|result| events.borrow_mut().push(PageEvent::Exported(result)));
            view.dispatch(interaction, &mut callbacks);
        }

        if let Some(p) = pagination {
            self.set_pagination(p);
        }
        for change in filter_changes {
            self.set_filter(change)?;
        }
        if let Some(sort) = sort_change {
            self.set_sort(sort)?;
        }
        Ok(events.into_inner())
    }

    /// Exports either the current page or every filtered row.
    pub fn export(&self, scope: ExportScope) -> Result<ExportedFile, TableError> {
        let Some(view) = self.view() else {
            return Err(TableError::NotReady);
        };
        match scope {
            ExportScope::Page => view.export_file(),
            ExportScope::AllRows => {
                let rows: Vec<&T> = self.filtered_rows().iter().collect();
                view.export_rows(&rows).export_file()
            }
        }
    }
}

impl<T> fmt::Debug for TablePage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TablePage")
            .field("columns", &self.columns.len())
            .field("filters", &self.filters)
            .field("sort", &self.sort)
            .field("pagination", &self.pagination)
            .field("paging", &self.paging)
            .field("status", &self.status)
            .field("source_rows", &self.source.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;
    use std::rc::Rc;

    use super::*;
    use crate::column::{CellValue, FilterDescriptor};
    use crate::sort::SortDirection;
    use crate::table::ClickTarget;

    #[derive(Debug, Clone, PartialEq, Serialize)]
    struct Leave {
        id: u32,
        santri: String,
        status: &'static str,
    }

    fn leaves(n: u32) -> Vec<Leave> {
        (0..n)
            .map(|id| Leave {
                id,
                santri: format!("santri {id}"),
                status: if id % 3 == 0 { "approved" } else { "pending" },
            })
            .collect()
    }

    fn columns() -> Vec<ColumnDefinition<Leave>> {
        vec![
            ColumnDefinition::new("id", "Id", |l: &Leave| l.id.into()).sortable(),
            ColumnDefinition::new("santri", "Santri", |l: &Leave| l.santri.as_str().into()),
            ColumnDefinition::new("status", "Status", |l: &Leave| CellValue::from(l.status))
                .filter(FilterDescriptor::select(["approved", "pending"])),
        ]
    }

    fn page(n: u32) -> TablePage<Leave> {
        let mut page = TablePage::new(columns(), PaginationState::try_with_page_size(10).unwrap());
        page.receive(QueryState::ready(leaves(n))).unwrap();
        page
    }

    fn ids(page: &TablePage<Leave>) -> Vec<u32> {
        page.page_rows().iter().map(|l| l.id).collect()
    }

    #[test]
    fn no_view_until_data_arrives() {
        let mut page: TablePage<Leave> = TablePage::new(columns(), PaginationState::default());
        assert!(page.view().is_none());
        page.receive(QueryState::loading()).unwrap();
        assert!(page.is_loading());
        assert!(page.view().is_none());
        page.receive(QueryState::error()).unwrap();
        assert!(page.is_error());
        assert!(page.interact(Interaction::NextPage).unwrap().is_empty());
    }

    #[test]
    fn navigation_goes_through_the_page() {
        let mut page = page(25);
        assert_eq!(page.page_count(), 3);
        page.interact(Interaction::NextPage).unwrap();
        page.interact(Interaction::NextPage).unwrap();
        assert_eq!(ids(&page), vec![20, 21, 22, 23, 24]);
        page.interact(Interaction::NextPage).unwrap();
        assert_eq!(page.pagination().page_index, 2);
    }

    #[test]
    fn new_snapshot_resets_to_first_page() {
        let mut page = page(30);
        page.set_pagination(page.pagination().at_page(2));
        page.receive(QueryState::ready(leaves(5))).unwrap();
        assert_eq!(page.pagination().page_index, 0);
        assert_eq!(page.page_count(), 1);
        assert_eq!(ids(&page), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn filter_change_resets_page_and_recounts() {
        let mut page = page(30);
        page.set_pagination(page.pagination().at_page(2));
        page.interact(Interaction::SetFilter {
            column_id: "status".into(),
            value: "approved".into(),
        })
        .unwrap();
        assert_eq!(page.pagination().page_index, 0);
        assert_eq!(page.total_rows(), 10);
        assert_eq!(page.page_count(), 1);
        assert!(page.page_rows().iter().all(|l| l.status == "approved"));

        page.interact(Interaction::ClearFilters).unwrap();
        assert_eq!(page.total_rows(), 30);
    }

    #[test]
    fn page_size_change_starts_over() {
        let mut page = page(30);
        page.set_pagination(page.pagination().at_page(1));
        page.interact(Interaction::SetPageSize(NonZeroUsize::new(25).unwrap())).unwrap();
        assert_eq!(page.pagination().page_index, 0);
        assert_eq!(page.page_count(), 2);
        assert_eq!(page.page_rows().len(), 25);
    }

    #[test]
    fn sorting_reorders_rows() {
        let mut page = page(12);
        page.interact(Interaction::ToggleSort { column_id: "id".into() }).unwrap();
        page.interact(Interaction::ToggleSort { column_id: "id".into() }).unwrap();
        assert_eq!(page.sort(), Some(&SortState::new("id", SortDirection::Descending)));
        assert_eq!(ids(&page)[..3], [11, 10, 9]);
    }

    #[test]
    fn rejected_filter_and_sort_leave_the_page_usable() {
        let mut page = page(30);
        page.set_filter(FilterChange::Set {
            column_id: "status".into(),
            value: "approved".into(),
        })
        .unwrap();
        let filters = page.filters().clone();

        let result = page.set_filter(FilterChange::Set {
            column_id: "room".into(),
            value: "a".into(),
        });
        assert!(matches!(result, Err(TableError::UnknownColumn(c)) if c == "room"));
        assert_eq!(page.filters(), &filters);

        let result = page.set_sort(Some(SortState::new("room", SortDirection::Ascending)));
        assert!(matches!(result, Err(TableError::UnknownColumn(_))));
        assert_eq!(page.sort(), None);

        page.receive(QueryState::ready(leaves(6))).unwrap();
        assert_eq!(page.total_rows(), 2);
        assert_eq!(ids(&page), vec![0, 3]);

        page.interact(Interaction::ClearFilters).unwrap();
        assert_eq!(page.total_rows(), 6);
    }

    #[test]
    fn row_clicks_come_back_as_events() {
        let mut page = page(3);
        let events = page
            .interact(Interaction::Click { row: 1, target: ClickTarget::Row })
            .unwrap();
        assert!(matches!(&events[..], [PageEvent::RowClicked(l)] if l.id == 1));
    }

    #[test]
    fn observers_see_every_recompute() {
        let mut page = page(25);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        page.subscribe(move |s| sink.borrow_mut().push(s.page_info.page_number));
        page.interact(Interaction::LastPage).unwrap();
        page.interact(Interaction::FirstPage).unwrap();
        assert_eq!(*seen.borrow(), vec![3, 1]);
    }

    #[test]
    fn export_scopes() {
        let mut page = page(25);
        page.interact(Interaction::NextPage).unwrap();
        let events = page.interact(Interaction::Export).unwrap();
        assert!(matches!(&events[..], [PageEvent::Exported(Ok(f))] if f.file_name == "export.xlsx"));

        let all = page.export(ExportScope::AllRows).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = all.save_in(dir.path()).unwrap();
        assert!(path.exists());
    }

    struct Backend {
        rows: Vec<Leave>,
        calls: usize,
    }

    impl DataSource<Leave> for Backend {
        fn fetch(&mut self, request: &PageRequest) -> QueryState<ServerPage<Leave>> {
            self.calls += 1;
            let range = crate::pagination::page_range(self.rows.len(), request.pagination);
            QueryState::ready(ServerPage {
                rows: self.rows[range].to_vec(),
                total: self.rows.len(),
            })
        }
    }

    #[test]
    fn server_paging_fetches_on_change() {
        let mut backend = Backend { rows: leaves(25), calls: 0 };
        let mut page = TablePage::new(columns(), PaginationState::default()).server_paginated();
        assert!(page.view().is_none());
        page.refresh(&mut backend);
        assert_eq!(page.page_count(), 3);
        assert_eq!(page.page_rows().len(), 10);

        page.interact(Interaction::LastPage).unwrap();
        assert!(page.pending_request().is_some());
        page.refresh(&mut backend);
        assert_eq!(ids(&page), vec![20, 21, 22, 23, 24]);
        assert_eq!(backend.calls, 2);

        // the backend shrinks under us
        backend.rows.truncate(4);
        page.set_pagination(page.pagination().at_page(1));
        page.refresh(&mut backend);
        assert_eq!(page.pagination().page_index, 0);
        page.refresh(&mut backend);
        assert_eq!(ids(&page), vec![0, 1, 2, 3]);
    }
}
