use std::num::NonZeroUsize;
use std::time::Instant;

use arboard::Clipboard;
use ratatui::crossterm::event::{KeyCode, KeyEvent};
use tracing::{debug, error, info, trace};

use crate::column::{CellControl, CellValue, ColumnDefinition, FilterDescriptor, SelectOption};
use crate::domain::{HELP_TEXT, InputMode, Message, TableError, ViewerConfig};
use crate::export::{ExportOptions, ExportedFile, XlsxExporter};
use crate::inputter::{InputResult, Inputter};
use crate::page::{ExportScope, PageEvent, TablePage};
use crate::pagination::{PageInfo, PaginationState};
use crate::source::{Dataset, FileSource, QueryState, Record};
use crate::sort::{SortDirection, SortState};
use crate::table::{ClickTarget, FilterInput, Interaction};
use crate::ui::{COLUMN_SPACING, COLUMN_WIDTH_MARGIN, TABLE_BORDER_WIDTH};

/// Id of the trailing column holding the copy control.
pub const COPY_COLUMN: &str = "copy";
const COPY_LABEL: &str = "⧉";

const PAGE_SIZES: [usize; 6] = [5, 10, 25, 50, 100, 250];

#[derive(Debug, PartialEq)]
pub enum Status {
    Ready,
    Quitting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Modus {
    Table,
    Record,
    Popup,
    Input,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnView {
    pub name: String,
    pub width: usize,
    pub data: Vec<String>,
    pub is_control: bool,
}

/// Everything the ui needs for one frame.
#[derive(Debug, Clone)]
pub struct UIData {
    pub name: String,
    pub table: Vec<ColumnView>,
    pub filter_line: String,
    pub selected_row: Option<usize>,
    pub selected_column: usize,
    pub page_info: PageInfo,
    pub page_size: usize,
    pub loading: bool,
    pub show_popup: bool,
    pub popup_title: String,
    pub popup_message: String,
    pub input: InputResult,
    pub input_mode: Option<InputMode>,
    pub input_label: String,
    pub status_message: String,
    pub last_update: Instant,
}

impl UIData {
    fn empty() -> Self {
        UIData {
            name: String::new(),
            table: Vec::new(),
            filter_line: String::new(),
            selected_row: None,
            selected_column: 0,
            page_info: PageInfo::new(0, 0, PaginationState::default()),
            page_size: 0,
            loading: false,
            show_popup: false,
            popup_title: String::new(),
            popup_message: String::new(),
            input: InputResult::default(),
            input_mode: None,
            input_label: String::new(),
            status_message: String::new(),
            last_update: Instant::now(),
        }
    }
}

/// Filter being edited on one column.
struct FilterEdit {
    column_id: String,
    options: Vec<SelectOption>,
    option_idx: Option<usize>,
}

pub struct Model {
    config: ViewerConfig,
    pub status: Status,
    modus: Modus,
    previous_modus: Modus,
    name: String,
    page: TablePage<Record>,
    source: Option<FileSource>,
    curser_row: usize,
    curser_column: usize,
    offset_column: usize,
    width: usize,
    height: usize,
    input: Inputter,
    last_input: InputResult,
    filter_edit: Option<FilterEdit>,
    popup_title: String,
    popup_message: String,
    clipboard: Option<Clipboard>,
    status_message: String,
    uidata: UIData,
}

fn copy_column() -> ColumnDefinition<Record> {
    ColumnDefinition::new(COPY_COLUMN, "", |_: &Record| CellValue::Empty)
        .control(CellControl::new(|_: &Record| COPY_LABEL.to_string()))
}

impl Model {
    pub fn init(config: &ViewerConfig, dataset: Dataset, ui_width: usize, ui_height: usize) -> Result<Self, TableError> {
        let start_time = Instant::now();
        let name = dataset.name.clone();
        let data_columns = dataset.column_definitions(config.select_threshold);
        let mut columns = data_columns.clone();
        columns.push(copy_column());

        let export = ExportOptions::new(config.export_name.clone().unwrap_or_else(|| name.clone()))
            .with_sheet_name(config.sheet_name.clone())
            .with_skip_controls(true);
        let pagination = PaginationState::try_with_page_size(config.page_size)?;
        let mut page = TablePage::new(columns, pagination).with_export(Box::new(XlsxExporter), export);
        page.subscribe(|snapshot| trace!("Page now shows {}", snapshot.page_info.as_string()));

        let rows = dataset.rows.len();
        let source = if config.server_paging {
            page = page.server_paginated();
            Some(FileSource::new(dataset, data_columns))
        } else {
            page.receive(QueryState::ready(dataset.rows))?;
            None
        };

        let mut model = Self {
            config: config.clone(),
            status: Status::Ready,
            modus: Modus::Table,
            previous_modus: Modus::Table,
            name,
            page,
            source,
            curser_row: 0,
            curser_column: 0,
            offset_column: 0,
            width: ui_width,
            height: ui_height,
            input: Inputter::default(),
            last_input: InputResult::default(),
            filter_edit: None,
            popup_title: String::new(),
            popup_message: String::new(),
            clipboard: None,
            status_message: String::new(),
            uidata: UIData::empty(),
        };
        model.fetch_pending();
        model.set_status_message(format!(
            "Loaded {rows} rows in {}ms, ? for help",
            start_time.elapsed().as_millis()
        ));
        model.update_uidata();
        Ok(model)
    }

    pub fn get_uidata(&self) -> &UIData {
        &self.uidata
    }

    pub fn page(&self) -> &TablePage<Record> {
        &self.page
    }

    pub fn raw_keyevents(&self) -> bool {
        self.modus == Modus::Input
    }

    pub fn quit(&mut self) {
        self.status = Status::Quitting;
    }

    pub fn update(&mut self, message: Option<Message>) -> Result<(), TableError> {
        let Some(msg) = message else {
            return Ok(());
        };
        trace!("Update: Modus {:?}, Message {:?}", self.modus, msg);
        match self.modus {
            Modus::Table => match msg {
                Message::Quit => self.quit(),
                Message::MoveUp => self.curser_row = self.curser_row.saturating_sub(1),
                Message::MoveDown => self.move_down(),
                Message::MoveLeft => self.curser_column = self.curser_column.saturating_sub(1),
                Message::MoveRight => self.move_right(),
                Message::NextPage => self.navigate(Interaction::NextPage)?,
                Message::PreviousPage => self.navigate(Interaction::PreviousPage)?,
                Message::FirstPage => self.navigate(Interaction::FirstPage)?,
                Message::LastPage => self.navigate(Interaction::LastPage)?,
                Message::GrowPageSize => self.step_page_size(true)?,
                Message::ShrinkPageSize => self.step_page_size(false)?,
                Message::Filter => self.start_filter(),
                Message::ClearFilters => {
                    self.navigate(Interaction::ClearFilters)?;
                    self.set_status_message("Cleared all filters");
                }
                Message::SortAscending => self.sort_current_column(SortDirection::Ascending)?,
                Message::SortDescending => self.sort_current_column(SortDirection::Descending)?,
                Message::Enter => self.click_current_cell()?,
                Message::CopyRow => self.click_copy_control()?,
                Message::ExportPage => self.export_page()?,
                Message::ExportAll => self.export_all(),
                Message::Help => self.show_popup(" Help ", HELP_TEXT),
                Message::Resize(width, height) => self.ui_resize(width, height),
                _ => (),
            },
            Modus::Record | Modus::Popup => match msg {
                Message::Quit => self.quit(),
                Message::Exit | Message::Enter => self.exit(),
                Message::Resize(width, height) => self.ui_resize(width, height),
                _ => (),
            },
            Modus::Input => {
                if let Message::RawKey(key) = msg {
                    self.raw_input(key)?;
                }
            }
        }
        self.fetch_pending();
        self.update_uidata();
        Ok(())
    }

    // -------------------- Control handling functions ---------------------- //

    fn fetch_pending(&mut self) {
        let Some(source) = self.source.as_mut() else {
            return;
        };
        // a vanished page triggers one more request for the first page
        while self.page.pending_request().is_some() {
            self.page.refresh(source);
        }
        if self.page.is_error() {
            self.set_status_message("Fetching the page failed, see the log");
        }
    }

    fn run(&mut self, interaction: Interaction) -> Result<(), TableError> {
        let events = self.page.interact(interaction)?;
        for event in events {
            self.handle_page_event(event);
        }
        Ok(())
    }

    /// Runs an interaction that changes which rows are shown.
    fn navigate(&mut self, interaction: Interaction) -> Result<(), TableError> {
        let before = self.page.pagination();
        self.run(interaction)?;
        if self.page.pagination() != before {
            self.curser_row = 0;
        }
        self.fetch_pending();
        self.clamp_cursor();
        Ok(())
    }

    fn handle_page_event(&mut self, event: PageEvent<Record>) {
        match event {
            PageEvent::RowClicked(record) => self.show_record(&record),
            PageEvent::ControlActivated { column_id, row } if column_id == COPY_COLUMN => self.copy_row(&row),
            PageEvent::ControlActivated { column_id, .. } => debug!("No handler for control in {column_id}"),
            PageEvent::Exported(Ok(file)) => self.save_export(file),
            PageEvent::Exported(Err(e)) => {
                error!("Export failed: {e}");
                self.set_status_message(format!("Export failed: {e}"));
            }
        }
    }

    fn move_down(&mut self) {
        let rows = self.page.page_rows().len();
        if self.curser_row + 1 < rows {
            self.curser_row += 1;
        }
    }

    fn move_right(&mut self) {
        if self.curser_column + 1 < self.page.columns().len() {
            self.curser_column += 1;
        }
    }

    fn clamp_cursor(&mut self) {
        let rows = self.page.page_rows().len();
        self.curser_row = self.curser_row.min(rows.saturating_sub(1));
    }

    fn step_page_size(&mut self, grow: bool) -> Result<(), TableError> {
        let current = self.page.pagination().size();
        let next = if grow {
            PAGE_SIZES.iter().copied().find(|&s| s > current)
        } else {
            PAGE_SIZES.iter().rev().copied().find(|&s| s < current)
        };
        let Some(size) = next.and_then(NonZeroUsize::new) else {
            return Ok(());
        };
        self.navigate(Interaction::SetPageSize(size))?;
        self.set_status_message(format!("Showing {size} rows per page"));
        Ok(())
    }

    fn current_column(&self) -> Option<&ColumnDefinition<Record>> {
        self.page.columns().get(self.curser_column)
    }

    fn sort_current_column(&mut self, direction: SortDirection) -> Result<(), TableError> {
        let Some((column_id, sortable)) = self.current_column().map(|c| (c.id.clone(), c.sortable)) else {
            return Ok(());
        };
        if !sortable {
            self.set_status_message("This column can not be sorted");
            return Ok(());
        }
        let sort = SortState::new(column_id, direction);
        if self.page.sort() == Some(&sort) {
            self.page.set_sort(None)?;
            self.set_status_message("Sorting removed");
        } else {
            self.set_status_message(format!("Sorted by {}", sort.column_id));
            self.page.set_sort(Some(sort))?;
        }
        self.curser_row = 0;
        self.fetch_pending();
        Ok(())
    }

    fn click_current_cell(&mut self) -> Result<(), TableError> {
        if self.page.page_rows().is_empty() {
            return Ok(());
        }
        let is_control = self.current_column().is_some_and(|c| c.control.is_some());
        let target = if is_control {
            ClickTarget::Control(self.curser_column)
        } else {
            ClickTarget::Cell(self.curser_column)
        };
        self.run(Interaction::Click {
            row: self.curser_row,
            target,
        })
    }

    fn click_copy_control(&mut self) -> Result<(), TableError> {
        if self.page.page_rows().is_empty() {
            return Ok(());
        }
        let Some(idx) = self.page.columns().iter().position(|c| c.id == COPY_COLUMN) else {
            return Ok(());
        };
        self.run(Interaction::Click {
            row: self.curser_row,
            target: ClickTarget::Control(idx),
        })
    }

    fn copy_row(&mut self, record: &Record) {
        let content = record.to_csv_line();
        trace!("Row content: {}", content);
        if self.clipboard.is_none() {
            match Clipboard::new() {
                Ok(clipboard) => self.clipboard = Some(clipboard),
                Err(e) => {
                    debug!("Clipboard not available: {e:?}");
                    self.set_status_message("Clipboard not available");
                    return;
                }
            }
        }
        if let Some(clipboard) = self.clipboard.as_mut() {
            match clipboard.set_text(content) {
                Ok(_) => self.set_status_message("Copied row to clipboard"),
                Err(e) => {
                    error!("Error copying to clipboard: {:?}", e);
                    self.set_status_message("Copying to the clipboard failed");
                }
            }
        }
    }

    fn export_page(&mut self) -> Result<(), TableError> {
        self.run(Interaction::Export)
    }

    fn export_all(&mut self) {
        match self.page.export(ExportScope::AllRows) {
            Ok(file) => self.save_export(file),
            Err(e) => {
                error!("Export failed: {e}");
                self.set_status_message(format!("Export failed: {e}"));
            }
        }
    }

    fn save_export(&mut self, file: ExportedFile) {
        match file.save_in(&self.config.export_dir) {
            Ok(path) => {
                info!("Exported {} bytes to {}", file.bytes.len(), path.display());
                self.set_status_message(format!("Exported to {}", path.display()));
            }
            Err(e) => {
                error!("Saving export failed: {e}");
                self.set_status_message(format!("Saving export failed: {e}"));
            }
        }
    }

    fn show_record(&mut self, record: &Record) {
        let header_width = record.iter().map(|(name, _)| name.chars().count()).max().unwrap_or(0);
        let header_width = header_width.min(self.config.max_column_width);
        let lines: Vec<String> = record
            .iter()
            .map(|(name, value)| {
                let name: String = name.chars().take(header_width).collect();
                format!(" {name:<header_width$}  {}", value.display())
            })
            .collect();
        self.popup_title = format!(" Row {} ", self.page.pagination().offset() + self.curser_row + 1);
        self.popup_message = lines.join("\n");
        self.previous_modus = self.modus;
        self.modus = Modus::Record;
    }

    fn show_popup(&mut self, title: &str, message: &str) {
        self.popup_title = title.to_string();
        self.popup_message = message.to_string();
        self.previous_modus = self.modus;
        self.modus = Modus::Popup;
    }

    fn exit(&mut self) {
        trace!("Close popup ...");
        self.modus = Modus::Table;
        self.previous_modus = Modus::Popup;
    }

    fn start_filter(&mut self) {
        let Some(column) = self.current_column() else {
            return;
        };
        let column_id = column.id.clone();
        let descriptor = self
            .page
            .view()
            .and_then(|view| view.filter_descriptor(&self.page.columns()[self.curser_column]).cloned());
        let options = match descriptor {
            Some(FilterDescriptor::Select(options)) => options,
            Some(FilterDescriptor::Text) => Vec::new(),
            None => {
                self.set_status_message("This column can not be filtered");
                return;
            }
        };
        let current = self.page.filters().get(&column_id).unwrap_or_default().to_string();
        trace!("Editing filter on {column_id}");
        self.input.clear();
        self.input.set(&current);
        self.last_input = self.input.get();
        self.filter_edit = Some(FilterEdit {
            option_idx: options.iter().position(|o| o.value == current),
            column_id,
            options,
        });
        self.previous_modus = self.modus;
        self.modus = Modus::Input;
    }

    fn raw_input(&mut self, key: KeyEvent) -> Result<(), TableError> {
        if key.code == KeyCode::Tab {
            self.cycle_option();
            return Ok(());
        }
        self.last_input = self.input.read(key);
        if self.last_input.finished {
            self.finish_filter()?;
        }
        Ok(())
    }

    fn cycle_option(&mut self) {
        let Some(edit) = self.filter_edit.as_mut() else {
            return;
        };
        if edit.options.is_empty() {
            return;
        }
        let next = edit.option_idx.map(|i| (i + 1) % edit.options.len()).unwrap_or(0);
        edit.option_idx = Some(next);
        let value = edit.options[next].value.clone();
        self.input.set(&value);
        self.last_input = self.input.get();
    }

    fn finish_filter(&mut self) -> Result<(), TableError> {
        self.modus = self.previous_modus;
        self.previous_modus = Modus::Input;
        let Some(edit) = self.filter_edit.take() else {
            return Ok(());
        };
        if self.last_input.canceled {
            self.set_status_message("Filter unchanged");
            return Ok(());
        }
        let value = self.last_input.input.trim().to_string();
        let start_time = Instant::now();
        self.navigate(Interaction::SetFilter {
            column_id: edit.column_id.clone(),
            value,
        })?;
        self.curser_row = 0;
        trace!("Filtering took {}ms", start_time.elapsed().as_millis());
        self.set_status_message(format!("{} matching rows", self.page.total_rows()));
        Ok(())
    }

    fn ui_resize(&mut self, width: usize, height: usize) {
        trace!("UI was resized! w:{}->{}, h:{}->{}", self.width, width, self.height, height);
        self.width = width;
        self.height = height;
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.uidata.status_message = self.status_message.clone();
        self.uidata.last_update = Instant::now();
    }

    // -------------------- View building ---------------------- //

    fn column_views(&self) -> Vec<ColumnView> {
        let Some(view) = self.page.view() else {
            return Vec::new();
        };
        let rendered = view.render();
        rendered
            .headers
            .into_iter()
            .enumerate()
            .map(|(cidx, name)| {
                let data: Vec<String> = rendered
                    .rows
                    .iter()
                    .map(|row| row[cidx].text().replace("\r\n", " ↵ ").replace('\n', " ↵ "))
                    .collect();
                let is_control = self.page.columns()[cidx].control.is_some();
                let content_width = data
                    .iter()
                    .map(|d| d.chars().count())
                    .chain(std::iter::once(name.chars().count()))
                    .max()
                    .unwrap_or(0);
                ColumnView {
                    width: (content_width + COLUMN_WIDTH_MARGIN).min(self.config.max_column_width),
                    name,
                    data,
                    is_control,
                }
            })
            .collect()
    }

    /// Moves the column offset so the cursor column is on screen and
    /// returns the columns that fit.
    fn visible_columns(&mut self, columns: Vec<ColumnView>) -> Vec<ColumnView> {
        let available = self.width.saturating_sub(TABLE_BORDER_WIDTH);
        self.curser_column = self.curser_column.min(columns.len().saturating_sub(1));
        self.offset_column = self.offset_column.min(self.curser_column);
        let fits = |from: usize, to: usize| {
            columns[from..=to].iter().map(|c| c.width + COLUMN_SPACING).sum::<usize>() <= available
        };
        while self.offset_column < self.curser_column && !fits(self.offset_column, self.curser_column) {
            self.offset_column += 1;
        }

        let mut used = 0;
        let mut visible = Vec::new();
        for column in columns.into_iter().skip(self.offset_column) {
            if !visible.is_empty() && used + column.width > available {
                break;
            }
            used += column.width + COLUMN_SPACING;
            visible.push(column);
        }
        visible
    }

    fn filter_line(&self) -> String {
        let Some(view) = self.page.view() else {
            return String::new();
        };
        view.filter_inputs()
            .into_iter()
            .filter_map(|input| match input {
                FilterInput::Text { column_id, value } if !value.is_empty() => Some(format!("{column_id} ~ {value}")),
                FilterInput::Select {
                    column_id,
                    selected: Some(value),
                    ..
                } => Some(format!("{column_id} = {value}")),
                _ => None,
            })
            .collect::<Vec<String>>()
            .join("  ")
    }

    fn update_uidata(&mut self) {
        let columns = self.column_views();
        let table = self.visible_columns(columns);
        let rows = self.page.page_rows().len();
        let input_label = self
            .filter_edit
            .as_ref()
            .map(|edit| {
                if edit.options.is_empty() {
                    format!("filter {}: ", edit.column_id)
                } else {
                    format!("filter {} (Tab): ", edit.column_id)
                }
            })
            .unwrap_or_default();
        let loading = self.page.is_loading();

        self.uidata = UIData {
            name: self.name.clone(),
            table,
            filter_line: self.filter_line(),
            selected_row: (rows > 0).then_some(self.curser_row),
            selected_column: self.curser_column - self.offset_column,
            page_info: self.page.page_info(),
            page_size: self.page.pagination().size(),
            loading,
            show_popup: matches!(self.modus, Modus::Record | Modus::Popup),
            popup_title: self.popup_title.clone(),
            popup_message: self.popup_message.clone(),
            input: self.last_input.clone(),
            input_mode: (self.modus == Modus::Input).then_some(InputMode::Filter),
            input_label,
            status_message: self.status_message.clone(),
            last_update: Instant::now(),
        };
    }
}
