use ratatui::{
    Frame,
    layout::{Constraint, Layout, Position, Rect},
    style::{Color, Modifier, Style, Stylize},
    symbols::border,
    text::{Line, Span, Text},
    widgets::{Block, Cell, Clear, Paragraph, Row, Table, TableState, Wrap},
};

use crate::model::{Model, UIData};

pub const COLUMN_WIDTH_MARGIN: usize = 1;
pub const COLUMN_SPACING: usize = 1;
pub const TABLE_BORDER_WIDTH: usize = 2;
const FILTER_LINE_HEIGHT: u16 = 1;
const STATUS_LINE_HEIGHT: u16 = 1;
const POPUP_WIDTH_PERCENT: u16 = 70;
const POPUP_HEIGHT_PERCENT: u16 = 70;

#[derive(Default)]
pub struct TableUI {
    table_state: TableState,
}

impl TableUI {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draw(&mut self, model: &Model, frame: &mut Frame) {
        let uidata = model.get_uidata();
        let [filter_area, table_area, status_area] = Layout::vertical([
            Constraint::Length(FILTER_LINE_HEIGHT),
            Constraint::Min(3),
            Constraint::Length(STATUS_LINE_HEIGHT),
        ])
        .areas(frame.area());

        frame.render_widget(filter_line(uidata), filter_area);
        self.render_table(uidata, frame, table_area);
        render_status_line(uidata, frame, status_area);

        if uidata.show_popup {
            render_popup(uidata, frame);
        }
    }

    fn render_table(&mut self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let title = Line::from(format!(" {} ", uidata.name).bold());
        let page_line = Line::from(vec![
            format!(" {} ", uidata.page_info.as_string()).into(),
            format!("· {} per page ", uidata.page_size).dark_gray(),
        ]);
        let block = Block::bordered()
            .title(title.centered())
            .title_bottom(page_line.right_aligned())
            .border_set(border::THICK);

        if uidata.loading {
            frame.render_widget(Paragraph::new("Loading ...").centered().block(block), area);
            return;
        }
        if uidata.table.is_empty() || uidata.page_info.total == 0 {
            frame.render_widget(Paragraph::new("No rows").centered().block(block), area);
            return;
        }

        let header = Row::new(uidata.table.iter().enumerate().map(|(cidx, column)| {
            let style = if cidx == uidata.selected_column {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default().add_modifier(Modifier::BOLD)
            };
            Cell::from(Span::styled(column.name.clone(), style))
        }));

        let nrows = uidata.table[0].data.len();
        let rows = (0..nrows).map(|ridx| {
            Row::new(uidata.table.iter().map(|column| {
                let value = column.data.get(ridx).cloned().unwrap_or_default();
                if column.is_control {
                    Cell::from(Span::styled(value, Style::default().fg(Color::Cyan)))
                } else {
                    Cell::from(value)
                }
            }))
        });
        let widths = uidata
            .table
            .iter()
            .map(|column| Constraint::Length(column.width as u16));

        let table = Table::new(rows, widths)
            .header(header)
            .block(block)
            .column_spacing(COLUMN_SPACING as u16)
            .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED))
            .cell_highlight_style(Style::default().fg(Color::Yellow));

        self.table_state.select(uidata.selected_row);
        self.table_state.select_column(Some(uidata.selected_column));
        frame.render_stateful_widget(table, area, &mut self.table_state);
    }
}

fn filter_line(uidata: &UIData) -> Paragraph<'static> {
    if uidata.filter_line.is_empty() {
        return Paragraph::new(Line::from(" no filters".dark_gray()));
    }
    Paragraph::new(Line::from(vec![
        " filters: ".dark_gray(),
        uidata.filter_line.clone().yellow(),
    ]))
}

fn render_status_line(uidata: &UIData, frame: &mut Frame, area: Rect) {
    if uidata.input_mode.is_some() {
        let label = uidata.input_label.clone();
        let offset = label.chars().count() + uidata.input.curser_pos;
        let line = Line::from(vec![label.blue().bold(), uidata.input.input.clone().into()]);
        frame.render_widget(Paragraph::new(line), area);
        frame.set_cursor_position(Position::new(area.x + offset as u16, area.y));
        return;
    }
    let line = Line::from(vec![
        format!(" {}", uidata.status_message).into(),
        "  ? help ".dark_gray(),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn render_popup(uidata: &UIData, frame: &mut Frame) {
    let area = popup_area(frame.area(), POPUP_WIDTH_PERCENT, POPUP_HEIGHT_PERCENT);
    let block = Block::bordered()
        .title(Line::from(uidata.popup_title.clone().bold()).centered())
        .title_bottom(Line::from(" <Esc> close ".blue()).centered())
        .border_set(border::THICK);
    let text = Text::from(uidata.popup_message.clone());
    frame.render_widget(Clear, area);
    frame.render_widget(Paragraph::new(text).wrap(Wrap { trim: false }).block(block), area);
}

fn popup_area(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let [area] = Layout::vertical([Constraint::Percentage(percent_y)])
        .flex(ratatui::layout::Flex::Center)
        .areas(area);
    let [area] = Layout::horizontal([Constraint::Percentage(percent_x)])
        .flex(ratatui::layout::Flex::Center)
        .areas(area);
    area
}
