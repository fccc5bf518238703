use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Row as ComfyRow, Table,
};
use serde::Serialize;
use terminal_size::{Width as TermWidth, terminal_size};

use crate::render::{AmountTone, PlacedRow, RowSink, RowView};

use super::{Cli, OutputFormat};

#[derive(Debug, Clone, Serialize)]
pub(super) struct KeyValueRow {
    pub key: String,
    pub value: String,
}

impl KeyValueRow {
    pub fn new(key: &str, value: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            value: value.into(),
        }
    }
}

pub(super) trait TableRow {
    const HEADERS: &'static [&'static str];
    fn cells(&self, cli: &Cli) -> Vec<Cell>;
}

impl TableRow for KeyValueRow {
    const HEADERS: &'static [&'static str] = &["key", "value"];

    fn cells(&self, _cli: &Cli) -> Vec<Cell> {
        vec![Cell::new(&self.key), Cell::new(&self.value)]
    }
}

impl TableRow for RowView {
    const HEADERS: &'static [&'static str] = &["date", "merchant", "amount", "currency", "comment"];

    fn cells(&self, cli: &Cli) -> Vec<Cell> {
        let mut amount = Cell::new(&self.amount.text).set_alignment(CellAlignment::Right);
        if super::should_color(cli) {
            amount = match self.tone {
                AmountTone::Positive => amount.fg(Color::Green),
                AmountTone::Negative => amount.fg(Color::Red),
                AmountTone::Neutral => amount,
            };
        }
        vec![
            Cell::new(&self.date.text),
            Cell::new(&self.merchant.text),
            amount,
            Cell::new(&self.currency.text),
            Cell::new(&self.comment.text),
        ]
    }
}

/// Row sink that collects a render pass so it can be printed as one table.
#[derive(Debug, Default)]
pub(super) struct TableRows {
    pub rows: Vec<PlacedRow>,
}

impl RowSink for TableRows {
    fn clear(&mut self) {
        self.rows.clear();
    }

    fn append(&mut self, rows: &[PlacedRow]) {
        self.rows.extend_from_slice(rows);
    }
}

pub(super) fn terminal_width() -> Option<u16> {
    if let Ok(cols) = std::env::var("COLUMNS")
        && let Ok(v) = cols.parse::<u16>()
    {
        return Some(v);
    }
    terminal_size().map(|(TermWidth(w), _)| w)
}

fn new_table(cli: &Cli, headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::DynamicFullWidth);
    if let Some(w) = terminal_width() {
        table.set_width(w);
    }
    table.set_header(ComfyRow::from(
        headers.iter().map(|h| header_cell(cli, h)).collect::<Vec<_>>(),
    ));
    table
}

/// Prints `rows` as a table, or as pretty JSON with `--output json`.
pub(super) fn render_output<T: Serialize + TableRow>(cli: &Cli, rows: &[T]) -> anyhow::Result<()> {
    match cli.output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(rows)?);
        }
        OutputFormat::Table => print_table(cli, rows),
    }
    Ok(())
}

pub(super) fn print_table<T: TableRow>(cli: &Cli, rows: &[T]) {
    let mut table = new_table(cli, T::HEADERS);
    for row in rows {
        table.add_row(ComfyRow::from(row.cells(cli)));
    }
    println!("{table}");
}

pub(super) fn header_cell(cli: &Cli, text: &str) -> Cell {
    if super::should_color(cli) {
        Cell::new(text)
            .add_attribute(Attribute::Bold)
            .fg(Color::Cyan)
    } else {
        Cell::new(text)
    }
}
