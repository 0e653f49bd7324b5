//! Markdown tables and bullet lists, grouped by the heading they sit under

use std::collections::BTreeMap;

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

/// One body row of a table, keyed by header text
pub type TableRow = BTreeMap<String, String>;

/// Content found between one heading and the next
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Section {
    /// Plain text of the heading; empty for content before the first heading
    pub heading: String,
    pub tables: Vec<Vec<TableRow>>,
    /// Text of every list item, nested items included
    pub items: Vec<String>,
}

#[derive(Default)]
struct TableState {
    header: Vec<String>,
    row: Vec<String>,
    cell: Option<String>,
    rows: Vec<TableRow>,
}

impl TableState {
    fn finish_row(&mut self) {
        let cells = std::mem::take(&mut self.row);
        let row: TableRow = self
            .header
            .iter()
            .zip(cells)
            .filter(|(header, _)| !header.is_empty())
            .map(|(header, cell)| (header.clone(), cell))
            .collect();
        if row.values().any(|cell| !cell.is_empty()) {
            self.rows.push(row);
        }
    }
}

/// Split a markdown body into heading sections with their tables and list items
pub fn parse_sections(markdown: &str) -> Vec<Section> {
    let mut sections = vec![Section::default()];
    let mut heading: Option<String> = None;
    let mut table = TableState::default();
    let mut items: Vec<String> = Vec::new();

    for event in Parser::new_ext(markdown, Options::ENABLE_TABLES) {
        match event {
            Event::Start(Tag::Heading { .. }) => heading = Some(String::new()),
            Event::End(TagEnd::Heading(_)) => {
                let text = heading.take().unwrap_or_default();
                sections.push(Section {
                    heading: text.trim().to_string(),
                    ..Section::default()
                });
            }
            Event::Start(Tag::Table(_)) => table = TableState::default(),
            Event::Start(Tag::TableHead) | Event::Start(Tag::TableRow) => table.row.clear(),
            Event::End(TagEnd::TableHead) => table.header = std::mem::take(&mut table.row),
            Event::End(TagEnd::TableRow) => table.finish_row(),
            Event::Start(Tag::TableCell) => table.cell = Some(String::new()),
            Event::End(TagEnd::TableCell) => {
                let cell = table.cell.take().unwrap_or_default();
                table.row.push(cell.trim().to_string());
            }
            Event::End(TagEnd::Table) => {
                let rows = std::mem::take(&mut table.rows);
                if !rows.is_empty() {
                    if let Some(section) = sections.last_mut() {
                        section.tables.push(rows);
                    }
                }
            }
            Event::Start(Tag::Item) => items.push(String::new()),
            Event::End(TagEnd::Item) => {
                let text = items.pop().unwrap_or_default();
                let text = text.trim();
                if !text.is_empty() {
                    if let Some(section) = sections.last_mut() {
                        section.items.push(text.to_string());
                    }
                }
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some(cell) = table.cell.as_mut() {
                    cell.push_str(&text);
                } else if let Some(heading) = heading.as_mut() {
                    heading.push_str(&text);
                } else if let Some(item) = items.last_mut() {
                    item.push_str(&text);
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                if let Some(item) = items.last_mut() {
                    item.push(' ');
                }
            }
            _ => {}
        }
    }

    sections
}

/// Rows of the first table in the document
pub fn first_table(markdown: &str) -> Vec<TableRow> {
    parse_sections(markdown)
        .into_iter()
        .flat_map(|section| section.tables)
        .next()
        .unwrap_or_default()
}

/// Value of the first listed header present in `row` with a non-empty cell
pub fn cell<'a>(row: &'a TableRow, headers: &[&str]) -> &'a str {
    headers
        .iter()
        .filter_map(|header| row.get(*header))
        .map(String::as_str)
        .find(|value| !value.is_empty())
        .unwrap_or_default()
}
