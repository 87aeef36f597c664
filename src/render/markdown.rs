//! Markdown rendering of a resolved document.

use std::sync::LazyLock;

use regex::Regex;

use crate::merge::{ResolvedDocument, grid_columns};
use crate::model::{Block, Cell, Image, ListItem, Note, Paragraph, Run, Table, VertAlign};

use super::escape_html;
use super::wrap::wrap_prefixed;

static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n(?:[ \t]*\n){2,}").expect("valid regex"));

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MarkdownOptions {
    /// Wrap column for paragraph text; 0 disables wrapping.
    pub line_width: usize,
    pub include_frontmatter: bool,
    /// Tables with merged cells become HTML `<table>` blocks.
    pub html_tables_for_merges: bool,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self {
            line_width: 98,
            include_frontmatter: false,
            html_tables_for_merges: true,
        }
    }
}

pub fn to_markdown(doc: &ResolvedDocument, options: &MarkdownOptions) -> String {
    MarkdownRenderer::new(options.clone()).render(doc)
}

pub struct MarkdownRenderer {
    options: MarkdownOptions,
}

impl MarkdownRenderer {
    pub fn new(options: MarkdownOptions) -> Self {
        Self { options }
    }

    pub fn render(&self, doc: &ResolvedDocument) -> String {
        let mut output = String::new();
        if self.options.include_frontmatter {
            let frontmatter = doc.doc.metadata.to_yaml_frontmatter();
            if !frontmatter.is_empty() {
                output.push_str(&frontmatter);
                output.push('\n');
            }
        }

        let mut in_list = false;
        for block in &doc.doc.blocks {
            let is_list = matches!(block, Block::ListItem(_));
            if in_list && !is_list {
                output.push('\n');
            }
            in_list = is_list;
            self.render_block(&mut output, block, doc);
        }
        if !doc.doc.notes.is_empty() {
            output.push('\n');
            for note in &doc.doc.notes {
                output.push_str(&note_definition(note));
                output.push_str("\n\n");
            }
        }

        let collapsed = BLANK_LINES.replace_all(&output, "\n\n");
        let trimmed = collapsed.trim();
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("{trimmed}\n")
        }
    }

    fn render_block(&self, output: &mut String, block: &Block, doc: &ResolvedDocument) {
        match block {
            Block::Paragraph(p) => self.render_paragraph(output, p),
            Block::Heading(h) => {
                let text = render_inline(&h.paragraph.runs);
                let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
                if text.is_empty() {
                    return;
                }
                let level = h.level.clamp(1, 6) as usize;
                output.push_str(&"#".repeat(level));
                output.push(' ');
                output.push_str(&text);
                output.push_str("\n\n");
            }
            Block::ListItem(li) => self.render_list_item(output, li),
            Block::Table(t) => self.render_table(output, t, doc),
            Block::Image(img) => {
                output.push_str(&image_markdown(img));
                output.push_str("\n\n");
            }
            Block::PageBreak => {
                if !output.is_empty() && !output.ends_with("\n\n") {
                    output.push('\n');
                }
            }
        }
    }

    fn render_paragraph(&self, output: &mut String, para: &Paragraph) {
        if para.is_blank() {
            return;
        }
        let text = render_inline(&para.runs);
        for line in wrap_prefixed(&text, self.options.line_width, "", "") {
            output.push_str(&line);
            output.push('\n');
        }
        output.push('\n');
    }

    fn render_list_item(&self, output: &mut String, li: &ListItem) {
        let indent = "  ".repeat(li.level as usize);
        let marker = if li.ordered && !li.marker.is_empty() {
            li.marker.as_str()
        } else {
            "-"
        };
        let first = format!("{indent}{marker} ");
        let rest = " ".repeat(first.chars().count());
        let text = render_inline(&li.paragraph.runs);
        for line in wrap_prefixed(&text, self.options.line_width, &first, &rest) {
            output.push_str(line.trim_end());
            output.push('\n');
        }
    }

    fn render_table(&self, output: &mut String, table: &Table, doc: &ResolvedDocument) {
        if table.rows.is_empty() {
            return;
        }
        if self.options.html_tables_for_merges && doc.merges.has_spans(table.id) {
            self.render_table_html(output, table, doc);
        } else {
            self.render_table_pipes(output, table, doc);
        }
    }

    fn render_table_pipes(&self, output: &mut String, table: &Table, doc: &ResolvedDocument) {
        let columns = table.column_count().max(1);
        for (ri, row) in table.rows.iter().enumerate() {
            let mut cells = vec![String::new(); columns];
            for (cell, col) in row.cells.iter().zip(grid_columns(row)) {
                let hidden = doc
                    .merges
                    .cell(table.id, ri, col)
                    .is_some_and(|span| span.hidden);
                if col < columns && !hidden {
                    cells[col] = cell_markdown(cell).replace('|', "\\|");
                }
            }
            output.push('|');
            for content in &cells {
                output.push(' ');
                output.push_str(content);
                output.push_str(" |");
            }
            output.push('\n');
            if ri == 0 {
                output.push('|');
                for _ in 0..columns {
                    output.push_str(" --- |");
                }
                output.push('\n');
            }
        }
        output.push('\n');
    }

    fn render_table_html(&self, output: &mut String, table: &Table, doc: &ResolvedDocument) {
        output.push_str("<table>\n");
        for (ri, row) in table.rows.iter().enumerate() {
            let tag = if row.header { "th" } else { "td" };
            output.push_str("<tr>");
            for (cell, col) in row.cells.iter().zip(grid_columns(row)) {
                let span = doc.merges.cell(table.id, ri, col);
                if span.is_some_and(|s| s.hidden) {
                    continue;
                }
                let mut attrs = String::new();
                if let Some(span) = span {
                    if span.row_span > 1 {
                        attrs.push_str(&format!(" rowspan=\"{}\"", span.row_span));
                    }
                    if span.col_span > 1 {
                        attrs.push_str(&format!(" colspan=\"{}\"", span.col_span));
                    }
                }
                output.push_str(&format!("<{tag}{attrs}>{}</{tag}>", escape_html(&cell.plain_text())));
            }
            output.push_str("</tr>\n");
        }
        output.push_str("</table>\n\n");
    }
}

/// One-line Markdown for a table cell; paragraphs are joined with `<br>`.
fn cell_markdown(cell: &Cell) -> String {
    let parts: Vec<String> = cell
        .blocks
        .iter()
        .filter_map(|block| match block {
            Block::ListItem(li) => {
                let marker = if li.ordered { li.marker.as_str() } else { "-" };
                Some(format!("{marker} {}", render_inline(&li.paragraph.runs)))
            }
            Block::Image(img) => Some(image_markdown(img)),
            Block::Table(nested) => Some(
                nested
                    .rows
                    .iter()
                    .flat_map(|r| r.cells.iter())
                    .map(Cell::plain_text)
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            other => other.paragraph().map(|p| render_inline(&p.runs)),
        })
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|text| !text.is_empty())
        .collect();
    parts.join("<br>")
}

/// `[^label]: text`, with later paragraphs indented under the first.
fn note_definition(note: &Note) -> String {
    let parts: Vec<String> = note
        .blocks
        .iter()
        .filter_map(|block| match block {
            Block::Table(_) | Block::Image(_) => Some(cell_markdown(&Cell {
                blocks: vec![block.clone()],
                ..Cell::default()
            })),
            other => other.paragraph().map(|p| render_inline(&p.runs)),
        })
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|text| !text.is_empty())
        .collect();
    format!("[^{}]: {}", note.reference.label(), parts.join("\n\n    "))
}

fn image_markdown(img: &Image) -> String {
    let alt = img.alt.as_deref().unwrap_or("").replace(['[', ']'], "");
    format!("![{alt}]({})", img.part)
}

#[derive(Clone, Copy, PartialEq, Eq)]
struct Style<'a> {
    bold: bool,
    italic: bool,
    underline: bool,
    strike: bool,
    vert_align: VertAlign,
    link: Option<&'a str>,
}

impl<'a> Style<'a> {
    fn of(run: &'a Run) -> Self {
        Self {
            bold: run.bold,
            italic: run.italic,
            underline: run.underline,
            strike: run.strike,
            vert_align: run.vert_align,
            link: run.link.as_deref(),
        }
    }
}

/// Inline Markdown for a run sequence. Adjacent runs with the same
/// formatting share one set of markers.
pub(crate) fn render_inline(runs: &[Run]) -> String {
    let mut output = String::new();
    let mut segment = String::new();
    let mut current: Option<Style> = None;

    for run in runs {
        if let Some(note) = &run.note {
            if let Some(c) = current.take() {
                output.push_str(&apply_style(&segment, c));
            }
            segment.clear();
            output.push_str(&format!("[^{}]", note.label()));
            continue;
        }
        if run.text.is_empty() {
            continue;
        }
        let style = Style::of(run);
        if current.is_some_and(|c| c != style) {
            if let Some(c) = current {
                output.push_str(&apply_style(&segment, c));
            }
            segment.clear();
        }
        current = Some(style);
        if run.field.is_some() {
            segment.push_str(&run.text);
        } else {
            segment.push_str(&escape_markdown(&run.text));
        }
    }
    if let Some(c) = current {
        output.push_str(&apply_style(&segment, c));
    }
    output
}

fn apply_style(text: &str, style: Style) -> String {
    let core = text.trim();
    if core.is_empty() {
        return text.to_string();
    }
    let lead = &text[..text.len() - text.trim_start().len()];
    let trail = &text[text.trim_end().len()..];

    let mut result = core.to_string();
    if style.strike {
        result = format!("~~{result}~~");
    }
    if style.italic {
        result = format!("*{result}*");
    }
    if style.bold {
        result = format!("**{result}**");
    }
    match style.vert_align {
        VertAlign::Superscript => result = format!("<sup>{result}</sup>"),
        VertAlign::Subscript => result = format!("<sub>{result}</sub>"),
        VertAlign::Baseline => {}
    }
    if style.underline {
        result = format!("<u>{result}</u>");
    }
    if let Some(url) = style.link {
        result = if core == url {
            format!("<{url}>")
        } else {
            format!("[{result}]({url})")
        };
    }
    format!("{lead}{result}{trail}")
}

fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '`' | '*' | '_') {
            result.push('\\');
        }
        result.push(c);
    }
    result
}
