//! Pagination and HTML page fragments.
//!
//! Heights are estimates in twips: lines of `0.5 × font size` wide glyphs,
//! each `1.2 × font size` tall, plus paragraph spacing.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::merge::{MergeMap, ResolvedDocument, grid_columns};
use crate::model::{
    Alignment, Block, FieldKind, HeaderFooterInfo, Image, LineSpacing, Note, PageClass,
    PageGeometry, Paragraph, ParsedDocument, Run, Table, VertAlign,
};
use crate::units::{self, TargetUnit, Unit};

use super::escape_html;
use super::style::StyleContext;

/// 11pt.
const DEFAULT_FONT_SIZE: f64 = 220.0;
const GLYPH_WIDTH: f64 = 0.5;
const LINE_FACTOR: f64 = 1.2;
const LIST_INDENT: f64 = 360.0;
const CELL_PADDING: f64 = 80.0;
const HEADING_SCALE: [f64; 6] = [2.0, 1.6, 1.4, 1.2, 1.1, 1.0];

#[derive(Clone, Debug, PartialEq)]
pub struct Page {
    /// 1-indexed.
    pub number: usize,
    pub geometry: PageGeometry,
    pub header: Option<PageClass>,
    pub footer: Option<PageClass>,
    /// Indices into the document's top-level blocks.
    pub blocks: Vec<usize>,
    pub used_height: f64,
}

impl Page {
    fn new(number: usize, geometry: PageGeometry, doc: &ParsedDocument) -> Self {
        Self {
            number,
            geometry,
            header: doc.headers.class_for_page(number),
            footer: doc.footers.class_for_page(number),
            blocks: Vec::new(),
            used_height: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn capacity(&self) -> f64 {
        self.geometry.content_height(self.number)
    }
}

impl PageGeometry {
    /// The geometry declared by the document, or US Letter.
    pub fn for_document(doc: &ParsedDocument) -> Self {
        doc.page.unwrap_or_default()
    }
}

fn line_height(p: &Paragraph, size: f64) -> f64 {
    match p.spacing.line {
        LineSpacing::Auto(multiple) => LINE_FACTOR * size * multiple,
        LineSpacing::Exact(v) => v,
        LineSpacing::AtLeast(v) => v.max(LINE_FACTOR * size),
    }
}

fn paragraph_height(p: &Paragraph, width: f64, default_size: f64) -> f64 {
    let size = p.font_size().unwrap_or(default_size);
    let usable = (width - p.indent.left - p.indent.right)
        .max(width * 0.25)
        .max(1.0);
    let lines: f64 = p
        .plain_text()
        .split('\n')
        .map(|segment| {
            let text_width = segment.chars().count() as f64 * GLYPH_WIDTH * size;
            (text_width / usable).ceil().max(1.0)
        })
        .sum();
    lines * line_height(p, size) + p.spacing.before + p.spacing.after
}

fn column_width(table: &Table, col: usize, span: usize, width: f64) -> f64 {
    if col + span <= table.grid.len() {
        let sum: f64 = table.grid[col..col + span].iter().sum();
        if sum > 0.0 {
            return sum;
        }
    }
    width / table.column_count().max(1) as f64 * span as f64
}

fn table_height(table: &Table, width: f64, merges: &MergeMap) -> f64 {
    table
        .rows
        .iter()
        .enumerate()
        .map(|(ri, row)| {
            let content = row
                .cells
                .iter()
                .zip(grid_columns(row))
                .filter(|(_, col)| !merges.cell(table.id, ri, *col).is_some_and(|s| s.hidden))
                .map(|(cell, col)| {
                    let cell_width = column_width(table, col, cell.col_span.max(1) as usize, width);
                    cell.blocks
                        .iter()
                        .map(|b| block_height(b, cell_width, merges))
                        .sum::<f64>()
                })
                .fold(0.0, f64::max);
            (content + CELL_PADDING).max(row.height.unwrap_or(0.0))
        })
        .sum()
}

/// Estimated height of `block` laid out `width` twips wide.
pub fn block_height(block: &Block, width: f64, merges: &MergeMap) -> f64 {
    match block {
        Block::Paragraph(p) => paragraph_height(p, width, DEFAULT_FONT_SIZE),
        Block::Heading(h) => {
            let scale = HEADING_SCALE[(h.level.clamp(1, 6) - 1) as usize];
            paragraph_height(&h.paragraph, width, DEFAULT_FONT_SIZE * scale)
        }
        Block::ListItem(li) => {
            let indent = (li.level as f64 + 1.0) * LIST_INDENT;
            paragraph_height(&li.paragraph, (width - indent).max(1.0), DEFAULT_FONT_SIZE)
        }
        Block::Table(t) => table_height(t, width, merges),
        Block::Image(img) => img.height,
        Block::PageBreak => 0.0,
    }
}

/// Places blocks greedily onto pages. A `PageBreak` always starts a new page;
/// a block taller than a whole page gets a page to itself. Never returns
/// an empty vector.
pub fn layout(doc: &ResolvedDocument, geometry: &PageGeometry) -> Vec<Page> {
    let width = geometry.content_width();
    let mut pages = Vec::new();
    let mut current = Page::new(1, *geometry, &doc.doc);

    for (index, block) in doc.doc.blocks.iter().enumerate() {
        if matches!(block, Block::PageBreak) {
            let next = Page::new(current.number + 1, *geometry, &doc.doc);
            pages.push(std::mem::replace(&mut current, next));
            continue;
        }
        let height = block_height(block, width, &doc.merges);
        if height > current.capacity() - current.used_height && !current.is_empty() {
            let next = Page::new(current.number + 1, *geometry, &doc.doc);
            pages.push(std::mem::replace(&mut current, next));
        }
        if height > current.capacity() {
            log::debug!("block {index} is taller than page {}", current.number);
        }
        current.blocks.push(index);
        current.used_height += height;
    }
    pages.push(current);
    log::info!("laid out {} blocks on {} pages", doc.doc.blocks.len(), pages.len());
    pages
}

fn pt(twips: f64) -> String {
    let points = units::convert(twips, Unit::Twip, TargetUnit::Points);
    format!("{}", (points * 100.0).round() / 100.0)
}

fn variant_name(class: PageClass) -> &'static str {
    match class {
        PageClass::First => "first",
        PageClass::Even => "even",
        PageClass::Odd => "odd",
        PageClass::Default => "default",
    }
}

/// Writes blocks as HTML with page-number fields filled in.
struct HtmlWriter<'d> {
    merges: &'d MergeMap,
    page: usize,
    total: usize,
}

impl HtmlWriter<'_> {
    fn run_text(&self, run: &Run) -> String {
        if run.is_page_placeholder() {
            return self.page.to_string();
        }
        let page_count = run
            .field
            .as_ref()
            .is_some_and(|f| f.kind == FieldKind::NumPages && f.result.is_none());
        if page_count {
            return self.total.to_string();
        }
        run.text.clone()
    }

    fn inline(&self, runs: &[Run], out: &mut String) {
        for run in runs {
            if let Some(note) = &run.note {
                out.push_str(&format!(
                    "<sup class=\"docxview-note-ref\">{}</sup>",
                    escape_html(&note.label())
                ));
                continue;
            }
            let text = self.run_text(run);
            if text.is_empty() {
                continue;
            }
            let mut html = escape_html(&text).replace('\n', "<br>");
            if run.bold {
                html = format!("<strong>{html}</strong>");
            }
            if run.italic {
                html = format!("<em>{html}</em>");
            }
            if run.underline {
                html = format!("<u>{html}</u>");
            }
            if run.strike {
                html = format!("<s>{html}</s>");
            }
            match run.vert_align {
                VertAlign::Superscript => html = format!("<sup>{html}</sup>"),
                VertAlign::Subscript => html = format!("<sub>{html}</sub>"),
                VertAlign::Baseline => {}
            }
            let mut style = String::new();
            if let Some([r, g, b]) = run.color {
                style.push_str(&format!("color:#{r:02x}{g:02x}{b:02x};"));
            }
            if let Some(size) = run.font_size {
                style.push_str(&format!("font-size:{}pt;", pt(size)));
            }
            if !style.is_empty() {
                html = format!("<span style=\"{style}\">{html}</span>");
            }
            if let Some(url) = &run.link {
                html = format!("<a href=\"{}\">{html}</a>", escape_html(url));
            }
            out.push_str(&html);
        }
    }

    fn paragraph_style(p: &Paragraph) -> String {
        let mut style = String::new();
        match p.alignment {
            Alignment::Left => {}
            Alignment::Center => style.push_str("text-align:center;"),
            Alignment::Right => style.push_str("text-align:right;"),
            Alignment::Justify => style.push_str("text-align:justify;"),
        }
        if p.indent.left > 0.0 {
            style.push_str(&format!("margin-left:{}pt;", pt(p.indent.left)));
        }
        if p.indent.right > 0.0 {
            style.push_str(&format!("margin-right:{}pt;", pt(p.indent.right)));
        }
        if p.indent.first_line > 0.0 {
            style.push_str(&format!("text-indent:{}pt;", pt(p.indent.first_line)));
        } else if p.indent.hanging > 0.0 {
            style.push_str(&format!("text-indent:-{}pt;", pt(p.indent.hanging)));
        }
        if p.spacing.before > 0.0 {
            style.push_str(&format!("margin-top:{}pt;", pt(p.spacing.before)));
        }
        if p.spacing.after > 0.0 {
            style.push_str(&format!("margin-bottom:{}pt;", pt(p.spacing.after)));
        }
        if style.is_empty() {
            style
        } else {
            format!(" style=\"{style}\"")
        }
    }

    fn block(&self, block: &Block, out: &mut String) {
        match block {
            Block::Paragraph(p) => {
                out.push_str(&format!("<p{}>", Self::paragraph_style(p)));
                if p.is_blank() {
                    out.push_str("&nbsp;");
                } else {
                    self.inline(&p.runs, out);
                }
                out.push_str("</p>\n");
            }
            Block::Heading(h) => {
                let level = h.level.clamp(1, 6);
                out.push_str(&format!("<h{level}{}>", Self::paragraph_style(&h.paragraph)));
                self.inline(&h.paragraph.runs, out);
                out.push_str(&format!("</h{level}>\n"));
            }
            Block::ListItem(li) => {
                let indent = (li.level as f64 + 1.0) * LIST_INDENT;
                out.push_str(&format!(
                    "<p class=\"docxview-list-item\" data-level=\"{}\" style=\"margin-left:{}pt;\">",
                    li.level,
                    pt(indent)
                ));
                if !li.marker.is_empty() {
                    out.push_str(&format!(
                        "<span class=\"docxview-marker\">{}</span>",
                        escape_html(&li.marker)
                    ));
                }
                self.inline(&li.paragraph.runs, out);
                out.push_str("</p>\n");
            }
            Block::Table(t) => self.table(t, out),
            Block::Image(img) => out.push_str(&image_html(img)),
            Block::PageBreak => {}
        }
    }

    fn table(&self, table: &Table, out: &mut String) {
        out.push_str("<table>\n");
        for (ri, row) in table.rows.iter().enumerate() {
            let tag = if row.header { "th" } else { "td" };
            match row.height {
                Some(h) => out.push_str(&format!("<tr style=\"height:{}pt;\">", pt(h))),
                None => out.push_str("<tr>"),
            }
            for (cell, col) in row.cells.iter().zip(grid_columns(row)) {
                let span = self.merges.cell(table.id, ri, col);
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
                if let Some(w) = cell.width {
                    attrs.push_str(&format!(" style=\"width:{}pt;\"", pt(w)));
                }
                out.push_str(&format!("<{tag}{attrs}>"));
                for block in &cell.blocks {
                    self.block(block, out);
                }
                out.push_str(&format!("</{tag}>"));
            }
            out.push_str("</tr>\n");
        }
        out.push_str("</table>\n");
    }

    fn header_footer(
        &self,
        info: &HeaderFooterInfo,
        class: Option<PageClass>,
        element: &str,
        out: &mut String,
    ) {
        let Some((class, hf)) = class.and_then(|c| info.get(c).map(|hf| (c, hf))) else {
            return;
        };
        out.push_str(&format!(
            "<{element} class=\"docxview-{element}\" data-variant=\"{}\">\n",
            variant_name(class)
        ));
        for block in &hf.blocks {
            self.block(block, out);
        }
        out.push_str(&format!("</{element}>\n"));
    }

    fn notes(&self, notes: &[Note], out: &mut String) {
        if notes.is_empty() {
            return;
        }
        out.push_str("<aside class=\"docxview-notes\">\n");
        for note in notes {
            out.push_str(&format!(
                "<div class=\"docxview-note\" data-note=\"{}\">\n",
                escape_html(&note.reference.label())
            ));
            for block in &note.blocks {
                self.block(block, out);
            }
            out.push_str("</div>\n");
        }
        out.push_str("</aside>\n");
    }
}

fn image_html(img: &Image) -> String {
    let src = if img.data.is_empty() {
        escape_html(&img.part)
    } else {
        format!("data:{};base64,{}", img.mime_type, STANDARD.encode(&img.data))
    };
    format!(
        "<img src=\"{src}\" alt=\"{}\" data-part=\"{}\" style=\"width:{}pt;height:{}pt;\">\n",
        escape_html(img.alt.as_deref().unwrap_or("")),
        escape_html(&img.part),
        pt(img.width),
        pt(img.height)
    )
}

/// One `<section class="docxview-page">` per page, preceded by the
/// stylesheet unless `styles` finds it already present.
pub fn render_pages_html(doc: &ResolvedDocument, pages: &[Page], styles: &StyleContext) -> String {
    let mut out = String::new();
    styles.inject(&mut out);
    for page in pages {
        let writer = HtmlWriter {
            merges: &doc.merges,
            page: page.number,
            total: pages.len(),
        };
        let g = &page.geometry;
        out.push_str(&format!(
            "<section class=\"docxview-page\" data-page=\"{}\" style=\"width:{}pt;height:{}pt;padding:{}pt {}pt {}pt {}pt;\">\n",
            page.number,
            pt(g.width),
            pt(g.height),
            pt(g.margin_top),
            pt(g.margin_right),
            pt(g.margin_bottom),
            pt(g.margin_left),
        ));
        writer.header_footer(&doc.doc.headers, page.header, "header", &mut out);
        if page.number > 1 {
            out.push_str(&format!(
                "<div class=\"docxview-running-header\" style=\"height:{}pt;\">Page {}</div>\n",
                pt(g.header_inset),
                page.number
            ));
        }
        out.push_str("<div class=\"docxview-body\">\n");
        for block in page.blocks.iter().filter_map(|&i| doc.doc.blocks.get(i)) {
            writer.block(block, &mut out);
        }
        out.push_str("</div>\n");
        if page.number == pages.len() {
            writer.notes(&doc.doc.notes, &mut out);
        }
        writer.header_footer(&doc.doc.footers, page.footer, "footer", &mut out);
        out.push_str("</section>\n");
    }
    out
}
