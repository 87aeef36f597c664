//! The normalized document tree. All lengths are twips.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::units::{self, TargetUnit, Unit};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ParsedDocument {
    pub blocks: Vec<Block>,
    pub metadata: Metadata,
    pub headers: HeaderFooterInfo,
    pub footers: HeaderFooterInfo,
    pub numbering: Numbering,
    /// Bookmark name → text of the paragraph holding the bookmark start.
    pub bookmarks: BTreeMap<String, String>,
    /// Footnotes then endnotes, each in part order.
    pub notes: Vec<Note>,
    /// Page geometry declared by the final section, if any.
    pub page: Option<PageGeometry>,
    pub different_first_page: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Block {
    Paragraph(Paragraph),
    Heading(Heading),
    Table(Table),
    ListItem(ListItem),
    Image(Image),
    PageBreak,
}

impl Block {
    /// The paragraph carried by text-bearing blocks.
    pub fn paragraph(&self) -> Option<&Paragraph> {
        match self {
            Block::Paragraph(p) => Some(p),
            Block::Heading(h) => Some(&h.paragraph),
            Block::ListItem(li) => Some(&li.paragraph),
            _ => None,
        }
    }

    pub fn paragraph_mut(&mut self) -> Option<&mut Paragraph> {
        match self {
            Block::Paragraph(p) => Some(p),
            Block::Heading(h) => Some(&mut h.paragraph),
            Block::ListItem(li) => Some(&mut li.paragraph),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Paragraph {
    pub style_id: Option<String>,
    pub alignment: Alignment,
    pub indent: Indentation,
    pub spacing: Spacing,
    pub runs: Vec<Run>,
}

impl Paragraph {
    pub fn plain_text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    pub fn is_blank(&self) -> bool {
        self.runs.iter().all(|r| r.text.trim().is_empty() && !r.is_page_placeholder())
    }

    /// Largest run font size, or `None` when every run inherits.
    pub fn font_size(&self) -> Option<f64> {
        self.runs
            .iter()
            .filter_map(|r| r.font_size)
            .fold(None, |acc, sz| Some(acc.map_or(sz, |a: f64| a.max(sz))))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Indentation {
    pub left: f64,
    pub right: f64,
    pub first_line: f64,
    pub hanging: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Spacing {
    pub before: f64,
    pub after: f64,
    pub line: LineSpacing,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "rule", content = "value", rename_all = "camelCase")]
pub enum LineSpacing {
    /// Multiple of single spacing (`w:line` / 240).
    Auto(f64),
    Exact(f64),
    AtLeast(f64),
}

impl Default for LineSpacing {
    fn default() -> Self {
        LineSpacing::Auto(1.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Heading {
    /// 1–9.
    pub level: u8,
    pub paragraph: Paragraph,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ListItem {
    pub num_id: String,
    pub level: u8,
    /// Rendered marker, e.g. `"•"`, `"3."`, `"b)"`.
    pub marker: String,
    pub ordered: bool,
    pub paragraph: Paragraph,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VertAlign {
    #[default]
    Baseline,
    Superscript,
    Subscript,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Run {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strike: bool,
    pub vert_align: VertAlign,
    pub color: Option<[u8; 3]>,
    pub font_size: Option<f64>,
    pub link: Option<String>,
    pub field: Option<FieldCode>,
    /// Set on the reference mark of a footnote or endnote.
    pub note: Option<NoteRef>,
}

impl Run {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// A PAGE field with no cached value; its text is supplied at layout time.
    pub fn is_page_placeholder(&self) -> bool {
        self.field
            .as_ref()
            .is_some_and(|f| f.kind == FieldKind::Page && f.result.is_none())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldKind {
    Page,
    NumPages,
    Date,
    Time,
    FileName,
    Author,
    Title,
    Subject,
    Keywords,
    Hyperlink,
    Ref,
    PageRef,
    NoteRef,
    Toc,
    Seq,
    FormText,
    FormCheckbox,
    FormDropdown,
    Formula,
    Unknown(String),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldCode {
    pub kind: FieldKind,
    pub instruction: String,
    /// Value cached in the source document between `separate` and `end`.
    pub result: Option<String>,
    pub properties: FieldProperties,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FieldProperties {
    pub url: Option<String>,
    pub bookmark: Option<String>,
    pub sequence: Option<String>,
    pub default_text: Option<String>,
    pub switches: BTreeMap<String, String>,
    pub args: Vec<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TableId(pub usize);

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Table {
    pub id: TableId,
    /// `tblGrid` column widths.
    pub grid: Vec<f64>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn column_count(&self) -> usize {
        let spanned = self
            .rows
            .iter()
            .map(|r| r.cells.iter().map(|c| c.col_span.max(1) as usize).sum::<usize>())
            .max()
            .unwrap_or(0);
        spanned.max(self.grid.len())
    }

    pub fn cell_count(&self) -> usize {
        self.rows.iter().map(|r| r.cells.len()).sum()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Row {
    pub cells: Vec<Cell>,
    /// `trHeight`, a minimum unless the rule is exact.
    pub height: Option<f64>,
    pub header: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VMerge {
    #[default]
    None,
    Start,
    Continue,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Cell {
    pub blocks: Vec<Block>,
    pub col_span: u32,
    pub v_merge: VMerge,
    pub width: Option<f64>,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            blocks: Vec::new(),
            col_span: 1,
            v_merge: VMerge::None,
            width: None,
        }
    }
}

impl Cell {
    pub fn plain_text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(Block::paragraph)
            .map(|p| p.plain_text().trim().to_string())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Image {
    /// Package part holding the image, e.g. `word/media/image1.png`.
    pub part: String,
    pub mime_type: String,
    pub width: f64,
    pub height: f64,
    pub alt: Option<String>,
    #[serde(skip)]
    pub data: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PageClass {
    First,
    Even,
    Odd,
    Default,
}

impl PageClass {
    pub fn from_reference_type(val: Option<&str>) -> Self {
        match val {
            Some("first") => PageClass::First,
            Some("even") => PageClass::Even,
            Some("odd") => PageClass::Odd,
            _ => PageClass::Default,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteKind {
    Footnote,
    Endnote,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct NoteRef {
    pub kind: NoteKind,
    pub id: String,
}

impl NoteRef {
    /// Label shared by a reference and its definition. Endnotes get an `e`
    /// prefix since both id spaces start at 1.
    pub fn label(&self) -> String {
        match self.kind {
            NoteKind::Footnote => self.id.clone(),
            NoteKind::Endnote => format!("e{}", self.id),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Note {
    #[serde(flatten)]
    pub reference: NoteRef,
    pub blocks: Vec<Block>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct HeaderFooter {
    pub blocks: Vec<Block>,
}

/// Header (or footer) variants keyed by page class.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct HeaderFooterInfo {
    pub variants: BTreeMap<PageClass, HeaderFooter>,
}

impl HeaderFooterInfo {
    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    pub fn get(&self, class: PageClass) -> Option<&HeaderFooter> {
        self.variants.get(&class)
    }

    /// Page 1 prefers `first`, even pages `even`, other odd pages `odd`;
    /// every class falls back to `default`.
    pub fn class_for_page(&self, page_number: usize) -> Option<PageClass> {
        let preferred = if page_number == 1 {
            PageClass::First
        } else if page_number % 2 == 0 {
            PageClass::Even
        } else {
            PageClass::Odd
        };
        [preferred, PageClass::Default]
            .into_iter()
            .find(|class| self.variants.contains_key(class))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Numbering {
    /// `numId` → `abstractNumId`.
    pub instances: BTreeMap<String, String>,
    pub abstracts: BTreeMap<String, AbstractNumbering>,
}

impl Numbering {
    pub fn level(&self, num_id: &str, ilvl: u8) -> Option<&LevelFormat> {
        self.instances
            .get(num_id)
            .and_then(|abs| self.abstracts.get(abs))
            .and_then(|a| a.levels.get(&ilvl))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AbstractNumbering {
    pub levels: BTreeMap<u8, LevelFormat>,
    pub num_style_link: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LevelFormat {
    pub num_fmt: NumFormat,
    pub lvl_text: String,
    pub start: u32,
    pub indent_left: f64,
    pub indent_hanging: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NumFormat {
    Bullet,
    Decimal,
    LowerLetter,
    UpperLetter,
    LowerRoman,
    UpperRoman,
    None,
}

impl NumFormat {
    pub fn parse(val: &str) -> Self {
        match val {
            "bullet" => NumFormat::Bullet,
            "lowerLetter" => NumFormat::LowerLetter,
            "upperLetter" => NumFormat::UpperLetter,
            "lowerRoman" => NumFormat::LowerRoman,
            "upperRoman" => NumFormat::UpperRoman,
            "none" => NumFormat::None,
            _ => NumFormat::Decimal,
        }
    }

    pub fn is_ordered(self) -> bool {
        !matches!(self, NumFormat::Bullet | NumFormat::None)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Metadata {
    pub title: Option<String>,
    pub subject: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub language: Option<String>,
    pub last_modified_by: Option<String>,
    pub revision: Option<u32>,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub application: Option<String>,
    pub company: Option<String>,
    /// Statistics the authoring application stored in `docProps/app.xml`.
    pub declared: DeclaredCounts,
    /// Statistics computed from the parsed tree.
    pub counts: Counts,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DeclaredCounts {
    pub pages: Option<u32>,
    pub words: Option<u32>,
    pub characters: Option<u32>,
    pub paragraphs: Option<u32>,
    pub lines: Option<u32>,
    pub slides: Option<u32>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub paragraphs: usize,
    pub headings: usize,
    pub list_items: usize,
    pub tables: usize,
    pub images: usize,
    pub page_breaks: usize,
    pub words: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PageGeometry {
    pub width: f64,
    pub height: f64,
    pub margin_top: f64,
    pub margin_right: f64,
    pub margin_bottom: f64,
    pub margin_left: f64,
    /// Extra top inset for the running header on pages after the first.
    pub header_inset: f64,
}

impl Default for PageGeometry {
    fn default() -> Self {
        let inch = |v: f64| units::convert(v, Unit::Inch, TargetUnit::Twips);
        Self {
            width: inch(8.5),
            height: inch(11.0),
            margin_top: inch(1.0),
            margin_right: inch(1.0),
            margin_bottom: inch(1.0),
            margin_left: inch(1.0),
            header_inset: inch(0.75),
        }
    }
}

impl PageGeometry {
    pub fn content_width(&self) -> f64 {
        (self.width - self.margin_left - self.margin_right).max(0.0)
    }

    /// Usable vertical space on `page_number` (1-indexed).
    pub fn content_height(&self, page_number: usize) -> f64 {
        let inset = if page_number > 1 { self.header_inset } else { 0.0 };
        (self.height - self.margin_top - self.margin_bottom - inset).max(0.0)
    }
}
