use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::fields;
use crate::metadata;
use crate::model::{
    AbstractNumbering, Alignment, Block, Cell, Heading, HeaderFooter, HeaderFooterInfo, Image,
    Indentation, LevelFormat, LineSpacing, ListItem, Note, NoteKind, NoteRef, NumFormat,
    Numbering, PageClass, PageGeometry, Paragraph, ParsedDocument, Row, Run, Spacing, Table,
    TableId, VMerge, VertAlign,
};
use crate::package::{self, Package, REL_NS};
use crate::units::{self, Unit};

const WML_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const DML_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const WPD_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";

const MAX_LIST_LEVELS: usize = 9;
const MAX_STYLE_DEPTH: usize = 16;

type Node<'a> = roxmltree::Node<'a, 'a>;

fn is_wml(node: Node, name: &str) -> bool {
    node.tag_name().name() == name && node.tag_name().namespace() == Some(WML_NS)
}

fn wml<'a>(node: Node<'a>, name: &str) -> Option<Node<'a>> {
    node.children().find(|n| is_wml(*n, name))
}

fn wml_children<'a>(node: Node<'a>, name: &'a str) -> impl Iterator<Item = Node<'a>> + 'a {
    node.children().filter(move |n| is_wml(*n, name))
}

fn wml_attr<'a>(node: Node<'a>, child: &str) -> Option<&'a str> {
    wml(node, child).and_then(|n| n.attribute((WML_NS, "val")))
}

/// Toggle properties: present means on unless `w:val` switches it off.
fn wml_bool(node: Node, child: &str) -> Option<bool> {
    wml(node, child).map(|n| {
        !matches!(
            n.attribute((WML_NS, "val")),
            Some("0" | "false" | "off" | "none")
        )
    })
}

fn twips_attr(node: Node, attr: &str) -> Option<f64> {
    node.attribute((WML_NS, attr))
        .map(|v| units::parse_measure(v, Unit::Twip))
}

pub(crate) fn parse_hex_color(val: &str) -> Option<[u8; 3]> {
    if val == "auto" || val.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&val[0..2], 16).ok()?;
    let g = u8::from_str_radix(&val[2..4], 16).ok()?;
    let b = u8::from_str_radix(&val[4..6], 16).ok()?;
    Some([r, g, b])
}

fn parse_alignment(val: &str) -> Alignment {
    match val {
        "center" => Alignment::Center,
        "right" | "end" => Alignment::Right,
        "both" | "distribute" | "justify" => Alignment::Justify,
        _ => Alignment::Left,
    }
}

/// Word-style `aa`, `bb` repetition past `z`.
fn letters(n: u32) -> String {
    if n == 0 {
        return "0".into();
    }
    let letter = (b'a' + ((n - 1) % 26) as u8) as char;
    std::iter::repeat_n(letter, ((n - 1) / 26 + 1) as usize).collect()
}

fn roman(mut n: u32) -> String {
    if n == 0 {
        return "0".into();
    }
    const TABLE: [(u32, &str); 13] = [
        (1000, "m"),
        (900, "cm"),
        (500, "d"),
        (400, "cd"),
        (100, "c"),
        (90, "xc"),
        (50, "l"),
        (40, "xl"),
        (10, "x"),
        (9, "ix"),
        (5, "v"),
        (4, "iv"),
        (1, "i"),
    ];
    let mut out = String::new();
    for (value, digits) in TABLE {
        while n >= value {
            out.push_str(digits);
            n -= value;
        }
    }
    out
}

pub(crate) fn format_number(n: u32, fmt: NumFormat) -> String {
    match fmt {
        NumFormat::LowerLetter => letters(n),
        NumFormat::UpperLetter => letters(n).to_uppercase(),
        NumFormat::LowerRoman => roman(n),
        NumFormat::UpperRoman => roman(n).to_uppercase(),
        NumFormat::Decimal | NumFormat::Bullet | NumFormat::None => n.to_string(),
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct RunProps {
    bold: Option<bool>,
    italic: Option<bool>,
    underline: Option<bool>,
    strike: Option<bool>,
    vanish: Option<bool>,
    color: Option<[u8; 3]>,
    font_size: Option<f64>,
    vert_align: Option<VertAlign>,
}

impl RunProps {
    fn read(rpr: Node) -> Self {
        Self {
            bold: wml_bool(rpr, "b"),
            italic: wml_bool(rpr, "i"),
            underline: wml(rpr, "u").map(|u| u.attribute((WML_NS, "val")) != Some("none")),
            strike: wml_bool(rpr, "strike").or_else(|| wml_bool(rpr, "dstrike")),
            vanish: wml_bool(rpr, "vanish"),
            color: wml_attr(rpr, "color").and_then(parse_hex_color),
            font_size: wml_attr(rpr, "sz")
                .and_then(|v| v.parse::<f64>().ok())
                .map(units::half_points_to_twips),
            vert_align: wml_attr(rpr, "vertAlign").map(|v| match v {
                "superscript" => VertAlign::Superscript,
                "subscript" => VertAlign::Subscript,
                _ => VertAlign::Baseline,
            }),
        }
    }

    /// Fills every unset property from `base`.
    fn or(self, base: RunProps) -> RunProps {
        RunProps {
            bold: self.bold.or(base.bold),
            italic: self.italic.or(base.italic),
            underline: self.underline.or(base.underline),
            strike: self.strike.or(base.strike),
            vanish: self.vanish.or(base.vanish),
            color: self.color.or(base.color),
            font_size: self.font_size.or(base.font_size),
            vert_align: self.vert_align.or(base.vert_align),
        }
    }

    fn template(self, link: Option<&str>) -> Run {
        Run {
            text: String::new(),
            bold: self.bold.unwrap_or(false),
            italic: self.italic.unwrap_or(false),
            underline: self.underline.unwrap_or(false),
            strike: self.strike.unwrap_or(false),
            vert_align: self.vert_align.unwrap_or_default(),
            color: self.color,
            font_size: self.font_size,
            link: link.map(String::from),
            field: None,
            note: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct ParaProps {
    alignment: Option<Alignment>,
    before: Option<f64>,
    after: Option<f64>,
    line: Option<LineSpacing>,
    left: Option<f64>,
    right: Option<f64>,
    first_line: Option<f64>,
    hanging: Option<f64>,
}

impl ParaProps {
    fn read(ppr: Node) -> Self {
        let spacing = wml(ppr, "spacing");
        let ind = wml(ppr, "ind");
        let ind_attr = |names: &[&str]| {
            ind.and_then(|n| names.iter().find_map(|name| twips_attr(n, name)))
        };
        Self {
            alignment: wml_attr(ppr, "jc").map(parse_alignment),
            before: spacing.and_then(|n| twips_attr(n, "before")),
            after: spacing.and_then(|n| twips_attr(n, "after")),
            line: spacing.and_then(parse_line_spacing),
            left: ind_attr(&["left", "start"]),
            right: ind_attr(&["right", "end"]),
            first_line: ind_attr(&["firstLine"]),
            hanging: ind_attr(&["hanging"]),
        }
    }

    fn or(self, base: ParaProps) -> ParaProps {
        ParaProps {
            alignment: self.alignment.or(base.alignment),
            before: self.before.or(base.before),
            after: self.after.or(base.after),
            line: self.line.or(base.line),
            left: self.left.or(base.left),
            right: self.right.or(base.right),
            first_line: self.first_line.or(base.first_line),
            hanging: self.hanging.or(base.hanging),
        }
    }

    fn paragraph(self, style_id: Option<String>) -> Paragraph {
        Paragraph {
            style_id,
            alignment: self.alignment.unwrap_or_default(),
            indent: Indentation {
                left: self.left.unwrap_or(0.0),
                right: self.right.unwrap_or(0.0),
                first_line: self.first_line.unwrap_or(0.0),
                hanging: self.hanging.unwrap_or(0.0),
            },
            spacing: Spacing {
                before: self.before.unwrap_or(0.0),
                after: self.after.unwrap_or(0.0),
                line: self.line.unwrap_or_default(),
            },
            runs: Vec::new(),
        }
    }
}

fn parse_line_spacing(spacing: Node) -> Option<LineSpacing> {
    let line = spacing.attribute((WML_NS, "line"))?;
    match spacing.attribute((WML_NS, "lineRule")) {
        Some("exact") => Some(LineSpacing::Exact(units::parse_measure(line, Unit::Twip))),
        Some("atLeast") => Some(LineSpacing::AtLeast(units::parse_measure(line, Unit::Twip))),
        _ => line
            .parse::<f64>()
            .ok()
            .filter(|v| *v > 0.0)
            .map(|v| LineSpacing::Auto(v / 240.0)),
    }
}

#[derive(Debug, Default)]
struct StyleDef {
    name: Option<String>,
    based_on: Option<String>,
    outline_level: Option<u8>,
    num_pr: Option<(String, Option<u8>)>,
    run: RunProps,
    para: ParaProps,
}

#[derive(Debug, Default)]
struct Styles {
    default_run: RunProps,
    default_para: ParaProps,
    paragraph: HashMap<String, StyleDef>,
    character: HashMap<String, StyleDef>,
}

impl Styles {
    /// `id` followed by its `basedOn` ancestors.
    fn chain<'s>(map: &'s HashMap<String, StyleDef>, id: Option<&str>) -> Vec<&'s StyleDef> {
        let mut chain = Vec::new();
        let mut next = id;
        while let Some(id) = next
            && chain.len() < MAX_STYLE_DEPTH
        {
            let Some(def) = map.get(id) else { break };
            chain.push(def);
            next = def.based_on.as_deref();
        }
        chain
    }

    fn para_run_props(&self, style_id: Option<&str>) -> RunProps {
        Self::chain(&self.paragraph, style_id.or(Some("Normal")))
            .into_iter()
            .fold(RunProps::default(), |acc, def| acc.or(def.run))
            .or(self.default_run)
    }

    fn char_run_props(&self, style_id: Option<&str>) -> RunProps {
        Self::chain(&self.character, style_id)
            .into_iter()
            .fold(RunProps::default(), |acc, def| acc.or(def.run))
    }

    fn para_props(&self, style_id: Option<&str>) -> ParaProps {
        Self::chain(&self.paragraph, style_id.or(Some("Normal")))
            .into_iter()
            .fold(ParaProps::default(), |acc, def| acc.or(def.para))
            .or(self.default_para)
    }

    fn heading_level(&self, style_id: Option<&str>) -> Option<u8> {
        let chain = Self::chain(&self.paragraph, style_id);
        if let Some(level) = chain.iter().find_map(|def| def.outline_level) {
            return outline_to_heading(level);
        }
        style_id.and_then(heading_from_name).or_else(|| {
            chain
                .first()
                .and_then(|def| def.name.as_deref())
                .and_then(heading_from_name)
        })
    }

    fn num_pr(&self, style_id: Option<&str>) -> Option<(String, Option<u8>)> {
        Self::chain(&self.paragraph, style_id)
            .into_iter()
            .find_map(|def| def.num_pr.clone())
    }
}

/// `w:outlineLvl` 0–8; 9 marks body text.
fn outline_to_heading(level: u8) -> Option<u8> {
    (level < 9).then_some(level + 1)
}

fn heading_from_name(name: &str) -> Option<u8> {
    let lower = name.to_ascii_lowercase().replace(' ', "");
    if lower == "title" {
        return Some(1);
    }
    lower
        .strip_prefix("heading")?
        .parse::<u8>()
        .ok()
        .filter(|l| (1..=9).contains(l))
}

fn read_num_pr(num_pr: Node) -> Option<(String, Option<u8>)> {
    let num_id = wml_attr(num_pr, "numId")?.to_string();
    let ilvl = wml_attr(num_pr, "ilvl").and_then(|v| v.parse::<u8>().ok());
    Some((num_id, ilvl))
}

fn parse_styles(pkg: &Package) -> Styles {
    let mut styles = Styles::default();
    let Some(xml_text) = pkg.get_xml("word/styles.xml") else {
        return styles;
    };
    let xml = match roxmltree::Document::parse(xml_text) {
        Ok(xml) => xml,
        Err(e) => {
            log::warn!("word/styles.xml unreadable, using defaults: {e}");
            return styles;
        }
    };
    let root = xml.root_element();

    if let Some(doc_defaults) = wml(root, "docDefaults") {
        if let Some(rpr) = wml(doc_defaults, "rPrDefault").and_then(|n| wml(n, "rPr")) {
            styles.default_run = RunProps::read(rpr);
        }
        if let Some(ppr) = wml(doc_defaults, "pPrDefault").and_then(|n| wml(n, "pPr")) {
            styles.default_para = ParaProps::read(ppr);
        }
    }

    for style_node in wml_children(root, "style") {
        let Some(style_id) = style_node.attribute((WML_NS, "styleId")) else {
            log::debug!("skipping style without styleId");
            continue;
        };
        let ppr = wml(style_node, "pPr");
        let def = StyleDef {
            name: wml_attr(style_node, "name").map(String::from),
            based_on: wml_attr(style_node, "basedOn").map(String::from),
            outline_level: ppr
                .and_then(|p| wml_attr(p, "outlineLvl"))
                .and_then(|v| v.parse::<u8>().ok()),
            num_pr: ppr.and_then(|p| wml(p, "numPr")).and_then(read_num_pr),
            run: wml(style_node, "rPr").map(RunProps::read).unwrap_or_default(),
            para: ppr.map(ParaProps::read).unwrap_or_default(),
        };
        match style_node.attribute((WML_NS, "type")) {
            Some("paragraph") => {
                styles.paragraph.insert(style_id.to_string(), def);
            }
            Some("character") => {
                styles.character.insert(style_id.to_string(), def);
            }
            _ => {}
        }
    }

    log::debug!(
        "parsed {} paragraph and {} character styles",
        styles.paragraph.len(),
        styles.character.len()
    );
    styles
}

fn parse_numbering(pkg: &Package) -> Numbering {
    let mut numbering = Numbering::default();
    let Some(xml_text) = pkg.get_xml("word/numbering.xml") else {
        return numbering;
    };
    let xml = match roxmltree::Document::parse(xml_text) {
        Ok(xml) => xml,
        Err(e) => {
            log::warn!("word/numbering.xml unreadable, lists lose markers: {e}");
            return numbering;
        }
    };

    for node in xml.root_element().children() {
        if node.tag_name().namespace() != Some(WML_NS) {
            continue;
        }
        match node.tag_name().name() {
            "abstractNum" => {
                let Some(abs_id) = node.attribute((WML_NS, "abstractNumId")) else {
                    continue;
                };
                let mut levels = BTreeMap::new();
                for lvl in wml_children(node, "lvl") {
                    let Some(ilvl) = lvl
                        .attribute((WML_NS, "ilvl"))
                        .and_then(|v| v.parse::<u8>().ok())
                    else {
                        continue;
                    };
                    let ind = wml(lvl, "pPr").and_then(|ppr| wml(ppr, "ind"));
                    levels.insert(
                        ilvl,
                        LevelFormat {
                            num_fmt: wml_attr(lvl, "numFmt")
                                .map(NumFormat::parse)
                                .unwrap_or(NumFormat::Decimal),
                            lvl_text: wml_attr(lvl, "lvlText").unwrap_or("").to_string(),
                            start: wml_attr(lvl, "start")
                                .and_then(|v| v.parse::<u32>().ok())
                                .unwrap_or(1),
                            indent_left: ind
                                .and_then(|n| twips_attr(n, "left").or_else(|| twips_attr(n, "start")))
                                .unwrap_or(0.0),
                            indent_hanging: ind.and_then(|n| twips_attr(n, "hanging")).unwrap_or(0.0),
                        },
                    );
                }
                numbering.abstracts.insert(
                    abs_id.to_string(),
                    AbstractNumbering {
                        levels,
                        num_style_link: wml_attr(node, "numStyleLink").map(String::from),
                    },
                );
            }
            "num" => {
                let Some(num_id) = node.attribute((WML_NS, "numId")) else {
                    continue;
                };
                let Some(abs_id) = wml_attr(node, "abstractNumId") else {
                    continue;
                };
                numbering
                    .instances
                    .insert(num_id.to_string(), abs_id.to_string());
            }
            _ => {}
        }
    }

    numbering
}

enum Inline {
    Run(Run),
    PageBreak,
    Image(Image),
}

enum ParagraphKind {
    Plain,
    Heading(u8),
    List {
        num_id: String,
        level: u8,
        marker: String,
        ordered: bool,
    },
}

fn make_block(mut template: Paragraph, runs: Vec<Run>, kind: ParagraphKind) -> Block {
    template.runs = runs;
    match kind {
        ParagraphKind::Plain => Block::Paragraph(template),
        ParagraphKind::Heading(level) => Block::Heading(Heading {
            level,
            paragraph: template,
        }),
        ParagraphKind::List {
            num_id,
            level,
            marker,
            ordered,
        } => Block::ListItem(ListItem {
            num_id,
            level,
            marker,
            ordered,
            paragraph: template,
        }),
    }
}

/// Complex-field state (`fldChar begin/separate/end`). Only the outermost
/// field is recorded; nested results contribute to its cached text.
#[derive(Debug, Default)]
struct FieldState {
    depth: usize,
    instruction: String,
    in_result: bool,
    result: String,
    /// Part of the result was already emitted by an earlier paragraph.
    flushed: bool,
    /// Display text met before `separate`.
    stray: Vec<Run>,
    format: Option<Run>,
}

impl FieldState {
    fn is_open(&self) -> bool {
        self.depth > 0
    }

    fn begin(&mut self, format: &Run) {
        if self.depth == 0 {
            self.reset();
            self.format = Some(format.clone());
        }
        self.depth += 1;
    }

    fn reset(&mut self) {
        self.depth = 0;
        self.instruction.clear();
        self.result.clear();
        self.in_result = false;
        self.flushed = false;
        self.stray.clear();
        self.format = None;
    }

    fn separate(&mut self) {
        if self.depth == 1 {
            self.in_result = true;
        }
    }

    fn push_instruction(&mut self, text: &str) {
        if self.depth == 1 && !self.in_result {
            self.instruction.push_str(text);
        }
    }

    fn push_text(&mut self, template: &Run, text: &str) {
        if self.in_result {
            self.result.push_str(text);
        } else {
            let mut run = template.clone();
            run.text = text.to_string();
            self.stray.push(run);
        }
    }

    fn build_run(&self, result: String) -> Run {
        let mut run = self.format.clone().unwrap_or_default();
        let mut code = fields::parse_instruction(&self.instruction);
        code.result = (!result.is_empty()).then(|| result.clone());
        run.text = result;
        run.field = Some(code);
        run
    }

    fn end(&mut self) -> Option<Run> {
        if self.depth == 0 {
            log::debug!("fldChar end without begin");
            return None;
        }
        self.depth -= 1;
        if self.depth > 0 {
            return None;
        }
        let mut result = std::mem::take(&mut self.result);
        if result.is_empty() && !self.in_result {
            result = self.stray.iter().map(|r| r.text.as_str()).collect();
        }
        let run = (!(result.is_empty() && self.flushed)).then(|| self.build_run(result));
        self.reset();
        run
    }

    /// Emits the result gathered so far when a field spans paragraphs.
    fn flush_partial(&mut self) -> Option<Run> {
        if !self.is_open() || !self.in_result || self.result.is_empty() {
            return None;
        }
        let result = std::mem::take(&mut self.result);
        self.flushed = true;
        Some(self.build_run(result))
    }

    /// Gives up on a field that reached a paragraph end holding display
    /// text but no `separate`; that text is returned as plain runs.
    fn abandon_unseparated(&mut self) -> Vec<Run> {
        if !self.is_open() || self.in_result || self.stray.is_empty() {
            return Vec::new();
        }
        log::warn!("field {:?} has text but no separator, keeping it as plain text", self.instruction.trim());
        let stray = std::mem::take(&mut self.stray);
        self.reset();
        stray
    }
}

struct BodyParser<'p> {
    pkg: &'p Package,
    /// Part whose relationships resolve ids met while parsing.
    part: String,
    styles: Styles,
    numbering: Numbering,
    counters: HashMap<String, [Option<u32>; MAX_LIST_LEVELS]>,
    bookmarks: BTreeMap<String, String>,
    next_table: usize,
    field: FieldState,
}

impl<'p> BodyParser<'p> {
    fn new(pkg: &'p Package, part: String, styles: Styles, numbering: Numbering) -> Self {
        Self {
            pkg,
            part,
            styles,
            numbering,
            counters: HashMap::new(),
            bookmarks: BTreeMap::new(),
            next_table: 0,
            field: FieldState::default(),
        }
    }

    fn parse_blocks(&mut self, container: Node) -> Vec<Block> {
        let mut out = Vec::new();
        for node in container.children().filter(|n| n.is_element()) {
            if node.tag_name().namespace() != Some(WML_NS) {
                log::debug!("skipping foreign element <{}>", node.tag_name().name());
                continue;
            }
            match node.tag_name().name() {
                "p" => self.parse_paragraph(node, &mut out),
                "tbl" => out.push(Block::Table(self.parse_table(node))),
                "sdt" => {
                    if let Some(content) = wml(node, "sdtContent") {
                        out.extend(self.parse_blocks(content));
                    }
                }
                "customXml" => out.extend(self.parse_blocks(node)),
                "sectPr" | "tcPr" | "bookmarkStart" | "bookmarkEnd" | "proofErr" => {}
                other => log::debug!("skipping <w:{other}>"),
            }
        }
        out
    }

    fn level_format(&self, num_id: &str, ilvl: u8) -> Option<&LevelFormat> {
        if let Some(def) = self.numbering.level(num_id, ilvl) {
            return Some(def);
        }
        let abs = self
            .numbering
            .instances
            .get(num_id)
            .and_then(|a| self.numbering.abstracts.get(a))?;
        let (linked, _) = self.styles.num_pr(abs.num_style_link.as_deref())?;
        if linked == num_id {
            return None;
        }
        self.numbering.level(&linked, ilvl)
    }

    fn levels_for(&self, num_id: &str) -> BTreeMap<u8, LevelFormat> {
        (0..MAX_LIST_LEVELS as u8)
            .filter_map(|l| self.level_format(num_id, l).map(|d| (l, d.clone())))
            .collect()
    }

    /// Advances the counter at `ilvl`, resets deeper levels, and renders
    /// the marker from `lvlText`.
    fn next_marker(&mut self, num_id: &str, ilvl: u8) -> Option<(String, bool)> {
        let levels = self.levels_for(num_id);
        let def = levels.get(&ilvl)?;
        let idx = (ilvl as usize).min(MAX_LIST_LEVELS - 1);
        let counters = self
            .counters
            .entry(num_id.to_string())
            .or_insert([None; MAX_LIST_LEVELS]);
        counters[idx] = Some(counters[idx].map_or(def.start, |c| c + 1));
        for deeper in counters.iter_mut().skip(idx + 1) {
            *deeper = None;
        }

        let marker = match def.num_fmt {
            NumFormat::Bullet => "\u{2022}".to_string(),
            NumFormat::None => String::new(),
            _ if def.lvl_text.is_empty() => {
                format!("{}.", format_number(counters[idx].unwrap_or(def.start), def.num_fmt))
            }
            _ => expand_level_text(&def.lvl_text, &levels, counters),
        };
        Some((marker, def.num_fmt.is_ordered()))
    }

    fn list_reference(&self, ppr: Option<Node>, style_id: Option<&str>) -> Option<(String, u8)> {
        let direct = ppr.and_then(|p| wml(p, "numPr")).and_then(read_num_pr);
        let from_style = self.styles.num_pr(style_id);
        let num_id = direct
            .as_ref()
            .map(|(id, _)| id.clone())
            .or_else(|| from_style.as_ref().map(|(id, _)| id.clone()))?;
        if num_id == "0" {
            return None;
        }
        let ilvl = direct
            .and_then(|(_, l)| l)
            .or_else(|| from_style.and_then(|(_, l)| l))
            .unwrap_or(0);
        Some((num_id, ilvl))
    }

    fn parse_paragraph(&mut self, node: Node, out: &mut Vec<Block>) {
        let ppr = wml(node, "pPr");
        let style_id = ppr.and_then(|p| wml_attr(p, "pStyle"));

        if ppr.and_then(|p| wml_bool(p, "pageBreakBefore")) == Some(true) {
            out.push(Block::PageBreak);
        }

        let list = self.list_reference(ppr, style_id);
        let numbering_props = list
            .as_ref()
            .and_then(|(id, lvl)| self.level_format(id, *lvl))
            .map(|def| ParaProps {
                left: Some(def.indent_left),
                hanging: Some(def.indent_hanging),
                ..ParaProps::default()
            })
            .unwrap_or_default();
        let props = ppr
            .map(ParaProps::read)
            .unwrap_or_default()
            .or(numbering_props)
            .or(self.styles.para_props(style_id));
        let template = props.paragraph(style_id.map(String::from));

        let heading = ppr
            .and_then(|p| wml_attr(p, "outlineLvl"))
            .and_then(|v| v.parse::<u8>().ok())
            .and_then(outline_to_heading)
            .or_else(|| self.styles.heading_level(style_id));

        let base = self.styles.para_run_props(style_id);
        let mut inlines = Vec::new();
        let mut bookmarks = Vec::new();
        self.collect_inlines(node, base, None, &mut inlines, &mut bookmarks);
        if let Some(run) = self.field.flush_partial() {
            inlines.push(Inline::Run(run));
        }
        inlines.extend(self.field.abandon_unseparated().into_iter().map(Inline::Run));

        let mut kind = match (heading, list) {
            (Some(level), _) => ParagraphKind::Heading(level),
            (None, Some((num_id, level))) => match self.next_marker(&num_id, level) {
                Some((marker, ordered)) => ParagraphKind::List {
                    num_id,
                    level,
                    marker,
                    ordered,
                },
                None => {
                    log::debug!("numId {num_id} level {level} has no definition");
                    ParagraphKind::Plain
                }
            },
            (None, None) => ParagraphKind::Plain,
        };

        if !bookmarks.is_empty() {
            let text: String = inlines
                .iter()
                .filter_map(|i| match i {
                    Inline::Run(r) => Some(r.text.as_str()),
                    _ => None,
                })
                .collect();
            for name in bookmarks {
                self.bookmarks
                    .entry(name)
                    .or_insert_with(|| text.trim().to_string());
            }
        }

        let split = inlines.iter().any(|i| !matches!(i, Inline::Run(_)));
        let mut runs = Vec::new();
        for inline in inlines {
            match inline {
                Inline::Run(run) => runs.push(run),
                other => {
                    if !runs.is_empty() {
                        let kind = std::mem::replace(&mut kind, ParagraphKind::Plain);
                        out.push(make_block(template.clone(), std::mem::take(&mut runs), kind));
                    }
                    out.push(match other {
                        Inline::Image(img) => Block::Image(img),
                        _ => Block::PageBreak,
                    });
                }
            }
        }
        if !runs.is_empty() || !split {
            out.push(make_block(template, runs, kind));
        }
    }

    fn hyperlink_target(&self, node: Node) -> Option<String> {
        let anchor = node.attribute((WML_NS, "anchor"));
        let url = node
            .attribute((REL_NS, "id"))
            .and_then(|rid| self.pkg.resolve_relationship_from(&self.part, rid));
        match (url, anchor) {
            (Some(url), Some(anchor)) => Some(format!("{url}#{anchor}")),
            (Some(url), None) => Some(url.to_string()),
            (None, Some(anchor)) => Some(format!("#{anchor}")),
            (None, None) => None,
        }
    }

    fn collect_inlines(
        &mut self,
        node: Node,
        base: RunProps,
        link: Option<&str>,
        inlines: &mut Vec<Inline>,
        bookmarks: &mut Vec<String>,
    ) {
        for child in node.children().filter(|n| n.is_element()) {
            if child.tag_name().namespace() != Some(WML_NS) {
                continue;
            }
            match child.tag_name().name() {
                "r" => self.parse_run(child, base, link, inlines),
                "hyperlink" => {
                    let target = self.hyperlink_target(child);
                    let link = target.as_deref().or(link);
                    self.collect_inlines(child, base, link, inlines, bookmarks);
                }
                "fldSimple" => {
                    let instruction = child.attribute((WML_NS, "instr")).unwrap_or("");
                    let mut inner = Vec::new();
                    self.collect_inlines(child, base, link, &mut inner, bookmarks);
                    let mut result = String::new();
                    let mut format = None;
                    let mut rest = Vec::new();
                    for inline in inner {
                        match inline {
                            Inline::Run(run) => {
                                result.push_str(&run.text);
                                format.get_or_insert(run);
                            }
                            other => rest.push(other),
                        }
                    }
                    let mut run = format.unwrap_or_else(|| base.template(link));
                    let mut code = fields::parse_instruction(instruction);
                    code.result = (!result.is_empty()).then(|| result.clone());
                    run.text = result;
                    run.field = Some(code);
                    inlines.push(Inline::Run(run));
                    inlines.extend(rest);
                }
                "bookmarkStart" => {
                    if let Some(name) = child.attribute((WML_NS, "name"))
                        && name != "_GoBack"
                    {
                        bookmarks.push(name.to_string());
                    }
                }
                "ins" | "smartTag" | "customXml" | "dir" | "bdo" => {
                    self.collect_inlines(child, base, link, inlines, bookmarks);
                }
                "sdt" => {
                    if let Some(content) = wml(child, "sdtContent") {
                        self.collect_inlines(content, base, link, inlines, bookmarks);
                    }
                }
                "pPr" | "del" | "bookmarkEnd" | "proofErr" | "permStart" | "permEnd" => {}
                other => log::debug!("skipping <w:{other}> in paragraph"),
            }
        }
    }

    fn parse_run(&mut self, run: Node, base: RunProps, link: Option<&str>, inlines: &mut Vec<Inline>) {
        let rpr = wml(run, "rPr");
        let char_style = rpr.and_then(|n| wml_attr(n, "rStyle"));
        let props = rpr
            .map(RunProps::read)
            .unwrap_or_default()
            .or(self.styles.char_run_props(char_style))
            .or(base);
        let hidden = props.vanish == Some(true);
        let template = props.template(link);

        let mut text = String::new();
        let flush = |text: &mut String, inlines: &mut Vec<Inline>| {
            if !text.is_empty() {
                let mut run = template.clone();
                run.text = std::mem::take(text);
                inlines.push(Inline::Run(run));
            }
        };

        for child in run.children().filter(|n| n.is_element()) {
            if child.tag_name().namespace() != Some(WML_NS) {
                continue;
            }
            let piece: Option<String> = match child.tag_name().name() {
                "fldChar" => {
                    match child.attribute((WML_NS, "fldCharType")) {
                        Some("begin") => {
                            flush(&mut text, inlines);
                            self.field.begin(&template);
                        }
                        Some("separate") => self.field.separate(),
                        Some("end") => {
                            if let Some(field_run) = self.field.end() {
                                inlines.push(Inline::Run(field_run));
                            }
                        }
                        other => log::debug!("unknown fldCharType {other:?}"),
                    }
                    None
                }
                "instrText" => {
                    self.field.push_instruction(child.text().unwrap_or(""));
                    None
                }
                "t" => child.text().map(String::from),
                "tab" => Some("\t".into()),
                "cr" => Some("\n".into()),
                "noBreakHyphen" => Some("-".into()),
                "br" => {
                    if child.attribute((WML_NS, "type")) == Some("page") {
                        if !self.field.is_open() && !hidden {
                            flush(&mut text, inlines);
                            inlines.push(Inline::PageBreak);
                        }
                        None
                    } else {
                        Some("\n".into())
                    }
                }
                "sym" => child
                    .attribute((WML_NS, "char"))
                    .and_then(|c| u32::from_str_radix(c, 16).ok())
                    .and_then(char::from_u32)
                    .map(String::from),
                "drawing" => {
                    if !hidden {
                        flush(&mut text, inlines);
                        if let Some(img) = self.parse_drawing(child) {
                            inlines.push(Inline::Image(img));
                        }
                    }
                    None
                }
                name @ ("footnoteReference" | "endnoteReference") => {
                    if !hidden && let Some(id) = child.attribute((WML_NS, "id")) {
                        flush(&mut text, inlines);
                        let kind = if name == "footnoteReference" {
                            NoteKind::Footnote
                        } else {
                            NoteKind::Endnote
                        };
                        let reference = NoteRef { kind, id: id.to_string() };
                        let mut mark = template.clone();
                        mark.text = reference.label();
                        mark.note = Some(reference);
                        inlines.push(Inline::Run(mark));
                    }
                    None
                }
                "rPr" | "delText" | "lastRenderedPageBreak" | "softHyphen" | "footnoteRef"
                | "endnoteRef" | "separator" | "continuationSeparator" => None,
                other => {
                    log::debug!("skipping <w:{other}> in run");
                    None
                }
            };
            let Some(piece) = piece else { continue };
            if hidden {
                continue;
            }
            if self.field.is_open() {
                self.field.push_text(&template, &piece);
            } else {
                text.push_str(&piece);
            }
        }
        flush(&mut text, inlines);
    }

    fn parse_drawing(&self, drawing: Node) -> Option<Image> {
        let container = drawing.children().find(|n| {
            matches!(n.tag_name().name(), "inline" | "anchor")
                && n.tag_name().namespace() == Some(WPD_NS)
        })?;
        let wpd = |name: &str| {
            container
                .children()
                .find(|n| n.tag_name().name() == name && n.tag_name().namespace() == Some(WPD_NS))
        };
        let extent = wpd("extent");
        let emu = |attr: &str| {
            extent
                .and_then(|e| e.attribute(attr))
                .map(|v| units::parse_measure(v, Unit::Emu))
                .unwrap_or(0.0)
        };
        let alt = wpd("docPr").and_then(|d| {
            d.attribute("descr")
                .filter(|s| !s.trim().is_empty())
                .or_else(|| d.attribute("title").filter(|s| !s.trim().is_empty()))
                .map(String::from)
        });

        let Some(rid) = container
            .descendants()
            .find(|n| n.tag_name().name() == "blip" && n.tag_name().namespace() == Some(DML_NS))
            .and_then(|b| b.attribute((REL_NS, "embed")))
        else {
            log::debug!("drawing without embedded picture");
            return None;
        };
        let part = self.pkg.resolve_relationship_from(&self.part, rid)?.to_string();
        let data = match self.pkg.get_part(&part) {
            Some(bytes) => bytes.to_vec(),
            None => {
                log::warn!("image part {part} is missing from the package");
                Vec::new()
            }
        };
        Some(Image {
            mime_type: package::mime_type(&part).to_string(),
            part,
            width: emu("cx"),
            height: emu("cy"),
            alt,
            data,
        })
    }

    fn parse_table(&mut self, node: Node) -> Table {
        let id = TableId(self.next_table);
        self.next_table += 1;

        let grid = wml(node, "tblGrid")
            .into_iter()
            .flat_map(|g| wml_children(g, "gridCol"))
            .filter_map(|n| twips_attr(n, "w"))
            .collect();

        let mut rows = Vec::new();
        for tr in wml_children(node, "tr") {
            let tr_pr = wml(tr, "trPr");
            let mut row = Row {
                cells: Vec::new(),
                height: tr_pr
                    .and_then(|p| wml(p, "trHeight"))
                    .and_then(|h| twips_attr(h, "val")),
                header: tr_pr.and_then(|p| wml_bool(p, "tblHeader")).unwrap_or(false),
            };
            for tc in wml_children(tr, "tc") {
                let tc_pr = wml(tc, "tcPr");
                let col_span = tc_pr
                    .and_then(|p| wml_attr(p, "gridSpan"))
                    .and_then(|v| v.parse::<u32>().ok())
                    .unwrap_or(1)
                    .max(1);
                let v_merge = tc_pr
                    .and_then(|p| wml(p, "vMerge"))
                    .map(|n| match n.attribute((WML_NS, "val")) {
                        Some("restart") => VMerge::Start,
                        _ => VMerge::Continue,
                    })
                    .unwrap_or(VMerge::None);
                let width = tc_pr
                    .and_then(|p| wml(p, "tcW"))
                    .filter(|w| matches!(w.attribute((WML_NS, "type")), None | Some("dxa")))
                    .and_then(|w| twips_attr(w, "w"));
                row.cells.push(Cell {
                    blocks: self.parse_blocks(tc),
                    col_span,
                    v_merge,
                    width,
                });
            }
            rows.push(row);
        }

        Table { id, grid, rows }
    }

    /// Note bodies from `word/footnotes.xml` or `word/endnotes.xml`. Separator
    /// notes and notes without content are dropped.
    fn parse_notes(&mut self, kind: NoteKind) -> Vec<Note> {
        let (part, element) = match kind {
            NoteKind::Footnote => ("word/footnotes.xml", "footnote"),
            NoteKind::Endnote => ("word/endnotes.xml", "endnote"),
        };
        let Some(xml_text) = self.pkg.get_xml(part) else {
            return Vec::new();
        };
        let xml = match roxmltree::Document::parse(xml_text) {
            Ok(xml) => xml,
            Err(e) => {
                log::warn!("skipping unreadable {part}: {e}");
                return Vec::new();
            }
        };
        let saved_part = std::mem::replace(&mut self.part, part.to_string());
        let saved_field = std::mem::take(&mut self.field);
        let mut notes = Vec::new();
        for node in wml_children(xml.root_element(), element) {
            if node
                .attribute((WML_NS, "type"))
                .is_some_and(|t| t != "normal")
            {
                continue;
            }
            let Some(id) = node.attribute((WML_NS, "id")) else {
                log::debug!("{element} without w:id");
                continue;
            };
            let blocks = self.parse_blocks(node);
            if blocks.is_empty() {
                continue;
            }
            notes.push(Note {
                reference: NoteRef { kind, id: id.to_string() },
                blocks,
            });
        }
        self.part = saved_part;
        self.field = saved_field;
        notes
    }

    fn parse_header_footers(&mut self, sect: Node, element: &'static str) -> HeaderFooterInfo {
        let pkg = self.pkg;
        let mut info = HeaderFooterInfo::default();
        for reference in wml_children(sect, element) {
            let class = PageClass::from_reference_type(reference.attribute((WML_NS, "type")));
            let Some(rid) = reference.attribute((REL_NS, "id")) else {
                log::debug!("{element} without r:id");
                continue;
            };
            let Some(target) = pkg.resolve_relationship_from(&self.part, rid) else {
                continue;
            };
            let Some(xml_text) = pkg.get_xml(target) else {
                log::warn!("{element} part {target} is missing");
                continue;
            };
            let xml = match roxmltree::Document::parse(xml_text) {
                Ok(xml) => xml,
                Err(e) => {
                    log::warn!("skipping unreadable {target}: {e}");
                    continue;
                }
            };
            let saved_part = std::mem::replace(&mut self.part, target.to_string());
            let saved_field = std::mem::take(&mut self.field);
            let blocks = self.parse_blocks(xml.root_element());
            self.part = saved_part;
            self.field = saved_field;
            info.variants.insert(class, HeaderFooter { blocks });
        }
        info
    }
}

/// Replaces `%1`…`%9` with each level's current counter in its own format.
fn expand_level_text(
    lvl_text: &str,
    levels: &BTreeMap<u8, LevelFormat>,
    counters: &[Option<u32>; MAX_LIST_LEVELS],
) -> String {
    let mut out = String::new();
    let mut chars = lvl_text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '%'
            && let Some(digit) = chars.peek().and_then(|d| d.to_digit(10))
            && (1..=MAX_LIST_LEVELS as u32).contains(&digit)
        {
            chars.next();
            let level = (digit - 1) as u8;
            let def = levels.get(&level);
            let value = counters[level as usize]
                .or_else(|| def.map(|d| d.start))
                .unwrap_or(1);
            out.push_str(&format_number(
                value,
                def.map(|d| d.num_fmt).unwrap_or(NumFormat::Decimal),
            ));
        } else {
            out.push(c);
        }
    }
    out
}

fn parse_geometry(sect: Node) -> Option<PageGeometry> {
    let pg_sz = wml(sect, "pgSz");
    let pg_mar = wml(sect, "pgMar");
    if pg_sz.is_none() && pg_mar.is_none() {
        return None;
    }
    let defaults = PageGeometry::default();
    let size = |attr: &str, fallback: f64| pg_sz.and_then(|n| twips_attr(n, attr)).unwrap_or(fallback);
    let margin = |attr: &str, fallback: f64| {
        pg_mar
            .and_then(|n| twips_attr(n, attr))
            .map(f64::abs)
            .unwrap_or(fallback)
    };
    Some(PageGeometry {
        width: size("w", defaults.width),
        height: size("h", defaults.height),
        margin_top: margin("top", defaults.margin_top),
        margin_right: margin("right", defaults.margin_right),
        margin_bottom: margin("bottom", defaults.margin_bottom),
        margin_left: margin("left", defaults.margin_left),
        header_inset: defaults.header_inset,
    })
}

pub fn parse(pkg: &Package) -> Result<ParsedDocument> {
    let main = pkg.main_part().to_string();
    let xml_text = pkg
        .get_xml(&main)
        .ok_or_else(|| Error::XmlParse(format!("{main} (not UTF-8 text)")))?;
    let xml = roxmltree::Document::parse(xml_text)
        .map_err(|e| Error::XmlParse(format!("{main} ({e})")))?;
    let body = wml(xml.root_element(), "body")
        .ok_or_else(|| Error::XmlParse(format!("{main} (missing w:body)")))?;

    let styles = parse_styles(pkg);
    let numbering = parse_numbering(pkg);
    let mut parser = BodyParser::new(pkg, main, styles, numbering);
    let blocks = parser.parse_blocks(body);
    if parser.field.is_open() {
        log::warn!("document ends inside an unterminated field");
    }

    let sect = wml(body, "sectPr");
    let page = sect.and_then(parse_geometry);
    let different_first_page = sect.and_then(|s| wml_bool(s, "titlePg")).unwrap_or(false);
    let (headers, footers) = match sect {
        Some(sect) => (
            parser.parse_header_footers(sect, "headerReference"),
            parser.parse_header_footers(sect, "footerReference"),
        ),
        None => Default::default(),
    };
    let mut notes = parser.parse_notes(NoteKind::Footnote);
    notes.extend(parser.parse_notes(NoteKind::Endnote));

    let mut metadata = metadata::parse_properties(pkg);
    metadata.counts = metadata::count_blocks(&blocks);
    log::info!(
        "parsed document: {} blocks, {} header and {} footer variants, {} notes",
        blocks.len(),
        headers.variants.len(),
        footers.variants.len(),
        notes.len()
    );

    Ok(ParsedDocument {
        blocks,
        metadata,
        headers,
        footers,
        numbering: parser.numbering,
        bookmarks: parser.bookmarks,
        notes,
        page,
        different_first_page,
    })
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use zip::write::SimpleFileOptions;

    use super::*;
    use crate::model::FieldKind;

    const NS: &str = r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships""#;

    fn package(body: &str, extra: &[(&str, &str)]) -> Package {
        let document = format!(r#"<?xml version="1.0"?><w:document {NS}><w:body>{body}</w:body></w:document>"#);
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("word/document.xml", SimpleFileOptions::default()).unwrap();
        zip.write_all(document.as_bytes()).unwrap();
        for (name, content) in extra {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        let buf = zip.finish().unwrap().into_inner();
        Package::open(&buf).unwrap()
    }

    fn parse_body(body: &str) -> ParsedDocument {
        parse(&package(body, &[])).unwrap()
    }

    fn text_of(block: &Block) -> String {
        block.paragraph().map(Paragraph::plain_text).unwrap_or_default()
    }

    #[test]
    fn missing_body_is_xml_error() {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("word/document.xml", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"<w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"/>")
            .unwrap();
        let buf = zip.finish().unwrap().into_inner();
        let err = parse(&Package::open(&buf).unwrap()).unwrap_err();
        assert!(matches!(err, Error::XmlParse(_)));
    }

    #[test]
    fn run_formatting_and_sizes() {
        let doc = parse_body(
            r#"<w:p><w:pPr><w:jc w:val="center"/><w:spacing w:before="120" w:after="1in"/><w:ind w:left="720" w:hanging="360"/></w:pPr>
               <w:r><w:rPr><w:b/><w:sz w:val="28"/><w:color w:val="FF0000"/></w:rPr><w:t>Bold</w:t></w:r>
               <w:r><w:rPr><w:i/><w:b w:val="0"/><w:vertAlign w:val="superscript"/></w:rPr><w:t xml:space="preserve"> sup</w:t></w:r>
               <w:r><w:rPr><w:vanish/></w:rPr><w:t>hidden</w:t></w:r></w:p>"#,
        );
        let Block::Paragraph(p) = &doc.blocks[0] else { panic!("expected paragraph") };
        assert_eq!(p.alignment, Alignment::Center);
        assert_eq!(p.spacing.before, 120.0);
        assert_eq!(p.spacing.after, 1440.0);
        assert_eq!(p.indent.left, 720.0);
        assert_eq!(p.indent.hanging, 360.0);
        assert_eq!(p.runs.len(), 2);
        assert!(p.runs[0].bold);
        assert_eq!(p.runs[0].font_size, Some(280.0));
        assert_eq!(p.runs[0].color, Some([255, 0, 0]));
        assert!(!p.runs[1].bold && p.runs[1].italic);
        assert_eq!(p.runs[1].vert_align, VertAlign::Superscript);
        assert_eq!(p.plain_text(), "Bold sup");
    }

    #[test]
    fn headings_from_styles_and_outline_level() {
        let styles = format!(
            r#"<w:styles {NS}>
              <w:style w:type="paragraph" w:styleId="Heading2"><w:name w:val="heading 2"/></w:style>
              <w:style w:type="paragraph" w:styleId="MyTitle"><w:name w:val="Title"/></w:style>
              <w:style w:type="paragraph" w:styleId="Custom"><w:basedOn w:val="Outline"/></w:style>
              <w:style w:type="paragraph" w:styleId="Outline"><w:pPr><w:outlineLvl w:val="2"/></w:pPr></w:style>
            </w:styles>"#
        );
        let body = r#"<w:p><w:pPr><w:pStyle w:val="Heading2"/></w:pPr><w:r><w:t>Two</w:t></w:r></w:p>
            <w:p><w:pPr><w:pStyle w:val="MyTitle"/></w:pPr><w:r><w:t>T</w:t></w:r></w:p>
            <w:p><w:pPr><w:pStyle w:val="Custom"/></w:pPr><w:r><w:t>Three</w:t></w:r></w:p>
            <w:p><w:pPr><w:outlineLvl w:val="0"/></w:pPr><w:r><w:t>One</w:t></w:r></w:p>
            <w:p><w:pPr><w:outlineLvl w:val="9"/></w:pPr><w:r><w:t>Body</w:t></w:r></w:p>"#;
        let doc = parse(&package(body, &[("word/styles.xml", &styles)])).unwrap();
        let levels: Vec<Option<u8>> = doc
            .blocks
            .iter()
            .map(|b| match b {
                Block::Heading(h) => Some(h.level),
                _ => None,
            })
            .collect();
        assert_eq!(levels, vec![Some(2), Some(1), Some(3), Some(1), None]);
    }

    #[test]
    fn page_break_splits_paragraph() {
        let doc = parse_body(
            r#"<w:p><w:r><w:t>before</w:t><w:br w:type="page"/><w:t>after</w:t></w:r></w:p>
               <w:p><w:pPr><w:pageBreakBefore/></w:pPr><w:r><w:t>next</w:t></w:r></w:p>"#,
        );
        assert_eq!(doc.blocks.len(), 5);
        assert_eq!(text_of(&doc.blocks[0]), "before");
        assert!(matches!(doc.blocks[1], Block::PageBreak));
        assert_eq!(text_of(&doc.blocks[2]), "after");
        assert!(matches!(doc.blocks[3], Block::PageBreak));
        assert_eq!(text_of(&doc.blocks[4]), "next");
        assert_eq!(doc.metadata.counts.page_breaks, 2);
    }

    #[test]
    fn complex_and_simple_fields() {
        let doc = parse_body(
            r#"<w:p>
                <w:r><w:t xml:space="preserve">Page </w:t></w:r>
                <w:r><w:fldChar w:fldCharType="begin"/></w:r>
                <w:r><w:instrText xml:space="preserve"> PAGE </w:instrText></w:r>
                <w:r><w:fldChar w:fldCharType="separate"/></w:r>
                <w:r><w:t>3</w:t></w:r>
                <w:r><w:fldChar w:fldCharType="end"/></w:r>
                <w:r><w:t xml:space="preserve"> of </w:t></w:r>
                <w:fldSimple w:instr=" NUMPAGES "/>
              </w:p>"#,
        );
        let Block::Paragraph(p) = &doc.blocks[0] else { panic!() };
        assert_eq!(p.runs.len(), 4);
        let page = p.runs[1].field.as_ref().unwrap();
        assert_eq!(page.kind, FieldKind::Page);
        assert_eq!(page.result.as_deref(), Some("3"));
        assert_eq!(p.runs[1].text, "3");
        let total = p.runs[3].field.as_ref().unwrap();
        assert_eq!(total.kind, FieldKind::NumPages);
        assert_eq!(total.result, None);
    }

    #[test]
    fn nested_field_keeps_outer_instruction() {
        let doc = parse_body(
            r#"<w:p>
                <w:r><w:fldChar w:fldCharType="begin"/><w:instrText>REF </w:instrText></w:r>
                <w:r><w:fldChar w:fldCharType="begin"/><w:instrText>PAGE</w:instrText><w:fldChar w:fldCharType="end"/></w:r>
                <w:r><w:instrText>bm1</w:instrText><w:fldChar w:fldCharType="end"/></w:r>
              </w:p>"#,
        );
        let Block::Paragraph(p) = &doc.blocks[0] else { panic!() };
        assert_eq!(p.runs.len(), 1);
        let code = p.runs[0].field.as_ref().unwrap();
        assert_eq!(code.kind, FieldKind::Ref);
        assert_eq!(code.instruction, "REF bm1");
    }

    #[test]
    fn unterminated_field_does_not_swallow_later_paragraphs() {
        let doc = parse_body(
            r#"<w:p><w:r><w:fldChar w:fldCharType="begin"/></w:r><w:r><w:instrText>AUTHOR</w:instrText></w:r></w:p>
              <w:p><w:r><w:t>Second paragraph</w:t></w:r></w:p>
              <w:p><w:r><w:t>Third paragraph</w:t></w:r></w:p>"#,
        );
        let texts: Vec<String> = doc.blocks.iter().map(text_of).collect();
        assert!(texts.contains(&"Second paragraph".to_string()), "{texts:?}");
        assert!(texts.contains(&"Third paragraph".to_string()), "{texts:?}");
        assert!(doc.blocks.iter().all(|b| {
            b.paragraph()
                .is_none_or(|p| p.runs.iter().all(|r| r.field.is_none()))
        }));
    }

    #[test]
    fn text_without_separator_becomes_field_result() {
        let doc = parse_body(
            r#"<w:p><w:r><w:fldChar w:fldCharType="begin"/><w:instrText>AUTHOR</w:instrText></w:r>
                 <w:r><w:t>Ada</w:t></w:r><w:r><w:fldChar w:fldCharType="end"/></w:r></w:p>"#,
        );
        let Block::Paragraph(p) = &doc.blocks[0] else { panic!() };
        assert_eq!(p.runs.len(), 1);
        assert_eq!(p.runs[0].text, "Ada");
        assert_eq!(p.runs[0].field.as_ref().unwrap().result.as_deref(), Some("Ada"));
    }

    #[test]
    fn cached_result_across_paragraphs_is_emitted_once() {
        let doc = parse_body(
            r#"<w:p><w:r><w:fldChar w:fldCharType="begin"/><w:instrText>REF bm1</w:instrText></w:r>
                 <w:r><w:fldChar w:fldCharType="separate"/></w:r><w:r><w:t>Cached text</w:t></w:r></w:p>
              <w:p><w:r><w:fldChar w:fldCharType="end"/></w:r></w:p>"#,
        );
        let field_runs: Vec<&Run> = doc
            .blocks
            .iter()
            .filter_map(Block::paragraph)
            .flat_map(|p| p.runs.iter())
            .filter(|r| r.field.is_some())
            .collect();
        assert_eq!(field_runs.len(), 1);
        assert_eq!(field_runs[0].text, "Cached text");
        assert_eq!(
            field_runs[0].field.as_ref().unwrap().result.as_deref(),
            Some("Cached text")
        );
    }

    #[test]
    fn hyperlinks_and_bookmarks() {
        let rels = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
            <Relationship Id="rId5" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com" TargetMode="External"/>
          </Relationships>"#;
        let body = r#"<w:p><w:bookmarkStart w:id="0" w:name="intro"/><w:r><w:t>Intro text</w:t></w:r><w:bookmarkEnd w:id="0"/></w:p>
            <w:p><w:hyperlink r:id="rId5"><w:r><w:t>site</w:t></w:r></w:hyperlink>
                 <w:hyperlink w:anchor="intro"><w:r><w:t>back</w:t></w:r></w:hyperlink></w:p>"#;
        let doc = parse(&package(body, &[("word/_rels/document.xml.rels", rels)])).unwrap();
        assert_eq!(doc.bookmarks.get("intro").map(String::as_str), Some("Intro text"));
        let Block::Paragraph(p) = &doc.blocks[1] else { panic!() };
        assert_eq!(p.runs[0].link.as_deref(), Some("https://example.com"));
        assert_eq!(p.runs[1].link.as_deref(), Some("#intro"));
    }

    #[test]
    fn list_markers_follow_numbering() {
        let numbering = format!(
            r#"<w:numbering {NS}>
              <w:abstractNum w:abstractNumId="0">
                <w:lvl w:ilvl="0"><w:start w:val="1"/><w:numFmt w:val="decimal"/><w:lvlText w:val="%1."/><w:pPr><w:ind w:left="720" w:hanging="360"/></w:pPr></w:lvl>
                <w:lvl w:ilvl="1"><w:start w:val="1"/><w:numFmt w:val="lowerLetter"/><w:lvlText w:val="%1.%2)"/></w:lvl>
                <w:lvl w:ilvl="2"><w:numFmt w:val="lowerRoman"/><w:lvlText w:val="%3"/></w:lvl>
              </w:abstractNum>
              <w:abstractNum w:abstractNumId="1">
                <w:lvl w:ilvl="0"><w:numFmt w:val="bullet"/><w:lvlText w:val="&#61623;"/></w:lvl>
              </w:abstractNum>
              <w:num w:numId="1"><w:abstractNumId w:val="0"/></w:num>
              <w:num w:numId="2"><w:abstractNumId w:val="1"/></w:num>
            </w:numbering>"#
        );
        let item = |num: u32, lvl: u32| {
            format!(
                r#"<w:p><w:pPr><w:numPr><w:ilvl w:val="{lvl}"/><w:numId w:val="{num}"/></w:numPr></w:pPr><w:r><w:t>x</w:t></w:r></w:p>"#
            )
        };
        let body = [item(1, 0), item(1, 1), item(1, 1), item(1, 2), item(1, 2), item(1, 0), item(1, 1), item(2, 0)]
            .concat();
        let doc = parse(&package(&body, &[("word/numbering.xml", &numbering)])).unwrap();
        let markers: Vec<&str> = doc
            .blocks
            .iter()
            .map(|b| match b {
                Block::ListItem(li) => li.marker.as_str(),
                _ => "",
            })
            .collect();
        assert_eq!(markers, vec!["1.", "1.a)", "1.b)", "i", "ii", "2.", "2.a)", "\u{2022}"]);
        let Block::ListItem(first) = &doc.blocks[0] else { panic!() };
        assert!(first.ordered);
        assert_eq!(first.paragraph.indent.left, 720.0);
        let Block::ListItem(bullet) = &doc.blocks[7] else { panic!() };
        assert!(!bullet.ordered);
    }

    #[test]
    fn tables_with_spans_merges_and_nesting() {
        let doc = parse_body(
            r#"<w:tbl><w:tblGrid><w:gridCol w:w="2000"/><w:gridCol w:w="3000"/></w:tblGrid>
                <w:tr><w:trPr><w:tblHeader/><w:trHeight w:val="400"/></w:trPr>
                  <w:tc><w:tcPr><w:gridSpan w:val="2"/></w:tcPr><w:p><w:r><w:t>wide</w:t></w:r></w:p></w:tc></w:tr>
                <w:tr>
                  <w:tc><w:tcPr><w:vMerge w:val="restart"/><w:tcW w:w="2000" w:type="dxa"/></w:tcPr><w:p/></w:tc>
                  <w:tc><w:tbl><w:tr><w:tc><w:p><w:r><w:t>inner</w:t></w:r></w:p></w:tc></w:tr></w:tbl><w:p/></w:tc></w:tr>
                <w:tr><w:tc><w:tcPr><w:vMerge/></w:tcPr><w:p/></w:tc><w:tc><w:p/></w:tc></w:tr>
              </w:tbl>"#,
        );
        let Block::Table(t) = &doc.blocks[0] else { panic!() };
        assert_eq!(t.id, TableId(0));
        assert_eq!(t.grid, vec![2000.0, 3000.0]);
        assert!(t.rows[0].header);
        assert_eq!(t.rows[0].height, Some(400.0));
        assert_eq!(t.rows[0].cells[0].col_span, 2);
        assert_eq!(t.rows[1].cells[0].v_merge, VMerge::Start);
        assert_eq!(t.rows[1].cells[0].width, Some(2000.0));
        assert_eq!(t.rows[2].cells[0].v_merge, VMerge::Continue);
        let Block::Table(inner) = &t.rows[1].cells[1].blocks[0] else { panic!() };
        assert_eq!(inner.id, TableId(1));
        assert_eq!(inner.rows[0].cells[0].plain_text(), "inner");
    }

    #[test]
    fn images_resolve_through_relationships() {
        let rels = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
            <Relationship Id="rId7" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/image1.png"/>
          </Relationships>"#;
        let body = r#"<w:p><w:r><w:drawing>
            <wp:inline xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing">
              <wp:extent cx="914400" cy="457200"/><wp:docPr id="1" name="Picture 1" descr="A chart"/>
              <a:graphic xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"><a:graphicData>
                <pic:pic xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture"><pic:blipFill>
                  <a:blip r:embed="rId7"/></pic:blipFill></pic:pic></a:graphicData></a:graphic>
            </wp:inline></w:drawing></w:r></w:p>"#;
        let doc = parse(&package(
            body,
            &[("word/_rels/document.xml.rels", rels), ("word/media/image1.png", "PNG")],
        ))
        .unwrap();
        assert_eq!(doc.blocks.len(), 1);
        let Block::Image(img) = &doc.blocks[0] else { panic!() };
        assert_eq!(img.part, "word/media/image1.png");
        assert_eq!(img.mime_type, "image/png");
        assert_eq!(img.width, 1440.0);
        assert_eq!(img.height, 720.0);
        assert_eq!(img.alt.as_deref(), Some("A chart"));
        assert_eq!(img.data, b"PNG");
    }

    #[test]
    fn section_geometry_and_headers() {
        let rels = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
            <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/header" Target="header1.xml"/>
            <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/header" Target="header2.xml"/>
            <Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/footer" Target="footer1.xml"/>
          </Relationships>"#;
        let header = |text: &str| format!(r#"<w:hdr {NS}><w:p><w:r><w:t>{text}</w:t></w:r></w:p></w:hdr>"#);
        let footer = format!(r#"<w:ftr {NS}><w:p><w:fldSimple w:instr="PAGE"/></w:p></w:ftr>"#);
        let h1 = header("Default header");
        let h2 = header("First header");
        let body = r#"<w:p/><w:sectPr>
              <w:headerReference w:type="default" r:id="rId1"/>
              <w:headerReference w:type="first" r:id="rId2"/>
              <w:footerReference w:type="bogus" r:id="rId3"/>
              <w:pgSz w:w="11906" w:h="16838"/><w:pgMar w:top="1440" w:right="1000" w:bottom="-1440" w:left="1000"/>
              <w:titlePg/></w:sectPr>"#;
        let doc = parse(&package(
            body,
            &[
                ("word/_rels/document.xml.rels", rels),
                ("word/header1.xml", &h1),
                ("word/header2.xml", &h2),
                ("word/footer1.xml", &footer),
            ],
        ))
        .unwrap();
        let page = doc.page.unwrap();
        assert_eq!(page.width, 11906.0);
        assert_eq!(page.margin_bottom, 1440.0);
        assert_eq!(page.margin_left, 1000.0);
        assert!(doc.different_first_page);
        assert_eq!(
            text_of(&doc.headers.get(PageClass::First).unwrap().blocks[0]),
            "First header"
        );
        assert_eq!(
            text_of(&doc.headers.get(PageClass::Default).unwrap().blocks[0]),
            "Default header"
        );
        let footer = doc.footers.get(PageClass::Default).unwrap();
        let run = &footer.blocks[0].paragraph().unwrap().runs[0];
        assert_eq!(run.field.as_ref().unwrap().kind, FieldKind::Page);
    }

    #[test]
    fn note_references_and_bodies() {
        let footnotes = format!(
            r#"<w:footnotes {NS}>
              <w:footnote w:type="separator" w:id="-1"><w:p><w:r><w:separator/></w:r></w:p></w:footnote>
              <w:footnote w:type="continuationSeparator" w:id="0"><w:p><w:r><w:continuationSeparator/></w:r></w:p></w:footnote>
              <w:footnote w:id="1"><w:p><w:r><w:footnoteRef/></w:r><w:r><w:t xml:space="preserve"> See chapter two.</w:t></w:r></w:p></w:footnote>
            </w:footnotes>"#
        );
        let endnotes = format!(
            r#"<w:endnotes {NS}><w:endnote w:id="1"><w:p><w:r><w:endnoteRef/></w:r><w:r><w:t>Closing remark.</w:t></w:r></w:p></w:endnote></w:endnotes>"#
        );
        let body = r#"<w:p><w:r><w:t>Claim</w:t></w:r><w:r><w:rPr><w:vertAlign w:val="superscript"/></w:rPr><w:footnoteReference w:id="1"/></w:r><w:r><w:t xml:space="preserve"> and more</w:t></w:r><w:r><w:endnoteReference w:id="1"/></w:r></w:p>"#;
        let doc = parse(&package(
            body,
            &[("word/footnotes.xml", &footnotes), ("word/endnotes.xml", &endnotes)],
        ))
        .unwrap();

        let runs = &doc.blocks[0].paragraph().unwrap().runs;
        let marks: Vec<_> = runs.iter().filter_map(|r| r.note.as_ref()).collect();
        assert_eq!(marks.len(), 2);
        assert_eq!(marks[0].kind, NoteKind::Footnote);
        assert_eq!(marks[0].label(), "1");
        assert_eq!(marks[1].label(), "e1");
        assert_eq!(runs[1].vert_align, VertAlign::Superscript);

        assert_eq!(doc.notes.len(), 2);
        assert_eq!(doc.notes[0].reference, *marks[0]);
        assert_eq!(text_of(&doc.notes[0].blocks[0]), " See chapter two.");
        assert_eq!(doc.notes[1].reference.kind, NoteKind::Endnote);
        assert_eq!(text_of(&doc.notes[1].blocks[0]), "Closing remark.");
    }

    #[test]
    fn unknown_elements_are_skipped() {
        let doc = parse_body(
            r#"<w:p><w:r><w:t>kept</w:t><w:unknownThing/></w:r><w:weird/></w:p>
               <w:mystery><w:p/></w:mystery>
               <w:sdt><w:sdtContent><w:p><w:r><w:t>in sdt</w:t></w:r></w:p></w:sdtContent></w:sdt>"#,
        );
        assert_eq!(doc.blocks.len(), 2);
        assert_eq!(text_of(&doc.blocks[0]), "kept");
        assert_eq!(text_of(&doc.blocks[1]), "in sdt");
    }

    #[test]
    fn number_formats() {
        assert_eq!(format_number(4, NumFormat::UpperRoman), "IV");
        assert_eq!(format_number(1994, NumFormat::LowerRoman), "mcmxciv");
        assert_eq!(format_number(28, NumFormat::LowerLetter), "bb");
        assert_eq!(format_number(3, NumFormat::UpperLetter), "C");
    }
}
