use std::collections::BTreeMap;

use crate::docx::{format_number, parse_hex_color};
use crate::error::{Error, Result};
use crate::metadata;
use crate::model::{
    Block, Cell, Heading, Image, ListItem, NumFormat, PageGeometry, Paragraph, ParsedDocument,
    Row, Run, Table, TableId, VMerge, VertAlign,
};
use crate::package::{self, Package, REL_NS};
use crate::units::{self, TargetUnit, Unit};

const PML_NS: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";
const DML_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";

const TITLE_LEVEL: u8 = 2;

type Node<'a> = roxmltree::Node<'a, 'a>;

fn child<'a>(node: Node<'a>, ns: &str, name: &str) -> Option<Node<'a>> {
    node.children()
        .find(|n| n.tag_name().name() == name && n.tag_name().namespace() == Some(ns))
}

fn pml<'a>(node: Node<'a>, name: &str) -> Option<Node<'a>> {
    child(node, PML_NS, name)
}

fn dml<'a>(node: Node<'a>, name: &str) -> Option<Node<'a>> {
    child(node, DML_NS, name)
}

fn dml_children<'a>(node: Node<'a>, name: &'static str) -> impl Iterator<Item = Node<'a>> + 'a {
    node.children()
        .filter(move |n| n.tag_name().name() == name && n.tag_name().namespace() == Some(DML_NS))
}

fn emu_attr(node: Option<Node>, attr: &str) -> f64 {
    node.and_then(|n| n.attribute(attr))
        .map(|v| units::parse_measure(v, Unit::Emu))
        .unwrap_or(0.0)
}

/// `ppt/slides/slide12.xml` → 12.
fn slide_number(name: &str) -> Option<u32> {
    name.strip_prefix("ppt/slides/slide")?
        .strip_suffix(".xml")?
        .parse()
        .ok()
}

/// Slide parts in presentation order: `sldIdLst` when it resolves, otherwise
/// numeric file-name order.
fn slide_parts(pkg: &Package, presentation: Option<Node>) -> Vec<String> {
    let listed: Vec<String> = presentation
        .and_then(|root| pml(root, "sldIdLst"))
        .into_iter()
        .flat_map(|list| list.children().filter(|n| n.is_element()))
        .filter_map(|sld| sld.attribute((REL_NS, "id")))
        .filter_map(|rid| pkg.resolve_relationship_from("ppt/presentation.xml", rid))
        .filter(|part| pkg.has_part(part))
        .map(String::from)
        .collect();
    if !listed.is_empty() {
        return listed;
    }
    let mut numbered: Vec<(u32, String)> = pkg
        .part_names()
        .filter_map(|name| slide_number(name).map(|n| (n, name.to_string())))
        .collect();
    numbered.sort();
    numbered.into_iter().map(|(_, name)| name).collect()
}

/// Marker suffix/format for `a:buAutoNum type="…"`.
fn auto_number_format(scheme: &str) -> (NumFormat, &'static str, &'static str) {
    let fmt = if scheme.starts_with("alphaLc") {
        NumFormat::LowerLetter
    } else if scheme.starts_with("alphaUc") {
        NumFormat::UpperLetter
    } else if scheme.starts_with("romanLc") {
        NumFormat::LowerRoman
    } else if scheme.starts_with("romanUc") {
        NumFormat::UpperRoman
    } else {
        NumFormat::Decimal
    };
    let (prefix, suffix) = if scheme.ends_with("ParenBoth") {
        ("(", ")")
    } else if scheme.ends_with("ParenR") {
        ("", ")")
    } else if scheme.ends_with("Plain") {
        ("", "")
    } else {
        ("", ".")
    };
    (fmt, prefix, suffix)
}

enum Bullet {
    None,
    Char,
    Auto { scheme: String, start: u32 },
}

struct SlideParser<'p> {
    pkg: &'p Package,
    part: String,
    slide: u32,
    next_table: usize,
}

impl SlideParser<'_> {
    fn link(&self, rpr: Option<Node>) -> Option<String> {
        let rid = rpr
            .and_then(|r| dml(r, "hlinkClick"))
            .and_then(|h| h.attribute((REL_NS, "id")))?;
        self.pkg
            .resolve_relationship_from(&self.part, rid)
            .map(String::from)
    }

    fn run(&self, text: &str, rpr: Option<Node>) -> Run {
        let attr = |name: &str| rpr.and_then(|r| r.attribute(name));
        let flag = |name: &str| matches!(attr(name), Some("1" | "true"));
        let baseline = attr("baseline").and_then(|v| v.parse::<i32>().ok()).unwrap_or(0);
        Run {
            text: text.to_string(),
            bold: flag("b"),
            italic: flag("i"),
            underline: attr("u").is_some_and(|u| u != "none"),
            strike: attr("strike").is_some_and(|s| s != "noStrike"),
            vert_align: match baseline {
                b if b > 0 => VertAlign::Superscript,
                b if b < 0 => VertAlign::Subscript,
                _ => VertAlign::Baseline,
            },
            color: rpr
                .and_then(|r| dml(r, "solidFill"))
                .and_then(|f| dml(f, "srgbClr"))
                .and_then(|c| c.attribute("val"))
                .and_then(parse_hex_color),
            // Hundredths of a point.
            font_size: attr("sz")
                .and_then(|v| v.parse::<f64>().ok())
                .map(|v| units::convert(v / 100.0, Unit::Point, TargetUnit::Twips)),
            link: self.link(rpr),
            field: None,
            note: None,
        }
    }

    fn runs(&self, para: Node) -> Vec<Run> {
        let mut runs = Vec::new();
        for node in para.children().filter(|n| n.tag_name().namespace() == Some(DML_NS)) {
            match node.tag_name().name() {
                "r" | "fld" => {
                    let text = dml(node, "t").and_then(|t| t.text()).unwrap_or("");
                    if !text.is_empty() {
                        runs.push(self.run(text, dml(node, "rPr")));
                    }
                }
                "br" => runs.push(Run::text("\n")),
                _ => {}
            }
        }
        runs
    }

    fn bullet(para: Node, bulleted_by_default: bool) -> Bullet {
        let ppr = dml(para, "pPr");
        if ppr.and_then(|p| dml(p, "buNone")).is_some() {
            return Bullet::None;
        }
        if let Some(auto) = ppr.and_then(|p| dml(p, "buAutoNum")) {
            return Bullet::Auto {
                scheme: auto.attribute("type").unwrap_or("arabicPeriod").to_string(),
                start: auto
                    .attribute("startAt")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1),
            };
        }
        if ppr.and_then(|p| dml(p, "buChar")).is_some() || bulleted_by_default {
            Bullet::Char
        } else {
            Bullet::None
        }
    }

    fn shape(&mut self, sp: Node, out: &mut Vec<Block>) {
        let ph_type = pml(sp, "nvSpPr")
            .and_then(|nv| pml(nv, "nvPr"))
            .and_then(|nv| pml(nv, "ph"))
            .map(|ph| ph.attribute("type").unwrap_or("body"));
        let Some(body) = pml(sp, "txBody") else { return };

        if matches!(ph_type, Some("title" | "ctrTitle")) {
            let mut runs = Vec::new();
            for para in dml_children(body, "p") {
                let para_runs = self.runs(para);
                if para_runs.is_empty() {
                    continue;
                }
                if !runs.is_empty() {
                    runs.push(Run::text(" "));
                }
                runs.extend(para_runs);
            }
            if !runs.is_empty() {
                out.push(Block::Heading(Heading {
                    level: TITLE_LEVEL,
                    paragraph: Paragraph {
                        runs,
                        ..Paragraph::default()
                    },
                }));
            }
            return;
        }

        let bulleted_by_default = matches!(ph_type, Some("body" | "obj"));
        let mut counters: BTreeMap<u8, u32> = BTreeMap::new();
        for para in dml_children(body, "p") {
            let runs = self.runs(para);
            if runs.iter().all(|r| r.text.trim().is_empty()) {
                continue;
            }
            let level = dml(para, "pPr")
                .and_then(|p| p.attribute("lvl"))
                .and_then(|v| v.parse::<u8>().ok())
                .unwrap_or(0);
            let paragraph = Paragraph {
                runs,
                ..Paragraph::default()
            };
            let (marker, ordered) = match Self::bullet(para, bulleted_by_default) {
                Bullet::None => {
                    out.push(Block::Paragraph(paragraph));
                    continue;
                }
                Bullet::Char => ("\u{2022}".to_string(), false),
                Bullet::Auto { scheme, start } => {
                    counters.retain(|l, _| *l <= level);
                    let n = counters.entry(level).and_modify(|c| *c += 1).or_insert(start);
                    let (fmt, prefix, suffix) = auto_number_format(&scheme);
                    (format!("{prefix}{}{suffix}", format_number(*n, fmt)), true)
                }
            };
            out.push(Block::ListItem(ListItem {
                num_id: format!("slide{}", self.slide),
                level,
                marker,
                ordered,
                paragraph,
            }));
        }
    }

    fn picture(&self, pic: Node) -> Option<Image> {
        let rid = pml(pic, "blipFill")
            .and_then(|f| dml(f, "blip"))
            .and_then(|b| b.attribute((REL_NS, "embed")))?;
        let part = self.pkg.resolve_relationship_from(&self.part, rid)?.to_string();
        let ext = pml(pic, "spPr")
            .and_then(|sp| dml(sp, "xfrm"))
            .and_then(|x| dml(x, "ext"));
        let alt = pml(pic, "nvPicPr")
            .and_then(|nv| pml(nv, "cNvPr"))
            .and_then(|c| c.attribute("descr"))
            .filter(|d| !d.trim().is_empty())
            .map(String::from);
        Some(Image {
            mime_type: package::mime_type(&part).to_string(),
            data: self.pkg.get_part(&part).map(<[u8]>::to_vec).unwrap_or_default(),
            part,
            width: emu_attr(ext, "cx"),
            height: emu_attr(ext, "cy"),
            alt,
        })
    }

    fn table(&mut self, tbl: Node) -> Table {
        let id = TableId(self.next_table);
        self.next_table += 1;
        let grid = dml(tbl, "tblGrid")
            .into_iter()
            .flat_map(|g| dml_children(g, "gridCol"))
            .map(|c| emu_attr(Some(c), "w"))
            .collect();
        let rows = dml_children(tbl, "tr")
            .map(|tr| Row {
                height: tr.attribute("h").map(|v| units::parse_measure(v, Unit::Emu)),
                header: false,
                cells: dml_children(tr, "tc")
                    .filter(|tc| tc.attribute("hMerge") != Some("1"))
                    .map(|tc| {
                        let v_merge = if tc.attribute("vMerge") == Some("1") {
                            VMerge::Continue
                        } else if tc
                            .attribute("rowSpan")
                            .and_then(|v| v.parse::<u32>().ok())
                            .is_some_and(|s| s > 1)
                        {
                            VMerge::Start
                        } else {
                            VMerge::None
                        };
                        let blocks = dml(tc, "txBody")
                            .into_iter()
                            .flat_map(|body| dml_children(body, "p"))
                            .map(|p| {
                                Block::Paragraph(Paragraph {
                                    runs: self.runs(p),
                                    ..Paragraph::default()
                                })
                            })
                            .collect();
                        Cell {
                            blocks,
                            col_span: tc
                                .attribute("gridSpan")
                                .and_then(|v| v.parse().ok())
                                .unwrap_or(1),
                            v_merge,
                            width: None,
                        }
                    })
                    .collect(),
            })
            .collect();
        Table { id, grid, rows }
    }

    fn shape_tree(&mut self, tree: Node, out: &mut Vec<Block>) {
        for node in tree.children().filter(|n| n.tag_name().namespace() == Some(PML_NS)) {
            match node.tag_name().name() {
                "sp" => self.shape(node, out),
                "pic" => match self.picture(node) {
                    Some(img) => out.push(Block::Image(img)),
                    None => log::debug!("slide {}: picture without resolvable blip", self.slide),
                },
                "grpSp" => self.shape_tree(node, out),
                "graphicFrame" => {
                    let table = node
                        .descendants()
                        .find(|n| n.tag_name().name() == "tbl" && n.tag_name().namespace() == Some(DML_NS));
                    if let Some(tbl) = table {
                        out.push(Block::Table(self.table(tbl)));
                    }
                }
                _ => {}
            }
        }
    }
}

fn slide_geometry(presentation: Option<Node>) -> Option<PageGeometry> {
    let size = presentation.and_then(|root| pml(root, "sldSz"))?;
    let half_inch = units::convert(0.5, Unit::Inch, TargetUnit::Twips);
    Some(PageGeometry {
        width: emu_attr(Some(size), "cx"),
        height: emu_attr(Some(size), "cy"),
        margin_top: half_inch,
        margin_right: half_inch,
        margin_bottom: half_inch,
        margin_left: half_inch,
        ..PageGeometry::default()
    })
}

pub fn parse(pkg: &Package) -> Result<ParsedDocument> {
    let presentation_xml = match pkg.get_xml("ppt/presentation.xml") {
        Some(text) => Some(
            roxmltree::Document::parse(text)
                .map_err(|e| Error::XmlParse(format!("ppt/presentation.xml ({e})")))?,
        ),
        None => None,
    };
    let presentation = presentation_xml.as_ref().map(|x| x.root_element());

    let slides = slide_parts(pkg, presentation);
    let mut blocks = Vec::new();
    let mut next_table = 0;
    let mut emitted = 0;
    for (i, part) in slides.iter().enumerate() {
        let Some(xml_text) = pkg.get_xml(part) else {
            log::warn!("slide part {part} is not readable text");
            continue;
        };
        let xml = match roxmltree::Document::parse(xml_text) {
            Ok(xml) => xml,
            Err(e) => {
                log::warn!("skipping malformed {part}: {e}");
                continue;
            }
        };
        if emitted > 0 {
            blocks.push(Block::PageBreak);
        }
        emitted += 1;
        let mut parser = SlideParser {
            pkg,
            part: part.clone(),
            slide: i as u32 + 1,
            next_table,
        };
        if let Some(tree) = pml(xml.root_element(), "cSld").and_then(|c| pml(c, "spTree")) {
            parser.shape_tree(tree, &mut blocks);
        }
        next_table = parser.next_table;
    }

    let mut metadata = metadata::parse_properties(pkg);
    metadata.counts = metadata::count_blocks(&blocks);
    if metadata.declared.slides.is_none() {
        metadata.declared.slides = u32::try_from(slides.len()).ok();
    }
    log::info!("parsed presentation: {} slides, {} blocks", slides.len(), blocks.len());

    Ok(ParsedDocument {
        blocks,
        metadata,
        page: slide_geometry(presentation),
        ..ParsedDocument::default()
    })
}
