use chrono::{DateTime, Utc};

use crate::model::{Block, Counts, DeclaredCounts, Metadata};
use crate::package::Package;

const CORE_PART: &str = "docProps/core.xml";
const APP_PART: &str = "docProps/app.xml";

fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text.trim())
        .map(|d| d.with_timezone(&Utc))
        .ok()
}

fn non_empty(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
}

/// Reads `docProps/core.xml` and `docProps/app.xml`. Either part may be
/// missing or unreadable; the affected fields stay empty.
pub fn parse_properties(pkg: &Package) -> Metadata {
    let mut meta = Metadata::default();

    if let Some(xml_text) = pkg.get_xml(CORE_PART) {
        match roxmltree::Document::parse(xml_text) {
            Ok(xml) => {
                for node in xml.root_element().children().filter(|n| n.is_element()) {
                    let text = node.text();
                    match node.tag_name().name() {
                        "title" => meta.title = non_empty(text),
                        "subject" => meta.subject = non_empty(text),
                        "creator" => meta.author = non_empty(text),
                        "description" => meta.description = non_empty(text),
                        "language" => meta.language = non_empty(text),
                        "lastModifiedBy" => meta.last_modified_by = non_empty(text),
                        "revision" => meta.revision = text.and_then(|t| t.trim().parse().ok()),
                        "created" => meta.created = text.and_then(parse_date),
                        "modified" => meta.modified = text.and_then(parse_date),
                        "keywords" => {
                            meta.keywords = text
                                .unwrap_or("")
                                .split([',', ';'])
                                .map(str::trim)
                                .filter(|k| !k.is_empty())
                                .map(String::from)
                                .collect();
                        }
                        _ => {}
                    }
                }
            }
            Err(e) => log::warn!("{CORE_PART} unreadable: {e}"),
        }
    }

    if let Some(xml_text) = pkg.get_xml(APP_PART) {
        match roxmltree::Document::parse(xml_text) {
            Ok(xml) => {
                let mut declared = DeclaredCounts::default();
                for node in xml.root_element().children().filter(|n| n.is_element()) {
                    let text = node.text();
                    let count = || text.and_then(|t| t.trim().parse::<u32>().ok());
                    match node.tag_name().name() {
                        "Application" => meta.application = non_empty(text),
                        "Company" => meta.company = non_empty(text),
                        "Pages" => declared.pages = count(),
                        "Words" => declared.words = count(),
                        "Characters" => declared.characters = count(),
                        "Paragraphs" => declared.paragraphs = count(),
                        "Lines" => declared.lines = count(),
                        "Slides" => declared.slides = count(),
                        _ => {}
                    }
                }
                meta.declared = declared;
            }
            Err(e) => log::warn!("{APP_PART} unreadable: {e}"),
        }
    }

    meta
}

fn tally(blocks: &[Block], counts: &mut Counts) {
    for block in blocks {
        match block {
            Block::Paragraph(_) => counts.paragraphs += 1,
            Block::Heading(_) => counts.headings += 1,
            Block::ListItem(_) => counts.list_items += 1,
            Block::Image(_) => counts.images += 1,
            Block::PageBreak => counts.page_breaks += 1,
            Block::Table(table) => {
                counts.tables += 1;
                for cell in table.rows.iter().flat_map(|r| r.cells.iter()) {
                    tally(&cell.blocks, counts);
                }
            }
        }
        if let Some(p) = block.paragraph() {
            counts.words += p.plain_text().split_whitespace().count();
        }
    }
}

/// Statistics computed from the parsed tree, nested tables included.
pub fn count_blocks(blocks: &[Block]) -> Counts {
    let mut counts = Counts::default();
    tally(blocks, &mut counts);
    counts
}

impl Metadata {
    /// YAML front matter for Markdown output; empty when there is nothing to say.
    pub fn to_yaml_frontmatter(&self) -> String {
        let mut lines = vec!["---".to_string()];
        let quoted = [
            ("title", &self.title),
            ("author", &self.author),
            ("subject", &self.subject),
            ("description", &self.description),
            ("language", &self.language),
        ];
        for (key, value) in quoted {
            if let Some(value) = value {
                lines.push(format!("{key}: \"{}\"", escape_yaml(value)));
            }
        }
        if !self.keywords.is_empty() {
            let list: Vec<String> = self
                .keywords
                .iter()
                .map(|k| format!("\"{}\"", escape_yaml(k)))
                .collect();
            lines.push(format!("keywords: [{}]", list.join(", ")));
        }
        if let Some(created) = &self.created {
            lines.push(format!("created: {}", created.to_rfc3339()));
        }
        if let Some(modified) = &self.modified {
            lines.push(format!("modified: {}", modified.to_rfc3339()));
        }
        if lines.len() == 1 {
            return String::new();
        }
        lines.push(format!("words: {}", self.counts.words));
        lines.push("---".to_string());
        lines.push(String::new());
        lines.join("\n")
    }
}

fn escape_yaml(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
