use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read};

use crate::error::{Error, Result};

pub(crate) const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PKG_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const OFFICE_DOCUMENT_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";

/// Total decompressed bytes [`Package::open`] accepts.
pub const DEFAULT_EXTRACT_LIMIT: usize = 100 * 1024 * 1024;

/// Main parts probed when `_rels/.rels` does not name one.
const FALLBACK_MAIN_PARTS: [&str; 2] = ["word/document.xml", "ppt/presentation.xml"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    /// Package part name, or the verbatim URL for external targets.
    pub target: String,
    pub external: bool,
}

impl Relationship {
    /// Last path segment of the relationship type, e.g. `header`, `image`.
    pub fn kind(&self) -> &str {
        self.rel_type.rsplit('/').next().unwrap_or(&self.rel_type)
    }
}

/// An opened OOXML container. Every part is extracted up front, so the
/// handle owns its data and can move across threads.
#[derive(Debug)]
pub struct Package {
    parts: BTreeMap<String, Vec<u8>>,
    rels: HashMap<String, Vec<Relationship>>,
    main_part: String,
}

impl Package {
    pub fn open(buffer: &[u8]) -> Result<Self> {
        Self::open_with_limit(buffer, DEFAULT_EXTRACT_LIMIT)
    }

    /// Like [`Package::open`], failing once the parts decompress to more
    /// than `limit` bytes in total.
    pub fn open_with_limit(buffer: &[u8], limit: usize) -> Result<Self> {
        let mut zip = zip::ZipArchive::new(Cursor::new(buffer))
            .map_err(|e| Error::PackageRead(format!("not a ZIP container ({e})")))?;

        let mut parts = BTreeMap::new();
        let mut extracted = 0usize;
        for i in 0..zip.len() {
            let mut file = zip.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().trim_start_matches('/').to_string();
            let budget = u64::try_from(limit - extracted).unwrap_or(u64::MAX);
            let mut data = Vec::new();
            (&mut file).take(budget.saturating_add(1)).read_to_end(&mut data)?;
            extracted += data.len();
            if extracted > limit {
                return Err(Error::PackageRead(format!(
                    "parts decompress to more than {limit} bytes (stopped at {name})"
                )));
            }
            parts.insert(name, data);
        }

        let mut rels = HashMap::new();
        for (name, data) in &parts {
            let Some(source) = rels_source_part(name) else {
                continue;
            };
            let Some(text) = decode_text(data) else {
                log::warn!("relationship part {name} is not UTF-8, ignoring");
                continue;
            };
            match parse_relationships(text, &source) {
                Ok(list) => {
                    rels.insert(source, list);
                }
                Err(e) => log::warn!("unreadable relationship part {name}: {e}"),
            }
        }

        let declared = rels.get("").and_then(|root: &Vec<Relationship>| {
            root.iter()
                .find(|r| r.rel_type == OFFICE_DOCUMENT_REL && !r.external)
                .map(|r| r.target.clone())
        });
        let main_part = declared
            .filter(|name| parts.contains_key(name))
            .or_else(|| {
                FALLBACK_MAIN_PARTS
                    .iter()
                    .find(|name| parts.contains_key(**name))
                    .map(|name| name.to_string())
            })
            .ok_or_else(|| Error::PackageRead("missing main content part".into()))?;

        log::debug!("opened package: {} parts, main part {main_part}", parts.len());
        Ok(Self {
            parts,
            rels,
            main_part,
        })
    }

    pub fn main_part(&self) -> &str {
        &self.main_part
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.keys().map(String::as_str)
    }

    pub fn has_part(&self, name: &str) -> bool {
        self.parts.contains_key(name)
    }

    pub fn get_part(&self, name: &str) -> Option<&[u8]> {
        self.parts.get(name).map(Vec::as_slice)
    }

    /// A part's XML payload as text, without any byte-order mark.
    pub fn get_xml(&self, name: &str) -> Option<&str> {
        self.parts.get(name).and_then(|data| decode_text(data))
    }

    pub fn relationships(&self, part: &str) -> &[Relationship] {
        self.rels.get(part).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn relationship_from(&self, part: &str, id: &str) -> Option<&Relationship> {
        self.relationships(part).iter().find(|r| r.id == id)
    }

    /// Resolves an id from the main content part's relationships.
    pub fn resolve_relationship(&self, id: &str) -> Option<&str> {
        self.resolve_relationship_from(&self.main_part, id)
    }

    pub fn resolve_relationship_from(&self, part: &str, id: &str) -> Option<&str> {
        let rel = self.relationship_from(part, id);
        if rel.is_none() {
            log::warn!("no relationship {id} from {part}");
        }
        rel.map(|r| r.target.as_str())
    }
}

pub(crate) fn mime_type(part: &str) -> &'static str {
    let ext = part.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("tif" | "tiff") => "image/tiff",
        Some("svg") => "image/svg+xml",
        Some("emf") => "image/x-emf",
        Some("wmf") => "image/x-wmf",
        _ => "application/octet-stream",
    }
}

fn decode_text(data: &[u8]) -> Option<&str> {
    let text = std::str::from_utf8(data).ok()?;
    Some(text.strip_prefix('\u{feff}').unwrap_or(text))
}

/// `word/_rels/document.xml.rels` → `word/document.xml`; `_rels/.rels` → ``.
fn rels_source_part(name: &str) -> Option<String> {
    let file = name.strip_suffix(".rels")?;
    let (dir, file) = match file.rsplit_once('/') {
        Some((dir, file)) => (dir, file),
        None => return None,
    };
    let parent = if dir == "_rels" {
        ""
    } else {
        dir.strip_suffix("/_rels")?
    };
    Some(if parent.is_empty() {
        file.to_string()
    } else {
        format!("{parent}/{file}")
    })
}

fn parse_relationships(xml_text: &str, source: &str) -> Result<Vec<Relationship>> {
    let xml = roxmltree::Document::parse(xml_text)?;
    let mut list = Vec::new();
    for node in xml.root_element().children() {
        if node.tag_name().name() != "Relationship"
            || !matches!(node.tag_name().namespace(), Some(PKG_REL_NS) | None)
        {
            continue;
        }
        let (Some(id), Some(target)) = (node.attribute("Id"), node.attribute("Target")) else {
            log::debug!("skipping relationship without Id/Target in {source}");
            continue;
        };
        let external = node.attribute("TargetMode") == Some("External");
        let target = if external {
            target.to_string()
        } else {
            normalize_target(source, target)
        };
        list.push(Relationship {
            id: id.to_string(),
            rel_type: node.attribute("Type").unwrap_or_default().to_string(),
            target,
            external,
        });
    }
    Ok(list)
}

/// Resolves `target` against the directory of `source`.
pub(crate) fn normalize_target(source: &str, target: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    if let Some(absolute) = target.strip_prefix('/') {
        return collapse(segments, absolute);
    }
    if let Some((dir, _)) = source.rsplit_once('/') {
        segments.extend(dir.split('/').filter(|s| !s.is_empty()));
    }
    collapse(segments, target)
}

fn collapse<'a>(mut segments: Vec<&'a str>, path: &'a str) -> String {
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::write::SimpleFileOptions;

    use super::*;

    fn build(parts: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in parts {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    const DOC_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/header" Target="header1.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="../word/media/../media/image1.png"/>
  <Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com/a/../b" TargetMode="External"/>
</Relationships>"#;

    #[test]
    fn rejects_non_zip() {
        let err = Package::open(b"plain text").unwrap_err();
        assert!(matches!(err, Error::PackageRead(_)));
    }

    #[test]
    fn rejects_missing_main_part() {
        let buf = build(&[("docProps/core.xml", "<x/>")]);
        let err = Package::open(&buf).unwrap_err();
        assert_eq!(err.to_string(), "cannot read package: missing main content part");
    }

    #[test]
    fn decompressed_size_is_capped() {
        let body = format!("<w:document>{}</w:document>", "x".repeat(4096));
        let buf = build(&[("word/document.xml", &body)]);
        let err = Package::open_with_limit(&buf, 1024).unwrap_err();
        assert!(matches!(err, Error::PackageRead(_)));
        assert!(err.to_string().contains("more than 1024 bytes"));
        assert!(Package::open_with_limit(&buf, body.len()).is_ok());
    }

    #[test]
    fn resolves_relationships_against_part_directory() {
        let buf = build(&[
            ("word/document.xml", "<w:document/>"),
            ("word/_rels/document.xml.rels", DOC_RELS),
        ]);
        let pkg = Package::open(&buf).unwrap();
        assert_eq!(pkg.main_part(), "word/document.xml");
        assert_eq!(pkg.resolve_relationship("rId1"), Some("word/header1.xml"));
        assert_eq!(pkg.resolve_relationship("rId2"), Some("word/media/image1.png"));
        assert_eq!(pkg.resolve_relationship("rId3"), Some("https://example.com/a/../b"));
        assert_eq!(pkg.resolve_relationship("rId9"), None);
        assert_eq!(pkg.relationship_from("word/document.xml", "rId1").unwrap().kind(), "header");
    }

    #[test]
    fn main_part_from_package_relationships() {
        let root = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="r1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="/word/document2.xml"/>
</Relationships>"#;
        let buf = build(&[("_rels/.rels", root), ("word/document2.xml", "\u{feff}<w:document/>")]);
        let pkg = Package::open(&buf).unwrap();
        assert_eq!(pkg.main_part(), "word/document2.xml");
        assert_eq!(pkg.get_xml("word/document2.xml"), Some("<w:document/>"));
    }

    #[test]
    fn rels_source_names() {
        assert_eq!(rels_source_part("_rels/.rels").as_deref(), Some(""));
        assert_eq!(
            rels_source_part("ppt/slides/_rels/slide1.xml.rels").as_deref(),
            Some("ppt/slides/slide1.xml")
        );
        assert_eq!(rels_source_part("word/document.xml"), None);
    }

    #[test]
    fn normalizes_targets() {
        assert_eq!(normalize_target("ppt/slides/slide1.xml", "../media/a.png"), "ppt/media/a.png");
        assert_eq!(normalize_target("word/document.xml", "/word/x.xml"), "word/x.xml");
        assert_eq!(normalize_target("", "word/document.xml"), "word/document.xml");
    }
}
