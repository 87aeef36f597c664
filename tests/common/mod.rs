#![allow(dead_code)]

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;

pub const W_NS: &str = r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships""#;
pub const P_NS: &str = r#"xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships""#;

pub fn zip(parts: &[(&str, String)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in parts {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

pub fn document_xml(body: &str) -> String {
    format!(r#"<?xml version="1.0" encoding="UTF-8"?><w:document {W_NS}><w:body>{body}</w:body></w:document>"#)
}

/// A DOCX holding `body` plus any extra parts.
pub fn docx_with(body: &str, extra: &[(&str, String)]) -> Vec<u8> {
    let mut parts = vec![("word/document.xml", document_xml(body))];
    parts.extend(extra.iter().cloned());
    zip(&parts)
}

pub fn docx(body: &str) -> Vec<u8> {
    docx_with(body, &[])
}

pub fn para(text: &str) -> String {
    format!(r#"<w:p><w:r><w:t xml:space="preserve">{text}</w:t></w:r></w:p>"#)
}

pub fn styled(style: &str, text: &str) -> String {
    format!(r#"<w:p><w:pPr><w:pStyle w:val="{style}"/></w:pPr><w:r><w:t>{text}</w:t></w:r></w:p>"#)
}

pub fn cell(content: &str, tc_pr: &str) -> String {
    format!(r#"<w:tc><w:tcPr>{tc_pr}</w:tcPr>{}</w:tc>"#, para(content))
}

/// A 3×3 table whose middle column merges rows one and two.
pub fn merged_table() -> String {
    let row = |cells: [String; 3]| format!("<w:tr>{}</w:tr>", cells.concat());
    let plain = |t: &str| cell(t, "");
    format!(
        r#"<w:tbl><w:tblGrid><w:gridCol w:w="3000"/><w:gridCol w:w="3000"/><w:gridCol w:w="3000"/></w:tblGrid>{}{}{}</w:tbl>"#,
        row([plain("a1"), cell("b1", r#"<w:vMerge w:val="restart"/>"#), plain("c1")]),
        row([plain("a2"), cell("", "<w:vMerge/>"), plain("c2")]),
        row([plain("a3"), plain("b3"), plain("c3")]),
    )
}

pub fn slide(shapes: &str) -> String {
    format!(r#"<p:sld {P_NS}><p:cSld><p:spTree>{shapes}</p:spTree></p:cSld></p:sld>"#)
}

pub fn title_shape(text: &str) -> String {
    format!(
        r#"<p:sp><p:nvSpPr><p:cNvPr id="1" name="Title"/><p:cNvSpPr/><p:nvPr><p:ph type="title"/></p:nvPr></p:nvSpPr><p:txBody><a:p><a:r><a:t>{text}</a:t></a:r></a:p></p:txBody></p:sp>"#
    )
}

pub fn body_shape(lines: &[&str]) -> String {
    let paras: String = lines
        .iter()
        .map(|l| format!("<a:p><a:r><a:t>{l}</a:t></a:r></a:p>"))
        .collect();
    format!(
        r#"<p:sp><p:nvSpPr><p:cNvPr id="2" name="Body"/><p:cNvSpPr/><p:nvPr><p:ph idx="1"/></p:nvPr></p:nvSpPr><p:txBody>{paras}</p:txBody></p:sp>"#
    )
}

pub fn pptx(slides: &[String]) -> Vec<u8> {
    let mut parts = vec![(
        "ppt/presentation.xml".to_string(),
        format!(r#"<p:presentation {P_NS}><p:sldSz cx="9144000" cy="6858000"/></p:presentation>"#),
    )];
    for (i, body) in slides.iter().enumerate() {
        parts.push((format!("ppt/slides/slide{}.xml", i + 1), body.clone()));
    }
    let borrowed: Vec<(&str, String)> = parts.iter().map(|(n, b)| (n.as_str(), b.clone())).collect();
    zip(&borrowed)
}
