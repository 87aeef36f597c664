mod common;

use chrono::{Local, TimeZone};
use docxview::model::{Block, TableId};
use docxview::{
    Config, ErrorKind, FieldContext, FileType, MarkdownOptions, OutputFormat, parse_bytes,
    parse_bytes_as, resolve, to_markdown,
};

use common::*;

fn fixed_clock() -> FieldContext {
    FieldContext::at(Local.with_ymd_and_hms(2024, 6, 1, 14, 30, 0).unwrap())
}

#[test]
fn three_by_three_merge_example() {
    let doc = parse_bytes(&docx(&merged_table())).unwrap();
    let resolved = resolve(doc, &fixed_clock());
    let Block::Table(table) = &resolved.doc.blocks[0] else {
        panic!("expected a table");
    };
    assert_eq!(table.id, TableId(0));
    let merges = &resolved.merges;
    let head = merges.cell(table.id, 0, 1).unwrap();
    assert_eq!(head.row_span, 2);
    assert!(!head.hidden);
    assert!(merges.cell(table.id, 1, 1).unwrap().hidden);
    let visible = (0..3)
        .filter(|r| !merges.cell(table.id, *r, 1).unwrap().hidden)
        .count();
    assert_eq!(visible, 2);
    assert_eq!(merges.entries(table.id).count(), 9);
}

#[test]
fn merged_table_markdown_uses_rowspan() {
    let resolved = resolve(parse_bytes(&docx(&merged_table())).unwrap(), &fixed_clock());
    let md = to_markdown(&resolved, &MarkdownOptions::default());
    assert!(md.contains("<td rowspan=\"2\">b1</td>"));
    assert_eq!(md.matches("<td").count(), 8);
}

#[test]
fn uncached_fields_render_placeholders() {
    let body = [
        r#"<w:p><w:r><w:t xml:space="preserve">Pages: </w:t></w:r><w:fldSimple w:instr=" NUMPAGES "/></w:p>"#,
        r#"<w:p><w:fldSimple w:instr="AUTHOR"/><w:r><w:t xml:space="preserve"> / </w:t></w:r><w:fldSimple w:instr="REF bookmark1 \h"/></w:p>"#,
        r#"<w:p><w:fldSimple w:instr="HYPERLINK &quot;https://example.com&quot;"/></w:p>"#,
        r#"<w:p><w:fldSimple w:instr="DATE \@ &quot;M/d/yyyy&quot;"/><w:r><w:t xml:space="preserve"> at </w:t></w:r><w:fldSimple w:instr="TIME"/></w:p>"#,
        r#"<w:p><w:r><w:fldChar w:fldCharType="begin"/></w:r><w:r><w:instrText xml:space="preserve"> TOC \o "1-3" </w:instrText></w:r><w:r><w:fldChar w:fldCharType="end"/></w:r><w:r><w:t>after toc</w:t></w:r></w:p>"#,
        r#"<w:p><w:r><w:t xml:space="preserve">Page </w:t></w:r><w:fldSimple w:instr="PAGE"/></w:p>"#,
    ]
    .concat();
    let resolved = resolve(parse_bytes(&docx(&body)).unwrap(), &fixed_clock());
    let md = to_markdown(&resolved, &MarkdownOptions::default());
    assert!(md.contains("Pages: [Total Pages]"), "{md}");
    assert!(md.contains("[Author] / [Reference: REF bookmark1 \\h]"), "{md}");
    assert!(md.contains("<https://example.com>"), "{md}");
    assert!(md.contains("6/1/2024 at 14:30"), "{md}");
    assert!(md.contains("\nafter toc\n"), "{md}");
    assert!(md.contains("Page [Page]"), "{md}");
}

#[test]
fn cached_field_result_wins() {
    let body = r#"<w:p><w:r><w:fldChar w:fldCharType="begin"/></w:r><w:r><w:instrText>AUTHOR</w:instrText></w:r><w:r><w:fldChar w:fldCharType="separate"/></w:r><w:r><w:t>Grace Hopper</w:t></w:r><w:r><w:fldChar w:fldCharType="end"/></w:r></w:p>"#;
    let resolved = resolve(parse_bytes(&docx(body)).unwrap(), &fixed_clock());
    let md = to_markdown(&resolved, &MarkdownOptions::default());
    assert_eq!(md, "Grace Hopper\n");
}

#[test]
fn markdown_document_structure() {
    let styles = format!(
        r#"<w:styles {W_NS}><w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/></w:style></w:styles>"#
    );
    let numbering = format!(
        r#"<w:numbering {W_NS}>
          <w:abstractNum w:abstractNumId="0">
            <w:lvl w:ilvl="0"><w:start w:val="1"/><w:numFmt w:val="decimal"/><w:lvlText w:val="%1."/></w:lvl>
          </w:abstractNum>
          <w:num w:numId="5"><w:abstractNumId w:val="0"/></w:num>
        </w:numbering>"#
    );
    let item = |text: &str| {
        format!(
            r#"<w:p><w:pPr><w:numPr><w:ilvl w:val="0"/><w:numId w:val="5"/></w:numPr></w:pPr><w:r><w:t>{text}</w:t></w:r></w:p>"#
        )
    };
    let body = [
        styled("Heading1", "Overview"),
        para("Intro paragraph."),
        item("first"),
        item("second"),
        para("Closing."),
    ]
    .concat();
    let buffer = docx_with(
        &body,
        &[("word/styles.xml", styles), ("word/numbering.xml", numbering)],
    );
    let output = docxview::convert_bytes(&buffer, OutputFormat::Markdown, &Config::default()).unwrap();
    assert_eq!(
        output.as_str(),
        "# Overview\n\nIntro paragraph.\n\n1. first\n2. second\n\nClosing.\n"
    );
}

#[test]
fn json_output_is_the_parsed_tree() {
    let buffer = docx(&[styled("Title", "Report"), para("Body")].concat());
    let output = docxview::convert_bytes(&buffer, OutputFormat::Json, &Config::default()).unwrap();
    let value: serde_json::Value = serde_json::from_str(output.as_str()).unwrap();
    assert_eq!(value["blocks"][0]["type"], "heading");
    assert_eq!(value["blocks"][0]["level"], 1);
    assert_eq!(value["blocks"][1]["type"], "paragraph");
    assert_eq!(value["metadata"]["counts"]["paragraphs"], 1);
}

#[test]
fn presentations_convert_slide_by_slide() {
    let buffer = pptx(&[
        slide(&[title_shape("Welcome"), body_shape(&["Point one", "Point two"])].concat()),
        slide(&title_shape("Second")),
    ]);
    let doc = parse_bytes(&buffer).unwrap();
    assert_eq!(doc.metadata.counts.page_breaks, 1);
    let output = docxview::convert_bytes(&buffer, OutputFormat::Markdown, &Config::default()).unwrap();
    assert_eq!(
        output.as_str(),
        "## Welcome\n\n- Point one\n- Point two\n\n## Second\n"
    );
}

#[test]
fn failures_map_to_error_kinds() {
    let config = Config::default();
    let err = docxview::convert_bytes(b"plain text", OutputFormat::Markdown, &config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PackageRead);

    let err = parse_bytes_as(&docx(&para("x")), FileType::Keynote).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    assert_eq!(err.to_string(), "Keynote documents are not yet supported");

    let broken = zip(&[("word/document.xml", "<w:document".to_string())]);
    let err = parse_bytes(&broken).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::XmlParse);

    let small = Config {
        max_file_size: 16,
        ..Config::default()
    };
    let err = docxview::convert_bytes(&docx(&para("x")), OutputFormat::Markdown, &small).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PackageRead);
}

#[test]
fn offloaded_conversion_matches_inline() {
    let buffer = docx(&[para("alpha"), merged_table(), para("omega")].concat());
    let inline = docxview::convert_bytes(&buffer, OutputFormat::Markdown, &Config::default()).unwrap();
    let offload = Config {
        worker_threshold: 0,
        ..Config::default()
    };
    let worker = docxview::convert_bytes_auto(buffer, None, OutputFormat::Markdown, &offload).unwrap();
    assert_eq!(inline, worker);
}

#[test]
fn unsupported_formats_fail_on_the_worker_too() {
    let offload = Config {
        worker_threshold: 0,
        ..Config::default()
    };
    let err = docxview::convert_bytes_auto(
        docx(&para("x")),
        Some(FileType::Pages),
        OutputFormat::Html,
        &offload,
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    assert!(err.to_string().contains("Pages documents are not yet supported"));

    let err = docxview::convert_bytes_auto(b"not a zip".to_vec(), None, OutputFormat::Markdown, &offload)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PackageRead);
}

#[test]
fn batches_keep_input_order() {
    let config = Config {
        max_workers: 2,
        ..Config::default()
    };
    let inputs = vec![
        (docx(&para("first")), None),
        (b"not a zip".to_vec(), None),
        (docx(&para("third")), None),
    ];
    let results = docxview::convert_many(inputs, OutputFormat::Markdown, &config).unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().as_str(), "first\n");
    assert_eq!(results[1].as_ref().unwrap_err().kind(), ErrorKind::PackageRead);
    assert_eq!(results[2].as_ref().unwrap().as_str(), "third\n");
}

#[test]
fn footnotes_render_as_markdown_definitions() {
    let body = r#"<w:p><w:r><w:t>Revenue grew</w:t></w:r><w:r><w:rPr><w:vertAlign w:val="superscript"/></w:rPr><w:footnoteReference w:id="2"/></w:r><w:r><w:t>.</w:t></w:r></w:p>"#;
    let footnotes = format!(
        r#"<w:footnotes {W_NS}>
          <w:footnote w:type="separator" w:id="-1"><w:p><w:r><w:separator/></w:r></w:p></w:footnote>
          <w:footnote w:id="2"><w:p><w:r><w:footnoteRef/></w:r><w:r><w:t xml:space="preserve"> Audited by </w:t></w:r><w:fldSimple w:instr="AUTHOR"/></w:p></w:footnote>
        </w:footnotes>"#
    );
    let buffer = docx_with(body, &[("word/footnotes.xml", footnotes)]);
    let output = docxview::convert_bytes(&buffer, OutputFormat::Markdown, &Config::default()).unwrap();
    assert_eq!(
        output.as_str(),
        "Revenue grew[^2].\n\n[^2]: Audited by [Author]\n"
    );

    let html = docxview::convert_bytes(&buffer, OutputFormat::Html, &Config::default()).unwrap();
    assert!(html.as_str().contains("<sup class=\"docxview-note-ref\">2</sup>"));
    assert!(html.as_str().contains("data-note=\"2\""));
}
