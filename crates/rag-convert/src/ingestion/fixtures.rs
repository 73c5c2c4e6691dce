//! In-memory Office documents for parser and engine tests

use std::io::Write;
use std::path::{Path, PathBuf};

const SPREADSHEET_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const RELATIONSHIPS_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PACKAGE_RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Zip archive with the given entries
pub fn zip_bytes(entries: &[(String, String)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, content) in entries {
        zip.start_file(name.as_str(), options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// Minimal `.xlsx` with one worksheet per `(name, rows)`, cells as inline strings
pub fn workbook(sheets: &[(&str, &[&[&str]])]) -> Vec<u8> {
    let mut entries = Vec::new();

    let sheet_list: String = sheets
        .iter()
        .enumerate()
        .map(|(i, (name, _))| {
            format!(
                r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
                escape(name),
                i + 1,
                i + 1
            )
        })
        .collect();
    entries.push((
        "xl/workbook.xml".to_string(),
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="{}" xmlns:r="{}"><sheets>{}</sheets></workbook>"#,
            SPREADSHEET_NS, RELATIONSHIPS_NS, sheet_list
        ),
    ));

    let rels: String = (1..=sheets.len())
        .map(|i| {
            format!(
                r#"<Relationship Id="rId{}" Type="{}/worksheet" Target="worksheets/sheet{}.xml"/>"#,
                i, RELATIONSHIPS_NS, i
            )
        })
        .collect();
    entries.push((
        "xl/_rels/workbook.xml.rels".to_string(),
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{}">{}</Relationships>"#,
            PACKAGE_RELS_NS, rels
        ),
    ));

    for (i, (_, rows)) in sheets.iter().enumerate() {
        let rows_xml: String = rows
            .iter()
            .enumerate()
            .map(|(r, cells)| {
                let cells_xml: String = cells
                    .iter()
                    .enumerate()
                    .map(|(c, value)| {
                        let column = (b'A' + c as u8) as char;
                        format!(
                            r#"<c r="{}{}" t="inlineStr"><is><t>{}</t></is></c>"#,
                            column,
                            r + 1,
                            escape(value)
                        )
                    })
                    .collect();
                format!(r#"<row r="{}">{}</row>"#, r + 1, cells_xml)
            })
            .collect();
        entries.push((
            format!("xl/worksheets/sheet{}.xml", i + 1),
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="{}"><sheetData>{}</sheetData></worksheet>"#,
                SPREADSHEET_NS, rows_xml
            ),
        ));
    }

    zip_bytes(&entries)
}

/// Minimal `.pptx` with one text box per paragraph on each slide
pub fn presentation(slides: &[&[&str]]) -> Vec<u8> {
    let entries: Vec<(String, String)> = slides
        .iter()
        .enumerate()
        .rev()
        .map(|(i, paragraphs)| {
            let shapes: String = paragraphs
                .iter()
                .map(|text| {
                    format!(
                        "<p:sp><p:txBody><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp>",
                        escape(text)
                    )
                })
                .collect();
            (
                format!("ppt/slides/slide{}.xml", i + 1),
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:cSld><p:spTree>{}</p:spTree></p:cSld></p:sld>"#,
                    shapes
                ),
            )
        })
        .collect();
    zip_bytes(&entries)
}

/// `.docx` with a heading, a paragraph and a one-row table
pub fn word_document(heading: &str, body: &str, cells: &[&str]) -> Vec<u8> {
    use docx_rs::{Docx, Paragraph, Run, Table, TableCell, TableRow};

    let row = TableRow::new(
        cells
            .iter()
            .map(|text| TableCell::new().add_paragraph(Paragraph::new().add_run(Run::new().add_text(*text))))
            .collect(),
    );

    let mut buf = std::io::Cursor::new(Vec::new());
    Docx::new()
        .add_paragraph(
            Paragraph::new()
                .add_run(Run::new().add_text(heading))
                .style("Heading1"),
        )
        .add_paragraph(Paragraph::new().add_run(Run::new().add_text(body)))
        .add_table(Table::new(vec![row]))
        .build()
        .pack(&mut buf)
        .unwrap();
    buf.into_inner()
}

/// Write `data` as `filename` inside `dir`
pub fn write_file(dir: &Path, filename: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(filename);
    std::fs::write(&path, data).unwrap();
    path
}
