//! Multi-format file parser producing structured documents

use calamine::Reader;
use std::ops::Range;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{
    BoundingBox, ConvertedDocument, CoordOrigin, DocItem, FileType, ItemLabel, SourceLayout,
};

use super::markdown::table_to_markdown;

/// Replace ligatures and control characters that PDF text extraction leaves behind
fn cleanup_pdf_text(text: &str) -> String {
    text.replace('\0', "")
        .replace('\u{00A0}', " ") // Non-breaking space
        .replace('\u{FB00}', "ff")
        .replace('\u{FB01}', "fi")
        .replace('\u{FB02}', "fl")
        .replace('\u{FB03}', "ffi")
        .replace('\u{FB04}', "ffl")
        .replace('\u{2010}', "-") // Hyphen
        .replace('\u{2011}', "-") // Non-breaking hyphen
}

/// Byte ranges of blank-line separated paragraphs; line terminators around a
/// paragraph are excluded, those inside it are kept as they are
fn paragraph_ranges(text: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut current: Option<Range<usize>> = None;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let content = line.trim_end_matches(['\n', '\r']);
        if content.trim().is_empty() {
            if let Some(range) = current.take() {
                ranges.push(range);
            }
        } else {
            let end = offset + content.len();
            match current.as_mut() {
                Some(range) => range.end = end,
                None => current = Some(offset..end),
            }
        }
        offset += line.len();
    }
    if let Some(range) = current {
        ranges.push(range);
    }

    ranges
}

/// Split text into blank-line separated paragraphs, keeping line breaks inside each
fn split_paragraphs(text: &str) -> Vec<&str> {
    paragraph_ranges(text).into_iter().map(|r| &text[r]).collect()
}

/// Collapse runs of whitespace to single spaces
fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Multi-format file parser
pub struct FileParser;

impl FileParser {
    /// Parse the file at `path`; `filename` is the original upload name and decides the format
    pub fn parse(path: &Path, filename: &str) -> Result<ConvertedDocument> {
        let (file_type, _) = FileType::from_filename(filename)?;

        let data = std::fs::read(path).map_err(|e| {
            Error::conversion(format!("Failed to read '{}': {}", filename, e))
        })?;

        tracing::debug!("Parsing {} as {:?} ({} bytes)", filename, file_type, data.len());

        match file_type {
            FileType::Pdf => Self::parse_pdf(filename, &data),
            FileType::Docx => Self::parse_docx(filename, &data),
            FileType::Pptx => Self::parse_pptx(filename, &data),
            FileType::Xlsx => Self::parse_xlsx(filename, &data),
            FileType::Html => Self::parse_html(filename, &data),
            FileType::Markdown => Self::parse_markdown(filename, &data),
            FileType::Txt => Self::parse_text(filename, &data),
            FileType::Json => Self::parse_json(filename, &data),
            FileType::Xml => Self::parse_xml(filename, &data),
            FileType::Csv => Self::parse_csv(filename, &data),
            FileType::Image => Ok(Self::parse_image(filename)),
        }
    }

    /// Parse PDF document page by page
    fn parse_pdf(filename: &str, data: &[u8]) -> Result<ConvertedDocument> {
        let pdf = lopdf::Document::load_mem(data)
            .map_err(|e| Error::conversion(format!("Failed to load PDF '{}': {}", filename, e)))?;

        let pages = pdf.get_pages();
        let mut doc = ConvertedDocument::new(filename, FileType::Pdf, SourceLayout::Paged);
        doc.total_pages = Some(pages.len() as u32);

        for (&page_no, &page_id) in &pages {
            let bbox = page_media_box(&pdf, page_id);
            let text = match pdf.extract_text(&[page_no]) {
                Ok(text) => cleanup_pdf_text(&text),
                Err(e) => {
                    tracing::debug!("Could not extract text from page {}: {}", page_no, e);
                    continue;
                }
            };

            for paragraph in split_paragraphs(&text) {
                let paragraph = paragraph
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n");
                if !paragraph.is_empty() {
                    doc.push(DocItem::new(ItemLabel::Paragraph, paragraph).on_page(page_no, bbox));
                }
            }
        }

        // lopdf cannot decode every font encoding; pdf-extract handles more of them
        if doc.items.is_empty() {
            tracing::warn!("No text from per-page extraction of '{}', trying pdf-extract", filename);
            let text = pdf_extract::extract_text_from_mem(data).map_err(|e| {
                Error::conversion(format!("Failed to extract text from '{}': {}", filename, e))
            })?;
            let bbox = pages.get(&1).and_then(|&id| page_media_box(&pdf, id));
            let text = cleanup_pdf_text(&text);
            for paragraph in split_paragraphs(&text) {
                doc.push(DocItem::new(ItemLabel::Paragraph, paragraph.trim()).on_page(1, bbox));
            }
        }

        Ok(doc)
    }

    /// Parse DOCX document
    fn parse_docx(filename: &str, data: &[u8]) -> Result<ConvertedDocument> {
        let docx = docx_rs::read_docx(data)
            .map_err(|e| Error::conversion(format!("Failed to read DOCX '{}': {}", filename, e)))?;

        let mut doc = ConvertedDocument::new(filename, FileType::Docx, SourceLayout::Sectioned);

        for child in &docx.document.children {
            match child {
                docx_rs::DocumentChild::Paragraph(p) => {
                    let text = docx_paragraph_text(p);
                    if text.trim().is_empty() {
                        continue;
                    }
                    let style = p.property.style.as_ref().map(|s| s.val.as_str());
                    doc.push(docx_item_for_style(style, text.trim()));
                }
                docx_rs::DocumentChild::Table(table) => {
                    let mut rows = Vec::new();
                    for row_child in &table.rows {
                        if let docx_rs::TableChild::TableRow(row) = row_child {
                            let mut cells = Vec::new();
                            for cell_child in &row.cells {
                                if let docx_rs::TableRowChild::TableCell(cell) = cell_child {
                                    let mut cell_text = Vec::new();
                                    for content in &cell.children {
                                        if let docx_rs::TableCellContent::Paragraph(p) = content {
                                            cell_text.push(docx_paragraph_text(p));
                                        }
                                    }
                                    cells.push(normalize_whitespace(&cell_text.join(" ")));
                                }
                            }
                            rows.push(cells);
                        }
                    }
                    if rows.iter().any(|r| r.iter().any(|c| !c.is_empty())) {
                        doc.push(DocItem::new(ItemLabel::Table, table_to_markdown(&rows)));
                    }
                }
                _ => {}
            }
        }

        Ok(doc)
    }

    /// Parse PowerPoint presentation (.pptx), one page per slide
    fn parse_pptx(filename: &str, data: &[u8]) -> Result<ConvertedDocument> {
        use std::io::Read;

        let cursor = std::io::Cursor::new(data);
        let mut archive = zip::ZipArchive::new(cursor)
            .map_err(|e| Error::conversion(format!("Failed to open PPTX '{}': {}", filename, e)))?;

        // ppt/slides/slide1.xml, slide2.xml, ...
        let mut slide_names: Vec<(u32, String)> = archive
            .file_names()
            .filter(|name| name.starts_with("ppt/slides/slide") && name.ends_with(".xml"))
            .filter_map(|name| {
                name.trim_start_matches("ppt/slides/slide")
                    .trim_end_matches(".xml")
                    .parse::<u32>()
                    .ok()
                    .map(|n| (n, name.to_string()))
            })
            .collect();
        slide_names.sort_by_key(|(n, _)| *n);

        let mut doc = ConvertedDocument::new(filename, FileType::Pptx, SourceLayout::Paged);
        doc.total_pages = Some(slide_names.len() as u32);

        for (page_no, (_, slide_name)) in (1u32..).zip(slide_names) {
            let mut xml = String::new();
            match archive.by_name(&slide_name) {
                Ok(mut file) => {
                    if let Err(e) = file.read_to_string(&mut xml) {
                        tracing::debug!("Skipping unreadable slide {}: {}", slide_name, e);
                        continue;
                    }
                }
                Err(e) => {
                    tracing::debug!("Skipping missing slide {}: {}", slide_name, e);
                    continue;
                }
            }

            for (i, line) in extract_pptx_paragraphs(&xml).into_iter().enumerate() {
                // The first text frame on a slide is treated as its title
                let item = if i == 0 {
                    DocItem::heading(1, line)
                } else {
                    DocItem::new(ItemLabel::Paragraph, line)
                };
                doc.push(item.on_page(page_no, None));
            }
        }

        Ok(doc)
    }

    /// Parse Excel workbook, one table per sheet
    fn parse_xlsx(filename: &str, data: &[u8]) -> Result<ConvertedDocument> {
        let cursor = std::io::Cursor::new(data);
        let mut workbook = calamine::open_workbook_auto_from_rs(cursor)
            .map_err(|e| Error::conversion(format!("Failed to open workbook '{}': {}", filename, e)))?;

        let sheets = workbook.sheet_names().to_vec();
        let mut doc = ConvertedDocument::new(
            filename,
            FileType::Xlsx,
            SourceLayout::Spreadsheet { sheets: sheets.clone() },
        );

        for (index, sheet_name) in (1u32..).zip(sheets) {
            let range = match workbook.worksheet_range(&sheet_name) {
                Ok(range) => range,
                Err(e) => {
                    tracing::warn!("Failed to read sheet '{}' of {}: {}", sheet_name, filename, e);
                    continue;
                }
            };

            let rows: Vec<Vec<String>> = range
                .rows()
                .map(|row| {
                    row.iter()
                        .map(|cell| match cell {
                            calamine::Data::Empty => String::new(),
                            calamine::Data::String(s) => s.clone(),
                            calamine::Data::Float(f) => f.to_string(),
                            calamine::Data::Int(i) => i.to_string(),
                            calamine::Data::Bool(b) => b.to_string(),
                            calamine::Data::DateTime(dt) => dt.to_string(),
                            calamine::Data::DateTimeIso(s) | calamine::Data::DurationIso(s) => {
                                s.clone()
                            }
                            _ => String::new(),
                        })
                        .collect::<Vec<_>>()
                })
                .filter(|row: &Vec<String>| !row.iter().all(|s| s.is_empty()))
                .collect();

            if rows.is_empty() {
                continue;
            }

            doc.push(DocItem::new(ItemLabel::Table, table_to_markdown(&rows)).on_sheet(index, &sheet_name));
        }

        Ok(doc)
    }

    /// Parse HTML document
    fn parse_html(filename: &str, data: &[u8]) -> Result<ConvertedDocument> {
        let html = String::from_utf8_lossy(data);
        let document = scraper::Html::parse_document(&html);
        let selector = scraper::Selector::parse("h1, h2, h3, h4, h5, h6, p, li, pre, table")
            .map_err(|e| Error::internal(format!("Invalid selector: {:?}", e)))?;
        let row_selector = scraper::Selector::parse("tr")
            .map_err(|e| Error::internal(format!("Invalid selector: {:?}", e)))?;
        let cell_selector = scraper::Selector::parse("th, td")
            .map_err(|e| Error::internal(format!("Invalid selector: {:?}", e)))?;

        let mut doc = ConvertedDocument::new(filename, FileType::Html, SourceLayout::Sectioned);

        for element in document.select(&selector) {
            // Content of lists, tables and preformatted blocks is emitted by the container
            let nested = element.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .map(|e| matches!(e.name(), "li" | "table" | "pre"))
                    .unwrap_or(false)
            });
            if nested {
                continue;
            }

            let name = element.value().name();
            let item = match name {
                "table" => {
                    let rows: Vec<Vec<String>> = element
                        .select(&row_selector)
                        .map(|row| {
                            row.select(&cell_selector)
                                .map(|cell| normalize_whitespace(&cell.text().collect::<String>()))
                                .collect()
                        })
                        .filter(|row: &Vec<String>| !row.is_empty())
                        .collect();
                    if rows.is_empty() {
                        continue;
                    }
                    DocItem::new(ItemLabel::Table, table_to_markdown(&rows))
                }
                "pre" => DocItem::new(ItemLabel::Code, element.text().collect::<String>()),
                _ => {
                    let text = normalize_whitespace(&element.text().collect::<Vec<_>>().join(" "));
                    if text.is_empty() {
                        continue;
                    }
                    match name {
                        "li" => DocItem::new(ItemLabel::ListItem, text),
                        "p" => DocItem::new(ItemLabel::Paragraph, text),
                        heading => {
                            let level = heading[1..].parse::<u8>().unwrap_or(1);
                            DocItem::heading(level, text)
                        }
                    }
                }
            };
            doc.push(item);
        }

        // Pages without block markup: fall back to all body text
        if doc.items.is_empty() {
            let body_selector = scraper::Selector::parse("body")
                .map_err(|e| Error::internal(format!("Invalid selector: {:?}", e)))?;
            if let Some(body) = document.select(&body_selector).next() {
                let text = normalize_whitespace(&body.text().collect::<Vec<_>>().join(" "));
                if !text.is_empty() {
                    doc.push(DocItem::new(ItemLabel::Paragraph, text));
                }
            }
        }

        Ok(doc)
    }

    /// Parse Markdown into headings, paragraphs, list items, code blocks and tables
    fn parse_markdown(filename: &str, data: &[u8]) -> Result<ConvertedDocument> {
        use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

        let text = String::from_utf8_lossy(data);
        let mut doc = ConvertedDocument::new(filename, FileType::Markdown, SourceLayout::Sectioned);

        let mut buf = String::new();
        let mut list_depth = 0usize;
        let mut in_table = false;
        let mut row: Vec<String> = Vec::new();
        let mut rows: Vec<Vec<String>> = Vec::new();
        let mut cell = String::new();

        let flush = |doc: &mut ConvertedDocument, buf: &mut String, label: ItemLabel| {
            let text = buf.trim();
            if !text.is_empty() {
                doc.push(DocItem::new(label, text));
            }
            buf.clear();
        };

        for event in Parser::new_ext(&text, Options::ENABLE_TABLES) {
            match event {
                Event::Start(Tag::Heading { .. }) => buf.clear(),
                Event::End(TagEnd::Heading(level)) => {
                    let heading = buf.trim();
                    if !heading.is_empty() {
                        doc.push(DocItem::heading(level as u8, heading));
                    }
                    buf.clear();
                }
                Event::End(TagEnd::Paragraph) => {
                    if list_depth == 0 {
                        flush(&mut doc, &mut buf, ItemLabel::Paragraph);
                    } else {
                        buf.push('\n');
                    }
                }
                Event::Start(Tag::Item) => {
                    // Text of a parent item precedes its nested list
                    if list_depth > 0 {
                        flush(&mut doc, &mut buf, ItemLabel::ListItem);
                    }
                    list_depth += 1;
                }
                Event::End(TagEnd::Item) => {
                    flush(&mut doc, &mut buf, ItemLabel::ListItem);
                    list_depth = list_depth.saturating_sub(1);
                }
                Event::End(TagEnd::CodeBlock) => flush(&mut doc, &mut buf, ItemLabel::Code),
                Event::Start(Tag::Table(_)) => {
                    in_table = true;
                    rows.clear();
                }
                Event::End(TagEnd::TableCell) => {
                    row.push(cell.trim().to_string());
                    cell.clear();
                }
                Event::End(TagEnd::TableHead) | Event::End(TagEnd::TableRow) => {
                    rows.push(std::mem::take(&mut row));
                }
                Event::End(TagEnd::Table) => {
                    in_table = false;
                    if !rows.is_empty() {
                        doc.push(DocItem::new(ItemLabel::Table, table_to_markdown(&rows)));
                    }
                    rows.clear();
                }
                Event::Text(t) | Event::Code(t) => {
                    if in_table {
                        cell.push_str(&t);
                    } else {
                        buf.push_str(&t);
                    }
                }
                Event::SoftBreak | Event::HardBreak => {
                    if in_table {
                        cell.push(' ');
                    } else {
                        buf.push('\n');
                    }
                }
                _ => {}
            }
        }
        flush(&mut doc, &mut buf, ItemLabel::Paragraph);

        Ok(doc)
    }

    /// Parse plain text into paragraphs that are verbatim slices of the source
    fn parse_text(filename: &str, data: &[u8]) -> Result<ConvertedDocument> {
        let content = String::from_utf8_lossy(data).into_owned();
        let mut doc = ConvertedDocument::new(filename, FileType::Txt, SourceLayout::Sectioned);

        for range in paragraph_ranges(&content) {
            let item = DocItem::new(ItemLabel::Paragraph, &content[range.clone()]).at_source(range.start);
            doc.push(item);
        }
        doc.source_text = Some(content);

        Ok(doc)
    }

    /// Parse JSON, validated and pretty-printed as a code block
    fn parse_json(filename: &str, data: &[u8]) -> Result<ConvertedDocument> {
        let value: serde_json::Value = serde_json::from_slice(data)
            .map_err(|e| Error::conversion(format!("Invalid JSON in '{}': {}", filename, e)))?;
        let pretty = serde_json::to_string_pretty(&value)?;

        let mut doc = ConvertedDocument::new(filename, FileType::Json, SourceLayout::Sectioned);
        doc.push(DocItem::new(ItemLabel::Code, pretty));
        Ok(doc)
    }

    /// Parse XML, one paragraph per text node
    fn parse_xml(filename: &str, data: &[u8]) -> Result<ConvertedDocument> {
        use quick_xml::events::Event;
        use quick_xml::Reader;

        let xml = String::from_utf8_lossy(data);
        let mut reader = Reader::from_str(&xml);
        reader.config_mut().trim_text(true);

        let mut doc = ConvertedDocument::new(filename, FileType::Xml, SourceLayout::Sectioned);

        loop {
            match reader.read_event() {
                Ok(Event::Text(e)) => {
                    let text = e.unescape().map_err(|err| {
                        Error::conversion(format!("Invalid XML text in '{}': {}", filename, err))
                    })?;
                    let text = normalize_whitespace(&text);
                    if !text.is_empty() {
                        doc.push(DocItem::new(ItemLabel::Paragraph, text));
                    }
                }
                Ok(Event::CData(e)) => {
                    let text = normalize_whitespace(&String::from_utf8_lossy(&e.into_inner()));
                    if !text.is_empty() {
                        doc.push(DocItem::new(ItemLabel::Paragraph, text));
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::conversion(format!(
                        "Malformed XML in '{}' at byte {}: {}",
                        filename,
                        reader.buffer_position(),
                        e
                    )));
                }
                _ => {}
            }
        }

        Ok(doc)
    }

    /// Parse CSV file into a single table
    fn parse_csv(filename: &str, data: &[u8]) -> Result<ConvertedDocument> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(data);

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record
                .map_err(|e| Error::conversion(format!("Invalid CSV in '{}': {}", filename, e)))?;
            rows.push(record.iter().map(|f| f.trim().to_string()).collect::<Vec<_>>());
        }

        let mut doc = ConvertedDocument::new(filename, FileType::Csv, SourceLayout::Sectioned);
        if !rows.is_empty() {
            doc.push(DocItem::new(ItemLabel::Table, table_to_markdown(&rows)));
        }
        Ok(doc)
    }

    /// Images carry no extractable text; they become a single picture on page 1
    fn parse_image(filename: &str) -> ConvertedDocument {
        let mut doc = ConvertedDocument::new(filename, FileType::Image, SourceLayout::Paged);
        doc.total_pages = Some(1);
        doc.push(DocItem::new(ItemLabel::Picture, "").on_page(1, None));
        doc
    }
}

/// Concatenated run text of a DOCX paragraph
fn docx_paragraph_text(p: &docx_rs::Paragraph) -> String {
    let mut text = String::new();
    for child in &p.children {
        if let docx_rs::ParagraphChild::Run(run) = child {
            for run_child in &run.children {
                match run_child {
                    docx_rs::RunChild::Text(t) => text.push_str(&t.text),
                    docx_rs::RunChild::Tab(_) => text.push('\t'),
                    docx_rs::RunChild::Break(_) => text.push('\n'),
                    _ => {}
                }
            }
        }
    }
    text
}

/// Map a DOCX paragraph style id to an item
fn docx_item_for_style(style: Option<&str>, text: &str) -> DocItem {
    let Some(style) = style else {
        return DocItem::new(ItemLabel::Paragraph, text);
    };
    let normalized = style.to_lowercase().replace(' ', "");

    if normalized == "title" {
        return DocItem::heading(0, text);
    }
    if let Some(level) = normalized.strip_prefix("heading") {
        return DocItem::heading(level.parse::<u8>().unwrap_or(1), text);
    }
    if normalized.starts_with("list") {
        return DocItem::new(ItemLabel::ListItem, text);
    }
    DocItem::new(ItemLabel::Paragraph, text)
}

/// Text paragraphs (`<a:p>`) of a slide, each made of its `<a:t>` runs
fn extract_pptx_paragraphs(xml: &str) -> Vec<String> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(e)) if in_text => {
                if let Ok(text) = e.unescape() {
                    current.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let text = normalize_whitespace(&current);
                    if !text.is_empty() {
                        paragraphs.push(text);
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::debug!("Stopping slide parse on malformed XML: {}", e);
                break;
            }
            _ => {}
        }
    }

    paragraphs
}

/// Page MediaBox, following the `Parent` chain for inherited values
fn page_media_box(pdf: &lopdf::Document, page_id: lopdf::ObjectId) -> Option<BoundingBox> {
    fn number(obj: &lopdf::Object) -> Option<f64> {
        match obj {
            lopdf::Object::Integer(i) => Some(*i as f64),
            lopdf::Object::Real(r) => Some(*r as f64),
            _ => None,
        }
    }

    let mut dict = pdf.get_object(page_id).ok()?.as_dict().ok()?;
    for _ in 0..16 {
        if let Ok(media_box) = dict.get(b"MediaBox").and_then(|o| o.as_array()) {
            let values: Vec<f64> = media_box.iter().filter_map(number).collect();
            if let [l, b, r, t] = values[..] {
                return Some(BoundingBox {
                    l,
                    t,
                    r,
                    b,
                    coord_origin: CoordOrigin::BottomLeft,
                });
            }
            return None;
        }
        let parent = dict.get(b"Parent").and_then(|o| o.as_reference()).ok()?;
        dict = pdf.get_object(parent).ok()?.as_dict().ok()?;
    }
    None
}
