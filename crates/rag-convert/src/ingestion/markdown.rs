//! Markdown rendering of documents and chunk lists

use crate::types::{ChunkRecord, ConvertedDocument, ItemLabel};

/// Render rows as a Markdown table; the first row is the header
pub fn table_to_markdown(rows: &[Vec<String>]) -> String {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0).max(1);

    let render_row = |row: &[String]| {
        let cells: Vec<String> = (0..width)
            .map(|i| {
                row.get(i)
                    .map(|c| c.replace('|', "\\|").replace('\n', " "))
                    .unwrap_or_default()
            })
            .collect();
        format!("| {} |", cells.join(" | "))
    };

    let mut lines = Vec::with_capacity(rows.len() + 1);
    if let Some((header, body)) = rows.split_first() {
        lines.push(render_row(header));
        lines.push(format!("|{}", " --- |".repeat(width)));
        lines.extend(body.iter().map(|row| render_row(row)));
    }
    lines.join("\n")
}

/// Export a whole document as Markdown
pub fn export_markdown(doc: &ConvertedDocument) -> String {
    let blocks: Vec<String> = doc
        .items
        .iter()
        .filter_map(|item| {
            let text = item.text.trim();
            let block = match item.label {
                ItemLabel::Picture => "<!-- image -->".to_string(),
                _ if text.is_empty() => return None,
                ItemLabel::Title => format!("# {}", text),
                ItemLabel::SectionHeader => {
                    format!("{} {}", "#".repeat(item.level.clamp(1, 6) as usize), text)
                }
                ItemLabel::ListItem => format!("- {}", text),
                ItemLabel::Code => format!("```\n{}\n```", item.text.trim_end()),
                ItemLabel::Paragraph | ItemLabel::Table => text.to_string(),
            };
            Some(block)
        })
        .collect();

    if blocks.is_empty() {
        return String::new();
    }
    format!("{}\n", blocks.join("\n\n"))
}

/// Render chunks as `## Chunk N` sections, using contextualized text when present
pub fn render_chunks(chunks: &[ChunkRecord]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let text = chunk.contextualized_text.as_deref().unwrap_or(&chunk.text);
            format!("## Chunk {}\n\n{}\n", i + 1, text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
