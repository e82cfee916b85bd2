//! Native (non-LLM) text extraction for formats where a Rust crate can
//! read the container directly. Each function is best-effort: callers
//! treat any `Err` or empty result as "no native text", not as a hard
//! failure, and fall back to the multimodal extractor.

use std::io::{Cursor, Read};

use calamine::{Reader as _, Xls, Xlsx};
use pulldown_cmark::{Event, Parser, TagEnd};
use scraper::Html;

pub fn extract_pdf_text(bytes: &[u8]) -> Result<String, String> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| e.to_string())?;
    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    doc.extract_text(&pages).map_err(|e| e.to_string())
}

pub fn extract_docx_text(bytes: &[u8]) -> Result<String, String> {
    let docx = docx_rs::read_docx(bytes).map_err(|e| format!("{e:?}"))?;
    let mut out = String::new();

    for child in &docx.document.children {
        if let docx_rs::DocumentChild::Paragraph(paragraph) = child {
            for run_child in &paragraph.children {
                if let docx_rs::ParagraphChild::Run(run) = run_child {
                    for text_child in &run.children {
                        if let docx_rs::RunChild::Text(text) = text_child {
                            out.push_str(&text.text);
                        }
                    }
                }
            }
            out.push('\n');
        }
    }

    Ok(out)
}

pub fn extract_rtf_text(bytes: &[u8]) -> Result<String, String> {
    let input = String::from_utf8_lossy(bytes);
    let document = rtf_parser::document::RtfDocument::try_from(input.as_ref()).map_err(|e| format!("{e:?}"))?;
    Ok(document.get_text())
}

/// hwpx is a zip archive of XML parts (like docx); walks every XML
/// entry under `Contents/` and concatenates text nodes.
pub fn extract_hwpx_text(bytes: &[u8]) -> Result<String, String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| e.to_string())?;
    let mut out = String::new();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| e.to_string())?;
        if !entry.name().starts_with("Contents/") || !entry.name().ends_with(".xml") {
            continue;
        }

        let mut xml = String::new();
        entry.read_to_string(&mut xml).map_err(|e| e.to_string())?;
        out.push_str(&extract_xml_text(&xml));
        out.push('\n');
    }

    Ok(out)
}

fn extract_xml_text(xml: &str) -> String {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut out = String::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Text(text)) => {
                if let Ok(unescaped) = text.unescape() {
                    out.push_str(&unescaped);
                    out.push(' ');
                }
            }
            Ok(quick_xml::events::Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    out
}

/// Renders every sheet of an xlsx/xls workbook as a sequence of
/// markdown tables, one per sheet, headed by the sheet name.
pub fn extract_spreadsheet_text(ext: &str, bytes: &[u8]) -> Result<String, String> {
    if ext.eq_ignore_ascii_case("xls") {
        let mut workbook: Xls<_> = Xls::new(Cursor::new(bytes)).map_err(|e| e.to_string())?;
        let names = workbook.sheet_names().to_owned();
        let sheets: Vec<String> = names
            .iter()
            .filter_map(|name| workbook.worksheet_range(name).ok().map(|range| render_sheet(name, &range)))
            .collect();
        Ok(sheets.join("\n\n"))
    } else {
        let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes)).map_err(|e| e.to_string())?;
        let names = workbook.sheet_names().to_owned();
        let sheets: Vec<String> = names
            .iter()
            .filter_map(|name| workbook.worksheet_range(name).ok().map(|range| render_sheet(name, &range)))
            .collect();
        Ok(sheets.join("\n\n"))
    }
}

fn render_sheet(name: &str, range: &calamine::Range<calamine::Data>) -> String {
    let mut out = format!("### {name}\n\n");
    for row in range.rows() {
        let cells: Vec<String> = row.iter().map(|cell| cell.to_string()).collect();
        out.push_str("| ");
        out.push_str(&cells.join(" | "));
        out.push_str(" |\n");
    }
    out
}

pub fn render_markdown_as_text(markdown: &str) -> String {
    let mut out = String::new();
    for event in Parser::new(markdown) {
        match event {
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            Event::End(TagEnd::Paragraph) | Event::End(TagEnd::Heading(_)) | Event::End(TagEnd::Item) => {
                out.push_str("\n\n");
            }
            _ => {}
        }
    }
    out.trim().to_string()
}

pub fn render_html_as_text(html: &str) -> String {
    let document = Html::parse_document(html);
    document
        .root_element()
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
