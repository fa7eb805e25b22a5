// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Text extraction for office documents, PDFs and plain text

use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;
use std::io::Read;
use std::path::Path;
use tracing::warn;

use crate::{Result, WizardError};

/// Extract content based on file type; unknown types are read as UTF-8 (lossy)
pub fn extract_text(path: &Path) -> Result<String> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "docx" => extract_docx(path),
        "pdf" => extract_pdf(path),
        "xlsx" | "xls" | "ods" => extract_spreadsheet(path),
        _ => {
            let bytes = std::fs::read(path)?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
    }
}

fn extract_pdf(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    pdf_extract::extract_text_from_mem(&bytes)
        .map_err(|e| WizardError::Extraction(format!("PDF text extraction failed: {}", e)))
}

/// First sheet, first 20 rows, tab separated
fn extract_spreadsheet(path: &Path) -> Result<String> {
    use calamine::{open_workbook_auto, Reader};

    let mut workbook = open_workbook_auto(path)
        .map_err(|e| WizardError::Extraction(format!("Failed to open spreadsheet: {}", e)))?;

    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    let mut text = format!("Sheets: {}\n", sheet_names.join(", "));

    if let Some(sheet_name) = sheet_names.first() {
        if let Ok(range) = workbook.worksheet_range(sheet_name) {
            for (i, row) in range.rows().enumerate() {
                if i >= 20 {
                    text.push_str("...\n");
                    break;
                }
                let cells: Vec<String> = row.iter().map(|c| c.to_string()).collect();
                text.push_str(&cells.join("\t"));
                text.push('\n');
            }
        }
    }

    Ok(text)
}

/// Text runs of `word/document.xml`
fn extract_docx(path: &Path) -> Result<String> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| WizardError::Extraction(format!("Failed to open DOCX: {}", e)))?;

    let mut content = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|_| WizardError::Extraction("No document.xml found".to_string()))?
        .read_to_string(&mut content)?;

    Ok(docx_text(&content))
}

fn docx_text(xml: &str) -> String {
    let mut reader = XmlReader::from_str(xml);
    let mut text = String::new();
    let mut in_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"w:t" => in_run = true,
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_run = false,
                b"w:p" if !text.ends_with('\n') => text.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" => text.push('\t'),
                b"w:br" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_run => match t.unescape() {
                Ok(decoded) => text.push_str(&decoded),
                Err(_) => text.push_str(&String::from_utf8_lossy(&t)),
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!("Malformed document.xml at byte {}: {}", reader.buffer_position(), e);
                break;
            }
            _ => {}
        }
    }

    text.trim().to_string()
}

/// Cut `text` to roughly `max_tokens` tokens (4 bytes each) on a char boundary
pub fn truncate_to_tokens(mut text: String, max_tokens: usize) -> String {
    let max_bytes = max_tokens.saturating_mul(4);
    if text.len() > max_bytes {
        let mut end = max_bytes;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}
