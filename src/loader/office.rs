//! OOXML loader (docx, pptx, xlsx): text pulled straight out of the ZIP
//! container's XML parts, no full document model.
//!
//! ZIP entries are read through a byte cap so a crafted archive cannot
//! balloon in memory.

use std::io::{Cursor, Read};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use quick_xml::events::Event;

use super::{base_document, DocumentLoader};
use crate::hash;
use crate::models::{Document, DocumentType};
use crate::vault::Vault;

const MAX_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
const MAX_SHEETS: usize = 100;

pub struct OfficeLoader;

#[async_trait]
impl DocumentLoader for OfficeLoader {
    fn supported_extensions(&self) -> &'static [&'static str] {
        &["docx", "pptx", "xlsx"]
    }

    fn doc_type(&self) -> DocumentType {
        DocumentType::Docx
    }

    async fn read_by_path(
        &self,
        vault: &Vault,
        rel_path: &str,
        gen_cache_content: bool,
    ) -> Option<Document> {
        let doc_type = match crate::vault::extension_of(rel_path).as_str() {
            "pptx" => DocumentType::Pptx,
            "xlsx" => DocumentType::Xlsx,
            _ => DocumentType::Docx,
        };
        let mut doc = base_document(vault, rel_path, doc_type)?;
        let bytes = match vault.read_bytes(rel_path) {
            Ok(b) => b,
            Err(e) => {
                eprintln!("Warning: cannot read {}: {}", rel_path, e);
                return None;
            }
        };
        doc.content_hash = hash::hash_bytes(&bytes);

        if gen_cache_content {
            let extracted = match doc_type {
                DocumentType::Pptx => extract_pptx(&bytes),
                DocumentType::Xlsx => extract_xlsx(&bytes),
                _ => extract_docx(&bytes),
            };
            match extracted {
                Ok(text) => doc.cache_info.content = text,
                Err(e) => {
                    eprintln!("Warning: extraction failed for {}: {}", rel_path, e);
                }
            }
        }
        Some(doc)
    }
}

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>> {
    Ok(zip::ZipArchive::new(Cursor::new(bytes))?)
}

fn read_entry(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>> {
    let entry = archive
        .by_name(name)
        .map_err(|e| anyhow!("{}: {}", name, e))?;
    let mut out = Vec::new();
    entry.take(MAX_ENTRY_BYTES).read_to_end(&mut out)?;
    if out.len() as u64 >= MAX_ENTRY_BYTES {
        bail!("ZIP entry {} exceeds {} byte limit", name, MAX_ENTRY_BYTES);
    }
    Ok(out)
}

/// Numbered XML parts under a prefix (`slide3.xml`, `sheet1.xml`), in order.
fn numbered_parts(archive: &Archive<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

/// Text of every `<t>` run, with a newline at each paragraph (`<p>`) end.
fn text_runs(xml: &[u8]) -> Result<String> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                if e.local_name().as_ref() == b"t" {
                    in_t = true;
                }
            }
            Event::Text(te) if in_t => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"p" if !out.ends_with('\n') && !out.is_empty() => out.push('\n'),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = open_archive(bytes)?;
    let xml = read_entry(&mut archive, "word/document.xml")?;
    text_runs(&xml)
}

fn extract_pptx(bytes: &[u8]) -> Result<String> {
    let mut archive = open_archive(bytes)?;
    let mut slides = Vec::new();
    for name in numbered_parts(&archive, "ppt/slides/slide") {
        let xml = read_entry(&mut archive, &name)?;
        let text = text_runs(&xml)?;
        if !text.is_empty() {
            slides.push(text);
        }
    }
    Ok(slides.join("\n\n"))
}

fn extract_xlsx(bytes: &[u8]) -> Result<String> {
    let mut archive = open_archive(bytes)?;
    let shared = shared_strings(&mut archive)?;
    let mut sheets = Vec::new();
    for name in numbered_parts(&archive, "xl/worksheets/sheet")
        .into_iter()
        .take(MAX_SHEETS)
    {
        let xml = read_entry(&mut archive, &name)?;
        let text = sheet_cells(&xml, &shared)?;
        if !text.is_empty() {
            sheets.push(text);
        }
    }
    Ok(sheets.join("\n"))
}

fn shared_strings(archive: &mut Archive<'_>) -> Result<Vec<String>> {
    let xml = match read_entry(archive, "xl/sharedStrings.xml") {
        Ok(x) => x,
        // A workbook with only numeric cells has no shared-string part.
        Err(_) => return Ok(Vec::new()),
    };
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_t = false;
    let mut current = String::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                if e.local_name().as_ref() == b"t" {
                    in_t = true;
                }
            }
            Event::Text(te) if in_t => {
                current.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"si" => strings.push(std::mem::take(&mut current)),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Cell values of one worksheet, shared strings resolved, numbers kept.
fn sheet_cells(xml: &[u8], shared: &[String]) -> Result<String> {
    let mut cells: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_v = false;
    let mut is_shared = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"c" => {
                    is_shared = e.attributes().any(|a| {
                        a.as_ref()
                            .map(|a| a.key.as_ref() == b"t" && a.value.as_ref() == b"s")
                            .unwrap_or(false)
                    });
                }
                b"v" => in_v = true,
                _ => {}
            },
            Event::Text(te) if in_v => {
                let v = te.unescape().unwrap_or_default();
                let v = v.trim();
                if v.is_empty() {
                } else if is_shared {
                    if let Some(s) = v.parse::<usize>().ok().and_then(|i| shared.get(i)) {
                        cells.push(s.clone());
                    }
                } else {
                    cells.push(v.to_string());
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" => in_v = false,
                b"c" => is_shared = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(cells.join(" "))
}
