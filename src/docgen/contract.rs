use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;

use super::{output_file_name, TemplateError, TemplateResult};
use crate::pdf::{render::text_to_pdf, PdfError};

fn contract_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)_contract(_es)?\.html$").expect("valid regex"))
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("valid regex"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractFile {
    pub file: String,
    pub label: String,
}

pub fn is_contract_file_name(name: &str) -> bool {
    contract_name_re().is_match(name)
}

/// Human label for a contract file, e.g. `vehicle_PurchaseandSale_contract.html`
/// becomes `Vehicle Purchase And Sale`.
pub fn contract_label(file_name: &str) -> String {
    static CAMEL: OnceLock<Regex> = OnceLock::new();
    static GLUED_AND: OnceLock<Regex> = OnceLock::new();

    let base = file_name
        .replace("_contract_es.html", "")
        .replace("_contract.html", "")
        .replace('_', " ");
    let camel = CAMEL.get_or_init(|| Regex::new(r"([a-z])([A-Z])").expect("valid regex"));
    let spaced = camel.replace_all(&base, "$1 $2");
    let glued = GLUED_AND.get_or_init(|| Regex::new(r"([a-z])(and)").expect("valid regex"));
    let spaced = glued.replace_all(&spaced, "$1 $2");
    title_case(&spaced)
}

fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_alpha = false;
    for ch in text.chars() {
        if ch.is_alphabetic() {
            if prev_alpha {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(ch);
            prev_alpha = false;
        }
    }
    out
}

/// Contract files in `dir`, sorted by name. A missing directory is empty.
pub fn list_contract_files(dir: &Path) -> TemplateResult<Vec<ContractFile>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    let mut files: Vec<String> = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if name.ends_with("_contract.html") || name.ends_with("_contract_es.html") {
                files.push(name.to_string());
            }
        }
    }
    files.sort();

    Ok(files
        .into_iter()
        .map(|file| ContractFile {
            label: contract_label(&file),
            file,
        })
        .collect())
}

/// Reads a contract file by name, refusing anything that could escape `dir`.
pub fn read_contract_file(dir: &Path, name: &str) -> TemplateResult<String> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(TemplateError::InvalidName);
    }
    if !is_contract_file_name(name) {
        return Err(TemplateError::InvalidName);
    }

    let root = match dir.canonicalize() {
        Ok(root) => root,
        Err(err) if err.kind() == ErrorKind::NotFound => return Err(TemplateError::Missing),
        Err(err) => return Err(err.into()),
    };
    let resolved = match root.join(name).canonicalize() {
        Ok(path) => path,
        Err(err) if err.kind() == ErrorKind::NotFound => return Err(TemplateError::Missing),
        Err(err) => return Err(err.into()),
    };
    if !resolved.starts_with(&root) {
        return Err(TemplateError::OutsideDirectory);
    }

    Ok(fs::read_to_string(resolved)?)
}

/// Reduces contract HTML to plain text: block elements end lines, tags are
/// dropped and entities decoded.
pub fn html_to_text(html: &str) -> String {
    static HIDDEN: OnceLock<Regex> = OnceLock::new();
    static BREAKS: OnceLock<Regex> = OnceLock::new();
    static BLOCK_END: OnceLock<Regex> = OnceLock::new();
    static ITEM: OnceLock<Regex> = OnceLock::new();
    static TAG: OnceLock<Regex> = OnceLock::new();

    let hidden = HIDDEN.get_or_init(|| {
        Regex::new(r"(?is)<(script|style|head)[^>]*>.*?</(script|style|head)>").expect("valid regex")
    });
    let breaks = BREAKS.get_or_init(|| Regex::new(r"(?i)<br\s*/?>").expect("valid regex"));
    let block_end = BLOCK_END.get_or_init(|| {
        Regex::new(r"(?i)</(p|div|h[1-6]|li|tr|table|section|article|ul|ol|blockquote)\s*>")
            .expect("valid regex")
    });
    let item = ITEM.get_or_init(|| Regex::new(r"(?i)<li[^>]*>").expect("valid regex"));
    let tag = TAG.get_or_init(|| Regex::new(r"(?s)<[^>]+>").expect("valid regex"));

    let text = hidden.replace_all(html, "");
    let text = breaks.replace_all(&text, "\n");
    let text = block_end.replace_all(&text, "\n");
    let text = item.replace_all(&text, "- ");
    let text = tag.replace_all(&text, "");
    let text = decode_entities(&text);

    let mut lines: Vec<&str> = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() && lines.last().map_or(true, |last| last.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|last| last.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

fn decode_entities(text: &str) -> String {
    let normalized = text.replace("&nbsp;", " ").replace("&#160;", " ");
    match quick_xml::escape::unescape(&normalized) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => normalized,
    }
}

/// Replaces `{{KEY}}` markers that have a value; unknown keys stay visible.
pub fn fill_placeholders(text: &str, context: &BTreeMap<String, String>) -> String {
    placeholder_re()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            context
                .get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[derive(Debug)]
pub struct RenderedContract {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub content_type: &'static str,
}

/// Renders a contract to PDF, falling back to a UTF-8 text file when the PDF
/// engine is not installed.
pub fn render_contract(
    name: &str,
    html: &str,
    context: &BTreeMap<String, String>,
    today: NaiveDate,
) -> TemplateResult<RenderedContract> {
    let text = fill_placeholders(&html_to_text(html), context);
    match text_to_pdf(&text) {
        Ok(bytes) => Ok(RenderedContract {
            bytes,
            file_name: output_file_name(name, today, "pdf"),
            content_type: "application/pdf",
        }),
        Err(PdfError::Unavailable) => {
            tracing::warn!(template = name, "pdf engine unavailable, rendering contract as text");
            Ok(RenderedContract {
                bytes: text.into_bytes(),
                file_name: output_file_name(name, today, "txt"),
                content_type: "text/plain; charset=utf-8",
            })
        }
        Err(err) => Err(err.into()),
    }
}
