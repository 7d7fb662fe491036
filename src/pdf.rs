use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use lopdf::Document;
use regex::Regex;
use tracing::{debug, info};

use crate::error::CatalogError;

static PAGE_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+\s*/\s*\d+\s*$").unwrap());

fn load(path: &Path) -> Result<Document, CatalogError> {
    Document::load(path).map_err(|e| CatalogError::Pdf {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Whole-document text, pages separated by a form feed.
pub fn document_text(path: &Path) -> Result<String> {
    let doc = load(path)?;
    let pages = doc.get_pages();
    let mut texts = Vec::with_capacity(pages.len());
    for page_num in pages.keys() {
        let text = doc.extract_text(&[*page_num]).map_err(|e| CatalogError::Pdf {
            path: path.to_path_buf(),
            message: format!("page {}: {}", page_num, e),
        })?;
        texts.push(text);
    }
    debug!("Extracted {} pages from {}", texts.len(), path.display());
    Ok(texts.join("\x0c"))
}

/// Text of a single 1-based page.
pub fn page_text(path: &Path, page: u32) -> Result<String> {
    let doc = load(path)?;
    if !doc.get_pages().contains_key(&page) {
        return Err(CatalogError::Pdf {
            path: path.to_path_buf(),
            message: format!("no page {}", page),
        }
        .into());
    }
    let text = doc.extract_text(&[page]).map_err(|e| CatalogError::Pdf {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(sanitize(&text))
}

/// Drop everything outside printable ASCII, keeping layout whitespace.
pub fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| matches!(c, ' '..='~' | '\t' | '\n' | '\x0b' | '\x0c' | '\r'))
        .collect()
}

/// Split extracted text into lines and drop the leading cover lines.
pub fn split_lines(text: &str, skip: usize) -> Vec<String> {
    sanitize(text)
        .split(['\n', '\x0c'])
        .map(|l| l.trim_end_matches('\r').to_string())
        .skip(skip)
        .collect()
}

/// Page headers, footers and page numbers that repeat through a handbook.
pub struct Boilerplate {
    patterns: Vec<Regex>,
}

impl Boilerplate {
    pub fn new(extra: &[String]) -> Result<Self> {
        let patterns = extra
            .iter()
            .map(|p| Regex::new(p).with_context(|| format!("Invalid boilerplate pattern: {}", p)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn matches(&self, line: &str) -> bool {
        let line = line.trim();
        line.is_empty()
            || PAGE_NUMBER_RE.is_match(line)
            || self.patterns.iter().any(|re| re.is_match(line))
    }

    pub fn strip(&self, lines: Vec<String>) -> Vec<String> {
        let before = lines.len();
        let kept: Vec<String> = lines.into_iter().filter(|l| !self.matches(l)).collect();
        debug!("Stripped {} boilerplate lines", before - kept.len());
        kept
    }
}

/// Read a handbook PDF into cleaned lines ready for record assembly.
pub fn extract_lines(path: &Path, skip: usize, boilerplate: &Boilerplate) -> Result<Vec<String>> {
    crate::error::ensure_exists(path)?;
    let text = document_text(path)?;
    let lines = boilerplate.strip(split_lines(&text, skip));
    info!("Extracted {} lines from {}", lines.len(), path.display());
    Ok(lines)
}

pub fn write_raw_lines(path: &Path, lines: &[String]) -> Result<()> {
    let mut body = lines.join("\n");
    body.push('\n');
    std::fs::write(path, body).with_context(|| format!("Failed to write {}", path.display()))
}

/// Output prefix for a handbook: file stem without a leading `cd-`.
pub fn output_prefix(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match stem.strip_prefix("cd-") {
        Some(rest) => rest.to_string(),
        None => stem,
    }
}
