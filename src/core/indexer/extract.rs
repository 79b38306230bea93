//! Plain-text extraction from raw file bytes.
//!
//! Files are decoded as UTF-8, falling back to latin-1 so that legacy
//! encodings still index instead of failing. Markdown is reduced to
//! its prose; every format gets whitespace collapsed to single spaces.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::error::{DocaError, Result};

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*(```|~~~).*$").unwrap());
static IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\([^)]*\)").unwrap());
static LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").unwrap());
static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s{0,3}#{1,6}\s*").unwrap());
static BLOCKQUOTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*>\s?").unwrap());
static LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?:[-*+]|\d+[.)])\s+").unwrap());
static RULE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*(?:[-*_]\s*){3,}$").unwrap());
static EMPHASIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\*\*|__|\*|`)").unwrap());
static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>\n]+>").unwrap());

/// Decode file bytes as UTF-8, or latin-1 when that fails
pub fn decode(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            tracing::debug!("Content is not valid UTF-8, decoding as latin-1");
            bytes.iter().map(|&b| b as char).collect()
        }
    }
}

/// Turn decoded content into plain text for embedding
///
/// `file_type` is the lower-case extension. Content containing NUL
/// bytes is treated as binary and rejected.
pub fn extract(content: &str, file_type: &str) -> Result<String> {
    if content.contains('\0') {
        return Err(DocaError::ExtractionFailed(
            "content looks binary (contains NUL bytes)".to_string(),
        ));
    }

    let text = match file_type {
        "md" | "markdown" => strip_markdown(content),
        _ => content.to_string(),
    };

    Ok(collapse_whitespace(&text))
}

fn strip_markdown(content: &str) -> String {
    let text = CODE_FENCE.replace_all(content, "");
    let text = RULE.replace_all(&text, "");
    let text = IMAGE.replace_all(&text, "$1");
    let text = LINK.replace_all(&text, "$1");
    let text = HEADING.replace_all(&text, "");
    let text = BLOCKQUOTE.replace_all(&text, "");
    let text = LIST_MARKER.replace_all(&text, "");
    let text = HTML_TAG.replace_all(&text, " ");
    EMPHASIS.replace_all(&text, "").into_owned()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
