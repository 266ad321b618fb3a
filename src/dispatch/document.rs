//! Local document transforms between plain text and HTML.
//!
//! Any document can be reduced to text or wrapped as HTML. Producing richer
//! formats (PDF, DOCX, ODT, RTF) needs the conversion service.

use crate::error::ConvertError;
use once_cell::sync::Lazy;
use regex::Regex;

/// Formats handled in-process.
pub const TEXT_FORMATS: [&str; 2] = ["txt", "html"];

static RE_SCRIPT_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>").unwrap());

static RE_BLOCK_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(p|div|h[1-6]|li|tr|pre|blockquote)\s*>").unwrap()
});

static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->|<[^>]*>").unwrap());

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Convert `text` (decoded from a `.from` file) to `to`.
///
/// The target alone picks the transform:
/// * txt: strip markup (a txt source passes through).
/// * html: wrap in a minimal document (an html source passes through).
pub fn transform(file: &str, from: &str, to: &str, text: &str) -> Result<String, ConvertError> {
    match to {
        "txt" if from == "txt" => Ok(text.to_string()),
        "txt" => Ok(strip_markup(text)),
        "html" if from == "html" => Ok(text.to_string()),
        "html" => Ok(wrap_html(file, text)),
        _ => Err(ConvertError::UnsupportedFormat {
            file: file.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }),
    }
}

/// Remove tags, scripts and styles; decode the common entities.
pub fn strip_markup(html: &str) -> String {
    let s = RE_SCRIPT_STYLE.replace_all(html, "");
    let s = RE_BLOCK_BREAK.replace_all(&s, "\n");
    let s = RE_TAG.replace_all(&s, "");
    let s = decode_entities(&s);
    let s = s.replace("\r\n", "\n");
    let lines: Vec<&str> = s.lines().map(str::trim_end).collect();
    RE_BLANK_LINES
        .replace_all(&lines.join("\n"), "\n\n")
        .trim()
        .to_string()
}

/// Wrap plain text in a minimal HTML document.
pub fn wrap_html(title: &str, text: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n<pre>{}</pre>\n</body>\n</html>\n",
        escape_html(title),
        escape_html(text)
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn decode_entities(s: &str) -> String {
    // &amp; last so "&amp;lt;" stays "&lt;"
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
