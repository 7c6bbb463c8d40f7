//! Placeholder Templates - `{{ .Name }}` substitution
//!
//! Single syntax: `{{ .Name }}` where `Name` is a value-store key. Whitespace
//! inside the braces is optional. Text outside placeholders is copied
//! verbatim; a lone `}}` is literal text.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, ValetError};

/// Placeholder body: `.Name` with optional surrounding whitespace
static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\.([A-Za-z_][A-Za-z0-9_]*)\s*$").unwrap());

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// A parsed template fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Literal(&'a str),
    /// Key name without the leading dot
    Placeholder(&'a str),
}

/// Split a template body into literal and placeholder segments
pub fn parse(body: &str) -> Result<Vec<Segment<'_>>> {
    let mut segments = Vec::new();
    let mut rest = body;
    let mut offset = 0;

    while let Some(open) = rest.find(OPEN) {
        if open > 0 {
            segments.push(Segment::Literal(&rest[..open]));
        }
        let inner_start = open + OPEN.len();
        let close = rest[inner_start..]
            .find(CLOSE)
            .ok_or_else(|| ValetError::TemplateParse {
                position: offset + open,
                details: "unclosed '{{'".to_string(),
            })?;
        let inner = &rest[inner_start..inner_start + close];
        let name = PLACEHOLDER_RE
            .captures(inner)
            .and_then(|cap| cap.get(1))
            .ok_or_else(|| ValetError::TemplateParse {
                position: offset + open,
                details: format!("expected '{{{{ .Name }}}}', got '{{{{{}}}}}'", inner),
            })?;
        segments.push(Segment::Placeholder(name.as_str()));

        let consumed = inner_start + close + CLOSE.len();
        rest = &rest[consumed..];
        offset += consumed;
    }

    if !rest.is_empty() {
        segments.push(Segment::Literal(rest));
    }
    Ok(segments)
}
