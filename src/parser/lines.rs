use std::sync::LazyLock;

use regex::Regex;

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z]{2,4}\d{4})\b\s*(.*)$").unwrap());
// Whole-line unit tokens only: `(3 units)`, `(4 UNITS, 2 lab hours)`, `3 credits`.
static UNIT_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:\(\s*(\d{1,2})\s*(?:units?|credits?)\b[^)]*\)|(\d{1,2})\s*(?:units?|credits?))\.?$",
    )
    .unwrap()
});
static TRAILING_UNIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*\(\s*(\d{1,2})\s*(?:units?|credits?)\b[^)]*\)\s*$").unwrap()
});
static PREREQ_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^pre-?requisites?(?:\(s\))?\s*:\s*(.*)$").unwrap()
});
static DESCRIPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:course\s+description\s*:?|description\s*:)\s*(.*)$").unwrap()
});
static PAGE_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\s*/\s*\d+$").unwrap());
static STANDALONE_INT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})\b").unwrap());

/// What a single handbook line looks like, judged on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// `ACCT3013 FINANCIAL ACCOUNTING` starts a course record.
    Heading { code: String, rest: String },
    /// `(3 units)` or `3 units`.
    Units(u32),
    /// `Pre-requisite(s): ACCT1013`: text after the label.
    Prerequisite(String),
    /// `Course Description: ...`: text after the marker.
    DescriptionMarker(String),
    PageNumber,
    Text(String),
    Empty,
}

pub fn classify(line: &str) -> Line {
    let line = line.trim();

    if line.is_empty() {
        return Line::Empty;
    }

    if let Some(caps) = HEADING_RE.captures(line) {
        return Line::Heading {
            code: caps[1].to_string(),
            rest: caps[2].trim().to_string(),
        };
    }

    if PAGE_NUMBER_RE.is_match(line) {
        return Line::PageNumber;
    }

    if let Some(caps) = UNIT_LINE_RE.captures(line) {
        let digits = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str());
        if let Some(Ok(n)) = digits.map(str::parse::<u32>) {
            return Line::Units(n);
        }
    }

    if let Some(caps) = PREREQ_RE.captures(line) {
        return Line::Prerequisite(caps[1].trim().to_string());
    }

    if let Some(caps) = DESCRIPTION_RE.captures(line) {
        return Line::DescriptionMarker(caps[1].trim().to_string());
    }

    Line::Text(line.to_string())
}

/// True when the line opens a new course record.
pub fn is_heading(line: &str) -> bool {
    HEADING_RE.is_match(line.trim())
}

/// Course code leading `text`, if any.
pub fn find_code(text: &str) -> Option<&str> {
    HEADING_RE
        .captures(text.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Split a trailing `(3 units)` off a heading remainder.
pub fn split_trailing_units(rest: &str) -> (&str, Option<u32>) {
    match TRAILING_UNIT_RE.captures(rest) {
        Some(caps) => {
            let start = caps.get(0).map(|m| m.start()).unwrap_or(rest.len());
            (rest[..start].trim_end(), caps[1].parse().ok())
        }
        None => (rest, None),
    }
}

/// First 1–2 digit integer not glued to letters (so `ACCT1013` and `3D` are skipped).
pub fn first_standalone_int(text: &str) -> Option<u32> {
    STANDALONE_INT_RE
        .captures(text)
        .and_then(|c| c[1].parse().ok())
}

/// Hanging title lines: upper case, no sentence punctuation.
pub fn is_upper_title(text: &str) -> bool {
    let has_alpha = text.chars().any(|c| c.is_ascii_alphabetic());
    has_alpha
        && text.len() < 80
        && !text.chars().any(|c| c.is_ascii_lowercase())
        && !text.ends_with('.')
}
