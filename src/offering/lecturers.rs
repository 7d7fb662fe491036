use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::Timetable;
use crate::model::{OfferingRecord, Term};

static ROLE_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:Course Convener|Instructor|Teacher|Lecturer):\s*").unwrap()
});

/// Names that stand in for an unassigned lecturer.
const PLACEHOLDERS: &[&str] = &["TBC", "TBA"];

/// Remove any leading role labels, e.g. `Course Convener: Dr. Li`.
pub fn strip_role_prefix(name: &str) -> &str {
    let mut rest = name.trim();
    while let Some(m) = ROLE_PREFIX_RE.find(rest) {
        rest = rest[m.end()..].trim_start();
    }
    rest
}

/// Split a teachers cell into individual lecturer names.
pub fn split_lecturers(cell: &str, delimiter: &str) -> Vec<String> {
    strip_role_prefix(cell)
        .split(delimiter)
        .map(|part| strip_role_prefix(part).to_string())
        .filter(|name| !name.is_empty())
        .filter(|name| !PLACEHOLDERS.iter().any(|p| name.starts_with(p)))
        .collect()
}

/// One row per distinct (course, lecturer), in timetable order.
pub fn extract_offerings(timetable: &Timetable, delimiter: &str) -> Vec<OfferingRecord> {
    let Term { year, semester } = timetable.term;
    let mut seen = HashSet::new();
    let mut offerings = Vec::new();

    for row in &timetable.rows {
        if row.course_code.is_empty() || row.teachers.is_empty() {
            continue;
        }
        for lecturer in split_lecturers(&row.teachers, delimiter) {
            if seen.insert((row.course_code.clone(), lecturer.clone())) {
                offerings.push(OfferingRecord {
                    course_code: row.course_code.clone(),
                    year,
                    semester,
                    lecturer_name: lecturer,
                });
            }
        }
    }
    offerings
}

pub fn offering_file_name(term: Term) -> String {
    format!("offering-{}.csv", term)
}
