pub mod fields;
pub mod lines;
pub mod records;

use std::collections::BTreeMap;

use crate::model::{CourseRecord, DescriptionRow};

/// Three-pass pipeline: lines → record groups → course fields.
pub fn parse_lines<I>(lines: I) -> impl Iterator<Item = CourseRecord>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    records::group_records(lines).map(|group| fields::parse_record(&group))
}

/// How often each course code opens a record.
pub fn code_counts<S: AsRef<str>>(lines: &[S]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for line in lines {
        if let Some(code) = lines::find_code(line.as_ref()) {
            *counts.entry(code.to_string()).or_insert(0) += 1;
        }
    }
    counts
}

/// One description per code. A repeated code keeps its first position but
/// takes the later description.
pub fn description_rows(records: &[CourseRecord]) -> Vec<DescriptionRow> {
    let mut rows: Vec<DescriptionRow> = Vec::new();
    let mut index: BTreeMap<&str, usize> = BTreeMap::new();
    for r in records {
        match index.get(r.code.as_str()) {
            Some(&i) => rows[i].course_description = r.description.clone(),
            None => {
                index.insert(&r.code, rows.len());
                rows.push(DescriptionRow {
                    course_code: r.code.clone(),
                    course_description: r.description.clone(),
                });
            }
        }
    }
    rows
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Vec<String> {
        std::fs::read_to_string("tests/fixtures/handbook_lines.txt")
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }

    #[test]
    fn two_record_example() {
        let lines = [
            "ACCT3013 Financial Accounting",
            "Prerequisite: ACCT1013",
            "3 units",
            "Intro to...",
            "ACCT3014 Cost Accounting",
            "3 units",
            "...",
        ];
        let records: Vec<_> = parse_lines(lines).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].code, "ACCT3013");
        assert_eq!(records[0].prerequisite, "ACCT1013");
        assert_eq!(records[0].units, 3);
        assert_eq!(records[1].code, "ACCT3014");
        assert_eq!(records[1].units, 3);
    }

    #[test]
    fn front_matter_only() {
        let lines = ["Business Faculty Handbook", "2025 edition"];
        assert_eq!(parse_lines(lines).count(), 0);
    }

    #[test]
    fn handbook_fixture() {
        let lines = fixture();
        let records: Vec<_> = parse_lines(&lines).collect();
        let codes: Vec<&str> = records.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["ACCT1003", "ACCT2013", "ACCT3043", "COMP1013"]);

        let acct2013 = &records[1];
        assert_eq!(acct2013.name, "INTERMEDIATE FINANCIAL ACCOUNTING");
        assert_eq!(acct2013.units, 3);
        assert_eq!(acct2013.prerequisite, "ACCT1003 Principles of Accounting");
        assert!(acct2013.description.starts_with("This course extends"));
        assert!(!acct2013.description.contains("/ 42"));

        assert!(records[0].prerequisite.is_empty());
        assert_eq!(records[3].units, 4);
    }

    #[test]
    fn counts_codes() {
        let counts = code_counts(&fixture());
        assert_eq!(counts.get("ACCT2013"), Some(&1));
        assert_eq!(counts.len(), 4);
    }

    #[test]
    fn later_description_wins_in_place() {
        let record = |code: &str, description: &str| CourseRecord {
            code: code.into(),
            name: String::new(),
            prerequisite: String::new(),
            units: 3,
            description: description.into(),
        };
        let rows = description_rows(&[
            record("ACCT1003", "old"),
            record("COMP1013", "programming"),
            record("ACCT1003", "new"),
        ]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].course_code, "ACCT1003");
        assert_eq!(rows[0].course_description, "new");
        assert_eq!(rows[1].course_code, "COMP1013");
    }
}
