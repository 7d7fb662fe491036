use super::lines::{classify, first_standalone_int, is_upper_title, split_trailing_units, Line};
use crate::model::CourseRecord;

/// Split one record's lines into fields. Never fails: anything missing comes
/// back empty or zero.
pub fn parse_record<S: AsRef<str>>(group: &[S]) -> CourseRecord {
    let Some((first, body)) = group.split_first() else {
        return CourseRecord::default();
    };

    let (code, rest) = match classify(first.as_ref()) {
        Line::Heading { code, rest } => (code, rest),
        _ => (String::new(), first.as_ref().trim().to_string()),
    };
    let (name_part, mut units) = split_trailing_units(&rest);
    let mut name = name_part.to_string();

    let body: Vec<(&str, Line)> = body
        .iter()
        .map(|l| (l.as_ref().trim(), classify(l.as_ref())))
        .filter(|(_, kind)| !matches!(kind, Line::Empty | Line::PageNumber))
        .collect();

    // Upper-case layouts wrap long titles onto the following lines. The last
    // body line is never a title continuation.
    let mut start = 0;
    if is_upper_title(&name) {
        while let Some((raw, Line::Text(_))) = body.get(start) {
            if !is_upper_title(raw) || start + 1 == body.len() {
                break;
            }
            name.push(' ');
            name.push_str(raw);
            start += 1;
        }
    }

    let has_marker = body[start..]
        .iter()
        .any(|(_, kind)| matches!(kind, Line::DescriptionMarker(_)));

    let mut prereq: Vec<String> = Vec::new();
    let mut desc: Vec<String> = Vec::new();
    let mut in_prereq = false;
    let mut in_desc = false;

    // The description never starts with a line that would classify as a
    // label, so feeding it back through here yields the same text.
    for (raw, kind) in &body[start..] {
        match kind {
            Line::Units(n) => {
                units.get_or_insert(*n);
                in_prereq = false;
            }
            Line::Prerequisite(text) if !in_desc || desc.is_empty() => {
                prereq.push(text.clone());
                in_prereq = has_marker && !in_desc;
            }
            Line::DescriptionMarker(text) => {
                in_desc = true;
                in_prereq = false;
                let (lead, lead_kind) = marker_text(text);
                match lead_kind {
                    Line::Units(n) => {
                        units.get_or_insert(n);
                    }
                    Line::Prerequisite(text) if desc.is_empty() => prereq.push(text),
                    Line::Empty | Line::PageNumber => {}
                    _ => desc.push(lead),
                }
            }
            Line::Text(text) if in_prereq => prereq.push(text.clone()),
            _ => desc.push(raw.to_string()),
        }
    }

    let description = normalize(&desc.join(" "));
    let units = units
        .or_else(|| first_standalone_int(&description))
        .unwrap_or(0);

    CourseRecord {
        code,
        name: normalize(&name),
        prerequisite: clean_prerequisite(&normalize(&prereq.join(" "))),
        units,
        description,
    }
}

/// Classify the text after a description marker, peeling nested markers.
fn marker_text(text: &str) -> (String, Line) {
    match classify(text) {
        Line::DescriptionMarker(inner) => marker_text(&inner),
        kind => (text.trim().to_string(), kind),
    }
}

/// Collapse runs of whitespace into single spaces.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clean_prerequisite(text: &str) -> String {
    let lower = text.to_ascii_lowercase();
    if matches!(lower.as_str(), "none" | "none." | "n/a" | "nil" | "-") {
        String::new()
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_case_record() {
        let r = parse_record(&[
            "ACCT3013 Financial Accounting",
            "Prerequisite: ACCT1013",
            "3 units",
            "Intro to accounting standards.",
        ]);
        assert_eq!(r.code, "ACCT3013");
        assert_eq!(r.name, "Financial Accounting");
        assert_eq!(r.prerequisite, "ACCT1013");
        assert_eq!(r.units, 3);
        assert_eq!(r.description, "Intro to accounting standards.");
    }

    #[test]
    fn handbook_layout_with_marker() {
        let r = parse_record(&[
            "COMP3013 DATABASE MANAGEMENT",
            "SYSTEMS",
            "(3 units)",
            "Pre-requisite(s): COMP1013 or",
            "equivalent experience",
            "Course Description: Relational models,",
            "  SQL   and transactions.",
            "34 / 80",
        ]);
        assert_eq!(r.name, "DATABASE MANAGEMENT SYSTEMS");
        assert_eq!(r.units, 3);
        assert_eq!(r.prerequisite, "COMP1013 or equivalent experience");
        assert_eq!(r.description, "Relational models, SQL and transactions.");
    }

    #[test]
    fn trailing_units_in_heading() {
        let r = parse_record(&["MATH1003 CALCULUS (3 units)", "Limits and derivatives."]);
        assert_eq!(r.name, "CALCULUS");
        assert_eq!(r.units, 3);
    }

    #[test]
    fn missing_fields_default() {
        let r = parse_record(&["GD1003 Design Studio"]);
        assert_eq!(r.units, 0);
        assert!(r.prerequisite.is_empty());
        assert!(r.description.is_empty());
    }

    #[test]
    fn unit_falls_back_to_first_integer() {
        let r = parse_record(&["STAT2003 Statistics", "A 4 credit-hour survey of methods"]);
        assert_eq!(r.units, 4);
    }

    #[test]
    fn none_prerequisite_is_empty() {
        let r = parse_record(&["ACCT1003 Basics", "Pre-requisite(s): None", "(3 units)"]);
        assert!(r.prerequisite.is_empty());
    }

    #[test]
    fn prerequisite_without_marker_is_one_line() {
        let r = parse_record(&[
            "ACCT3014 Cost Accounting",
            "Prerequisite: ACCT3013",
            "Costing methods for managers.",
        ]);
        assert_eq!(r.prerequisite, "ACCT3013");
        assert_eq!(r.description, "Costing methods for managers.");
    }

    #[test]
    fn description_reparse_is_stable() {
        let layouts: &[&[&str]] = &[
            &[
                "ECON2013 Macroeconomics",
                "(3 units)",
                "Course Description:",
                "National income,   inflation",
                "and monetary policy.",
            ],
            &[
                "ACCT1003 PRINCIPLES OF ACCOUNTING (3 units)",
                "Course Description:",
                "2 credits of lab work each week.",
            ],
            &[
                "ACCT1003 PRINCIPLES OF ACCOUNTING (3 units)",
                "Course Description:",
                "Prerequisite: knowledge of algebra is assumed.",
                "Journals and ledgers.",
            ],
            &[
                "ACCT1003 PRINCIPLES OF ACCOUNTING",
                "Course Description: Prerequisite: knowledge of algebra is assumed.",
            ],
            &[
                "MGMT2013 Strategy",
                "Course Description: Description: Competitive positioning.",
            ],
            &["MGMT2023 Operations", "Course Description: (3 units)", "Queues and capacity."],
            &["MGMT3013 STRATEGY", "Course Description:", "SEE DEPARTMENT OFFICE"],
            &[
                "MGMT3023 Leadership",
                "Course Description: Teams and influence.",
                "Prerequisite: MGMT2013 is recommended.",
            ],
            &[
                "ACCT3013 Financial Accounting",
                "Prerequisite: ACCT1013",
                "3 units",
                "Intro to accounting standards.",
            ],
            &[
                "COMP3013 DATABASE MANAGEMENT",
                "SYSTEMS",
                "(3 units)",
                "Pre-requisite(s): COMP1013 or",
                "equivalent experience",
                "Course Description: Relational models,",
                "  SQL   and transactions.",
            ],
            &["STAT2003 Statistics", "3 credits", "4 credits of tutorials run weekly."],
        ];

        for &layout in layouts {
            let first = parse_record(layout);
            let headings = [
                first.code.clone(),
                format!("{} {}", first.code, first.name),
                layout[0].to_string(),
            ];
            for heading in headings {
                let again = parse_record(&[heading.clone(), first.description.clone()]);
                assert_eq!(again.description, first.description, "{heading:?} / {layout:?}");
            }
        }
    }

    #[test]
    fn unit_prose_stays_in_description() {
        let r = parse_record(&[
            "ACCT1003 PRINCIPLES OF ACCOUNTING (3 units)",
            "Course Description:",
            "2 credits of lab work each week.",
        ]);
        assert_eq!(r.units, 3);
        assert_eq!(r.description, "2 credits of lab work each week.");
    }

    #[test]
    fn label_right_after_marker_is_prerequisite() {
        let r = parse_record(&[
            "ACCT1003 PRINCIPLES OF ACCOUNTING (3 units)",
            "Course Description:",
            "Prerequisite: knowledge of algebra is assumed.",
            "Journals and ledgers.",
        ]);
        assert_eq!(r.prerequisite, "knowledge of algebra is assumed.");
        assert_eq!(r.description, "Journals and ledgers.");
    }

    #[test]
    fn prerequisite_starting_with_none_is_kept() {
        let r = parse_record(&[
            "ACCT2003 Bookkeeping",
            "Prerequisite: None of the above; ACCT1003 recommended",
            "(3 units)",
        ]);
        assert_eq!(r.prerequisite, "None of the above; ACCT1003 recommended");
        for empty in ["None", "NONE", "n/a", "Nil"] {
            assert_eq!(clean_prerequisite(empty), "");
        }
    }

    #[test]
    fn empty_group() {
        let empty: [&str; 0] = [];
        assert_eq!(parse_record(&empty), CourseRecord::default());
    }
}
