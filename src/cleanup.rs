use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::export::{self, ExportFormat, Table};
use crate::model::DepartmentRecord;

const QUOTES: [char; 3] = ['"', '\u{201c}', '\u{201d}'];

/// Faculty and department for one course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub faculty: String,
    pub department: String,
}

/// Drop quote characters, split on commas, trim and dedupe keeping first order.
pub fn clean_type_field(value: &str) -> String {
    let stripped: String = value.chars().filter(|c| !QUOTES.contains(c)).collect();
    let mut seen: Vec<&str> = Vec::new();
    for part in stripped.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if !seen.contains(&part) {
            seen.push(part);
        }
    }
    seen.join(",")
}

/// Offering unit becomes the faculty, offering programme the department.
/// Later rows for a code win.
pub fn department_mapping(records: &[DepartmentRecord]) -> HashMap<String, Delivery> {
    records
        .iter()
        .map(|r| {
            (
                r.course_code.trim().to_string(),
                Delivery {
                    faculty: r.offering_unit.clone(),
                    department: r.offering_programme.clone(),
                },
            )
        })
        .collect()
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupStats {
    pub total: usize,
    pub types_cleaned: usize,
    pub delivery_updated: usize,
}

/// Clean a catalog export in place.
pub fn cleanup(table: &mut Table, mapping: &HashMap<String, Delivery>) -> Result<CleanupStats> {
    let code = table.require("code")?;
    let kind = table.require("type")?;
    let faculty = table.require("deliver_faculty")?;
    let department = table.require("deliver_department")?;

    let mut stats = CleanupStats {
        total: table.rows.len(),
        ..Default::default()
    };
    for i in 0..table.rows.len() {
        let cleaned = clean_type_field(table.get(i, kind));
        if cleaned != table.get(i, kind) {
            table.set(i, kind, &cleaned);
            stats.types_cleaned += 1;
        }

        let Some(delivery) = mapping.get(table.get(i, code).trim()) else {
            continue;
        };
        if table.get(i, faculty) != delivery.faculty
            || table.get(i, department) != delivery.department
        {
            table.set(i, faculty, &delivery.faculty);
            table.set(i, department, &delivery.department);
            stats.delivery_updated += 1;
        }
    }
    Ok(stats)
}

pub fn cleanup_files(courses: &Path, departments: &Path, output: &Path) -> Result<CleanupStats> {
    let mut table = export::read_table(courses)?;
    info!("Loaded {} courses from {}", table.rows.len(), courses.display());

    let records: Vec<DepartmentRecord> = export::read_records(departments, ExportFormat::Tsv)?;
    let mapping = department_mapping(&records);
    info!("Loaded {} course mappings from {}", mapping.len(), departments.display());

    let stats = cleanup(&mut table, &mapping)?;
    export::write_table(output, &table)?;
    info!("Saved cleaned data to {}", output.display());
    Ok(stats)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeChange {
    pub code: String,
    pub original: String,
    pub cleaned: String,
}

#[derive(Debug, Default)]
pub struct CleanupReport {
    pub original_rows: usize,
    pub cleaned_rows: usize,
    pub type_changes: Vec<TypeChange>,
    pub delivery_changes: usize,
    /// Code and type of cleaned rows that still carry quotes.
    pub remaining_quotes: Vec<(String, String)>,
}

/// Row-by-row comparison of an export before and after cleanup.
pub fn report(original: &Table, cleaned: &Table) -> Result<CleanupReport> {
    let o_code = original.require("code")?;
    let o_type = original.require("type")?;
    let o_faculty = original.require("deliver_faculty")?;
    let o_department = original.require("deliver_department")?;
    let c_code = cleaned.require("code")?;
    let c_type = cleaned.require("type")?;
    let c_faculty = cleaned.require("deliver_faculty")?;
    let c_department = cleaned.require("deliver_department")?;

    let mut report = CleanupReport {
        original_rows: original.rows.len(),
        cleaned_rows: cleaned.rows.len(),
        ..Default::default()
    };
    for i in 0..original.rows.len().min(cleaned.rows.len()) {
        if original.get(i, o_type) != cleaned.get(i, c_type) {
            report.type_changes.push(TypeChange {
                code: original.get(i, o_code).to_string(),
                original: original.get(i, o_type).to_string(),
                cleaned: cleaned.get(i, c_type).to_string(),
            });
        }
        if original.get(i, o_faculty) != cleaned.get(i, c_faculty)
            || original.get(i, o_department) != cleaned.get(i, c_department)
        {
            report.delivery_changes += 1;
        }
    }
    report.remaining_quotes = (0..cleaned.rows.len())
        .filter(|&i| cleaned.get(i, c_type).contains(&QUOTES[..]))
        .map(|i| {
            (
                cleaned.get(i, c_code).to_string(),
                cleaned.get(i, c_type).to_string(),
            )
        })
        .collect();
    Ok(report)
}

pub fn report_files(original: &Path, cleaned: &Path) -> Result<CleanupReport> {
    let original = export::read_table(original)?;
    let cleaned = export::read_table(cleaned)?;
    report(&original, &cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Semester;

    fn courses() -> Table {
        let header = ["code", "name_en", "type", "deliver_faculty", "deliver_department"];
        Table {
            path: "courses.tsv".into(),
            headers: header.map(String::from).to_vec(),
            rows: vec![
                ["ACCT1003", "Accounting", "\"MR\",MR, GE", "FBM", "ACCT"]
                    .map(String::from)
                    .to_vec(),
                ["COMP1013", "Programming", "MR", "", ""].map(String::from).to_vec(),
                ["STAT2043", "Statistics", "\u{201c}FE\u{201d}", "FST"]
                    .map(String::from)
                    .to_vec(),
            ],
        }
    }

    #[test]
    fn type_field() {
        assert_eq!(clean_type_field("\"MR\",MR, GE"), "MR,GE");
        assert_eq!(clean_type_field("\u{201c}FE\u{201d}, ,FE"), "FE");
        assert_eq!(clean_type_field(""), "");
        assert_eq!(clean_type_field("MR"), "MR");
    }

    #[test]
    fn cleans_types_and_delivery() {
        let records = vec![
            DepartmentRecord {
                course_code: "COMP1013".into(),
                year: 2024,
                semester: Semester::Fall,
                offering_unit: "FST".into(),
                offering_programme: "CST".into(),
            },
            DepartmentRecord {
                course_code: "ACCT1003".into(),
                year: 2024,
                semester: Semester::Fall,
                offering_unit: "FBM".into(),
                offering_programme: "ACCT".into(),
            },
        ];
        let mapping = department_mapping(&records);
        let mut table = courses();
        let stats = cleanup(&mut table, &mapping).unwrap();

        assert_eq!(
            stats,
            CleanupStats {
                total: 3,
                types_cleaned: 2,
                delivery_updated: 1,
            }
        );
        assert_eq!(table.get(0, 2), "MR,GE");
        assert_eq!(table.get(1, 3), "FST");
        assert_eq!(table.get(1, 4), "CST");
        assert_eq!(table.get(2, 2), "FE");
    }

    #[test]
    fn missing_type_column() {
        let mut table = courses();
        table.headers[2] = "kind".into();
        assert!(cleanup(&mut table, &HashMap::new()).is_err());
    }

    #[test]
    fn report_counts_changes() {
        let original = courses();
        let mut cleaned = courses();
        cleaned.set(0, 2, "MR,GE");
        cleaned.set(1, 3, "FST");
        let r = report(&original, &cleaned).unwrap();

        assert_eq!(r.original_rows, 3);
        assert_eq!(r.type_changes.len(), 1);
        assert_eq!(r.type_changes[0].code, "ACCT1003");
        assert_eq!(r.delivery_changes, 1);
        assert_eq!(r.remaining_quotes.len(), 1);
        assert_eq!(r.remaining_quotes[0].0, "STAT2043");
    }

    #[test]
    fn files_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let courses_path = dir.path().join("courses.tsv");
        let departments = dir.path().join("departments-unified.tsv");
        let output = dir.path().join("cleaned.tsv");
        export::write_table(&courses_path, &courses()).unwrap();
        export::write_records::<DepartmentRecord>(&departments, ExportFormat::Tsv, &[]).unwrap();

        let stats = cleanup_files(&courses_path, &departments, &output).unwrap();
        assert_eq!(stats.delivery_updated, 0);
        let r = report_files(&courses_path, &output).unwrap();
        assert_eq!(r.type_changes.len(), 2);
        assert!(r.remaining_quotes.is_empty());
    }
}
