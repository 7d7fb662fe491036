use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::Timetable;
use crate::error::CatalogError;
use crate::export::{self, ExportFormat};
use crate::model::{DepartmentRecord, Term};

pub const UNIFIED_FILE: &str = "departments-unified.tsv";

/// Distinct (course, unit, programme) rows of a timetable.
pub fn extract_departments(timetable: &Timetable, path: &Path) -> Result<Vec<DepartmentRecord>> {
    if timetable.columns.unit.is_none() && timetable.columns.programme.is_none() {
        return Err(CatalogError::MissingColumn {
            column: "Offering Unit".into(),
            path: path.to_path_buf(),
            available: "no department/faculty columns".into(),
        }
        .into());
    }

    let Term { year, semester } = timetable.term;
    let mut seen = HashSet::new();
    let records = timetable
        .rows
        .iter()
        .filter(|row| !row.course_code.is_empty())
        .map(|row| DepartmentRecord {
            course_code: row.course_code.clone(),
            year,
            semester,
            offering_unit: row.offering_unit.clone(),
            offering_programme: row.offering_programme.clone(),
        })
        .filter(|record| seen.insert(record.clone()))
        .collect();
    Ok(records)
}

pub fn departments_file_name(term: Term) -> String {
    format!("departments-{}.tsv", term)
}

/// Keep the most recent record per course, sorted by code.
/// Ties within a term keep the first record seen.
pub fn merge_latest(records: impl IntoIterator<Item = DepartmentRecord>) -> Vec<DepartmentRecord> {
    let mut latest: BTreeMap<String, DepartmentRecord> = BTreeMap::new();
    for record in records {
        match latest.get(&record.course_code) {
            Some(current) if current.term() >= record.term() => {}
            _ => {
                latest.insert(record.course_code.clone(), record);
            }
        }
    }
    latest.into_values().collect()
}

/// Course counts per offering unit, largest first.
pub fn unit_counts(records: &[DepartmentRecord]) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for r in records {
        *counts.entry(r.offering_unit.as_str()).or_insert(0) += 1;
    }
    let mut counts: Vec<(String, usize)> =
        counts.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts
}

/// Per-term department files in `dir`, sorted by name. The unified file is skipped.
pub fn find_department_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(CatalogError::NotADirectory {
            path: dir.to_path_buf(),
        }
        .into());
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            let name = p.file_name().and_then(|n| n.to_str()).unwrap_or("");
            name.starts_with("departments-") && name.ends_with(".tsv") && name != UNIFIED_FILE
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Merge every per-term file in `dir` into `output`. Returns the merged rows.
pub fn merge_directory(dir: &Path, output: &Path) -> Result<Vec<DepartmentRecord>> {
    let files = find_department_files(dir)?;
    if files.is_empty() {
        return Err(CatalogError::NoMatchingFiles {
            pattern: dir.join("departments-*.tsv").display().to_string(),
        }
        .into());
    }

    let mut all = Vec::new();
    for file in &files {
        match export::read_records::<DepartmentRecord>(file, ExportFormat::Tsv) {
            Ok(records) => {
                info!("Read {} records from {}", records.len(), file.display());
                all.extend(records);
            }
            Err(e) => warn!("Skipping {}: {:#}", file.display(), e),
        }
    }

    let total = all.len();
    let merged = merge_latest(all);
    export::write_records(output, ExportFormat::Tsv, &merged)?;
    info!(
        "Merged {} records from {} files into {} courses: {}",
        total,
        files.len(),
        merged.len(),
        output.display()
    );
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Semester;
    use crate::offering::tests::grid;
    use crate::offering::{detect_columns, map_rows};

    fn record(code: &str, year: i32, semester: Semester, unit: &str) -> DepartmentRecord {
        DepartmentRecord {
            course_code: code.into(),
            year,
            semester,
            offering_unit: unit.into(),
            offering_programme: String::new(),
        }
    }

    #[test]
    fn distinct_rows_with_codes() {
        let g = grid(&[
            &["Course Code", "Offering Unit", "Offering Programme"],
            &["ACCT1003", "FBM", "ACCT"],
            &["ACCT1003", "FBM", "ACCT"],
            &["", "FBM", "ACCT"],
            &["COMP1013", "FST", "CST"],
        ]);
        let columns = detect_columns(&g).unwrap();
        let tt = Timetable {
            term: Term {
                year: 2024,
                semester: Semester::Spring,
            },
            columns,
            rows: map_rows(&g, &columns),
        };
        let records = extract_departments(&tt, Path::new("t.xlsx")).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].offering_programme, "CST");
    }

    #[test]
    fn needs_a_department_column() {
        let g = grid(&[&["Course Code", "Teachers"], &["ACCT1003", "Dr. A"]]);
        let columns = detect_columns(&g).unwrap();
        let tt = Timetable {
            term: Term {
                year: 2024,
                semester: Semester::Fall,
            },
            columns,
            rows: map_rows(&g, &columns),
        };
        let err = extract_departments(&tt, Path::new("t.xlsx")).unwrap_err();
        assert!(err.downcast_ref::<CatalogError>().is_some());
    }

    #[test]
    fn latest_term_wins() {
        let merged = merge_latest(vec![
            record("ACCT1003", 2023, Semester::Fall, "old"),
            record("ACCT1003", 2024, Semester::Spring, "spring"),
            record("ACCT1003", 2024, Semester::Fall, "fall"),
            record("ACCT1003", 2024, Semester::Fall, "fall-dup"),
            record("AAAA1000", 2021, Semester::Spring, "only"),
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].course_code, "AAAA1000");
        assert_eq!(merged[1].offering_unit, "fall");
    }

    #[test]
    fn merges_directory() {
        let dir = tempfile::tempdir().unwrap();
        export::write_records(
            &dir.path().join("departments-2023-FALL.tsv"),
            ExportFormat::Tsv,
            &[record("ACCT1003", 2023, Semester::Fall, "FBM")],
        )
        .unwrap();
        export::write_records(
            &dir.path().join("departments-2024-SPRING.tsv"),
            ExportFormat::Tsv,
            &[
                record("ACCT1003", 2024, Semester::Spring, "FBM2"),
                record("COMP1013", 2024, Semester::Spring, "FST"),
            ],
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let out = dir.path().join(UNIFIED_FILE);
        let merged = merge_directory(dir.path(), &out).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].offering_unit, "FBM2");

        // a second run ignores its own output
        assert_eq!(find_department_files(dir.path()).unwrap().len(), 2);
        let back: Vec<DepartmentRecord> = export::read_records(&out, ExportFormat::Tsv).unwrap();
        assert_eq!(back, merged);
        assert_eq!(unit_counts(&back), vec![("FBM2".to_string(), 1), ("FST".to_string(), 1)]);
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = merge_directory(dir.path(), &dir.path().join(UNIFIED_FILE)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CatalogError>(),
            Some(CatalogError::NoMatchingFiles { .. })
        ));
    }
}
