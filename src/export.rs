use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ensure_exists, CatalogError};
use crate::model::{
    CourseRecord, DepartmentRecord, DescriptionRow, HandbookCourse, LecturerRow, OfferingRecord,
    OnboardingCourse, TeacherRow,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Tsv,
    Csv,
}

impl ExportFormat {
    pub fn delimiter(self) -> u8 {
        match self {
            ExportFormat::Tsv => b'\t',
            ExportFormat::Csv => b',',
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Tsv => "tsv",
            ExportFormat::Csv => "csv",
        }
    }

    /// Guess from a file extension; anything but `.tsv` is comma-separated.
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("tsv") => ExportFormat::Tsv,
            _ => ExportFormat::Csv,
        }
    }
}

/// A row type with a fixed column order.
pub trait Columns: Serialize + DeserializeOwned {
    const COLUMNS: &'static [&'static str];
    /// Columns that are always written but may be absent when reading.
    const OPTIONAL: &'static [&'static str] = &[];
}

impl Columns for CourseRecord {
    const COLUMNS: &'static [&'static str] =
        &["course_code", "course_name", "prerequisite", "unit", "course_description"];
}

impl Columns for DescriptionRow {
    const COLUMNS: &'static [&'static str] = &["course_code", "course_description"];
}

impl Columns for OfferingRecord {
    const COLUMNS: &'static [&'static str] = &["course_code", "year", "semester", "lecturer_name"];
}

impl Columns for DepartmentRecord {
    const COLUMNS: &'static [&'static str] = &[
        "course_code",
        "year",
        "semester",
        "offering_unit",
        "offering_programme",
    ];
}

impl Columns for TeacherRow {
    const COLUMNS: &'static [&'static str] = &["name", "uid", "description", "url"];
}

impl Columns for LecturerRow {
    const COLUMNS: &'static [&'static str] =
        &["name", "uid", "description", "url", "incumbencyStatus"];
    // Live exports predate the first merge and carry no status yet.
    const OPTIONAL: &'static [&'static str] = &["incumbencyStatus"];
}

impl Columns for HandbookCourse {
    const COLUMNS: &'static [&'static str] = &["course_code", "course_name", "unit", "source_file"];
}

impl Columns for OnboardingCourse {
    const COLUMNS: &'static [&'static str] = &[
        "code",
        "name_en",
        "name_cn",
        "type",
        "units",
        "deliver_department",
        "deliver_faculty",
        "prerequisites",
        "exclusions",
        "description",
        "is_visible",
    ];
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(())
}

/// Write a header row then one line per record. Empty input still gets a header.
pub fn write_records<T: Columns>(path: &Path, format: ExportFormat, records: &[T]) -> Result<()> {
    create_parent(path)?;
    let mut writer = WriterBuilder::new()
        .delimiter(format.delimiter())
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    writer.write_record(T::COLUMNS)?;
    for record in records {
        writer
            .serialize(record)
            .with_context(|| format!("Failed to write row to {}", path.display()))?;
    }
    writer.flush()?;
    Ok(())
}

/// Read records written by [`write_records`] (or any file carrying the same columns).
pub fn read_records<T: Columns>(path: &Path, format: ExportFormat) -> Result<Vec<T>> {
    ensure_exists(path)?;
    let mut reader = ReaderBuilder::new()
        .delimiter(format.delimiter())
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let headers = reader.headers()?.clone();
    for column in T::COLUMNS.iter().filter(|c| !T::OPTIONAL.contains(*c)) {
        if !headers.iter().any(|h| h.trim_matches('\u{feff}') == *column) {
            return Err(CatalogError::MissingColumn {
                column: column.to_string(),
                path: path.to_path_buf(),
                available: headers.iter().collect::<Vec<_>>().join(", "),
            }
            .into());
        }
    }

    reader
        .deserialize::<T>()
        .map(|row| row.with_context(|| format!("Bad row in {}", path.display())))
        .collect()
}

/// Untyped delimited file: header names plus string rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub path: PathBuf,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn require(&self, name: &str) -> Result<usize, CatalogError> {
        self.column(name).ok_or_else(|| CatalogError::MissingColumn {
            column: name.to_string(),
            path: self.path.clone(),
            available: self.headers.join(", "),
        })
    }

    /// Cell at `(row, col)`, empty for short rows.
    pub fn get(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn values(&self, col: usize) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .map(move |r| r.get(col).map(String::as_str).unwrap_or(""))
    }

    /// Overwrite a cell, padding a short row first.
    pub fn set(&mut self, row: usize, col: usize, value: &str) {
        if let Some(r) = self.rows.get_mut(row) {
            if r.len() <= col {
                r.resize(col + 1, String::new());
            }
            r[col] = value.to_string();
        }
    }
}

pub fn read_table(path: &Path) -> Result<Table> {
    ensure_exists(path)?;
    let mut reader = ReaderBuilder::new()
        .delimiter(ExportFormat::for_path(path).delimiter())
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", path.display()))?
        .iter()
        .map(|h| h.trim_matches('\u{feff}').trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("Bad row in {}", path.display()))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(Table {
        path: path.to_path_buf(),
        headers,
        rows,
    })
}

pub fn write_table(path: &Path, table: &Table) -> Result<()> {
    create_parent(path)?;
    let mut writer = WriterBuilder::new()
        .delimiter(ExportFormat::for_path(path).delimiter())
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Distinct non-empty, trimmed values of one column.
pub fn read_code_set(path: &Path, column: &str) -> Result<BTreeSet<String>> {
    let table = read_table(path)?;
    let col = table.require(column)?;
    Ok(table
        .values(col)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<CourseRecord> {
        vec![
            CourseRecord {
                code: "ACCT3013".into(),
                name: "Financial Accounting".into(),
                prerequisite: "ACCT1013".into(),
                units: 3,
                description: "Standards, \"fair value\"\tand reporting".into(),
            },
            CourseRecord {
                code: "ACCT3014".into(),
                name: "Cost Accounting".into(),
                ..Default::default()
            },
        ]
    }

    #[test]
    fn records_survive_export_and_reread() {
        let dir = tempfile::tempdir().unwrap();
        for format in [ExportFormat::Tsv, ExportFormat::Csv] {
            let path = dir.path().join(format!("records.{}", format.extension()));
            write_records(&path, format, &sample()).unwrap();
            let back: Vec<CourseRecord> = read_records(&path, format).unwrap();
            assert_eq!(back, sample());
        }
    }

    #[test]
    fn header_row_is_fixed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/records.tsv");
        write_records::<CourseRecord>(&path, ExportFormat::Tsv, &[]).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "course_code\tcourse_name\tprerequisite\tunit\tcourse_description\n"
        );
    }

    #[test]
    fn missing_column_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.tsv");
        std::fs::write(&path, "code\tname\nA\tB\n").unwrap();
        let err = read_records::<DescriptionRow>(&path, ExportFormat::Tsv).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CatalogError>(),
            Some(CatalogError::MissingColumn { column, .. }) if column == "course_code"
        ));
    }

    #[test]
    fn optional_column_may_be_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live.csv");
        std::fs::write(&path, "name,uid,description,url\nAnn Lee,alee,Lecturer,\n").unwrap();
        let rows: Vec<LecturerRow> = read_records(&path, ExportFormat::Csv).unwrap();
        assert_eq!(rows[0].uid, "alee");
        assert_eq!(rows[0].incumbency, None);

        std::fs::write(&path, "name,description,url,incumbencyStatus\nAnn Lee,,,\n").unwrap();
        let err = read_records::<LecturerRow>(&path, ExportFormat::Csv).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CatalogError>(),
            Some(CatalogError::MissingColumn { column, .. }) if column == "uid"
        ));
    }

    #[test]
    fn code_set_trims_and_dedupes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courses.tsv");
        std::fs::write(&path, "code\tname\nC1 \tA\nC2\tB\nC1\tC\n\tD\n").unwrap();
        let codes = read_code_set(&path, "code").unwrap();
        assert_eq!(codes.into_iter().collect::<Vec<_>>(), vec!["C1", "C2"]);
    }

    #[test]
    fn table_rewrite_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.csv");
        std::fs::write(&src, "code,type\nC1,\"x, y\"\n").unwrap();
        let table = read_table(&src).unwrap();
        assert_eq!(table.get(0, table.require("type").unwrap()), "x, y");
        let dst = dir.path().join("b.csv");
        write_table(&dst, &table).unwrap();
        assert_eq!(read_table(&dst).unwrap().rows, table.rows);
    }
}
