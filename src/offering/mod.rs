pub mod combine;
pub mod departments;
pub mod lecturers;

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Range, Reader};
use regex::Regex;
use tracing::{debug, info};

use crate::error::{ensure_exists, CatalogError};
use crate::model::{Semester, Term};

static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"AY(\d{4})[-_]\d{2}").unwrap());
static SEMESTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Semester[_\s](\d+)").unwrap());

const SHEET_HINTS: &[&str] = &["Course List", "Timetable", "Export", "Semester"];
const HEADER_SCAN_ROWS: usize = 10;

/// Timetable exports without a recognizable header row still share this layout.
const POSITIONAL_MIN_WIDTH: usize = 12;
const POSITIONAL: ColumnMap = ColumnMap {
    header_row: 1,
    code: 0,
    unit: Some(2),
    programme: Some(3),
    teachers: Some(7),
};

/// Where the interesting columns sit in a sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub header_row: usize,
    pub code: usize,
    pub unit: Option<usize>,
    pub programme: Option<usize>,
    pub teachers: Option<usize>,
}

/// One data row of a timetable, reduced to the columns we use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimetableRow {
    pub course_code: String,
    pub teachers: String,
    pub offering_unit: String,
    pub offering_programme: String,
}

#[derive(Debug, Clone)]
pub struct Timetable {
    pub term: Term,
    pub columns: ColumnMap,
    pub rows: Vec<TimetableRow>,
}

/// `..._Semester 1 of AY2024-25_...xlsx` → 2024-FALL.
pub fn term_from_filename(filename: &str) -> Result<Term, CatalogError> {
    let unknown = || CatalogError::UnknownTerm {
        filename: filename.to_string(),
    };
    let year = YEAR_RE
        .captures(filename)
        .and_then(|c| c[1].parse().ok())
        .ok_or_else(unknown)?;
    let semester = SEMESTER_RE
        .captures(filename)
        .and_then(|c| Semester::from_number(&c[1]))
        .ok_or_else(unknown)?;
    Ok(Term { year, semester })
}

/// Every timetable must exist and name its term before any is processed.
pub fn check_inputs<P: AsRef<Path>>(files: &[P]) -> Result<(), CatalogError> {
    for file in files {
        let file = file.as_ref();
        ensure_exists(file)?;
        let filename = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        term_from_filename(&filename)?;
    }
    Ok(())
}

pub fn pick_sheet(names: &[String]) -> Option<&String> {
    names
        .iter()
        .find(|n| SHEET_HINTS.iter().any(|hint| n.contains(hint)))
        .or_else(|| names.first())
}

fn header_matches(cell: &str, aliases: &[&str]) -> bool {
    let cell = cell.trim().to_ascii_lowercase();
    aliases.iter().any(|a| cell == *a || cell.starts_with(a))
}

/// Find the header row by its `Course Code` cell, falling back to the
/// positional layout for wide sheets.
pub fn detect_columns(grid: &[Vec<String>]) -> Option<ColumnMap> {
    for (i, row) in grid.iter().take(HEADER_SCAN_ROWS).enumerate() {
        let Some(code) = row.iter().position(|c| header_matches(c, &["course code"])) else {
            continue;
        };
        let find = |aliases: &[&str]| row.iter().position(|c| header_matches(c, aliases));
        return Some(ColumnMap {
            header_row: i,
            code,
            unit: find(&["offering unit"]),
            programme: find(&["offering programme", "offering program"]),
            teachers: find(&["teachers", "teacher", "lecturer", "instructor"]),
        });
    }

    let width = grid.iter().map(Vec::len).max().unwrap_or(0);
    (width >= POSITIONAL_MIN_WIDTH).then_some(POSITIONAL)
}

fn cell(row: &[String], col: Option<usize>) -> String {
    col.and_then(|c| row.get(c))
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Apply a column map to the rows below the header. Fully empty rows are dropped.
pub fn map_rows(grid: &[Vec<String>], columns: &ColumnMap) -> Vec<TimetableRow> {
    grid.iter()
        .skip(columns.header_row + 1)
        .filter(|row| row.iter().any(|c| !c.trim().is_empty()))
        .map(|row| TimetableRow {
            course_code: cell(row, Some(columns.code)),
            teachers: cell(row, columns.teachers),
            offering_unit: cell(row, columns.unit),
            offering_programme: cell(row, columns.programme),
        })
        .collect()
}

fn range_to_grid(range: &Range<Data>) -> Vec<Vec<String>> {
    range
        .rows()
        .map(|row| row.iter().map(|c| c.to_string()).collect())
        .collect()
}

/// Open an XLS/XLSX timetable and reduce its course sheet to [`TimetableRow`]s.
pub fn load_timetable(path: &Path) -> Result<Timetable> {
    ensure_exists(path)?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let term = term_from_filename(&filename)?;

    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook {}", path.display()))?;
    let names = workbook.sheet_names();
    let sheet = pick_sheet(&names)
        .cloned()
        .ok_or_else(|| CatalogError::NoWorksheet {
            path: path.to_path_buf(),
        })?;
    let range = workbook
        .worksheet_range(&sheet)
        .with_context(|| format!("Failed to read sheet '{}' of {}", sheet, path.display()))?;
    let grid = range_to_grid(&range);
    debug!("Read sheet '{}' ({} rows)", sheet, grid.len());

    let columns = detect_columns(&grid).ok_or_else(|| CatalogError::MissingColumn {
        column: "Course Code".into(),
        path: path.to_path_buf(),
        available: grid
            .iter()
            .find(|r| r.iter().any(|c| !c.is_empty()))
            .map(|r| r.join(", "))
            .unwrap_or_default(),
    })?;
    let rows = map_rows(&grid, &columns);
    info!("Loaded {} ({}): {} rows from '{}'", filename, term, rows.len(), sheet);

    Ok(Timetable {
        term,
        columns,
        rows,
    })
}
