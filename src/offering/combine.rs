use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::error::CatalogError;
use crate::export::{self, Table};
use crate::model::Term;

/// CSV files whose path starts with `prefix`, e.g. `output/offering-` →
/// `output/offering-2024-FALL.csv`, sorted by name.
pub fn find_matching(prefix: &Path) -> Result<Vec<PathBuf>> {
    let dir = match prefix.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let stem = prefix
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut files: Vec<PathBuf> = match std::fs::read_dir(&dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                let name = p.file_name().and_then(|n| n.to_str()).unwrap_or("");
                name.starts_with(&stem) && name.ends_with(".csv")
            })
            .collect(),
        Err(_) => Vec::new(),
    };
    files.sort();

    if files.is_empty() {
        return Err(CatalogError::NoMatchingFiles {
            pattern: format!("{}*.csv", prefix.display()),
        }
        .into());
    }
    Ok(files)
}

#[derive(Debug, Default)]
pub struct Combined {
    pub table: Table,
    /// File name and row count, in read order.
    pub files: Vec<(String, usize)>,
}

/// Concatenate files. Columns are the union of all headers in first-seen order.
pub fn combine(files: &[PathBuf]) -> Result<Combined> {
    let mut combined = Combined::default();

    for file in files {
        let table = export::read_table(file)?;
        for h in &table.headers {
            if !combined.table.headers.contains(h) {
                combined.table.headers.push(h.clone());
            }
        }
        let positions: Vec<usize> = table
            .headers
            .iter()
            .map(|h| combined.table.column(h).unwrap_or_default())
            .collect();

        for row in &table.rows {
            let mut out = vec![String::new(); combined.table.headers.len()];
            for (value, &pos) in row.iter().zip(&positions) {
                out[pos] = value.clone();
            }
            combined.table.rows.push(out);
        }

        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        combined.files.push((name, table.rows.len()));
    }

    // earlier rows may be shorter once later files add columns
    let width = combined.table.headers.len();
    for row in &mut combined.table.rows {
        row.resize(width, String::new());
    }
    Ok(combined)
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CombineStats {
    pub total: usize,
    pub unique_courses: usize,
    pub unique_lecturers: usize,
    pub unique_sessions: usize,
    /// Chronological, so SPRING sorts before FALL of the same year.
    pub by_term: BTreeMap<Term, usize>,
    /// Rows whose year or semester does not read as a term.
    pub unknown_term: usize,
}

fn distinct(table: &Table, column: &str) -> usize {
    match table.column(column) {
        Some(col) => table
            .values(col)
            .filter(|v| !v.is_empty())
            .collect::<HashSet<_>>()
            .len(),
        None => 0,
    }
}

pub fn stats(table: &Table) -> CombineStats {
    let mut by_term = BTreeMap::new();
    let mut unknown_term = 0;
    if let (Some(y), Some(s)) = (table.column("year"), table.column("semester")) {
        for i in 0..table.rows.len() {
            match Term::from_columns(table.get(i, y), table.get(i, s)) {
                Some(term) => *by_term.entry(term).or_insert(0) += 1,
                None => unknown_term += 1,
            }
        }
    }

    CombineStats {
        total: table.rows.len(),
        unique_courses: distinct(table, "course_code"),
        unique_lecturers: distinct(table, "lecturer_name"),
        unique_sessions: distinct(table, "session"),
        by_term,
        unknown_term,
    }
}

/// Zero-based indices of rows with an empty `session`, when that column exists.
pub fn rows_missing_session(table: &Table) -> Vec<usize> {
    let Some(col) = table.column("session") else {
        return Vec::new();
    };
    (0..table.rows.len())
        .filter(|&i| table.get(i, col).trim().is_empty())
        .collect()
}

pub fn write_combined(path: &Path, table: &Table) -> Result<()> {
    export::write_table(path, table)
        .with_context(|| format!("Failed to write combined file {}", path.display()))
}
