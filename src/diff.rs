use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::export::{self, ExportFormat, Table};
use crate::model::{OfferingRecord, Term};

/// Column holding course codes in a catalog export.
pub const CATALOG_CODE_COLUMN: &str = "code";
/// Column holding course codes in extractor output.
pub const EXTRACTED_CODE_COLUMN: &str = "course_code";

/// Two-way difference between a catalog (`input`) and extracted courses (`output`).
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Comparison {
    pub input_count: usize,
    pub output_count: usize,
    /// In the output but missing from the input.
    pub missing: BTreeSet<String>,
    /// In the input but not in the output.
    pub only_in_input: BTreeSet<String>,
    pub common: usize,
}

pub fn compare(input: &BTreeSet<String>, output: &BTreeSet<String>) -> Comparison {
    Comparison {
        input_count: input.len(),
        output_count: output.len(),
        missing: output.difference(input).cloned().collect(),
        only_in_input: input.difference(output).cloned().collect(),
        common: input.intersection(output).count(),
    }
}

/// Compare a catalog export (`code` column) against an extractor export (`course_code`).
pub fn missing_courses(input: &Path, output: &Path) -> Result<Comparison> {
    let input_codes = export::read_code_set(input, CATALOG_CODE_COLUMN)?;
    let output_codes = export::read_code_set(output, EXTRACTED_CODE_COLUMN)?;
    info!(
        "Loaded {} input and {} output course codes",
        input_codes.len(),
        output_codes.len()
    );
    Ok(compare(&input_codes, &output_codes))
}

/// Rows of `table` whose code is in `codes`, ordered by code.
pub fn detail_rows(table: &Table, codes: &BTreeSet<String>) -> Result<Vec<usize>> {
    let col = table.require(EXTRACTED_CODE_COLUMN)?;
    let mut rows: Vec<usize> = (0..table.rows.len())
        .filter(|&i| codes.contains(table.get(i, col).trim()))
        .collect();
    rows.sort_by_key(|&i| table.get(i, col).trim().to_string());
    Ok(rows)
}

/// A course seen in offerings but absent from the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingOffering {
    pub course_code: String,
    pub terms: BTreeSet<Term>,
}

impl MissingOffering {
    pub fn latest(&self) -> Option<Term> {
        self.terms.iter().next_back().copied()
    }
}

/// Offered courses missing from `existing`, most recently offered first, then
/// most often offered, then by code.
pub fn offering_diff<'a>(
    existing: &BTreeSet<String>,
    offerings: impl IntoIterator<Item = &'a OfferingRecord>,
) -> Vec<MissingOffering> {
    let mut missing: BTreeMap<String, BTreeSet<Term>> = BTreeMap::new();
    for o in offerings {
        let code = o.course_code.trim();
        if code.is_empty() || existing.contains(code) {
            continue;
        }
        missing.entry(code.to_string()).or_default().insert(Term {
            year: o.year,
            semester: o.semester,
        });
    }

    let mut out: Vec<MissingOffering> = missing
        .into_iter()
        .map(|(course_code, terms)| MissingOffering { course_code, terms })
        .collect();
    out.sort_by_key(|m| (Reverse(m.latest()), Reverse(m.terms.len()), m.course_code.clone()));
    out
}

/// Load offering CSVs and diff them against a catalog export.
pub fn offering_diff_files(
    courses: &Path,
    offering_files: &[impl AsRef<Path>],
) -> Result<Vec<MissingOffering>> {
    let existing = export::read_code_set(courses, CATALOG_CODE_COLUMN)?;
    let mut offerings = Vec::new();
    for file in offering_files {
        let records: Vec<OfferingRecord> = export::read_records(file.as_ref(), ExportFormat::Csv)?;
        offerings.extend(records);
    }
    info!(
        "Loaded {} offerings from {} files against {} catalog codes",
        offerings.len(),
        offering_files.len(),
        existing.len()
    );
    Ok(offering_diff(&existing, &offerings))
}
