use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::CatalogError;
use crate::export::{self, ExportFormat};
use crate::llm::deepseek::DeepSeek;
use crate::model::HandbookCourse;
use crate::pdf;

/// Handbooks list their courses on the second page.
const COURSE_PAGE: u32 = 2;

const SYSTEM_PROMPT: &str = r#"You are an expert at extracting structured course information from university handbook text.

Analyze the provided text and extract every course as JSON. For each course extract:
- course_code: the course code (e.g. "ACCT101", "BUSA200")
- course_name: the full course title
- unit: the credit units for the course, as a string

Return a JSON object with a "courses" array:
{"courses": [{"course_code": "ACCT101", "course_name": "Introduction to Accounting", "unit": "3"}]}

If no courses are found, return {"courses": []}.
Extract only course information, keep course codes upper case, never truncate names."#;

fn user_prompt(file_name: &str, text: &str) -> String {
    format!(
        "Please extract course information from this text from file \"{}\":\n\n{}\n\n\
         Extract all courses with their codes, names, and units. Return JSON as specified.",
        file_name, text
    )
}

/// Pull `courses` out of a model reply. Entries that don't fit are skipped.
pub fn parse_courses(reply: &Value, source_file: &str) -> Vec<HandbookCourse> {
    reply
        .get("courses")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value::<HandbookCourse>(item.clone()).ok())
                .map(|mut c| {
                    c.source_file = source_file.to_string();
                    c
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn find_pdfs(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(CatalogError::NotADirectory {
            path: dir.to_path_buf(),
        }
        .into());
    }
    let mut pdfs: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
        })
        .collect();
    pdfs.sort();
    Ok(pdfs)
}

#[derive(Debug, Default)]
pub struct HandbookSummary {
    /// PDF name and course count, in processing order.
    pub per_file: Vec<(String, usize)>,
    pub courses: Vec<HandbookCourse>,
}

impl HandbookSummary {
    pub fn unique_codes(&self) -> BTreeSet<&str> {
        self.courses
            .iter()
            .map(|c| c.course_code.as_str())
            .filter(|c| !c.is_empty())
            .collect()
    }
}

async fn extract_one(
    deepseek: &DeepSeek,
    pdf_path: &Path,
    name: &str,
) -> Result<Vec<HandbookCourse>> {
    let text = pdf::page_text(pdf_path, COURSE_PAGE)?;
    if text.trim().is_empty() {
        warn!("No text on page {} of {}", COURSE_PAGE, name);
        return Ok(Vec::new());
    }
    let reply = deepseek
        .chat_json(SYSTEM_PROMPT, &user_prompt(name, text.trim()))
        .await?;
    Ok(parse_courses(&reply, name))
}

/// Run every handbook PDF in `input_dir` through the model, one TSV per PDF.
/// A failing PDF is logged and counted as zero courses.
pub async fn extract_directory(
    deepseek: &DeepSeek,
    input_dir: &Path,
    output_dir: &Path,
    combined: Option<&Path>,
) -> Result<HandbookSummary> {
    let pdfs = find_pdfs(input_dir)?;
    if pdfs.is_empty() {
        return Err(CatalogError::NoMatchingFiles {
            pattern: input_dir.join("*.pdf").display().to_string(),
        }
        .into());
    }
    info!("Found {} PDF files to process", pdfs.len());

    let pb = ProgressBar::new(pdfs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let mut summary = HandbookSummary::default();
    for pdf_path in &pdfs {
        let name = pdf_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        pb.set_message(name.clone());

        let courses = match extract_one(deepseek, pdf_path, &name).await {
            Ok(courses) => courses,
            Err(e) => {
                pb.suspend(|| warn!("Skipping {}: {:#}", name, e));
                Vec::new()
            }
        };

        if !courses.is_empty() {
            let stem = pdf_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let out = output_dir.join(format!("{}.tsv", stem));
            export::write_records(&out, ExportFormat::Tsv, &courses)?;
            pb.suspend(|| info!("Saved {} courses to {}", courses.len(), out.display()));
        }

        summary.per_file.push((name, courses.len()));
        summary.courses.extend(courses);
        pb.inc(1);
    }
    pb.finish_and_clear();

    if let Some(path) = combined {
        if !summary.courses.is_empty() {
            export::write_records(path, ExportFormat::Tsv, &summary.courses)?;
            info!(
                "Combined file created: {} ({} courses)",
                path.display(),
                summary.courses.len()
            );
        }
    }
    Ok(summary)
}
