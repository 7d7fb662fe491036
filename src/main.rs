mod cleanup;
mod config;
mod diff;
mod error;
mod export;
mod handbook;
mod llm;
mod model;
mod offering;
mod onboarding;
mod parser;
mod pdf;
mod teachers;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::{ensure_exists, CatalogError};
use crate::export::ExportFormat;
use crate::offering::{combine, departments, lecturers};

#[derive(Parser)]
#[command(name = "catalog", about = "Course catalog extraction tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract course records from a handbook PDF
    Extract {
        input: PathBuf,
        /// Write records, descriptions and raw lines in this format
        #[arg(long, value_enum)]
        export: Option<ExportFormat>,
        /// Output file prefix (default: PDF stem without "cd-")
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Extract lecturer offerings (or departments) from timetable spreadsheets
    Offering {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Extract offering unit/programme instead of lecturers
        #[arg(long)]
        departments: bool,
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Merge per-term department files, keeping the latest term per course
    MergeDepartments {
        #[arg(long)]
        input_dir: Option<PathBuf>,
        #[arg(long, default_value = departments::UNIFIED_FILE)]
        output: String,
    },
    /// Concatenate offering CSVs sharing a path prefix
    Combine {
        prefix: PathBuf,
        /// Default: combined-<prefix name>.csv in the output directory
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Courses in extractor output that the catalog export lacks
    Missing {
        /// Catalog export (`code` column)
        input: PathBuf,
        /// Extractor output (`course_code` column)
        output: PathBuf,
        #[arg(short, long)]
        details: bool,
        #[arg(short, long)]
        stats: bool,
        /// Exit with status 1 when any course is missing
        #[arg(long)]
        check: bool,
    },
    /// Offered courses absent from a catalog export
    OfferingDiff {
        courses: PathBuf,
        #[arg(required = true)]
        offerings: Vec<PathBuf>,
    },
    /// Staff directory tools
    Teachers {
        #[command(subcommand)]
        command: TeacherCommands,
    },
    /// Extract course lists from handbook PDFs with DeepSeek
    Handbook {
        #[arg(short, long, default_value = "assets/handbooks/2025")]
        input_dir: PathBuf,
        #[arg(short, long, default_value = "output/individual_courses")]
        output_dir: PathBuf,
        /// Also write every course into this TSV
        #[arg(short, long)]
        combined: Option<PathBuf>,
    },
    /// Build catalog rows for missing courses with a local Ollama model
    Onboard {
        input: PathBuf,
        output: PathBuf,
        #[arg(long)]
        ollama_host: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long, default_value = onboarding::DEFAULT_OUTPUT)]
        output_tsv: PathBuf,
    },
    /// Clean type and delivery fields of a catalog export
    Cleanup {
        courses: PathBuf,
        departments: PathBuf,
        output: PathBuf,
    },
    /// Compare a catalog export before and after cleanup
    CleanupReport { original: PathBuf, cleaned: PathBuf },
}

#[derive(Subcommand)]
enum TeacherCommands {
    /// Download the staff directory to JSON and CSV
    Fetch {
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Merge a fetched CSV into the live lecturer export
    Merge {
        #[arg(long)]
        latest_csv: PathBuf,
        /// YYYY-MM-DD, optionally with a -N version suffix
        #[arg(long)]
        live_date: String,
        #[arg(long, default_value = "live-data")]
        live_dir: PathBuf,
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;
    let default_out = PathBuf::from(&settings.output_dir);

    let result = match cli.command {
        Commands::Extract {
            input,
            export,
            prefix,
            output_dir,
        } => run_extract(
            &settings,
            &input,
            export,
            prefix,
            &output_dir.unwrap_or(default_out),
        ),
        Commands::Offering {
            files,
            departments,
            output_dir,
        } => run_offering(
            &settings,
            &files,
            departments,
            &output_dir.unwrap_or(default_out),
        ),
        Commands::MergeDepartments { input_dir, output } => {
            let dir = input_dir.unwrap_or(default_out);
            departments::merge_directory(&dir, &dir.join(&output)).map(|merged| {
                println!("{:<12} | {:>7}", "Unit", "Courses");
                println!("{}", "-".repeat(22));
                for (unit, count) in departments::unit_counts(&merged) {
                    println!("{:<12} | {:>7}", unit, count);
                }
                println!("\n{} courses -> {}", merged.len(), dir.join(&output).display());
            })
        }
        Commands::Combine { prefix, output } => {
            let output = output.unwrap_or_else(|| {
                let name = prefix
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                default_out.join(format!("combined-{}.csv", name))
            });
            run_combine(&prefix, &output)
        }
        Commands::Missing {
            input,
            output,
            details,
            stats,
            check,
        } => run_missing(&input, &output, details, stats, check),
        Commands::OfferingDiff { courses, offerings } => {
            diff::offering_diff_files(&courses, &offerings).map(|missing| {
                if missing.is_empty() {
                    println!("All courses in offerings are present in {}", courses.display());
                    return;
                }
                println!("{:<15} Offered In", "Course Code");
                println!("{}", "-".repeat(70));
                for m in &missing {
                    let terms: Vec<String> = m.terms.iter().map(|t| t.to_string()).collect();
                    println!("{:<15} {}", m.course_code, terms.join(", "));
                }
                println!("\nTotal unique missing courses: {}", missing.len());
            })
        }
        Commands::Teachers { command } => run_teachers(&settings, command, &default_out).await,
        Commands::Handbook {
            input_dir,
            output_dir,
            combined,
        } => run_handbook(&settings, &input_dir, &output_dir, combined.as_deref()).await,
        Commands::Onboard {
            input,
            output,
            ollama_host,
            model,
            output_tsv,
        } => {
            let host = ollama_host.unwrap_or_else(|| settings.ollama_host.clone());
            let model = model.unwrap_or_else(|| settings.ollama_model.clone());
            run_onboard(&settings, &host, &model, &input, &output, &output_tsv).await
        }
        Commands::Cleanup {
            courses,
            departments,
            output,
        } => cleanup::cleanup_files(&courses, &departments, &output).map(|s| {
            println!("Total courses processed:          {}", s.total);
            println!("Courses with type field cleaned:  {}", s.types_cleaned);
            println!("Courses with delivery updated:    {}", s.delivery_updated);
            println!("\nSaved to {}", output.display());
        }),
        Commands::CleanupReport { original, cleaned } => {
            cleanup::report_files(&original, &cleaned).map(|r| print_cleanup_report(&r))
        }
    };

    if let Err(e) = &result {
        if let Some(err) = e.chain().find_map(|c| c.downcast_ref::<CatalogError>()) {
            if err.is_fixable() {
                eprintln!("Error: {}", err);
                std::process::exit(1);
            }
        }
    }

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn run_extract(
    settings: &Settings,
    input: &Path,
    format: Option<ExportFormat>,
    prefix: Option<String>,
    output_dir: &Path,
) -> Result<()> {
    let boilerplate = pdf::Boilerplate::new(&settings.boilerplate)?;
    let lines = pdf::extract_lines(input, settings.skip_lines, &boilerplate)?;

    let counts = parser::code_counts(&lines);
    for (code, n) in counts.iter().filter(|&(_, &n)| n > 1) {
        info!("Course code {} opens {} records", code, n);
    }
    info!("{} distinct course codes", counts.len());

    let records: Vec<_> = parser::parse_lines(&lines).collect();

    let Some(format) = format else {
        println!("{:<10} | {:<40} | {:>5} | Prerequisite", "Code", "Name", "Units");
        println!("{}", "-".repeat(80));
        for r in &records {
            println!(
                "{:<10} | {:<40} | {:>5} | {}",
                r.code,
                truncate(&r.name, 40),
                r.units,
                truncate(&r.prerequisite, 30)
            );
        }
        println!("\n{} records", records.len());
        return Ok(());
    };

    let prefix = prefix.unwrap_or_else(|| pdf::output_prefix(input));
    let ext = format.extension();
    let raw = output_dir.join(format!("{}-raw_lines.txt", prefix));
    let records_path = output_dir.join(format!("{}-records.{}", prefix, ext));
    let description_path = output_dir.join(format!("{}-description.{}", prefix, ext));

    std::fs::create_dir_all(output_dir)?;
    pdf::write_raw_lines(&raw, &lines)?;
    export::write_records(&records_path, format, &records)?;
    let descriptions = parser::description_rows(&records);
    export::write_records(&description_path, format, &descriptions)?;

    println!("Raw lines:    {} ({} lines)", raw.display(), lines.len());
    println!("Records:      {} ({} rows)", records_path.display(), records.len());
    println!(
        "Descriptions: {} ({} rows)",
        description_path.display(),
        descriptions.len()
    );
    Ok(())
}

fn run_offering(
    settings: &Settings,
    files: &[PathBuf],
    want_departments: bool,
    output_dir: &Path,
) -> Result<()> {
    offering::check_inputs(files)?;

    let mut written = Vec::new();
    for file in files {
        let outcome = offering::load_timetable(file).and_then(|timetable| {
            if want_departments {
                let rows = departments::extract_departments(&timetable, file)?;
                let path = output_dir.join(departments::departments_file_name(timetable.term));
                export::write_records(&path, ExportFormat::Tsv, &rows)?;
                Ok((path, rows.len()))
            } else {
                let rows = lecturers::extract_offerings(&timetable, &settings.lecturer_delimiter);
                let path = output_dir.join(lecturers::offering_file_name(timetable.term));
                export::write_records(&path, ExportFormat::Csv, &rows)?;
                Ok((path, rows.len()))
            }
        });
        match outcome {
            Ok(done) => written.push(done),
            Err(e) => warn!("Skipping {}: {:#}", file.display(), e),
        }
    }

    println!("{:<40} | {:>6}", "Output", "Rows");
    println!("{}", "-".repeat(49));
    for (path, rows) in &written {
        let name = path.file_name().unwrap_or_default().to_string_lossy();
        println!("{:<40} | {:>6}", name, rows);
    }
    println!("\n{}/{} files processed", written.len(), files.len());
    if written.len() < files.len() {
        anyhow::bail!("{} of {} timetables failed", files.len() - written.len(), files.len());
    }
    Ok(())
}

fn run_combine(prefix: &Path, output: &Path) -> Result<()> {
    let files = combine::find_matching(prefix)?;
    println!("Found {} files:", files.len());
    for f in &files {
        println!("  - {}", f.file_name().unwrap_or_default().to_string_lossy());
    }

    let combined = combine::combine(&files)?;
    println!("\n{:<40} | {:>6}", "File", "Rows");
    println!("{}", "-".repeat(49));
    for (name, rows) in &combined.files {
        println!("{:<40} | {:>6}", name, rows);
    }

    let s = combine::stats(&combined.table);
    println!("\nTotal records:      {}", s.total);
    println!("Unique courses:     {}", s.unique_courses);
    println!("Unique lecturers:   {}", s.unique_lecturers);
    if combined.table.column("session").is_some() {
        println!("Unique sessions:    {}", s.unique_sessions);
    }
    if !s.by_term.is_empty() {
        println!("\nRecords by term:");
        for (term, n) in &s.by_term {
            println!("  {:<14} {:>6}", term.to_string(), n);
        }
    }
    if s.unknown_term > 0 {
        warn!("{} rows have no readable year/semester", s.unknown_term);
    }

    let missing = combine::rows_missing_session(&combined.table);
    if !missing.is_empty() {
        warn!("{} rows have an empty session", missing.len());
        for &i in missing.iter().take(10) {
            warn!("  row {}: {}", i + 2, combined.table.rows[i].join(", "));
        }
    }

    combine::write_combined(output, &combined.table)?;
    println!("\nOutput file: {}", output.display());
    Ok(())
}

fn run_missing(input: &Path, output: &Path, details: bool, stats: bool, check: bool) -> Result<()> {
    ensure_exists(input)?;
    ensure_exists(output)?;
    let cmp = diff::missing_courses(input, output)?;
    println!("Courses in input file:  {}", cmp.input_count);
    println!("Courses in output file: {}", cmp.output_count);

    if cmp.missing.is_empty() {
        println!("\nNo missing courses: every output course is in the input file.");
    } else {
        println!(
            "\n{} course(s) in output file but missing from input file:",
            cmp.missing.len()
        );
        println!("{}", "-".repeat(40));
        for (i, code) in cmp.missing.iter().enumerate() {
            println!("{:>2}. {}", i + 1, code);
        }
    }

    if details && !cmp.missing.is_empty() {
        let table = export::read_table(output)?;
        let rows = diff::detail_rows(&table, &cmp.missing)?;
        let cell = |row: usize, name: &str| {
            table
                .column(name)
                .map_or("N/A".to_string(), |c| table.get(row, c).to_string())
        };
        for row in rows {
            println!("\nCourse Code:   {}", cell(row, "course_code"));
            println!("Course Name:   {}", cell(row, "course_name"));
            println!("Units:         {}", cell(row, "unit"));
            println!("Prerequisites: {}", cell(row, "prerequisite"));
            println!("Description:   {}", truncate(&cell(row, "course_description"), 100));
            println!("{}", "-".repeat(40));
        }
    }

    if stats {
        println!("\nCourses only in input file:  {}", cmp.only_in_input.len());
        println!("Courses only in output file: {}", cmp.missing.len());
        println!("Common courses:              {}", cmp.common);
        if !cmp.only_in_input.is_empty() && cmp.only_in_input.len() <= 20 {
            println!("\nCourses in input but not in output:");
            for code in &cmp.only_in_input {
                println!("  - {}", code);
            }
        }
    }

    if check && !cmp.missing.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_teachers(
    settings: &Settings,
    command: TeacherCommands,
    default_out: &Path,
) -> Result<()> {
    match command {
        TeacherCommands::Fetch { output_dir } => {
            let dir = output_dir.unwrap_or_else(|| default_out.to_path_buf());
            let client = llm::http_client(settings.request_timeout())?;
            let raw = teachers::fetch_all(&client, settings).await?;
            let rows: Vec<_> = raw
                .iter()
                .map(|v| teachers::to_row(v, &settings.teacher_profile_url))
                .collect();
            let date = teachers::today();
            let json = teachers::save_json(&dir, &date, &raw)?;
            let csv = teachers::save_csv(&dir, &date, &rows)?;
            println!("Fetched {} teachers", rows.len());
            println!("JSON: {}", json.display());
            println!("CSV:  {}", csv.display());
            Ok(())
        }
        TeacherCommands::Merge {
            latest_csv,
            live_date,
            live_dir,
            output_dir,
        } => {
            let dir = output_dir.unwrap_or_else(|| default_out.to_path_buf());
            let (path, summary, total) =
                teachers::merge_files(&latest_csv, &live_dir, &live_date, &dir)?;
            println!("Updated (ACTIVE):   {}", summary.updated);
            println!("Added (ACTIVE):     {}", summary.added);
            println!("Resigned:           {}", summary.resigned);
            println!("Without uid:        {}", summary.without_uid);
            println!("\n{} lecturers -> {}", total, path.display());
            Ok(())
        }
    }
}

async fn run_handbook(
    settings: &Settings,
    input_dir: &Path,
    output_dir: &Path,
    combined: Option<&Path>,
) -> Result<()> {
    let client = llm::http_client(settings.request_timeout())?;
    let deepseek = llm::deepseek::DeepSeek::from_env(client, settings)?;
    let summary = handbook::extract_directory(&deepseek, input_dir, output_dir, combined).await?;

    println!("{:<40} | {:>7}", "PDF", "Courses");
    println!("{}", "-".repeat(50));
    for (name, n) in &summary.per_file {
        println!("{:<40} | {:>7}", truncate(name, 40), n);
    }
    println!("\nTotal courses extracted: {}", summary.courses.len());
    println!("Unique course codes:     {}", summary.unique_codes().len());
    Ok(())
}

async fn run_onboard(
    settings: &Settings,
    host: &str,
    model: &str,
    input: &Path,
    output: &Path,
    output_tsv: &Path,
) -> Result<()> {
    ensure_exists(input)?;
    ensure_exists(output)?;
    let client = llm::http_client(settings.request_timeout())?;
    let ollama = llm::ollama::Ollama::new(client, host);
    let summary = onboarding::run(&ollama, model, input, output, output_tsv).await?;

    if summary.courses.is_empty() {
        println!("No missing courses: every output course is in the input file.");
        return Ok(());
    }
    let codes: Vec<&str> = summary.comparison.missing.iter().map(String::as_str).collect();
    println!("Missing courses: {}", codes.join(", "));
    println!("Processed {} courses -> {}", summary.courses.len(), output_tsv.display());
    println!("Fill in deliver_faculty and review names before import.");
    Ok(())
}

fn print_cleanup_report(r: &cleanup::CleanupReport) {
    println!("Original file: {} courses", r.original_rows);
    println!("Cleaned file:  {} courses", r.cleaned_rows);

    if !r.type_changes.is_empty() {
        println!("\nSample type field cleanups:");
        println!("{}", "-".repeat(30));
        for c in r.type_changes.iter().take(10) {
            println!("Course: {}", c.code);
            println!("  Original: {}", c.original);
            println!("  Cleaned:  {}", c.cleaned);
        }
    }

    println!("\nCourses with type field cleaned:       {}", r.type_changes.len());
    println!("Courses with department/faculty updated: {}", r.delivery_changes);
    println!("Courses with remaining quotes in type:   {}", r.remaining_quotes.len());
    for (code, kind) in r.remaining_quotes.iter().take(5) {
        println!("  {}: {}", code, kind);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
