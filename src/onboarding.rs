use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use quick_xml::events::Event;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::diff::{self, Comparison, EXTRACTED_CODE_COLUMN};
use crate::export::{self, ExportFormat, Table};
use crate::llm::ollama::Ollama;
use crate::model::OnboardingCourse;

pub const DEFAULT_OUTPUT: &str = "onboarding_courses.tsv";

static DEPARTMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([A-Z]+)").unwrap());

const TRANSLATION_PREFIXES: [&str; 6] = [
    "中文：",
    "中文:",
    "翻译：",
    "翻译:",
    "Chinese:",
    "Translation:",
];

const REQUIREMENTS_PROMPT: &str = r#"/no_think 将文本化课程前置要求转换为特定的格式：
例子：
1.
<original>未曾修读过GCIT1013 同时 未曾修读过COMP1013 同时 未曾修读过STAT2043 同时 未曾修读过COMP3153</original>
<prerequisites></prerequisites>
<exclusions>GCIT1013 AND COMP1013 AND STAT2043 AND COMP3153</exclusions>

2.
<original>(需修读过ACCT2003 或者 ACCT2043) 同时 未曾修读过ACCT2053 同时 专业需为ACCT</original>
<prerequisites>ACCT2003 OR ACCT2043</prerequisites>
<exclusions>ACCT2053 AND Student Major in ACCT</exclusions>

3.
<original>需修读过ACCT3003</original>
<prerequisites>ACCT3003</prerequisites>
<exclusions></exclusions>

You should only output the XML part, without any additional text or explanation. Do not repeat the original text in your output.
"#;

fn capitalize_prompt(name: &str) -> String {
    format!(
        "Convert this all-caps course name to proper title case following academic standards:\n\n\
         Input: \"{}\"\n\n\
         Rules:\n\
         - Use title case (capitalize first letter of major words)\n\
         - Keep articles, prepositions, and conjunctions lowercase unless they're the first word\n\
         - Preserve acronyms like \"AI\", \"VR\", \"3D\", \"API\", \"HTML\", \"CSS\", \"SQL\"\n\
         - Roman numerals should remain as \"I\", \"II\"\n\n\
         Return only the properly formatted course name, no explanations.",
        name
    )
}

fn translate_prompt(name: &str, context: &str) -> String {
    format!(
        "Task: Translate to Chinese\n\nEnglish: {}\nContext: {}\n\n\
         Output only the Chinese translation (no explanations):",
        name, context
    )
}

/// Letters start a word after any non-letter; the rest of the word is lower case.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_word = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

fn strip_quotes(s: &str) -> &str {
    s.trim().trim_matches('"').trim_matches('\'')
}

/// First useful line of a translation reply, label prefixes removed.
/// Lines opening with 或 or 这 are alternatives or commentary.
pub fn clean_translation(reply: &str) -> String {
    let reply = strip_quotes(reply);
    let mut result = reply
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('或') && !l.starts_with('这'))
        .map(strip_quotes)
        .unwrap_or(reply);
    for prefix in TRANSLATION_PREFIXES {
        if let Some(rest) = result.strip_prefix(prefix) {
            result = rest.trim();
        }
    }
    result.to_string()
}

/// Leading capital letters of a course code, e.g. `GD` for `GD1003`.
pub fn department_prefix(code: &str) -> &str {
    DEPARTMENT_RE
        .captures(code)
        .and_then(|c| c.get(1))
        .map_or("", |m| m.as_str())
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Requirements {
    pub prerequisites: String,
    pub exclusions: String,
}

fn between<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = text.find(&open)? + open.len();
    let end = text.find(&close)?;
    text.get(start..end).map(str::trim)
}

/// Read the `<prerequisites>` and `<exclusions>` pair out of a model reply.
/// Missing tags or malformed XML give empty requirements.
pub fn parse_requirements(reply: &str) -> Requirements {
    let (Some(prerequisites), Some(exclusions)) =
        (between(reply, "prerequisites"), between(reply, "exclusions"))
    else {
        warn!("Missing requirement tags in reply: {}", reply);
        return Requirements::default();
    };
    let xml = format!(
        "<root><prerequisites>{}</prerequisites><exclusions>{}</exclusions></root>",
        prerequisites, exclusions
    );
    debug!("Requirements XML: {}", xml);

    match read_requirements_xml(&xml) {
        Ok(req) => req,
        Err(e) => {
            warn!("Failed to parse requirements XML: {}", e);
            Requirements::default()
        }
    }
}

fn read_requirements_xml(xml: &str) -> Result<Requirements> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut req = Requirements::default();
    let mut current: Option<bool> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"prerequisites" => current = Some(true),
                b"exclusions" => current = Some(false),
                _ => {}
            },
            Ok(Event::Text(e)) => {
                let text = e.unescape()?;
                match current {
                    Some(true) => req.prerequisites.push_str(&text),
                    Some(false) => req.exclusions.push_str(&text),
                    None => {}
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }
    Ok(req)
}

/// A course row from extractor output that still needs onboarding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCourse {
    pub code: String,
    pub name: String,
    pub description: String,
    pub units: String,
    pub prerequisite: String,
}

/// Rows of an extractor TSV whose code is in `codes`, in file order.
pub fn source_courses(table: &Table, codes: &BTreeSet<String>) -> Result<Vec<SourceCourse>> {
    let code_col = table.require(EXTRACTED_CODE_COLUMN)?;
    let name = table.column("course_name");
    let description = table.column("course_description");
    let unit = table.column("unit");
    let prerequisite = table.column("prerequisite");
    let cell = |row: usize, col: Option<usize>, default: &str| {
        col.map_or(default.to_string(), |c| table.get(row, c).to_string())
    };

    Ok((0..table.rows.len())
        .filter(|&i| codes.contains(table.get(i, code_col).trim()))
        .map(|i| SourceCourse {
            code: table.get(i, code_col).trim().to_string(),
            name: cell(i, name, ""),
            description: cell(i, description, ""),
            units: cell(i, unit, "3"),
            prerequisite: cell(i, prerequisite, "N/A"),
        })
        .collect())
}

pub struct Onboarder<'a> {
    ollama: &'a Ollama,
    model: String,
}

impl<'a> Onboarder<'a> {
    pub fn new(ollama: &'a Ollama, model: String) -> Self {
        Self { ollama, model }
    }

    async fn ask(&self, prompt: &str) -> Option<String> {
        match self.ollama.generate(&self.model, prompt).await {
            Ok(reply) if !reply.is_empty() => Some(reply),
            Ok(_) => None,
            Err(e) => {
                warn!("Ollama request failed: {:#}", e);
                None
            }
        }
    }

    async fn proper_name(&self, name: &str) -> String {
        if name.is_empty() {
            return String::new();
        }
        match self.ask(&capitalize_prompt(name)).await {
            Some(reply) => strip_quotes(&reply).to_string(),
            None => title_case(name),
        }
    }

    async fn chinese_name(&self, name: &str, context: &str) -> String {
        if name.is_empty() {
            return String::new();
        }
        match self.ask(&translate_prompt(name, context)).await {
            Some(reply) => clean_translation(&reply),
            None => format!("{} (翻译待完成)", name),
        }
    }

    async fn requirements(&self, text: &str) -> Requirements {
        let text = text.trim();
        if text.is_empty() || text == "N/A" {
            return Requirements::default();
        }
        let prompt = format!("{}<original>{}</original>", REQUIREMENTS_PROMPT, text);
        match self.ask(&prompt).await {
            Some(reply) => parse_requirements(&reply),
            None => {
                warn!("No reply for requirements of: {}", text);
                Requirements::default()
            }
        }
    }

    pub async fn onboard(&self, course: &SourceCourse) -> OnboardingCourse {
        let name_en = self.proper_name(&course.name).await;
        let name_cn = self.chinese_name(&name_en, &course.description).await;
        let req = self.requirements(&course.prerequisite).await;

        OnboardingCourse {
            code: course.code.clone(),
            name_en,
            name_cn,
            course_type: "UNK(UNK)".to_string(),
            units: course.units.clone(),
            deliver_department: department_prefix(&course.code).to_string(),
            deliver_faculty: String::new(),
            prerequisites: req.prerequisites,
            exclusions: req.exclusions,
            description: course.description.clone(),
            is_visible: "true".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct OnboardSummary {
    pub comparison: Comparison,
    pub courses: Vec<OnboardingCourse>,
}

/// Onboard every course present in `output` but missing from the catalog `input`.
/// Nothing is written when no course is missing.
pub async fn run(
    ollama: &Ollama,
    model: &str,
    input: &Path,
    output: &Path,
    output_tsv: &Path,
) -> Result<OnboardSummary> {
    let model = ollama.resolve_model(model).await?;
    let comparison = diff::missing_courses(input, output)?;
    if comparison.missing.is_empty() {
        return Ok(OnboardSummary {
            comparison,
            courses: Vec::new(),
        });
    }

    let table = export::read_table(output)?;
    let sources = source_courses(&table, &comparison.missing)?;
    info!("Onboarding {} courses with {}", sources.len(), model);

    let onboarder = Onboarder::new(ollama, model);
    let pb = ProgressBar::new(sources.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let mut courses = Vec::with_capacity(sources.len());
    for source in &sources {
        pb.set_message(source.code.clone());
        let course = onboarder.onboard(source).await;
        pb.suspend(|| {
            info!("{}: {} -> {}", course.code, course.name_en, course.name_cn);
            if !course.prerequisites.is_empty() {
                info!("  Prerequisites: {}", course.prerequisites);
            }
            if !course.exclusions.is_empty() {
                info!("  Exclusions: {}", course.exclusions);
            }
        });
        courses.push(course);
        pb.inc(1);
    }
    pb.finish_and_clear();

    export::write_records(output_tsv, ExportFormat::Tsv, &courses)?;
    info!("Saved {} courses to {}", courses.len(), output_tsv.display());
    Ok(OnboardSummary {
        comparison,
        courses,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_case_like_fallback() {
        assert_eq!(title_case("INTRO TO 3D MODELLING"), "Intro To 3D Modelling");
        assert_eq!(title_case("DATA-DRIVEN DESIGN II"), "Data-Driven Design Ii");
        assert_eq!(title_case("it's"), "It'S");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn translation_cleanup() {
        assert_eq!(clean_translation("中文：数据科学"), "数据科学");
        assert_eq!(clean_translation("\"会计原理\""), "会计原理");
        assert_eq!(
            clean_translation("这是翻译结果\n\nTranslation: 市场营销\n或 营销学"),
            "市场营销"
        );
    }

    #[test]
    fn department_from_code() {
        assert_eq!(department_prefix("GD1003"), "GD");
        assert_eq!(department_prefix("ACCT3013"), "ACCT");
        assert_eq!(department_prefix("1003"), "");
    }

    #[test]
    fn requirements_from_reply() {
        let reply = "Sure.\n<prerequisites>ACCT2003 OR ACCT2043</prerequisites>\n\
                     <exclusions>ACCT2053 AND Student Major in ACCT</exclusions>";
        let req = parse_requirements(reply);
        assert_eq!(req.prerequisites, "ACCT2003 OR ACCT2043");
        assert_eq!(req.exclusions, "ACCT2053 AND Student Major in ACCT");

        let req =
            parse_requirements("<prerequisites>ACCT3003</prerequisites><exclusions></exclusions>");
        assert_eq!(req.prerequisites, "ACCT3003");
        assert!(req.exclusions.is_empty());
    }

    #[test]
    fn requirements_fall_back_to_empty() {
        assert_eq!(parse_requirements("no tags here"), Requirements::default());
        assert_eq!(
            parse_requirements("<prerequisites>A &bogus; B</prerequisites><exclusions></exclusions>"),
            Requirements::default()
        );
    }

    #[test]
    fn sources_keep_file_order_and_defaults() {
        let table = Table {
            path: "out.tsv".into(),
            headers: vec!["course_code".into(), "course_name".into()],
            rows: vec![
                vec!["MKT2003".into(), "MARKETING".into()],
                vec!["ACCT1003".into(), "ACCOUNTING".into()],
                vec!["COMP1013".into(), "PROGRAMMING".into()],
            ],
        };
        let codes: BTreeSet<String> = ["ACCT1003", "MKT2003"].map(String::from).into();
        let sources = source_courses(&table, &codes).unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].code, "MKT2003");
        assert_eq!(sources[1].units, "3");
        assert_eq!(sources[1].prerequisite, "N/A");
        assert!(sources[1].description.is_empty());
    }
}
