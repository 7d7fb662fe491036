use std::fmt;

use serde::{Deserialize, Serialize};

// ── Handbook records ──

/// One course reconstructed from handbook text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRecord {
    #[serde(rename = "course_code")]
    pub code: String,
    #[serde(rename = "course_name")]
    pub name: String,
    pub prerequisite: String,
    #[serde(rename = "unit")]
    pub units: u32,
    #[serde(rename = "course_description")]
    pub description: String,
}

/// Description-only export row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptionRow {
    pub course_code: String,
    pub course_description: String,
}

// ── Timetable records ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Semester {
    Spring,
    Fall,
}

impl Semester {
    /// Timetable numbering: semester 1 runs in the fall, semester 2 in the spring.
    pub fn from_number(n: &str) -> Option<Self> {
        match n.trim() {
            "1" => Some(Semester::Fall),
            "2" => Some(Semester::Spring),
            _ => None,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FALL" => Some(Semester::Fall),
            "SPRING" => Some(Semester::Spring),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Semester::Fall => "FALL",
            Semester::Spring => "SPRING",
        }
    }
}

impl fmt::Display for Semester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Academic year start plus semester. Orders FALL after SPRING within a year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Term {
    pub year: i32,
    pub semester: Semester,
}

impl Term {
    /// Term from the `year` and `semester` cells of an exported row.
    pub fn from_columns(year: &str, semester: &str) -> Option<Self> {
        Some(Term {
            year: year.trim().parse().ok()?,
            semester: Semester::parse(semester)?,
        })
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.year, self.semester)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OfferingRecord {
    pub course_code: String,
    pub year: i32,
    pub semester: Semester,
    pub lecturer_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepartmentRecord {
    pub course_code: String,
    pub year: i32,
    pub semester: Semester,
    pub offering_unit: String,
    pub offering_programme: String,
}

impl DepartmentRecord {
    pub fn term(&self) -> Term {
        Term {
            year: self.year,
            semester: self.semester,
        }
    }
}

// ── Staff records ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Incumbency {
    Active,
    Resigned,
}

/// One staff member as fetched from the directory API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeacherRow {
    pub name: String,
    pub uid: String,
    pub description: String,
    pub url: String,
}

/// Staff row in the live system export, with incumbency after a merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LecturerRow {
    pub name: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "incumbencyStatus", default)]
    pub incumbency: Option<Incumbency>,
}

// ── LLM-derived records ──

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandbookCourse {
    #[serde(default)]
    pub course_code: String,
    #[serde(default)]
    pub course_name: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub unit: String,
    #[serde(default)]
    pub source_file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingCourse {
    pub code: String,
    pub name_en: String,
    pub name_cn: String,
    #[serde(rename = "type")]
    pub course_type: String,
    pub units: String,
    pub deliver_department: String,
    pub deliver_faculty: String,
    pub prerequisites: String,
    pub exclusions: String,
    pub description: String,
    pub is_visible: String,
}

/// LLMs return units as `"3"` or `3`; keep the text form either way.
fn string_or_number<'de, D>(de: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let v = serde_json::Value::deserialize(de)?;
    Ok(match v {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}
