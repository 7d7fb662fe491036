use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::config::Settings;
use crate::error::CatalogError;
use crate::export::{self, ExportFormat};
use crate::model::{Incumbency, LecturerRow, TeacherRow};

#[derive(Debug, Default, Deserialize)]
struct ListResponse {
    #[serde(default)]
    data: ListPage,
}

#[derive(Debug, Default, Deserialize)]
struct ListPage {
    #[serde(default)]
    total: usize,
    #[serde(default)]
    data: Vec<Value>,
}

/// Page through the staff directory until an empty page or `total` is reached.
/// Raw entries are kept so the JSON dump has every field; sorted by `id`.
pub async fn fetch_all(client: &reqwest::Client, settings: &Settings) -> Result<Vec<Value>> {
    let mut page = 0usize;
    let mut teachers = Vec::new();

    loop {
        info!("Fetching staff page {}", page + 1);
        let body: ListResponse = client
            .get(&settings.teacher_api_url)
            .query(&[
                ("access-token", String::new()),
                ("page", page.to_string()),
                ("pageSize", settings.teacher_page_size.to_string()),
                ("key", String::new()),
                ("lang", "en".to_string()),
            ])
            .send()
            .await
            .context("Failed to fetch staff list")?
            .error_for_status()?
            .json()
            .await
            .context("Failed to decode staff list")?;

        let total = body.data.total;
        if body.data.data.is_empty() {
            break;
        }
        teachers.extend(body.data.data);
        info!("Fetched {}/{} staff entries", teachers.len(), total);
        page += 1;
        if teachers.len() >= total {
            break;
        }
    }

    teachers.sort_by_key(id_key);
    Ok(teachers)
}

fn id_key(v: &Value) -> (i64, String) {
    match v.get("id") {
        Some(Value::Number(n)) => (n.as_i64().unwrap_or_default(), String::new()),
        Some(Value::String(s)) => s
            .parse()
            .map(|n| (n, String::new()))
            .unwrap_or((i64::MAX, s.clone())),
        _ => (i64::MAX, String::new()),
    }
}

fn str_field<'a>(v: &'a Value, key: &str) -> &'a str {
    v.get(key).and_then(Value::as_str).unwrap_or("").trim()
}

/// Combine the local and English names without repeating shared tokens.
///
/// Identical names (ignoring case) are used once; when one name's tokens are a
/// subset of the other's, the longer one wins; otherwise both are joined.
pub fn merge_teacher_names(name: &str, name_en: &str) -> String {
    let (name, name_en) = (name.trim(), name_en.trim());
    if name.is_empty() {
        return name_en.to_string();
    }
    if name_en.is_empty() {
        return name.to_string();
    }
    if name.to_lowercase() == name_en.to_lowercase() {
        return name.to_string();
    }

    let tokens = |s: &str| -> HashSet<String> {
        s.split_whitespace().map(str::to_lowercase).collect()
    };
    let (local, english) = (tokens(name), tokens(name_en));
    if local.is_subset(&english) {
        name_en.to_string()
    } else if english.is_subset(&local) {
        name.to_string()
    } else {
        format!("{} {}", name, name_en)
    }
}

/// Flatten a raw staff entry into a CSV row.
pub fn to_row(v: &Value, profile_base: &str) -> TeacherRow {
    let uid = str_field(v, "username").to_string();
    let description = v
        .get("teacher_title")
        .map(|t| str_field(t, "title_en"))
        .unwrap_or("")
        .to_string();
    let url = if uid.is_empty() {
        String::new()
    } else {
        format!("{}/{}/en", profile_base.trim_end_matches('/'), uid)
    };
    TeacherRow {
        name: merge_teacher_names(str_field(v, "name"), str_field(v, "name_en")),
        uid,
        description,
        url,
    }
}

pub fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

pub fn save_json(dir: &Path, date: &str, teachers: &[Value]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(format!("teachers-{}.json", date));
    let body = serde_json::to_string_pretty(teachers)?;
    std::fs::write(&path, body).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

pub fn save_csv(dir: &Path, date: &str, rows: &[TeacherRow]) -> Result<PathBuf> {
    let path = dir.join(format!("teachers-{}.csv", date));
    export::write_records(&path, ExportFormat::Csv, rows)?;
    Ok(path)
}

/// Live date is `YYYY-MM-DD`, optionally followed by `-N` for re-exports.
pub fn validate_live_date(date: &str) -> Result<(), CatalogError> {
    let parts: Vec<&str> = date.splitn(4, '-').collect();
    if parts.len() < 3 {
        return Err(CatalogError::InvalidDate(date.to_string()));
    }
    let ymd = parts[..3].join("-");
    NaiveDate::parse_from_str(&ymd, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| CatalogError::InvalidDate(date.to_string()))
}

/// `lecturers_export_<date>.csv`, or the newest `lecturers_export_<date>*.csv`.
pub fn find_live_file(dir: &Path, date: &str) -> Result<PathBuf> {
    let exact = dir.join(format!("lecturers_export_{}.csv", date));
    if exact.exists() {
        return Ok(exact);
    }

    let prefix = format!("lecturers_export_{}", date);
    let mut candidates: Vec<(std::time::SystemTime, PathBuf)> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .filter_map(|e| e.ok())
        .filter(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            name.starts_with(&prefix) && name.ends_with(".csv")
        })
        .filter_map(|e| {
            let modified = e.metadata().and_then(|m| m.modified()).ok()?;
            Some((modified, e.path()))
        })
        .collect();
    candidates.sort();

    match candidates.pop() {
        Some((_, path)) => {
            info!("Found matching live data file: {}", path.display());
            Ok(path)
        }
        None => Err(CatalogError::NoMatchingFiles {
            pattern: dir.join(format!("{}*.csv", prefix)).display().to_string(),
        }
        .into()),
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub updated: usize,
    pub added: usize,
    pub resigned: usize,
    pub without_uid: usize,
}

/// Reconcile the live export with a fresh directory fetch, keyed by `uid`.
///
/// Rows with a uid come first, in live order, followed by newcomers in fetch
/// order; rows without a uid keep their values and move to the end.
pub fn merge_lecturers(
    latest: &[TeacherRow],
    live: Vec<LecturerRow>,
) -> (Vec<LecturerRow>, MergeSummary) {
    let mut order = Vec::new();
    let mut by_uid: HashMap<&str, &TeacherRow> = HashMap::new();
    for row in latest {
        let uid = row.uid.trim();
        if uid.is_empty() {
            continue;
        }
        if by_uid.insert(uid, row).is_none() {
            order.push(uid);
        }
    }

    let mut summary = MergeSummary::default();
    let mut merged = Vec::new();
    let mut without_uid = Vec::new();
    let mut seen = HashSet::new();

    for mut row in live {
        let uid = row.uid.trim().to_string();
        if uid.is_empty() {
            without_uid.push(row);
            continue;
        }
        match by_uid.get(uid.as_str()) {
            Some(fresh) => {
                row.name = fresh.name.clone();
                row.description = fresh.description.clone();
                row.url = fresh.url.clone();
                row.incumbency = Some(Incumbency::Active);
                summary.updated += 1;
            }
            None => {
                row.incumbency = Some(Incumbency::Resigned);
                summary.resigned += 1;
            }
        }
        seen.insert(uid);
        merged.push(row);
    }

    for uid in order {
        if seen.contains(uid) {
            continue;
        }
        let fresh = by_uid[uid];
        merged.push(LecturerRow {
            name: fresh.name.clone(),
            uid: fresh.uid.clone(),
            description: fresh.description.clone(),
            url: fresh.url.clone(),
            incumbency: Some(Incumbency::Active),
        });
        summary.added += 1;
    }

    summary.without_uid = without_uid.len();
    merged.extend(without_uid);
    (merged, summary)
}

/// Merge `latest_csv` into the live export for `live_date`; writes
/// `lecturers_export_<today>.csv` into `output_dir`.
pub fn merge_files(
    latest_csv: &Path,
    live_dir: &Path,
    live_date: &str,
    output_dir: &Path,
) -> Result<(PathBuf, MergeSummary, usize)> {
    validate_live_date(live_date)?;
    let live_path = find_live_file(live_dir, live_date)?;
    let latest: Vec<TeacherRow> = export::read_records(latest_csv, ExportFormat::Csv)?;
    let live: Vec<LecturerRow> = export::read_records(&live_path, ExportFormat::Csv)?;
    info!(
        "Loaded {} latest and {} live staff rows",
        latest.len(),
        live.len()
    );

    let (merged, summary) = merge_lecturers(&latest, live);
    let out = output_dir.join(format!("lecturers_export_{}.csv", today()));
    export::write_records(&out, ExportFormat::Csv, &merged)?;
    Ok((out, summary, merged.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn name_merging() {
        assert_eq!(
            merge_teacher_names("Mehrubon MAVLONI", "Michael Mehrubon MAVLONI"),
            "Michael Mehrubon MAVLONI"
        );
        assert_eq!(merge_teacher_names("Smith", "John Smith"), "John Smith");
        assert_eq!(merge_teacher_names("Zhang San", "John Zhang"), "Zhang San John Zhang");
        assert_eq!(merge_teacher_names("LI Wei", "li wei"), "LI Wei");
        assert_eq!(merge_teacher_names("", "Ann Lee"), "Ann Lee");
        assert_eq!(merge_teacher_names("王伟", ""), "王伟");
    }

    #[test]
    fn raw_entry_to_row() {
        let v = json!({
            "id": 7,
            "name": "王伟",
            "name_en": "Wang Wei",
            "username": "wangwei",
            "teacher_title": {"title_en": "Associate Professor"}
        });
        let row = to_row(&v, "https://staff.example.edu/");
        assert_eq!(row.name, "王伟 Wang Wei");
        assert_eq!(row.uid, "wangwei");
        assert_eq!(row.description, "Associate Professor");
        assert_eq!(row.url, "https://staff.example.edu/wangwei/en");

        let bare = to_row(&json!({"name": "X", "teacher_title": []}), "https://s");
        assert!(bare.url.is_empty());
        assert!(bare.description.is_empty());
    }

    #[test]
    fn ids_sort_numerically() {
        let mut v = vec![json!({"id": 10}), json!({"id": "2"}), json!({}), json!({"id": 1})];
        v.sort_by_key(id_key);
        assert_eq!(v[0]["id"], 1);
        assert_eq!(v[1]["id"], "2");
        assert_eq!(v[2]["id"], 10);
    }

    #[test]
    fn live_dates() {
        assert!(validate_live_date("2025-07-19").is_ok());
        assert!(validate_live_date("2025-07-19-2").is_ok());
        assert!(validate_live_date("2025-13-01").is_err());
        assert!(validate_live_date("20250719").is_err());
    }

    fn teacher(name: &str, uid: &str) -> TeacherRow {
        TeacherRow {
            name: name.into(),
            uid: uid.into(),
            description: "Lecturer".into(),
            url: format!("https://s/{}/en", uid),
        }
    }

    fn lecturer(name: &str, uid: &str) -> LecturerRow {
        LecturerRow {
            name: name.into(),
            uid: uid.into(),
            ..Default::default()
        }
    }

    #[test]
    fn merge_marks_incumbency() {
        let latest = vec![teacher("A New", "a"), teacher("C", "c")];
        let live = vec![
            lecturer("Guest", ""),
            lecturer("A Old", "a"),
            lecturer("B", "b"),
        ];
        let (merged, summary) = merge_lecturers(&latest, live);

        let names: Vec<&str> = merged.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["A New", "B", "C", "Guest"]);
        assert_eq!(merged[0].incumbency, Some(Incumbency::Active));
        assert_eq!(merged[1].incumbency, Some(Incumbency::Resigned));
        assert_eq!(merged[2].incumbency, Some(Incumbency::Active));
        assert_eq!(merged[3].incumbency, None);
        assert_eq!(
            summary,
            MergeSummary {
                updated: 1,
                added: 1,
                resigned: 1,
                without_uid: 1
            }
        );
    }

    #[test]
    fn merge_files_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let latest = dir.path().join("teachers-2025-08-01.csv");
        save_csv(dir.path(), "2025-08-01", &[teacher("A", "a")]).unwrap();
        let live_dir = dir.path().join("live");
        std::fs::create_dir(&live_dir).unwrap();
        std::fs::write(
            live_dir.join("lecturers_export_2025-07-19-2.csv"),
            "name,uid,description,url,incumbencyStatus\nOld A,a,,,ACTIVE\nB,b,,,ACTIVE\n",
        )
        .unwrap();

        let out_dir = dir.path().join("out");
        let (out, summary, total) =
            merge_files(&latest, &live_dir, "2025-07-19", &out_dir).unwrap();
        assert_eq!(total, 2);
        assert_eq!(summary.resigned, 1);
        let back: Vec<LecturerRow> = export::read_records(&out, ExportFormat::Csv).unwrap();
        assert_eq!(back[0].name, "A");
        assert_eq!(back[1].incumbency, Some(Incumbency::Resigned));
    }

    #[test]
    fn live_export_without_status_column() {
        let dir = tempfile::tempdir().unwrap();
        let latest = save_csv(dir.path(), "2025-08-01", &[teacher("A", "a")]).unwrap();
        std::fs::write(
            dir.path().join("lecturers_export_2025-07-19.csv"),
            "name,uid,description,url\nOld A,a,,\nB,b,,\n",
        )
        .unwrap();

        let out_dir = dir.path().join("out");
        let (out, summary, total) =
            merge_files(&latest, dir.path(), "2025-07-19", &out_dir).unwrap();
        assert_eq!(total, 2);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.resigned, 1);
        let back: Vec<LecturerRow> = export::read_records(&out, ExportFormat::Csv).unwrap();
        assert_eq!(back[0].incumbency, Some(Incumbency::Active));
        assert_eq!(back[1].incumbency, Some(Incumbency::Resigned));
    }

    #[test]
    fn missing_live_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_live_file(dir.path(), "2025-07-19").is_err());
    }
}
