use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

/// Runtime settings: defaults, then `catalog.toml`, then `CATALOG_*` env vars.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Leading lines of a handbook PDF that are cover/title noise.
    pub skip_lines: usize,
    pub output_dir: String,
    pub request_timeout_secs: u64,
    pub ollama_host: String,
    pub ollama_model: String,
    pub deepseek_base_url: String,
    pub deepseek_model: String,
    pub teacher_api_url: String,
    pub teacher_page_size: usize,
    pub teacher_profile_url: String,
    pub lecturer_delimiter: String,
    #[serde(default)]
    pub boilerplate: Vec<String>,
}

impl Settings {
    pub fn load() -> Result<Self> {
        Config::builder()
            .set_default("skip_lines", 6)?
            .set_default("output_dir", "output")?
            .set_default("request_timeout_secs", 120)?
            .set_default("ollama_host", "http://localhost:11434")?
            .set_default("ollama_model", "qwen3:30b-a3b")?
            .set_default("deepseek_base_url", "https://api.deepseek.com")?
            .set_default("deepseek_model", "deepseek-chat")?
            .set_default(
                "teacher_api_url",
                "https://staff.bnbu.edu.cn/teacher/teacher/list",
            )?
            .set_default("teacher_page_size", 500)?
            .set_default("teacher_profile_url", "https://staff.bnbu.edu.cn")?
            .set_default("lecturer_delimiter", "&")?
            .add_source(File::with_name("catalog").required(false))
            .add_source(Environment::with_prefix("CATALOG"))
            .build()
            .context("Failed to build settings")?
            .try_deserialize()
            .context("Invalid settings")
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            skip_lines: 6,
            output_dir: "output".into(),
            request_timeout_secs: 120,
            ollama_host: "http://localhost:11434".into(),
            ollama_model: "qwen3:30b-a3b".into(),
            deepseek_base_url: "https://api.deepseek.com".into(),
            deepseek_model: "deepseek-chat".into(),
            teacher_api_url: "https://staff.bnbu.edu.cn/teacher/teacher/list".into(),
            teacher_page_size: 500,
            teacher_profile_url: "https://staff.bnbu.edu.cn".into(),
            lecturer_delimiter: "&".into(),
            boilerplate: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_file() {
        let s = Settings::load().unwrap();
        assert_eq!(s.teacher_page_size, 500);
        assert!(s.ollama_host.starts_with("http"));
    }
}
