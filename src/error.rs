use std::path::PathBuf;

use thiserror::Error;

/// Failures the CLI reports as a one-line message with exit code 1.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("input file not found: {}", path.display())]
    InputNotFound { path: PathBuf },

    #[error("'{}' is not a directory", path.display())]
    NotADirectory { path: PathBuf },

    #[error("column '{column}' not found in {} (available: {available})", path.display())]
    MissingColumn {
        column: String,
        path: PathBuf,
        available: String,
    },

    #[error("no worksheet found in {}", path.display())]
    NoWorksheet { path: PathBuf },

    #[error("could not extract year/semester from filename: {filename}")]
    UnknownTerm { filename: String },

    #[error("no files found matching {pattern}")]
    NoMatchingFiles { pattern: String },

    #[error("{var} environment variable is not set")]
    MissingApiKey { var: &'static str },

    #[error("invalid live date '{0}' (expected YYYY-MM-DD[-N])")]
    InvalidDate(String),

    #[error("failed to read PDF {}: {message}", path.display())]
    Pdf { path: PathBuf, message: String },

    #[error("LLM request failed: {0}")]
    Llm(String),
}

impl CatalogError {
    /// Errors the user can fix by correcting arguments or environment.
    pub fn is_fixable(&self) -> bool {
        !matches!(self, CatalogError::Pdf { .. } | CatalogError::Llm(_))
    }
}

/// Fail with `InputNotFound` unless `path` exists.
pub fn ensure_exists(path: &std::path::Path) -> Result<(), CatalogError> {
    if path.exists() {
        Ok(())
    } else {
        Err(CatalogError::InputNotFound {
            path: path.to_path_buf(),
        })
    }
}
