//! Catalog file loading
//!
//! Supported formats, chosen by extension:
//! - `.csv`: header row with a `name` column
//! - `.json`: array of strings
//! - anything else: one name per line, `#` starts a comment line

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use super::Catalog;

/// Failure to load the catalog source. Always fatal at startup.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("catalog {path:?} has no 'name' column")]
    MissingNameColumn { path: PathBuf },
    #[error("invalid JSON catalog {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl Catalog {
    /// Load the catalog from a file
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        let names = match extension.as_deref() {
            Some("csv") => parse_csv(&content).ok_or_else(|| CatalogError::MissingNameColumn {
                path: path.to_path_buf(),
            })?,
            Some("json") => serde_json::from_str::<Vec<String>>(&content).map_err(|source| {
                CatalogError::Json {
                    path: path.to_path_buf(),
                    source,
                }
            })?,
            _ => parse_list(&content),
        };

        let catalog = Catalog::new(names);
        if catalog.is_empty() {
            warn!("Medicine catalog {:?} is empty; only unverified OCR names can resolve", path);
        } else {
            info!("Loaded {} medicines from {:?}", catalog.len(), path);
        }
        Ok(catalog)
    }
}

/// Extract the `name` column. Returns `None` when the header lacks it.
fn parse_csv(content: &str) -> Option<Vec<String>> {
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());
    let header = split_csv_line(lines.next()?);
    let column = header
        .iter()
        .position(|h| h.trim().trim_start_matches('\u{feff}').eq_ignore_ascii_case("name"))?;

    Some(
        lines
            .filter_map(|line| split_csv_line(line).into_iter().nth(column))
            .map(|cell| cell.trim().to_string())
            .filter(|cell| !cell.is_empty())
            .collect(),
    )
}

/// Split one CSV record, honouring double quotes and `""` escapes
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

fn parse_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}
