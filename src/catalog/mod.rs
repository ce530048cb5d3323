//! Medicine catalog and fuzzy matching
//!
//! The catalog is an ordered, append-only list of known medicine names.
//! Every lookup is order-sensitive: the first entry that wins a comparison
//! is returned, so results are reproducible for a given catalog.

pub mod loader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use strsim::normalized_levenshtein;
use tracing::{debug, info};


/// Default minimum similarity score for a fuzzy match
pub const DEFAULT_MATCH_THRESHOLD: u8 = 80;

/// Catalog source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Path to the catalog file (.csv with a `name` column, .json array, or plain list)
    pub path: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/medicines.csv"),
        }
    }
}

/// Outcome of a scored catalog query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// Matched catalog entry, if the score cleared the threshold
    pub name: Option<String>,
    /// Best similarity score seen (0 - 100)
    pub score: u8,
}

/// Ordered catalog of known medicine names
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    names: Vec<String>,
}

impl Catalog {
    /// Create a catalog from names, trimming each and skipping empties
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = names
            .into_iter()
            .map(|n| n.into().trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        Self { names }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the catalog has no entries
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// All entries in catalog order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Append a name. Empty names and exact duplicates are ignored.
    ///
    /// Returns true if the catalog grew.
    pub fn add(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() || self.names.iter().any(|n| n == name) {
            return false;
        }
        self.names.push(name.to_string());
        info!("Added medicine to catalog: {}", name);
        true
    }

    /// Find the catalog entry for an observed token.
    ///
    /// A case-insensitive exact hit always wins, whatever the threshold.
    /// Otherwise the highest fuzzy score is returned if it reaches `threshold`.
    pub fn search(&self, query: &str, threshold: u8) -> Option<String> {
        self.search_scored(query, threshold).name
    }

    /// Same as [`Catalog::search`] but also reports the best score
    pub fn search_scored(&self, query: &str, threshold: u8) -> MatchResult {
        let query = normalize(query);

        if let Some(hit) = self.names.iter().find(|n| n.to_lowercase() == query) {
            debug!("Exact catalog match: {}", hit);
            return MatchResult {
                name: Some(hit.clone()),
                score: 100,
            };
        }

        let mut best: Option<&String> = None;
        let mut best_score = 0u8;
        for name in &self.names {
            let score = similarity(&query, name);
            // Strictly greater keeps the first entry on ties
            if best.is_none() || score > best_score {
                best = Some(name);
                best_score = score;
            }
        }

        match best {
            Some(name) if best_score >= threshold => {
                debug!("Fuzzy catalog match: {} (score: {})", name, best_score);
                MatchResult {
                    name: Some(name.clone()),
                    score: best_score,
                }
            }
            _ => {
                debug!("No catalog match for '{}' (best score: {})", query, best_score);
                MatchResult {
                    name: None,
                    score: best_score,
                }
            }
        }
    }

    /// Whether a name resolves to a catalog entry
    pub fn is_known(&self, name: &str, threshold: u8) -> bool {
        self.search(name, threshold).is_some()
    }

    /// Score every entry against the query, best first.
    ///
    /// Ties keep catalog order. Intended for diagnostics.
    pub fn top_n(&self, query: &str, n: usize) -> Vec<(String, u8)> {
        let query = normalize(query);
        let mut scored: Vec<(String, u8)> = self
            .names
            .iter()
            .map(|name| (name.clone(), similarity(&query, name)))
            .collect();
        scored.sort_by(|a, b| b.1.cmp(&a.1));
        scored.truncate(n);
        scored
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Normalized edit-distance similarity on a 0 - 100 scale
fn similarity(normalized_query: &str, name: &str) -> u8 {
    let score = normalized_levenshtein(normalized_query, &name.to_lowercase());
    (score * 100.0).round().clamp(0.0, 100.0) as u8
}
