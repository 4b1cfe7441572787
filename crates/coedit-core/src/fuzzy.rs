//! Fuzzy string lookup over buffer titles.
//!
//! Titles are indexed as n-gram count vectors. A query is scored by cosine
//! similarity against every title, trying the largest gram size first and
//! falling back to smaller ones. The best candidates are optionally re-scored
//! by normalized Levenshtein distance, and anything under `min_score` is
//! discarded.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Candidates re-scored by edit distance after the cosine pass.
const LEVENSHTEIN_CANDIDATES: usize = 50;

/// Tuning knobs for fuzzy lookup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FuzzyConfig {
    pub min_score: f64,
    pub gram_size_lower: usize,
    pub gram_size_upper: usize,
    pub use_levenshtein: bool,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            min_score: 0.33,
            gram_size_lower: 2,
            gram_size_upper: 3,
            use_levenshtein: true,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    /// Lowercased value.
    normalized: String,
    /// Vector magnitude for each gram size.
    norms: HashMap<usize, f64>,
}

/// An index of strings that can be queried by similarity.
#[derive(Debug, Clone, Default)]
pub struct FuzzySet {
    config: FuzzyConfig,
    entries: Vec<Entry>,
    /// Original value for each normalized value.
    exact: HashMap<String, String>,
    /// gram size -> gram -> (entry index, count)
    grams: HashMap<usize, HashMap<String, Vec<(usize, usize)>>>,
}

impl FuzzySet {
    pub fn new(config: FuzzyConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Build an index over `values`. Duplicates are indexed once.
    pub fn from_values<'a>(config: FuzzyConfig, values: impl IntoIterator<Item = &'a str>) -> Self {
        let mut set = Self::new(config);
        for value in values {
            set.add(value);
        }
        set
    }

    /// Add a value. Returns false if an equal (case-insensitive) value exists.
    pub fn add(&mut self, value: &str) -> bool {
        let normalized = value.to_lowercase();
        if self.exact.contains_key(&normalized) {
            return false;
        }

        let index = self.entries.len();
        let mut norms = HashMap::new();
        for size in self.config.gram_size_lower..=self.config.gram_size_upper {
            let counts = gram_counts(value, size);
            let sum_sq: usize = counts.values().map(|c| c * c).sum();
            norms.insert(size, (sum_sq as f64).sqrt());

            let table = self.grams.entry(size).or_default();
            for (gram, count) in counts {
                table.entry(gram).or_default().push((index, count));
            }
        }

        self.entries.push(Entry {
            normalized: normalized.clone(),
            norms,
        });
        self.exact.insert(normalized, value.to_string());
        true
    }

    /// Best matches for `query`, highest score first.
    ///
    /// Returns None when nothing clears `min_score`.
    pub fn get(&self, query: &str) -> Option<Vec<(f64, String)>> {
        let normalized = query.to_lowercase();
        if let Some(value) = self.exact.get(&normalized) {
            return Some(vec![(1.0, value.clone())]);
        }

        (self.config.gram_size_lower..=self.config.gram_size_upper)
            .rev()
            .filter_map(|size| self.get_with_size(query, &normalized, size))
            .find(|results| !results.is_empty())
    }

    /// The single best match.
    pub fn best(&self, query: &str) -> Option<(f64, String)> {
        self.get(query)?.into_iter().next()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get_with_size(&self, query: &str, normalized: &str, size: usize) -> Option<Vec<(f64, String)>> {
        let table = self.grams.get(&size)?;
        let counts = gram_counts(query, size);

        let mut dot: HashMap<usize, usize> = HashMap::new();
        let mut sum_sq = 0usize;
        for (gram, count) in &counts {
            sum_sq += count * count;
            if let Some(postings) = table.get(gram) {
                for (index, other) in postings {
                    *dot.entry(*index).or_default() += count * other;
                }
            }
        }
        if dot.is_empty() {
            return None;
        }

        let query_norm = (sum_sq as f64).sqrt();
        let mut results: Vec<(f64, usize)> = dot
            .into_iter()
            .map(|(index, product)| {
                let entry_norm = self.entries[index].norms.get(&size).copied().unwrap_or(1.0);
                (product as f64 / (query_norm * entry_norm), index)
            })
            .collect();
        sort_desc(&mut results);

        if self.config.use_levenshtein {
            results.truncate(LEVENSHTEIN_CANDIDATES);
            for (score, index) in results.iter_mut() {
                *score = levenshtein_similarity(&self.entries[*index].normalized, normalized);
            }
            sort_desc(&mut results);
        }

        Some(
            results
                .into_iter()
                .filter(|(score, _)| *score >= self.config.min_score)
                .filter_map(|(score, index)| {
                    self.exact
                        .get(&self.entries[index].normalized)
                        .map(|value| (score, value.clone()))
                })
                .collect(),
        )
    }
}

/// Stable sort by score, highest first; ties keep insertion order.
fn sort_desc(results: &mut [(f64, usize)]) {
    results.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
}

/// Gram counts of `value` after lowercasing, dropping punctuation and padding
/// with `-` on both ends.
fn gram_counts(value: &str, size: usize) -> HashMap<String, usize> {
    let mut padded: Vec<char> = Vec::with_capacity(value.len() + 2);
    padded.push('-');
    padded.extend(
        value
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == ',' || *c == ' '),
    );
    padded.push('-');
    while padded.len() < size {
        padded.push('-');
    }

    let mut counts = HashMap::new();
    for window in padded.windows(size) {
        *counts.entry(window.iter().collect::<String>()).or_default() += 1;
    }
    counts
}

/// 1 - distance / longer length.
fn levenshtein_similarity(a: &str, b: &str) -> f64 {
    let a_len = a.chars().count();
    let b_len = b.chars().count();
    let longest = a_len.max(b_len);
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            let cost = if ca == *cb { 0 } else { 1 };
            row[j + 1] = (above + 1).min(row[j] + 1).min(diagonal + cost);
            diagonal = above;
        }
    }
    row[b.len()]
}

/// A free-text reference to a file, e.g. `main.py:L10` or `main.py:L10-L12`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileReference {
    pub file: String,
    /// One-based inclusive line range, if given.
    pub lines: Option<(usize, usize)>,
}

/// Split a reference into file name and optional line range.
pub fn parse_file_reference(reference: &str) -> FileReference {
    let reference = reference.trim();
    let Some((file, suffix)) = reference.rsplit_once(":L") else {
        return FileReference {
            file: reference.to_string(),
            lines: None,
        };
    };

    let lines = match suffix.split_once("-") {
        Some((start, end)) => {
            let end = end.strip_prefix('L').unwrap_or(end);
            start.parse().ok().zip(end.parse().ok())
        }
        None => suffix.parse().ok().map(|line| (line, line)),
    };

    match lines {
        Some(lines) => FileReference {
            file: file.to_string(),
            lines: Some(lines),
        },
        None => FileReference {
            file: reference.to_string(),
            lines: None,
        },
    }
}
