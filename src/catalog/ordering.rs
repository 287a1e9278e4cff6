use std::cmp::Ordering;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref NAME_CHUNKS: Regex = Regex::new(r"\d+|\D+").expect("valid chunk pattern");
}

/// How a catalog derives its total order when built from unordered entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionOrdering {
    /// Keep the order entries were supplied in.
    #[default]
    AsRegistered,
    /// Order by name, comparing embedded digit runs numerically
    /// (`"Model 9"` before `"Model 10"`).
    NaturalName,
}

impl VersionOrdering {
    pub fn sort<T, F>(&self, entries: &mut [T], key: F)
    where
        F: Fn(&T) -> &str,
    {
        match self {
            Self::AsRegistered => {}
            Self::NaturalName => entries.sort_by(|a, b| natural_cmp(key(a), key(b))),
        }
    }
}

/// Compares names chunk by chunk; digit chunks compare by numeric value.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = NAME_CHUNKS.find_iter(a).map(|m| m.as_str());
    let mut right = NAME_CHUNKS.find_iter(b).map(|m| m.as_str());

    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ordering = match (is_digits(x), is_digits(y)) {
                    (true, true) => cmp_digit_runs(x, y),
                    _ => x.cmp(y),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

fn is_digits(chunk: &str) -> bool {
    chunk.bytes().all(|b| b.is_ascii_digit())
}

// Length-then-lexical on the unpadded digits; no integer parsing, so runs of
// any length compare correctly.
fn cmp_digit_runs(x: &str, y: &str) -> Ordering {
    let x = x.trim_start_matches('0');
    let y = y.trim_start_matches('0');
    x.len().cmp(&y.len()).then_with(|| x.cmp(y))
}
