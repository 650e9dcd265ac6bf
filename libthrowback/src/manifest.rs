//! Manifest loading
//!
//! The manifest is a JSON list of set objects. Each entry carries a
//! `set_name` plus either an `images` list or the older single `filename`
//! field. Fields this version does not understand are ignored so newer
//! manifest generators keep working.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use crate::error::{ManifestError, Result};
use crate::types::ThrowbackSet;

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    #[serde(default)]
    set_name: String,
    #[serde(default)]
    images: Vec<String>,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    set_url: Option<String>,
    #[serde(default)]
    date_published: Option<String>,
    #[serde(default)]
    tags: Option<String>,
}

/// Load and validate the manifest at `path`
///
/// # Errors
///
/// Returns `ManifestError` if the file is missing or malformed, or if any
/// set has no name, no images, or a name already used by an earlier set.
pub fn load(path: &Path) -> Result<Vec<ThrowbackSet>> {
    if !path.exists() {
        return Err(ManifestError::NotFound(path.to_path_buf()).into());
    }

    let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let sets = parse(&content)?;
    tracing::debug!("Loaded {} sets from {}", sets.len(), path.display());
    Ok(sets)
}

/// Parse manifest JSON into validated sets, preserving manifest order
pub fn parse(content: &str) -> Result<Vec<ThrowbackSet>> {
    let entries: Vec<ManifestEntry> =
        serde_json::from_str(content).map_err(ManifestError::Malformed)?;

    let mut seen = HashSet::new();
    let mut sets = Vec::with_capacity(entries.len());

    for (index, entry) in entries.into_iter().enumerate() {
        let name = normalize_set_name(&entry.set_name);
        if name.is_empty() {
            return Err(ManifestError::EmptyName { index }.into());
        }

        let mut images: Vec<String> = entry
            .images
            .iter()
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty())
            .collect();
        if images.is_empty() {
            if let Some(filename) = non_empty(entry.filename) {
                images.push(filename);
            }
        }
        if images.is_empty() {
            return Err(ManifestError::NoImages(name).into());
        }

        if !seen.insert(name.clone()) {
            return Err(ManifestError::DuplicateName(name).into());
        }

        sets.push(ThrowbackSet {
            name,
            images,
            description: non_empty(entry.description),
            set_url: non_empty(entry.set_url),
            date_published: non_empty(entry.date_published),
            tags: non_empty(entry.tags),
        });
    }

    Ok(sets)
}

/// Decode HTML entities and fold typographic quotes to ASCII
///
/// Gallery exports tend to carry `&#8217;` and curly quotes in titles; the
/// same name typed on a command line will not.
pub fn normalize_set_name(raw: &str) -> String {
    let decoded = html_escape::decode_html_entities(raw.trim());
    decoded
        .chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{00AB}' | '\u{00BB}' => '"',
            '\u{2019}' | '\u{2018}' | '\u{201A}' | '`' => '\'',
            other => other,
        })
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
