use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::category::sanitize_label;
use crate::runner::{CompiledTrackDetail, RunState};

pub const LOG_FILE: &str = "log.txt";
pub const JSON_LOG_FILE: &str = "tracks.json";
pub const COLLECTIONS_DIR: &str = "collections";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Collection name for tracks whose grouping field is empty.
const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("IO error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn write_file(path: &Path, contents: impl AsRef<[u8]>) -> Result<(), ReportError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ReportError::Io {
            path: parent.display().to_string(),
            source,
        })?;
    }
    std::fs::write(path, contents).map_err(|source| ReportError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Compiled tracks ordered by numeric id, then name.
fn sorted_details(state: &RunState) -> Vec<&CompiledTrackDetail> {
    let mut details: Vec<_> = state.details.values().collect();
    details.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.name.cmp(&b.name)));
    details
}

/// Plain-text run log: counts, chart summaries in processing order, errors.
pub fn render_log(state: &RunState) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Compiled at {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(
        out,
        "Total compiled: {} | Incomplete: {} | Failed: {} | Skipped: {}",
        state.compiled, state.incomplete, state.failed, state.skipped
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "Compiled charts:");
    for summary in &state.summaries {
        let _ = writeln!(out, "{summary}");
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Errors ({}):", state.errors.len());
    for error in &state.errors {
        let _ = writeln!(out, "{error}");
    }
    out
}

/// Write `{output_root}/log.txt`.
pub fn write_log(output_root: &Path, state: &RunState) -> Result<PathBuf, ReportError> {
    let path = output_root.join(LOG_FILE);
    write_file(&path, render_log(state))?;
    log::info!("Wrote run log to {}", path.display());
    Ok(path)
}

/// Write `{output_root}/tracks.json`: compiled tracks sorted by id.
pub fn write_json_log(output_root: &Path, state: &RunState) -> Result<PathBuf, ReportError> {
    let path = output_root.join(JSON_LOG_FILE);
    let json = serde_json::to_string_pretty(&sorted_details(state))?;
    write_file(&path, json)?;
    log::info!("Wrote track log to {}", path.display());
    Ok(path)
}

#[derive(Debug, Serialize)]
struct ManifestTrack<'a> {
    id: u32,
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    name: &'a str,
    sort_order: usize,
    tracks: Vec<ManifestTrack<'a>>,
}

/// Write one manifest per genre and per version under `collections_root`.
///
/// Genre collections are ordered by name; version collections by their
/// numeric version so releases list chronologically. Returns the number of
/// manifests written.
pub fn write_collections(collections_root: &Path, state: &RunState) -> Result<usize, ReportError> {
    let details = sorted_details(state);

    let mut by_genre: BTreeMap<&str, Vec<&CompiledTrackDetail>> = BTreeMap::new();
    // (version number, version name) keeps versions in release order.
    let mut by_version: BTreeMap<(u64, &str), Vec<&CompiledTrackDetail>> = BTreeMap::new();
    for &detail in &details {
        by_genre.entry(detail.genre.as_str()).or_default().push(detail);
        let number = detail.version_number.parse().unwrap_or(u64::MAX);
        by_version
            .entry((number, detail.version.as_str()))
            .or_default()
            .push(detail);
    }

    let mut written = 0;
    for (order, (genre, tracks)) in by_genre.into_iter().enumerate() {
        write_manifest(&collections_root.join("genre"), genre, order, &tracks)?;
        written += 1;
    }

    // Tracks from one version may carry slightly different numbers; merge by name.
    let mut versions: Vec<(&str, Vec<&CompiledTrackDetail>)> = Vec::new();
    for ((_, version), tracks) in by_version {
        match versions.iter_mut().find(|(name, _)| *name == version) {
            Some((_, existing)) => existing.extend(tracks),
            None => versions.push((version, tracks)),
        }
    }
    for (order, (version, mut tracks)) in versions.into_iter().enumerate() {
        tracks.sort_by_key(|d| d.id);
        write_manifest(&collections_root.join("version"), version, order, &tracks)?;
        written += 1;
    }

    log::info!("Wrote {} collection manifests to {}", written, collections_root.display());
    Ok(written)
}

fn write_manifest(
    group_root: &Path,
    name: &str,
    sort_order: usize,
    tracks: &[&CompiledTrackDetail],
) -> Result<(), ReportError> {
    let name = if name.trim().is_empty() { UNCATEGORIZED } else { name };
    let manifest = Manifest {
        name,
        sort_order,
        tracks: tracks
            .iter()
            .map(|d| ManifestTrack { id: d.id, name: &d.name })
            .collect(),
    };
    let path = group_root.join(sanitize_label(name)).join(MANIFEST_FILE);
    write_file(&path, serde_json::to_string_pretty(&manifest)?)
}
