use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use thiserror::Error;
use walkdir::WalkDir;

use crate::pipeline::{PipelineError, SkipReason, TrackOutcome, TrackPipeline};
use crate::report::{self, ReportError};
use crate::MUSIC_DIR;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("source root {0} does not exist")]
    MissingSource(String),
    #[error("no `music` folder under source root {0}")]
    MissingMusicDir(String),
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Report(#[from] ReportError),
}

/// Manifest row for a compiled track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledTrackDetail {
    pub id: u32,
    pub name: String,
    pub genre: String,
    pub version: String,
    pub version_number: String,
    pub summary: String,
}

/// Everything a run accumulates. Built fresh per run and only written by the
/// runner, which folds each [`TrackOutcome`] in as it arrives.
#[derive(Debug, Default)]
pub struct RunState {
    pub compiled: usize,
    pub skipped: usize,
    pub incomplete: usize,
    pub failed: usize,
    /// One-line chart summaries in processing order.
    pub summaries: Vec<String>,
    /// Compiled id → name.
    pub index: BTreeMap<u32, String>,
    /// (id, name) → detail.
    pub details: BTreeMap<(u32, String), CompiledTrackDetail>,
    pub errors: Vec<String>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one outcome into the run.
    ///
    /// A repeated id replaces the earlier index entry; the collision is
    /// logged and kept in the error list.
    pub fn record(&mut self, outcome: &TrackOutcome) {
        self.errors.extend(outcome.errors());

        let track = match outcome {
            TrackOutcome::Skipped { .. } => {
                self.skipped += 1;
                return;
            }
            TrackOutcome::Failed { .. } => {
                self.failed += 1;
                return;
            }
            TrackOutcome::Incomplete { .. } => {
                self.incomplete += 1;
                return;
            }
            TrackOutcome::Committed(track) => track,
        };

        let meta = &track.meta;
        let id = meta.numeric_id();
        if let Some(previous) = self.index.insert(id, meta.name.clone()) {
            log::warn!("Duplicate track id {id}: {previous} replaced by {}", meta.name);
            self.errors
                .push(format!("Duplicate ID {id}: {previous} replaced by {}", meta.name));
        }
        self.details.insert(
            (id, meta.name.clone()),
            CompiledTrackDetail {
                id,
                name: meta.name.clone(),
                genre: meta.genre.clone(),
                version: meta.version.clone(),
                version_number: meta.version_number.clone(),
                summary: track.summary.clone(),
            },
        );
        self.summaries.push(track.summary.clone());
        self.compiled += 1;
    }
}

/// Which end-of-run artifacts to write besides the primary log.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub json_log: bool,
    pub collections: bool,
}

/// Runs every track folder under a source root through a [`TrackPipeline`].
pub struct BatchRunner {
    pipeline: TrackPipeline,
    options: RunOptions,
}

impl BatchRunner {
    pub fn new(pipeline: TrackPipeline, options: RunOptions) -> Self {
        Self { pipeline, options }
    }

    /// Compile every track under `{source_root}/music`, sequentially and in
    /// listing order, then write the run artifacts to the output root.
    ///
    /// Skipped, failed and incomplete tracks do not fail the run; only
    /// errors from [`TrackPipeline::process`] and artifact writing do.
    pub fn run(&self, source_root: &Path) -> Result<RunState, RunError> {
        if !source_root.is_dir() {
            return Err(RunError::MissingSource(source_root.display().to_string()));
        }
        let music_dir = source_root.join(MUSIC_DIR);
        if !music_dir.is_dir() {
            return Err(RunError::MissingMusicDir(source_root.display().to_string()));
        }

        let output_root = &self.pipeline.config().output_root;
        std::fs::create_dir_all(output_root).map_err(|source| RunError::Io {
            path: output_root.display().to_string(),
            source,
        })?;

        let (folders, unreadable) = track_folders(&music_dir);
        log::info!("Found {} track folders in {}", folders.len(), music_dir.display());

        let pb = ProgressBar::new(folders.len() as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}"
            )
            .unwrap()
            .progress_chars("#>-"),
        );

        let mut state = RunState::new();
        state.skipped += unreadable.len();
        state.errors.extend(unreadable);
        for folder in &folders {
            let name = folder
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            pb.set_message(name);

            let outcome = self.pipeline.process(folder).inspect_err(|_| pb.abandon())?;
            match &outcome {
                TrackOutcome::Skipped { reason: SkipReason::NoCharts, .. } => {
                    log::debug!("{}: no charts", folder.display());
                }
                TrackOutcome::Skipped { reason: SkipReason::NoMetadata, .. } => {
                    log::debug!("{}: no metadata", folder.display());
                }
                TrackOutcome::Committed(track) => {
                    log::info!("Exported to: {}", track.destination.display());
                }
                TrackOutcome::Incomplete { .. } | TrackOutcome::Failed { .. } => {}
            }
            state.record(&outcome);
            pb.inc(1);
        }

        pb.finish_with_message(format!(
            "Done: {} compiled, {} incomplete, {} failed, {} skipped",
            state.compiled, state.incomplete, state.failed, state.skipped
        ));

        print_index(&state);

        report::write_log(output_root, &state)?;
        if self.options.json_log {
            report::write_json_log(output_root, &state)?;
        }
        if self.options.collections {
            report::write_collections(&output_root.join(report::COLLECTIONS_DIR), &state)?;
        }

        Ok(state)
    }
}

/// Immediate subdirectories of `music_dir`, sorted by name, plus a message
/// for each entry that could not be read.
fn track_folders(music_dir: &Path) -> (Vec<PathBuf>, Vec<String>) {
    let mut folders = Vec::new();
    let mut unreadable = Vec::new();
    for entry in WalkDir::new(music_dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        match entry {
            Ok(entry) if entry.file_type().is_dir() => folders.push(entry.into_path()),
            Ok(_) => {}
            Err(e) => {
                let path = e.path().unwrap_or(music_dir).display().to_string();
                log::warn!("Skipping unreadable entry {path}: {e}");
                unreadable.push(format!("Unreadable track folder {path}: {e}"));
            }
        }
    }
    (folders, unreadable)
}

/// Print the final count and the compiled id → name index.
fn print_index(state: &RunState) {
    println!("Total music compiled: {}", state.compiled);
    for (i, (id, name)) in state.index.iter().enumerate() {
        println!("[{}]: {} {}", i + 1, id, name);
    }
}
