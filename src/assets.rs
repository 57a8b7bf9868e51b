use std::fmt;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::metadata::TrackMetadata;

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("{kind} not found for {name} with ID {id}")]
    Missing { kind: AssetKind, name: String, id: String },
    #[error("failed to copy {kind} from {from} to {to}: {source}")]
    Copy {
        kind: AssetKind,
        from: String,
        to: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{kind} NOT FOUND IN: {path} after copying from {from}")]
    NotPersisted { kind: AssetKind, path: String, from: String },
}

/// The three media kinds a track can carry besides its charts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Audio,
    Image,
    Video,
}

impl AssetKind {
    pub const ALL: [AssetKind; 3] = [Self::Audio, Self::Image, Self::Video];

    /// Candidate extensions in priority order.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Audio => &[".ogg", ".mp3"],
            Self::Image => &[".png", ".jpg"],
            Self::Video => &[".mp4"],
        }
    }

    /// Base name the asset is exported under, without extension.
    pub fn canonical_name(self) -> &'static str {
        match self {
            Self::Audio => "track",
            Self::Image => "bg",
            Self::Video => "pv",
        }
    }

    /// Path stem of this track's asset under `root`, e.g. `{root}/music000012`.
    pub fn source_stem(self, root: &Path, meta: &TrackMetadata) -> PathBuf {
        let short = meta.short_id();
        match self {
            Self::Audio => root.join(format!("music00{short}")),
            Self::Image => root.join(format!("UI_Jacket_00{short}")),
            Self::Video => root.join(format!("00{short}")),
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Audio => "Music",
            Self::Image => "Image",
            Self::Video => "BGA",
        })
    }
}

/// Find the first `{stem}{ext}` that exists, trying `extensions` in order.
pub fn resolve(stem: &Path, extensions: &[&str]) -> Option<PathBuf> {
    extensions.iter().find_map(|ext| {
        let mut candidate = stem.as_os_str().to_os_string();
        candidate.push(ext);
        let candidate = PathBuf::from(candidate);
        candidate.is_file().then_some(candidate)
    })
}

/// What to do when a requested asset is missing and incompleteness is not ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MissingAssetPolicy {
    /// Log, record the error, keep going.
    #[default]
    Warn,
    /// Like `Warn`, then wait for the operator to press Enter.
    Prompt,
    /// Abort the run.
    Fail,
}

/// Result of exporting one asset kind for one track.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportStatus {
    /// The caller did not ask for this kind.
    NotRequested,
    Copied(PathBuf),
    /// Destination already existed; nothing was copied.
    AlreadyPresent(PathBuf),
    /// Requested but not found. Carries the message for the run's error list.
    Missing(String),
}

impl ExportStatus {
    pub fn is_complete(&self) -> bool {
        !matches!(self, Self::Missing(_))
    }
}

/// Copies resolved assets into track directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssetExporter {
    pub ignore_incomplete: bool,
    pub on_missing: MissingAssetPolicy,
}

impl AssetExporter {
    /// Export `resolved` into `dest_dir` as `{kind.canonical_name()}{ext}`.
    ///
    /// `stem` is only used for logging when nothing was resolved.
    pub fn export(
        &self,
        requested: bool,
        kind: AssetKind,
        resolved: Option<&Path>,
        stem: &Path,
        dest_dir: &Path,
        meta: &TrackMetadata,
    ) -> Result<ExportStatus, AssetError> {
        if !requested {
            return Ok(ExportStatus::NotRequested);
        }

        let Some(source) = resolved else {
            log::warn!("{} file not found at: {}[.*]", kind, stem.display());
            let err = AssetError::Missing {
                kind,
                name: meta.name.clone(),
                id: meta.id.clone(),
            };
            if !self.ignore_incomplete {
                match self.on_missing {
                    MissingAssetPolicy::Warn => {}
                    MissingAssetPolicy::Prompt => wait_for_acknowledgment(&err),
                    MissingAssetPolicy::Fail => return Err(err),
                }
            }
            return Ok(ExportStatus::Missing(err.to_string()));
        };

        let ext = source
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let dest = dest_dir.join(format!("{}{}", kind.canonical_name(), ext));

        if dest.exists() {
            log::info!("{} already found in: {}", kind, dest.display());
            return Ok(ExportStatus::AlreadyPresent(dest));
        }

        std::fs::copy(source, &dest).map_err(|e| AssetError::Copy {
            kind,
            from: source.display().to_string(),
            to: dest.display().to_string(),
            source: e,
        })?;
        log::info!("{} exported to: {}", kind, dest.display());

        if !self.ignore_incomplete && !dest.is_file() {
            log::error!(
                "{} exists at {}: {}",
                kind,
                source.display(),
                source.exists()
            );
            return Err(AssetError::NotPersisted {
                kind,
                path: dest.display().to_string(),
                from: source.display().to_string(),
            });
        }

        Ok(ExportStatus::Copied(dest))
    }
}

fn wait_for_acknowledgment(err: &AssetError) {
    let mut stderr = std::io::stderr();
    let _ = write!(stderr, "{err}. Press Enter to continue...");
    let _ = stderr.flush();
    let mut line = String::new();
    if let Err(e) = std::io::stdin().lock().read_line(&mut line) {
        log::debug!("Could not read acknowledgment: {e}");
    }
}
