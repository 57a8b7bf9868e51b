use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::archive;
use crate::assets::{self, AssetError, AssetExporter, AssetKind, ExportStatus, MissingAssetPolicy};
use crate::category::{sanitize_label, CategoryScheme};
use crate::compiler::{chart_sources, ChartCompiler, CompileOptions, CompileRequest, Ma2Bundler};
use crate::metadata::{TrackMetadata, TrackMetadataSource, XmlMetadataSource};

/// Suffix for track directories whose requested assets were not all found.
pub const INCOMPLETE_SUFFIX: &str = "_Incomplete";

/// Suffix for party-mode track directories.
pub const SPECIAL_MODE_SUFFIX: &str = "_Utage";

/// Errors that end the whole run, not just the current track.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> PipelineError + '_ {
    move |source| PipelineError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Where each asset kind is read from. `None` means the kind was not requested.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetRoots {
    pub audio: Option<PathBuf>,
    pub image: Option<PathBuf>,
    pub video: Option<PathBuf>,
}

impl AssetRoots {
    pub fn get(&self, kind: AssetKind) -> Option<&Path> {
        match kind {
            AssetKind::Audio => self.audio.as_deref(),
            AssetKind::Image => self.image.as_deref(),
            AssetKind::Video => self.video.as_deref(),
        }
    }
}

/// Per-run settings for [`TrackPipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub output_root: PathBuf,
    pub scheme: CategoryScheme,
    pub assets: AssetRoots,
    pub compile: CompileOptions,
    /// Keep tracks with missing assets instead of marking them incomplete.
    pub ignore_incomplete: bool,
    /// Name track directories by bare id instead of `{id}_{sortName}`.
    pub id_folder_name: bool,
    /// Zip committed tracks and remove the directory.
    pub archive: bool,
    pub on_missing: MissingAssetPolicy,
}

impl PipelineConfig {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            scheme: CategoryScheme::Genre,
            assets: AssetRoots::default(),
            compile: CompileOptions::default(),
            ignore_incomplete: false,
            id_folder_name: false,
            archive: false,
            on_missing: MissingAssetPolicy::Warn,
        }
    }
}

/// Why a folder was passed over without producing output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoCharts,
    NoMetadata,
}

/// A track that made it into the compiled set.
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedTrack {
    pub meta: TrackMetadata,
    pub summary: String,
    /// Track directory, or the archive that replaced it.
    pub destination: PathBuf,
    /// Missing-asset messages for kinds that were ignored, and archive failures.
    pub errors: Vec<String>,
}

/// Result of running one folder through the pipeline. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackOutcome {
    Skipped { folder: PathBuf, reason: SkipReason },
    /// Metadata or compile failure scoped to this track.
    Failed { folder: PathBuf, message: String },
    /// Requested assets missing; directory renamed with [`INCOMPLETE_SUFFIX`].
    Incomplete {
        meta: TrackMetadata,
        destination: PathBuf,
        errors: Vec<String>,
    },
    Committed(CommittedTrack),
}

impl TrackOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }

    /// Messages this outcome contributes to the run's error list.
    pub fn errors(&self) -> Vec<String> {
        match self {
            Self::Skipped { .. } => Vec::new(),
            Self::Failed { message, .. } => vec![message.clone()],
            Self::Incomplete { errors, .. } => errors.clone(),
            Self::Committed(track) => track.errors.clone(),
        }
    }
}

/// Runs a single track folder from metadata to committed output.
pub struct TrackPipeline {
    config: PipelineConfig,
    metadata: Box<dyn TrackMetadataSource>,
    compiler: Box<dyn ChartCompiler>,
}

impl TrackPipeline {
    /// Pipeline reading `Music.xml` and bundling `.ma2` charts.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            metadata: Box::new(XmlMetadataSource),
            compiler: Box::new(Ma2Bundler),
        }
    }

    pub fn with_compiler(mut self, compiler: Box<dyn ChartCompiler>) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn with_metadata_source(mut self, source: Box<dyn TrackMetadataSource>) -> Self {
        self.metadata = source;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process one track folder.
    ///
    /// Soft skips and per-track failures come back as `Ok` outcomes; only
    /// filesystem-level failures (and the `fail` missing-asset policy) return `Err`.
    pub fn process(&self, folder: &Path) -> Result<TrackOutcome, PipelineError> {
        if chart_sources(folder).is_empty() {
            log::info!("No charts in {}, skipping", folder.display());
            return Ok(TrackOutcome::Skipped {
                folder: folder.to_path_buf(),
                reason: SkipReason::NoCharts,
            });
        }
        if !self.metadata.has_metadata(folder) {
            log::info!("No metadata in {}, skipping", folder.display());
            return Ok(TrackOutcome::Skipped {
                folder: folder.to_path_buf(),
                reason: SkipReason::NoMetadata,
            });
        }

        let meta = match self.metadata.load(folder) {
            Ok(m) => m,
            Err(e) => {
                log::warn!("Skipping {}: {}", folder.display(), e);
                return Ok(TrackOutcome::Failed {
                    folder: folder.to_path_buf(),
                    message: e.to_string(),
                });
            }
        };
        log::info!("Name: {} | ID: {} | Genre: {}", meta.name, meta.id, meta.genre);

        let category_dir = self.category_dir(&meta);
        std::fs::create_dir_all(&category_dir).map_err(io_err(&category_dir))?;

        let track_dir = category_dir.join(self.track_dir_name(&meta));
        let existed = track_dir.is_dir();
        if existed {
            log::debug!("Track folder already exists: {}", track_dir.display());
        }
        std::fs::create_dir_all(&track_dir).map_err(io_err(&track_dir))?;

        let request = CompileRequest {
            source_dir: folder,
            output_dir: &track_dir,
            meta: &meta,
            options: &self.config.compile,
        };
        let summary = match self.compiler.compile(&request) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("Failed to compile {} ({}): {}", meta.name, meta.id, e);
                // Partial output must not pass for a compiled track.
                if !existed {
                    if let Err(rm) = std::fs::remove_dir_all(&track_dir) {
                        log::warn!("Failed to remove {}: {}", track_dir.display(), rm);
                    }
                }
                return Ok(TrackOutcome::Failed {
                    folder: folder.to_path_buf(),
                    message: format!("Compile failed: {} with ID {}: {}", meta.name, meta.id, e),
                });
            }
        };
        log::info!("Compiled {} to {}", meta.name, track_dir.display());

        let missing = self.export_assets(&meta, &track_dir)?;

        // Party tracks are kept regardless of asset completeness.
        if !missing.is_empty() && !self.config.ignore_incomplete && !meta.special_mode {
            let destination = mark_incomplete(&track_dir)?;
            log::warn!(
                "Incomplete assets for {} ({}), marked as {}",
                meta.name,
                meta.id,
                destination.display()
            );
            return Ok(TrackOutcome::Incomplete {
                meta,
                destination,
                errors: missing,
            });
        }

        let mut errors = missing;
        let mut destination = track_dir;
        if self.config.archive {
            match archive::archive_directory(&destination) {
                Ok(zip_path) => {
                    log::info!("Compressed {}", zip_path.display());
                    destination = zip_path;
                }
                Err(e) => {
                    log::warn!("Failed to archive {}: {}", destination.display(), e);
                    errors.push(format!("Archive failed: {} with ID {}: {}", meta.name, meta.id, e));
                }
            }
        }

        Ok(TrackOutcome::Committed(CommittedTrack {
            meta,
            summary,
            destination,
            errors,
        }))
    }

    /// `{output}/{category}`, or the output root itself for the flat scheme.
    fn category_dir(&self, meta: &TrackMetadata) -> PathBuf {
        let label = sanitize_label(&self.config.scheme.route(meta));
        if label.is_empty() {
            self.config.output_root.clone()
        } else {
            self.config.output_root.join(label)
        }
    }

    fn track_dir_name(&self, meta: &TrackMetadata) -> String {
        let base = if self.config.id_folder_name {
            meta.id.clone()
        } else {
            format!("{}_{}", meta.id, sanitize_label(&meta.sort_name))
        };
        if meta.special_mode {
            format!("{base}{SPECIAL_MODE_SUFFIX}")
        } else if self.config.id_folder_name {
            base
        } else {
            format!("{base}{}", meta.deluxe_suffix())
        }
    }

    /// Resolve and export every asset kind. Returns the missing-asset messages.
    fn export_assets(&self, meta: &TrackMetadata, track_dir: &Path) -> Result<Vec<String>, PipelineError> {
        // Party tracks are never held back by a missing asset.
        let on_missing = if meta.special_mode {
            MissingAssetPolicy::Warn
        } else {
            self.config.on_missing
        };
        let exporter = AssetExporter {
            ignore_incomplete: self.config.ignore_incomplete,
            on_missing,
        };

        let mut missing = Vec::new();
        for kind in AssetKind::ALL {
            let Some(root) = self.config.assets.get(kind) else {
                continue;
            };
            let stem = kind.source_stem(root, meta);
            let resolved = assets::resolve(&stem, kind.extensions());
            let status = exporter.export(true, kind, resolved.as_deref(), &stem, track_dir, meta)?;
            if let ExportStatus::Missing(message) = status {
                missing.push(message);
            }
        }
        Ok(missing)
    }
}

/// Rename `dir` to `{dir}_Incomplete`, replacing an earlier incomplete copy.
fn mark_incomplete(dir: &Path) -> Result<PathBuf, PipelineError> {
    let mut name = dir.as_os_str().to_os_string();
    name.push(INCOMPLETE_SUFFIX);
    let target = PathBuf::from(name);

    if !dir.is_dir() {
        log::info!("{} does not exist, nothing to mark", dir.display());
        return Ok(target);
    }
    if target.exists() {
        std::fs::remove_dir_all(&target).map_err(io_err(&target))?;
    }
    std::fs::rename(dir, &target).map_err(io_err(dir))?;
    Ok(target)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::compiler::CompileError;
    use crate::metadata::tests::sample_xml;
    use tempfile::TempDir;

    /// Write a track folder under `{root}/music/{folder}` with a chart and `Music.xml`.
    pub(crate) fn write_track(root: &Path, folder: &str, id: &str, name: &str, genre: &str) -> PathBuf {
        let dir = root.join("music").join(folder);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{folder}_00.ma2")), b"chart data").unwrap();
        std::fs::write(dir.join("Music.xml"), sample_xml(id, name, genre)).unwrap();
        dir
    }

    /// Drop an asset at `{root}/{stem}{ext}`.
    pub(crate) fn write_asset(root: &Path, stem: &str, ext: &str) {
        std::fs::create_dir_all(root).unwrap();
        std::fs::write(root.join(format!("{stem}{ext}")), stem.as_bytes()).unwrap();
    }

    struct FailingCompiler;

    impl ChartCompiler for FailingCompiler {
        fn compile(&self, _request: &CompileRequest) -> Result<String, CompileError> {
            Err(CompileError::NoCharts("broken".into()))
        }
    }

    /// Writes one chart into the output directory, then errors.
    struct PartialCompiler;

    impl ChartCompiler for PartialCompiler {
        fn compile(&self, request: &CompileRequest) -> Result<String, CompileError> {
            std::fs::write(request.output_dir.join("partial.ma2"), b"half")?;
            Err(CompileError::NoCharts("broken".into()))
        }
    }

    #[test]
    fn test_folder_without_charts_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let folder = tmp.path().join("music").join("000012");
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(folder.join("Music.xml"), sample_xml("12", "Song", "Pop")).unwrap();

        let out = tmp.path().join("out");
        let outcome = TrackPipeline::new(PipelineConfig::new(&out)).process(&folder).unwrap();
        assert_eq!(outcome, TrackOutcome::Skipped { folder, reason: SkipReason::NoCharts });
        assert!(!out.exists());
    }

    #[test]
    fn test_folder_without_metadata_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let folder = write_track(tmp.path(), "000012", "12", "Song", "Pop");
        std::fs::remove_file(folder.join("Music.xml")).unwrap();

        let out = tmp.path().join("out");
        let outcome = TrackPipeline::new(PipelineConfig::new(&out)).process(&folder).unwrap();
        assert_eq!(outcome, TrackOutcome::Skipped { folder, reason: SkipReason::NoMetadata });
        assert!(!out.exists());
    }

    #[test]
    fn test_bad_metadata_fails_track_only() {
        let tmp = TempDir::new().unwrap();
        let folder = write_track(tmp.path(), "000012", "12", "Song", "Pop");
        std::fs::write(folder.join("Music.xml"), "<MusicData>").unwrap();

        let outcome = TrackPipeline::new(PipelineConfig::new(tmp.path().join("out")))
            .process(&folder)
            .unwrap();
        assert!(matches!(outcome, TrackOutcome::Failed { .. }));
    }

    #[test]
    fn test_compile_failure_fails_track_only() {
        let tmp = TempDir::new().unwrap();
        let folder = write_track(tmp.path(), "000012", "12", "Song", "Pop");
        let outcome = TrackPipeline::new(PipelineConfig::new(tmp.path().join("out")))
            .with_compiler(Box::new(FailingCompiler))
            .process(&folder)
            .unwrap();
        match outcome {
            TrackOutcome::Failed { message, .. } => assert!(message.contains("with ID 12")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_compile_failure_removes_partial_output() {
        let tmp = TempDir::new().unwrap();
        let folder = write_track(tmp.path(), "000012", "12", "Song", "Pop");
        let out = tmp.path().join("out");
        let outcome = TrackPipeline::new(PipelineConfig::new(&out))
            .with_compiler(Box::new(PartialCompiler))
            .process(&folder)
            .unwrap();

        assert!(matches!(outcome, TrackOutcome::Failed { .. }));
        assert!(!out.join("Pop").join("12_SONG").exists());
        assert!(!out.join("Pop").join(format!("12_SONG{INCOMPLETE_SUFFIX}")).exists());
    }

    #[test]
    fn test_unrequested_assets_are_vacuously_complete() {
        let tmp = TempDir::new().unwrap();
        let folder = write_track(tmp.path(), "000012", "12", "Song", "Pop");
        // Assets exist for every kind, but no root is configured.
        write_asset(&tmp.path().join("audio"), "music000012", ".ogg");
        write_asset(&tmp.path().join("images"), "UI_Jacket_000012", ".png");
        write_asset(&tmp.path().join("movies"), "000012", ".mp4");

        let outcome = TrackPipeline::new(PipelineConfig::new(tmp.path().join("out")))
            .process(&folder)
            .unwrap();
        let TrackOutcome::Committed(track) = outcome else { panic!("expected commit") };
        assert!(track.errors.is_empty());
        for name in ["track.ogg", "bg.png", "pv.mp4"] {
            assert!(!track.destination.join(name).exists(), "{name} should not be copied");
        }
    }

    #[test]
    fn test_directory_naming_modes() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("out");
        let standard = write_track(tmp.path(), "000012", "12", "Song", "Pop");
        let deluxe = write_track(tmp.path(), "010013", "10013", "Other", "Pop");

        let by_name = TrackPipeline::new(PipelineConfig::new(&out));
        let TrackOutcome::Committed(a) = by_name.process(&standard).unwrap() else { panic!() };
        let TrackOutcome::Committed(b) = by_name.process(&deluxe).unwrap() else { panic!() };
        assert_eq!(a.destination, out.join("Pop").join("12_SONG"));
        assert_eq!(b.destination, out.join("Pop").join("10013_OTHER_DX"));

        let mut config = PipelineConfig::new(&out);
        config.id_folder_name = true;
        let by_id = TrackPipeline::new(config);
        let TrackOutcome::Committed(c) = by_id.process(&deluxe).unwrap() else { panic!() };
        assert_eq!(c.destination, out.join("Pop").join("10013"));
    }

    #[test]
    fn test_flat_scheme_uses_output_root() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("out");
        let folder = write_track(tmp.path(), "000012", "12", "Song", "Pop");
        let mut config = PipelineConfig::new(&out);
        config.scheme = CategoryScheme::Flat;
        let TrackOutcome::Committed(t) = TrackPipeline::new(config).process(&folder).unwrap() else {
            panic!()
        };
        assert_eq!(t.destination, out.join("12_SONG"));
    }

    #[test]
    fn test_special_mode_skips_completeness_gate() {
        let tmp = TempDir::new().unwrap();
        let folder = write_track(tmp.path(), "008012", "8012", "Party", "Utage");
        let xml = sample_xml("8012", "Party", "Utage")
            .replace("<utageKanjiName></utageKanjiName>", "<utageKanjiName>宴</utageKanjiName>");
        std::fs::write(folder.join("Music.xml"), xml).unwrap();

        let out = tmp.path().join("out");
        let mut config = PipelineConfig::new(&out);
        config.assets.image = Some(tmp.path().join("covers"));
        let outcome = TrackPipeline::new(config).process(&folder).unwrap();

        let TrackOutcome::Committed(track) = outcome else { panic!("party track must be kept") };
        assert_eq!(track.destination, out.join("Utage").join("8012_PARTY_Utage"));
        assert_eq!(track.errors.len(), 1);
        assert!(track.destination.is_dir());
    }

    #[test]
    fn test_special_mode_missing_asset_never_fails_run() {
        let tmp = TempDir::new().unwrap();
        let folder = write_track(tmp.path(), "008012", "8012", "Party", "Utage");
        let xml = sample_xml("8012", "Party", "Utage")
            .replace("<utageKanjiName></utageKanjiName>", "<utageKanjiName>宴</utageKanjiName>");
        std::fs::write(folder.join("Music.xml"), xml).unwrap();

        let mut config = PipelineConfig::new(tmp.path().join("out"));
        config.assets.image = Some(tmp.path().join("covers"));
        config.on_missing = MissingAssetPolicy::Fail;
        let outcome = TrackPipeline::new(config).process(&folder).unwrap();

        let TrackOutcome::Committed(track) = outcome else { panic!("party track must be kept") };
        assert_eq!(track.errors, vec!["Image not found for Party with ID 8012".to_string()]);
    }

    #[test]
    fn test_ignored_incompleteness_commits_with_error() {
        let tmp = TempDir::new().unwrap();
        let folder = write_track(tmp.path(), "000012", "12", "Song", "Pop");
        let mut config = PipelineConfig::new(tmp.path().join("out"));
        config.assets.video = Some(tmp.path().join("movies"));
        config.ignore_incomplete = true;

        let TrackOutcome::Committed(track) = TrackPipeline::new(config).process(&folder).unwrap() else {
            panic!()
        };
        assert_eq!(track.errors, vec!["BGA not found for Song with ID 12".to_string()]);
        assert!(!track.destination.to_string_lossy().ends_with(INCOMPLETE_SUFFIX));
    }

    #[test]
    fn test_rerun_replaces_previous_incomplete_directory() {
        let tmp = TempDir::new().unwrap();
        let folder = write_track(tmp.path(), "000012", "12", "Song", "Pop");
        let mut config = PipelineConfig::new(tmp.path().join("out"));
        config.assets.audio = Some(tmp.path().join("audio"));
        let pipeline = TrackPipeline::new(config);

        let first = pipeline.process(&folder).unwrap();
        let second = pipeline.process(&folder).unwrap();
        let TrackOutcome::Incomplete { destination, .. } = second else { panic!() };
        assert!(matches!(first, TrackOutcome::Incomplete { .. }));
        assert!(destination.is_dir());
        assert!(!tmp.path().join("out").join("Pop").join("12_SONG").exists());
    }

    #[test]
    fn test_fail_policy_propagates() {
        let tmp = TempDir::new().unwrap();
        let folder = write_track(tmp.path(), "000012", "12", "Song", "Pop");
        let mut config = PipelineConfig::new(tmp.path().join("out"));
        config.assets.audio = Some(tmp.path().join("audio"));
        config.on_missing = MissingAssetPolicy::Fail;

        let result = TrackPipeline::new(config).process(&folder);
        assert!(matches!(result, Err(PipelineError::Asset(AssetError::Missing { .. }))));
    }
}
