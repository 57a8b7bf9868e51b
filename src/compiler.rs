use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;
use walkdir::WalkDir;

use crate::metadata::TrackMetadata;
use crate::CHART_EXTENSION;

/// Ticks in one measure, the unit of [`CompileOptions::shift_ticks`].
pub const TICKS_PER_MEASURE: i32 = 384;

/// Descriptor written next to bundled charts.
pub const DESCRIPTOR_FILE: &str = "chart.json";

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no chart sources in {0}")]
    NoCharts(String),
}

/// Output chart format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum TargetFormat {
    #[default]
    Simai,
    SimaiFes,
    #[serde(rename = "Ma2_103")]
    Ma2V103,
    #[serde(rename = "Ma2_104")]
    Ma2V104,
}

impl FromStr for TargetFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simai" => Ok(Self::Simai),
            "simaifes" => Ok(Self::SimaiFes),
            "ma2_103" | "ma2" => Ok(Self::Ma2V103),
            "ma2_104" => Ok(Self::Ma2V104),
            _ => Err(format!(
                "unknown target format `{s}` (expected Simai, SimaiFes, Ma2_103, Ma2_104)"
            )),
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Simai => "Simai",
            Self::SimaiFes => "SimaiFes",
            Self::Ma2V103 => "Ma2_103",
            Self::Ma2V104 => "Ma2_104",
        })
    }
}

/// Chart rotation applied by the transcoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Rotation {
    Clockwise90,
    Clockwise180,
    Counterclockwise90,
    Counterclockwise180,
    UpsideDown,
    LeftToRight,
}

impl FromStr for Rotation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "clockwise90" => Ok(Self::Clockwise90),
            "clockwise180" => Ok(Self::Clockwise180),
            "counterclockwise90" => Ok(Self::Counterclockwise90),
            "counterclockwise180" => Ok(Self::Counterclockwise180),
            "upsidedown" => Ok(Self::UpsideDown),
            "lefttoright" => Ok(Self::LeftToRight),
            _ => Err(format!(
                "unknown rotation `{s}` (expected Clockwise90/180, Counterclockwise90/180, UpsideDown, LeftToRight)"
            )),
        }
    }
}

/// Options passed through to the compiler untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompileOptions {
    pub format: TargetFormat,
    pub rotation: Option<Rotation>,
    /// Overall shift in ticks ([`TICKS_PER_MEASURE`] per measure).
    pub shift_ticks: Option<i32>,
    /// Rate levels by decimal instead of `+` notation.
    pub strict_decimal: bool,
}

/// One track handed to a [`ChartCompiler`].
#[derive(Debug, Clone, Copy)]
pub struct CompileRequest<'a> {
    pub source_dir: &'a Path,
    pub output_dir: &'a Path,
    pub meta: &'a TrackMetadata,
    pub options: &'a CompileOptions,
}

/// Turns a track folder's chart sources into output charts.
pub trait ChartCompiler {
    /// Compile and return a one-line summary for the run log.
    fn compile(&self, request: &CompileRequest) -> Result<String, CompileError>;
}

/// Chart-source files directly inside `dir`, sorted by name.
pub fn chart_sources(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|x| x.to_str())
                .is_some_and(|x| x.eq_ignore_ascii_case(CHART_EXTENSION))
        })
        .map(|e| e.into_path())
        .collect()
}

#[derive(Debug, Serialize)]
struct ChartDescriptor<'a> {
    id: &'a str,
    name: &'a str,
    special_mode: bool,
    #[serde(flatten)]
    options: &'a CompileOptions,
    charts: Vec<String>,
}

/// Default compiler: copies chart sources verbatim and records the requested
/// transform in a `chart.json` descriptor for a downstream transcoder.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ma2Bundler;

impl ChartCompiler for Ma2Bundler {
    fn compile(&self, request: &CompileRequest) -> Result<String, CompileError> {
        let sources = chart_sources(request.source_dir);
        if sources.is_empty() {
            return Err(CompileError::NoCharts(request.source_dir.display().to_string()));
        }
        std::fs::create_dir_all(request.output_dir)?;

        let mut charts = Vec::with_capacity(sources.len());
        for source in &sources {
            let Some(file_name) = source.file_name() else { continue };
            std::fs::copy(source, request.output_dir.join(file_name))?;
            charts.push(file_name.to_string_lossy().to_string());
        }

        let descriptor = ChartDescriptor {
            id: &request.meta.id,
            name: &request.meta.name,
            special_mode: request.meta.special_mode,
            options: request.options,
            charts,
        };
        let json = serde_json::to_string_pretty(&descriptor)?;
        std::fs::write(request.output_dir.join(DESCRIPTOR_FILE), json)?;
        log::debug!(
            "Bundled {} chart(s) into {}",
            descriptor.charts.len(),
            request.output_dir.display()
        );

        Ok(format!(
            "{} {} [{}] {} chart(s) -> {}",
            request.meta.id,
            request.meta.name,
            request.meta.genre,
            descriptor.charts.len(),
            request.options.format
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn meta() -> TrackMetadata {
        TrackMetadata {
            id: "012".into(),
            name: "Song".into(),
            sort_name: "SONG".into(),
            genre: "Pop".into(),
            symbolic_level: "12".into(),
            version: "maimai".into(),
            version_number: "10000".into(),
            composer: "Someone".into(),
            bpm: "150".into(),
            prefix: "SD".into(),
            special_mode: false,
        }
    }

    #[test]
    fn test_parse_target_format() {
        assert_eq!("simai".parse::<TargetFormat>().unwrap(), TargetFormat::Simai);
        assert_eq!("SimaiFes".parse::<TargetFormat>().unwrap(), TargetFormat::SimaiFes);
        assert_eq!("MA2_104".parse::<TargetFormat>().unwrap(), TargetFormat::Ma2V104);
        assert!("midi".parse::<TargetFormat>().is_err());
    }

    #[test]
    fn test_parse_rotation() {
        assert_eq!("Clockwise90".parse::<Rotation>().unwrap(), Rotation::Clockwise90);
        assert_eq!("upsidedown".parse::<Rotation>().unwrap(), Rotation::UpsideDown);
        assert_eq!("LeftToRight".parse::<Rotation>().unwrap(), Rotation::LeftToRight);
        assert!("Clockwise45".parse::<Rotation>().is_err());
    }

    #[test]
    fn test_chart_sources_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("000012_02.ma2"), b"b").unwrap();
        std::fs::write(dir.path().join("000012_00.MA2"), b"a").unwrap();
        std::fs::write(dir.path().join("Music.xml"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("sub.ma2")).unwrap();

        let names: Vec<String> = chart_sources(dir.path())
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["000012_00.MA2", "000012_02.ma2"]);
    }

    #[test]
    fn test_bundler_copies_charts_and_writes_descriptor() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        std::fs::write(src.path().join("000012_00.ma2"), b"chart").unwrap();
        let options = CompileOptions {
            format: TargetFormat::SimaiFes,
            rotation: Some(Rotation::UpsideDown),
            shift_ticks: Some(TICKS_PER_MEASURE),
            strict_decimal: true,
        };
        let m = meta();
        let output_dir = out.path().join("012_SONG");
        let summary = Ma2Bundler
            .compile(&CompileRequest {
                source_dir: src.path(),
                output_dir: &output_dir,
                meta: &m,
                options: &options,
            })
            .unwrap();

        assert_eq!(summary, "012 Song [Pop] 1 chart(s) -> SimaiFes");
        assert_eq!(std::fs::read(output_dir.join("000012_00.ma2")).unwrap(), b"chart");

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(output_dir.join(DESCRIPTOR_FILE)).unwrap())
                .unwrap();
        assert_eq!(json["format"], "SimaiFes");
        assert_eq!(json["rotation"], "UpsideDown");
        assert_eq!(json["shift_ticks"], 384);
        assert_eq!(json["strict_decimal"], true);
        assert_eq!(json["charts"][0], "000012_00.ma2");
    }

    #[test]
    fn test_bundler_without_charts_errors() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let m = meta();
        let options = CompileOptions::default();
        let result = Ma2Bundler.compile(&CompileRequest {
            source_dir: src.path(),
            output_dir: out.path(),
            meta: &m,
            options: &options,
        });
        assert!(matches!(result, Err(CompileError::NoCharts(_))));
    }
}
