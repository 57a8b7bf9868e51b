use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;

use crate::assets::{AssetKind, MissingAssetPolicy};

/// Application configuration loaded from TOML config file.
/// Every field has a default, so the file itself is optional.
#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Audio root used when `--music` is given without a value.
    pub default_audio_root: Option<PathBuf>,
    /// Cover image root used when `--cover` is given without a value.
    pub default_image_root: Option<PathBuf>,
    /// Video root used when `--video` is given without a value.
    pub default_video_root: Option<PathBuf>,
    /// Category scheme index used when `--category` is absent.
    pub category: Option<i64>,
    /// Behaviour on a missing asset when incompleteness is not ignored.
    pub on_missing_asset: MissingAssetPolicy,
    /// Target format name used when `--format` is absent.
    pub target_format: Option<String>,
}

impl AppConfig {
    /// Load config from `~/.config/chartpack/config.toml`.
    /// Returns default config if file doesn't exist.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => {
                log::debug!("No config directory available, using defaults");
                Self::default()
            }
        }
    }

    /// Load config from an explicit path. Missing, unreadable or invalid
    /// files log and fall back to defaults.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            log::debug!("No config file at {}, using defaults", path.display());
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                Self::default()
            }
        }
    }

    /// Default root for `kind`: config value, else the sibling folder of the
    /// source root the game data ships with.
    pub fn default_root(&self, kind: AssetKind, source_root: &Path) -> PathBuf {
        let configured = match kind {
            AssetKind::Audio => &self.default_audio_root,
            AssetKind::Image => &self.default_image_root,
            AssetKind::Video => &self.default_video_root,
        };
        configured.clone().unwrap_or_else(|| {
            let data_root = source_root.parent().unwrap_or(source_root);
            match kind {
                AssetKind::Audio => data_root.join("SoundData"),
                AssetKind::Image => data_root.join("AssetBundleImages").join("jacket"),
                AssetKind::Video => data_root.join("MovieData"),
            }
        })
    }

    /// Resolve a CLI asset root: absent → not requested, empty → default root.
    pub fn resolve_asset_root(
        &self,
        kind: AssetKind,
        cli_value: Option<&str>,
        source_root: &Path,
    ) -> Option<PathBuf> {
        match cli_value {
            None => None,
            Some("") => Some(self.default_root(kind, source_root)),
            Some(v) => Some(PathBuf::from(v)),
        }
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
