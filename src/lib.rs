pub mod archive;
pub mod assets;
pub mod category;
pub mod compiler;
pub mod config;
pub mod metadata;
pub mod pipeline;
pub mod report;
pub mod runner;

/// Folder under the source root holding one subfolder per track
pub const MUSIC_DIR: &str = "music";

/// Per-track metadata file
pub const METADATA_FILE: &str = "Music.xml";

/// Chart source extension (no dot)
pub const CHART_EXTENSION: &str = "ma2";

/// Application name for XDG paths
pub const APP_NAME: &str = "chartpack";
