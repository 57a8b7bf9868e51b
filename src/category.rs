use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::metadata::TrackMetadata;

/// Characters illegal in file names on common filesystems.
static UNSAFE_CHARS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\\/:*?"<>|\x00-\x1f]"#).unwrap());

/// Make a metadata value usable as a single path component.
///
/// Unsafe characters become `_` and trailing dots are dropped. A label made
/// only of dots is replaced so it can never walk up the tree.
pub fn sanitize_label(label: &str) -> String {
    let cleaned = UNSAFE_CHARS_RE.replace_all(label.trim(), "_");
    let cleaned = cleaned.trim_end_matches(['.', ' ']);
    if cleaned.is_empty() && !label.trim().is_empty() {
        return "_".to_string();
    }
    cleaned.to_string()
}

/// Which metadata field names the destination subdirectory.
///
/// Order matters: the CLI selects a scheme by its index in [`CategoryScheme::ALL`],
/// and the last slot is the flat layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryScheme {
    Genre,
    Level,
    Version,
    Composer,
    Bpm,
    Prefix,
    Flat,
}

impl CategoryScheme {
    pub const ALL: [CategoryScheme; 7] = [
        Self::Genre,
        Self::Level,
        Self::Version,
        Self::Composer,
        Self::Bpm,
        Self::Prefix,
        Self::Flat,
    ];

    /// Look up a scheme by index. Out-of-range indices fall back to
    /// [`CategoryScheme::Genre`] with a warning instead of failing the run.
    pub fn from_index(index: i64) -> Self {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .unwrap_or_else(|| {
                log::warn!(
                    "Category scheme {index} is out of range (0-{}), using {}",
                    Self::ALL.len() - 1,
                    Self::ALL[0]
                );
                Self::ALL[0]
            })
    }

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|s| *s == self).unwrap_or(0)
    }

    /// The destination label for `meta` under this scheme. Empty for [`CategoryScheme::Flat`].
    pub fn route(self, meta: &TrackMetadata) -> String {
        match self {
            Self::Genre => meta.genre.clone(),
            Self::Level => meta.symbolic_level.clone(),
            Self::Version => meta.version.clone(),
            Self::Composer => meta.composer.clone(),
            Self::Bpm => meta.bpm.clone(),
            Self::Prefix => meta.prefix.clone(),
            Self::Flat => String::new(),
        }
    }
}

impl fmt::Display for CategoryScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Genre => "Genre",
            Self::Level => "Level",
            Self::Version => "Version",
            Self::Composer => "Composer",
            Self::Bpm => "BPM",
            Self::Prefix => "SD/DX Chart",
            Self::Flat => "No Separate Folder",
        })
    }
}

/// Route `meta` with the scheme at `index`; see [`CategoryScheme::from_index`].
/// The label is returned as stored in the metadata, unsanitised.
pub fn route(meta: &TrackMetadata, index: i64) -> String {
    CategoryScheme::from_index(index).route(meta)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> TrackMetadata {
        TrackMetadata {
            id: "012".into(),
            name: "Song".into(),
            sort_name: "SONG".into(),
            genre: "Pop".into(),
            symbolic_level: "12+".into(),
            version: "maimai".into(),
            version_number: "10000".into(),
            composer: "Someone".into(),
            bpm: "150".into(),
            prefix: "SD".into(),
            special_mode: false,
        }
    }

    #[test]
    fn test_each_scheme_routes_its_field() {
        let m = meta();
        let labels: Vec<String> = (0..7).map(|i| route(&m, i)).collect();
        assert_eq!(labels, vec!["Pop", "12+", "maimai", "Someone", "150", "SD", ""]);
    }

    #[test]
    fn test_routing_is_deterministic() {
        let m = meta();
        for i in 0..7 {
            assert_eq!(route(&m, i), route(&m, i));
        }
    }

    #[test]
    fn test_out_of_range_falls_back_to_genre() {
        let m = meta();
        assert_eq!(route(&m, 7), route(&m, 0));
        assert_eq!(route(&m, -1), route(&m, 0));
        assert_eq!(route(&m, i64::MAX), "Pop");
        assert_eq!(CategoryScheme::from_index(99), CategoryScheme::Genre);
    }

    #[test]
    fn test_sanitize_label() {
        assert_eq!(sanitize_label("Pop/Anime"), "Pop_Anime");
        assert_eq!(sanitize_label("What?: <Yes>"), "What__ _Yes_");
        assert_eq!(sanitize_label("  ok  "), "ok");
        assert_eq!(sanitize_label("trail..."), "trail");
        assert_eq!(sanitize_label(".."), "_");
        assert_eq!(sanitize_label(""), "");
        assert_eq!(sanitize_label("POPS＆アニメ"), "POPS＆アニメ");
    }

    #[test]
    fn test_index_roundtrip() {
        for (i, scheme) in CategoryScheme::ALL.iter().enumerate() {
            assert_eq!(scheme.index(), i);
            assert_eq!(CategoryScheme::from_index(i as i64), *scheme);
        }
    }
}
