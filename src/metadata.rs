use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::METADATA_FILE;

/// Ids at or above this value belong to deluxe (DX) charts.
const DELUXE_ID_THRESHOLD: u32 = 10_000;

/// `levelDecimal` at which a level is shown with a `+`.
const PLUS_LEVEL_DECIMAL: u32 = 7;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("XML error in {path}: {source}")]
    Xml {
        path: String,
        #[source]
        source: roxmltree::Error,
    },
    #[error("{path}: missing required field `{field}`")]
    MissingField { path: String, field: &'static str },
    #[error("{path}: track id `{id}` is not an unsigned integer")]
    InvalidId { path: String, id: String },
}

/// Immutable per-track metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackMetadata {
    /// Track id as written in the metadata file (digits only).
    pub id: String,
    pub name: String,
    pub sort_name: String,
    pub genre: String,
    /// Display level of the hardest enabled chart, e.g. `13+`.
    pub symbolic_level: String,
    pub version: String,
    pub version_number: String,
    pub composer: String,
    pub bpm: String,
    /// `DX` for deluxe charts, `SD` for standard ones.
    pub prefix: String,
    /// Party ("utage") tracks compile into a separate path and skip the asset gate.
    pub special_mode: bool,
}

impl TrackMetadata {
    /// Numeric id. Validated at construction, so this cannot fail for
    /// metadata produced by [`XmlMetadataSource`].
    pub fn numeric_id(&self) -> u32 {
        self.id.parse().unwrap_or_default()
    }

    pub fn is_deluxe(&self) -> bool {
        self.numeric_id() >= DELUXE_ID_THRESHOLD
    }

    /// Id zero-padded to six digits: `12` → `000012`.
    pub fn padded_id(&self) -> String {
        format!("{:06}", self.numeric_id())
    }

    /// Last four digits of the padded id, shared by standard and deluxe
    /// variants of the same song: `10012` and `12` both give `0012`.
    pub fn short_id(&self) -> String {
        self.padded_id()[2..].to_string()
    }

    /// Directory suffix for deluxe chart variants.
    pub fn deluxe_suffix(&self) -> &'static str {
        if self.is_deluxe() { "_DX" } else { "" }
    }
}

/// Something that can turn a track folder into [`TrackMetadata`].
pub trait TrackMetadataSource {
    /// Whether `track_dir` carries a metadata file this source understands.
    fn has_metadata(&self, track_dir: &Path) -> bool;

    fn load(&self, track_dir: &Path) -> Result<TrackMetadata, MetadataError>;
}

/// Reads `Music.xml` files.
#[derive(Debug, Default, Clone, Copy)]
pub struct XmlMetadataSource;

impl TrackMetadataSource for XmlMetadataSource {
    fn has_metadata(&self, track_dir: &Path) -> bool {
        track_dir.join(METADATA_FILE).is_file()
    }

    fn load(&self, track_dir: &Path) -> Result<TrackMetadata, MetadataError> {
        let path = track_dir.join(METADATA_FILE);
        let display = path.display().to_string();
        let text = std::fs::read_to_string(&path).map_err(|source| MetadataError::Io {
            path: display.clone(),
            source,
        })?;
        parse_music_xml(&text, &display)
    }
}

/// Parse the contents of a `Music.xml` file. `origin` is only used in errors.
pub fn parse_music_xml(text: &str, origin: &str) -> Result<TrackMetadata, MetadataError> {
    let doc = roxmltree::Document::parse(text).map_err(|source| MetadataError::Xml {
        path: origin.to_string(),
        source,
    })?;
    let root = doc.root_element();

    let id = child_text(root, &["name", "id"])
        .ok_or(MetadataError::MissingField { path: origin.to_string(), field: "name/id" })?;
    let numeric: u32 = id.parse().map_err(|_| MetadataError::InvalidId {
        path: origin.to_string(),
        id: id.clone(),
    })?;
    let name = child_text(root, &["name", "str"])
        .ok_or(MetadataError::MissingField { path: origin.to_string(), field: "name/str" })?;

    let sort_name = child_text(root, &["sortName"]).unwrap_or_else(|| name.clone());
    let special_mode = child_text(root, &["utageKanjiName"]).is_some_and(|s| !s.is_empty());

    Ok(TrackMetadata {
        id,
        name,
        sort_name,
        genre: child_text(root, &["genreName", "str"]).unwrap_or_default(),
        symbolic_level: symbolic_level(root).unwrap_or_default(),
        version: child_text(root, &["AddVersion", "str"]).unwrap_or_default(),
        version_number: child_text(root, &["version"]).unwrap_or_default(),
        composer: child_text(root, &["artistName", "str"]).unwrap_or_default(),
        bpm: child_text(root, &["bpm"]).unwrap_or_default(),
        prefix: if numeric >= DELUXE_ID_THRESHOLD { "DX" } else { "SD" }.to_string(),
        special_mode,
    })
}

/// Follow a path of element names from `node` and return the trimmed text.
fn child_text(node: roxmltree::Node, path: &[&str]) -> Option<String> {
    let mut current = node;
    for name in path {
        current = current
            .children()
            .find(|c| c.is_element() && c.tag_name().name() == *name)?;
    }
    current.text().map(|t| t.trim().to_string())
}

/// Level of the highest enabled chart in `notesData`, with `+` for high decimals.
fn symbolic_level(root: roxmltree::Node) -> Option<String> {
    let notes_data = root
        .children()
        .find(|c| c.is_element() && c.tag_name().name() == "notesData")?;

    notes_data
        .children()
        .filter(|c| c.is_element() && c.tag_name().name() == "Notes")
        .filter(|n| child_text(*n, &["isEnable"]).is_none_or(|e| e.eq_ignore_ascii_case("true")))
        .filter_map(|n| {
            let level: u32 = child_text(n, &["level"])?.parse().ok()?;
            if level == 0 {
                return None;
            }
            let decimal: u32 = child_text(n, &["levelDecimal"])
                .and_then(|d| d.parse().ok())
                .unwrap_or(0);
            Some((level, decimal))
        })
        .max()
        .map(|(level, decimal)| {
            if decimal >= PLUS_LEVEL_DECIMAL {
                format!("{level}+")
            } else {
                level.to_string()
            }
        })
}
