use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const ARCHIVE_EXTENSION: &str = "zip";

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("{0} is not a directory")]
    NotADirectory(String),
}

/// Sibling archive path for a directory: `a/b/012_SONG` → `a/b/012_SONG.zip`.
pub fn archive_path(dir: &Path) -> PathBuf {
    let mut name = dir.as_os_str().to_os_string();
    name.push(".");
    name.push(ARCHIVE_EXTENSION);
    PathBuf::from(name)
}

/// Zip the contents of `dir` into a sibling archive, then delete `dir`.
///
/// Entries are stored relative to `dir` with `/` separators. An existing
/// archive at the destination is replaced.
pub fn archive_directory(dir: &Path) -> Result<PathBuf, ArchiveError> {
    if !dir.is_dir() {
        return Err(ArchiveError::NotADirectory(dir.display().to_string()));
    }

    let zip_path = archive_path(dir);
    if zip_path.exists() {
        log::info!("Replacing existing archive {}", zip_path.display());
    }

    let mut writer = ZipWriter::new(BufWriter::new(File::create(&zip_path)?));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let Ok(relative) = entry.path().strip_prefix(dir) else { continue };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type().is_dir() {
            writer.add_directory(name, options)?;
        } else {
            writer.start_file(name, options)?;
            let mut file = File::open(entry.path())?;
            io::copy(&mut file, &mut writer)?;
        }
    }
    writer.finish()?;

    std::fs::remove_dir_all(dir)?;
    Ok(zip_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_archive_path_appends_extension() {
        assert_eq!(
            archive_path(Path::new("/out/Pop/012_SONG")),
            PathBuf::from("/out/Pop/012_SONG.zip")
        );
        // Dots in the name are kept, not treated as an extension.
        assert_eq!(
            archive_path(Path::new("/out/Pop/012_Mr.Song")),
            PathBuf::from("/out/Pop/012_Mr.Song.zip")
        );
    }

    #[test]
    fn test_archive_replaces_directory() {
        let tmp = TempDir::new().unwrap();
        let track = tmp.path().join("012_SONG");
        std::fs::create_dir_all(track.join("extra")).unwrap();
        std::fs::write(track.join("track.ogg"), b"audio").unwrap();
        std::fs::write(track.join("extra").join("notes.txt"), b"n").unwrap();

        let zip_path = archive_directory(&track).unwrap();
        assert_eq!(zip_path, tmp.path().join("012_SONG.zip"));
        assert!(!track.exists());

        let mut archive = zip::ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(String::from).collect();
        names.sort();
        assert_eq!(names, vec!["extra/", "extra/notes.txt", "track.ogg"]);

        let mut contents = Vec::new();
        io::copy(&mut archive.by_name("track.ogg").unwrap(), &mut contents).unwrap();
        assert_eq!(contents, b"audio");
    }

    #[test]
    fn test_archive_missing_directory_errors() {
        let tmp = TempDir::new().unwrap();
        let result = archive_directory(&tmp.path().join("nope"));
        assert!(matches!(result, Err(ArchiveError::NotADirectory(_))));
    }
}
