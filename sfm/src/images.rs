//! Input image folder validation

use crate::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// File extensions accepted as input images (compared case-insensitively).
pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "tif", "tiff", "bmp"];

/// One input file as seen by the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageEntry {
    pub name: String,
    pub size: u64,
    /// Modification time in nanoseconds since the Unix epoch (0 if unknown).
    pub modified_ns: u128,
}

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

fn modified_ns(meta: &std::fs::Metadata) -> u128 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}

/// Name, size and modification time of a single input file.
pub fn describe_file(path: &Path) -> Result<ImageEntry> {
    let meta = std::fs::metadata(path)?;
    Ok(ImageEntry {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        size: meta.len(),
        modified_ns: modified_ns(&meta),
    })
}

/// List the images directly inside `dir`, sorted by name.
///
/// Fails when the directory does not exist or holds no image.
pub fn list_images(dir: &Path) -> Result<Vec<ImageEntry>> {
    if !dir.is_dir() {
        return Err(Error::ImagesNotFound(dir.to_path_buf()));
    }

    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path: PathBuf = entry.path();
        if !is_image(&path) {
            continue;
        }
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        entries.push(ImageEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            size: meta.len(),
            modified_ns: modified_ns(&meta),
        });
    }

    if entries.is_empty() {
        return Err(Error::NoImages(dir.to_path_buf()));
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_filter_is_case_insensitive() {
        assert!(is_image(Path::new("a/IMG_0001.JPG")));
        assert!(is_image(Path::new("scan.Tiff")));
        assert!(is_image(Path::new("x.bmp")));
        assert!(!is_image(Path::new("notes.txt")));
        assert!(!is_image(Path::new("jpg")));
    }

    #[test]
    fn test_listing_is_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.png"), b"12").unwrap();
        std::fs::write(dir.path().join("a.JPG"), b"1").unwrap();
        std::fs::write(dir.path().join("readme.md"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("nested.jpg")).unwrap();

        let images = list_images(dir.path()).unwrap();
        let names: Vec<&str> = images.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["a.JPG", "b.png"]);
        assert_eq!(images[1].size, 2);
    }

    #[test]
    fn test_describe_file() {
        let dir = tempfile::tempdir().unwrap();
        let clip = dir.path().join("clip.mp4");
        std::fs::write(&clip, b"12345").unwrap();
        let entry = describe_file(&clip).unwrap();
        assert_eq!(entry.name, "clip.mp4");
        assert_eq!(entry.size, 5);
        assert_eq!(entry, describe_file(&clip).unwrap());
        assert!(matches!(
            describe_file(&dir.path().join("gone.mp4")),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_missing_and_empty_folders() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            list_images(&dir.path().join("nope")),
            Err(Error::ImagesNotFound(_))
        ));
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        assert!(matches!(list_images(dir.path()), Err(Error::NoImages(_))));
    }
}
