//! Enrolled face images on disk.
//!
//! Each enrollment is one image named `<label>-<uuid>.<ext>` under the
//! database directory. The stem is the identity label used by the index;
//! the part before the first `-` is the person name shown in logs.

use facegate_core::LabeledImage;
use image::GrayImage;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Extensions considered enrollable when loading the database.
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "png", "tiff", "bmp"];

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unable to initialize database folder {path}: {source}")]
    Init {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to scan {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Persisting a captured frame failed. Logged, never fatal.
#[derive(Error, Debug)]
#[error("failed to add {label} to database at {path}: {source}")]
pub struct DatabasePersistError {
    pub label: String,
    pub path: PathBuf,
    #[source]
    pub source: image::ImageError,
}

/// Where enrolled frames are written.
pub trait FaceStore {
    /// Save `image` under `label`, returning the written path.
    fn persist(&self, label: &str, image: &GrayImage) -> Result<PathBuf, DatabasePersistError>;
}

/// Directory of enrolled images.
#[derive(Debug, Clone)]
pub struct FilesystemFaceStore {
    dir: PathBuf,
}

impl FilesystemFaceStore {
    /// Open `dir`, creating it if missing.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        if dir.is_dir() {
            tracing::info!(path = %dir.display(), "using database folder");
        } else {
            fs::create_dir_all(&dir).map_err(|source| StoreError::Init {
                path: dir.clone(),
                source,
            })?;
            tracing::info!(path = %dir.display(), "database folder created");
        }
        Ok(Self { dir })
    }

    /// Every enrollable image under the database directory, recursively, sorted by path.
    pub fn image_paths(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut paths = Vec::new();
        collect_images(&self.dir, &mut paths)?;
        paths.sort();
        Ok(paths)
    }

    /// Decode every enrolled image as grayscale, labelled by file stem.
    pub fn load_all(&self) -> Result<Vec<LabeledImage>, StoreError> {
        let paths = self.image_paths()?;
        tracing::info!(count = paths.len(), "loading enrolled images");

        paths
            .into_iter()
            .map(|path| {
                let image = image::open(&path)
                    .map_err(|source| StoreError::Decode {
                        path: path.clone(),
                        source,
                    })?
                    .to_luma8();
                Ok(LabeledImage {
                    label: label_of(&path),
                    image,
                })
            })
            .collect()
    }
}

impl FaceStore for FilesystemFaceStore {
    fn persist(&self, label: &str, image: &GrayImage) -> Result<PathBuf, DatabasePersistError> {
        let path = self.dir.join(format!("{label}.jpg"));
        tracing::info!(label, "adding face to database");
        image.save(&path).map_err(|source| DatabasePersistError {
            label: label.to_string(),
            path: path.clone(),
            source,
        })?;
        tracing::info!(label, path = %path.display(), "face added to database");
        Ok(path)
    }
}

fn collect_images(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), StoreError> {
    let scan_err = |source| StoreError::Scan {
        path: dir.to_path_buf(),
        source,
    };

    for entry in fs::read_dir(dir).map_err(scan_err)? {
        let path = entry.map_err(scan_err)?.path();
        if path.is_dir() {
            collect_images(&path, out)?;
        } else if is_enrollable(&path) {
            out.push(path);
        }
    }
    Ok(())
}

fn is_enrollable(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Identity label of an enrolled image: its file stem.
pub fn label_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Person name for log lines: the label up to its first `-`.
pub fn person_name(label: &str) -> &str {
    label.split('-').next().unwrap_or(label)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_image(path: &Path, shade: u8) {
        GrayImage::from_pixel(4, 4, image::Luma([shade]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn test_open_creates_missing_dir() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("nested/db");
        let store = FilesystemFaceStore::open(&dir).unwrap();
        assert!(dir.is_dir());
        assert!(store.image_paths().unwrap().is_empty());
    }

    #[test]
    fn test_image_paths_filters_extensions_recursively() {
        let root = tempfile::tempdir().unwrap();
        let store = FilesystemFaceStore::open(root.path()).unwrap();
        fs::create_dir(root.path().join("old")).unwrap();
        write_image(&root.path().join("alice-1.png"), 10);
        write_image(&root.path().join("old/bob-2.BMP"), 20);
        fs::write(root.path().join("notes.txt"), "x").unwrap();
        fs::write(root.path().join("carol-3.gif"), "x").unwrap();

        let names: Vec<String> = store
            .image_paths()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["alice-1.png", "bob-2.BMP"]);
    }

    #[test]
    fn test_persist_then_load_keeps_label() {
        let root = tempfile::tempdir().unwrap();
        let store = FilesystemFaceStore::open(root.path()).unwrap();

        let label = "Registered User-0b5d";
        let path = store
            .persist(label, &GrayImage::from_pixel(8, 8, image::Luma([200])))
            .unwrap();
        assert_eq!(path, root.path().join("Registered User-0b5d.jpg"));

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].label, label);
        assert_eq!(loaded[0].image.dimensions(), (8, 8));
    }

    #[test]
    fn test_load_reports_undecodable_image() {
        let root = tempfile::tempdir().unwrap();
        let store = FilesystemFaceStore::open(root.path()).unwrap();
        fs::write(root.path().join("broken-1.jpg"), b"not a jpeg").unwrap();

        assert!(matches!(store.load_all(), Err(StoreError::Decode { .. })));
    }

    #[test]
    fn test_persist_into_removed_dir_fails() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("db");
        let store = FilesystemFaceStore::open(&dir).unwrap();
        fs::remove_dir(&dir).unwrap();

        let err = store
            .persist("x-1", &GrayImage::new(2, 2))
            .unwrap_err();
        assert_eq!(err.label, "x-1");
    }

    #[test]
    fn test_person_name() {
        assert_eq!(person_name("Registered User-3f2a-11"), "Registered User");
        assert_eq!(person_name("alice"), "alice");
        assert_eq!(label_of(Path::new("/db/alice-42.jpg")), "alice-42");
    }
}
