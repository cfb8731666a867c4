//! Reference image lookup by logical name

use image::GrayImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template image not found: {path:?}")]
    Missing { path: PathBuf },

    #[error("Failed to load template {path:?}: {source}")]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },
}

/// Directory of `<name>.png` reference images. Templates are read from disk
/// on every lookup so assets can be swapped while the automation runs.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    directory: PathBuf,
}

impl TemplateStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.directory.join(format!("{name}.png"))
    }

    pub fn load(&self, name: &str) -> Result<GrayImage, TemplateError> {
        let path = self.path_for(name);
        if !path.is_file() {
            return Err(TemplateError::Missing { path });
        }
        image::open(&path)
            .map(|img| img.to_luma8())
            .map_err(|source| TemplateError::Decode { path, source })
    }

    /// Names from `expected` that have no image on disk
    pub fn missing<'a>(&self, expected: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
        expected
            .into_iter()
            .filter(|name| !self.path_for(name).is_file())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_template_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::new(dir.path());
        assert!(matches!(
            store.load("home-screen-marker"),
            Err(TemplateError::Missing { .. })
        ));
        assert_eq!(store.missing(["home-screen-marker"]), vec!["home-screen-marker"]);
    }

    #[test]
    fn corrupt_template_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.png"), b"not a png").unwrap();
        let store = TemplateStore::new(dir.path());
        assert!(matches!(
            store.load("broken"),
            Err(TemplateError::Decode { .. })
        ));
    }

    #[test]
    fn loads_png_as_grayscale() {
        let dir = tempfile::tempdir().unwrap();
        let img = image::RgbImage::from_pixel(4, 3, image::Rgb([200, 10, 10]));
        img.save(dir.path().join("marker.png")).unwrap();

        let store = TemplateStore::new(dir.path());
        let gray = store.load("marker").unwrap();
        assert_eq!(gray.dimensions(), (4, 3));
        assert!(store.missing(["marker"]).is_empty());
    }
}
