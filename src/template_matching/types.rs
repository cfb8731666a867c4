//! Template matching data types
use image::{DynamicImage, GrayImage};

/// A freshly captured screen image. Never kept across polls.
#[derive(Clone, Debug)]
pub struct Frame {
    image: DynamicImage,
}

impl Frame {
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }

    /// Decode PNG/JPEG screenshot bytes
    pub fn decode(bytes: &[u8]) -> Result<Self, image::ImageError> {
        image::load_from_memory(bytes).map(Self::new)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Grayscale view used for correlation
    pub fn to_gray(&self) -> GrayImage {
        self.image.to_luma8()
    }
}

/// Outcome of looking for one template in one frame
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MatchResult {
    pub found: bool,
    /// Center of the matched area in frame coordinates
    pub center: Option<(u32, u32)>,
    /// Score at the reported location, or the best score seen when not found
    pub score: f32,
}

impl MatchResult {
    pub fn not_found(score: f32) -> Self {
        Self {
            found: false,
            center: None,
            score,
        }
    }

    pub fn found_at(center: (u32, u32), score: f32) -> Self {
        Self {
            found: true,
            center: Some(center),
            score,
        }
    }
}
