//! Template matching implementation
//!
//! Zero-mean normalized cross-correlation. The raw cross term comes from
//! imageproc; window means and variances come from its integral images so the
//! score is insensitive to brightness offsets between template and screen.
use super::template::TemplateStore;
use super::types::{Frame, MatchResult};
use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::integral_image::{integral_image, integral_squared_image, sum_image_pixels};
use imageproc::template_matching::{MatchTemplateMethod, match_template};
use std::borrow::Cow;

pub const DEFAULT_THRESHOLD: f32 = 0.8;

/// Largest share of the limiting frame dimension an oversized template is shrunk to
const OVERSIZE_FILL: f64 = 0.9;
/// Frames this small are not worth shrinking a template for
const MIN_FRAME_SIDE: u32 = 10;
const FLAT_VARIANCE: f64 = 1e-6;

/// Per-pixel correlation scores, one per top-left placement
pub type ScoreMap = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Find `template` in `frame`.
///
/// Scans placements in row-major order and reports the first one scoring at
/// least `threshold`, so the lowest row wins and then the lowest column.
pub fn find_template(frame: &GrayImage, template: &GrayImage, threshold: f32) -> MatchResult {
    if frame.width() == 0 || frame.height() == 0 || template.width() == 0 || template.height() == 0
    {
        return MatchResult::not_found(0.0);
    }
    let Some(template) = fit_template(template, frame.width(), frame.height()) else {
        log::debug!(
            "⚠️ Frame {}x{} too small for template {}x{}",
            frame.width(),
            frame.height(),
            template.width(),
            template.height()
        );
        return MatchResult::not_found(0.0);
    };
    let (tw, th) = template.dimensions();

    let scores = correlation_map(frame, &template);
    let mut best = f32::NEG_INFINITY;
    for (x, y, pixel) in scores.enumerate_pixels() {
        let score = pixel[0];
        if score >= threshold {
            return MatchResult::found_at((x + tw / 2, y + th / 2), score);
        }
        if score > best {
            best = score;
        }
    }
    MatchResult::not_found(best.max(-1.0))
}

/// Shrink a template that does not fit inside the frame, keeping its aspect
/// ratio. Returns `None` when the frame is too small to match against.
pub fn fit_template(template: &GrayImage, frame_width: u32, frame_height: u32) -> Option<Cow<'_, GrayImage>> {
    let (tw, th) = template.dimensions();
    if tw <= frame_width && th <= frame_height {
        return Some(Cow::Borrowed(template));
    }
    if frame_width <= MIN_FRAME_SIDE || frame_height <= MIN_FRAME_SIDE {
        return None;
    }

    let scale_x = frame_width as f64 / tw as f64;
    let scale_y = frame_height as f64 / th as f64;
    let scale = scale_x.min(scale_y).min(1.0) * OVERSIZE_FILL;
    let new_width = ((tw as f64 * scale) as u32).max(1);
    let new_height = ((th as f64 * scale) as u32).max(1);
    log::info!("📐 Template {tw}x{th} larger than frame {frame_width}x{frame_height}, resized to {new_width}x{new_height}");

    Some(Cow::Owned(imageops::resize(
        template,
        new_width,
        new_height,
        FilterType::Triangle,
    )))
}

/// Zero-mean normalized cross-correlation for every placement of `template`.
/// `template` must fit inside `frame`.
pub fn correlation_map(frame: &GrayImage, template: &GrayImage) -> ScoreMap {
    let (tw, th) = template.dimensions();
    let n = (tw as f64) * (th as f64);

    let (t_sum, t_sq_sum) = template.pixels().fold((0.0f64, 0.0f64), |(s, q), p| {
        let v = p[0] as f64;
        (s + v, q + v * v)
    });
    let t_mean = t_sum / n;
    let t_var = t_sq_sum - t_sum * t_mean;

    let cross = match_template(frame, template, MatchTemplateMethod::CrossCorrelation);
    let mut scores = ScoreMap::new(cross.width(), cross.height());
    // a flat template correlates with nothing
    if t_var <= FLAT_VARIANCE {
        return scores;
    }

    let sums: ImageBuffer<Luma<u64>, Vec<u64>> = integral_image(frame);
    let sq_sums: ImageBuffer<Luma<u64>, Vec<u64>> = integral_squared_image(frame);
    for (x, y, pixel) in cross.enumerate_pixels() {
        let (right, bottom) = (x + tw - 1, y + th - 1);
        let i_sum = sum_image_pixels(&sums, x, y, right, bottom)[0] as f64;
        let i_sq_sum = sum_image_pixels(&sq_sums, x, y, right, bottom)[0] as f64;
        let i_var = i_sq_sum - i_sum * i_sum / n;
        if i_var <= FLAT_VARIANCE {
            continue;
        }
        let numerator = pixel[0] as f64 - i_sum * t_mean;
        let score = (numerator / (i_var * t_var).sqrt()).clamp(-1.0, 1.0);
        scores.put_pixel(x, y, Luma([score as f32]));
    }
    scores
}

/// Matches frames against named templates from a [`TemplateStore`]
pub struct TemplateMatcher {
    store: TemplateStore,
    threshold: f32,
}

impl TemplateMatcher {
    pub fn new(store: TemplateStore, threshold: f32) -> Self {
        Self { store, threshold }
    }

    pub fn store(&self) -> &TemplateStore {
        &self.store
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Look for the named template. A missing or unreadable template is
    /// logged and reported as not found.
    pub fn find(&self, frame: &Frame, name: &str) -> MatchResult {
        let template = match self.store.load(name) {
            Ok(template) => template,
            Err(e) => {
                log::warn!("⚠️ {e}");
                return MatchResult::not_found(0.0);
            }
        };
        let result = find_template(&frame.to_gray(), &template, self.threshold);
        if result.found {
            log::debug!("🎯 '{name}' matched at {:?} (score {:.3})", result.center, result.score);
        } else {
            log::debug!(
                "👀 '{name}' not found (best {:.3} < {:.3})",
                result.score,
                self.threshold
            );
        }
        result
    }
}
