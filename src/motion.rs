use image::GrayImage;

use crate::config::MotionConfig;

/// Fraction of pixels whose intensity moved by more than `pixel_delta`.
///
/// Crops of different size count as fully changed.
pub fn changed_fraction(previous: &GrayImage, current: &GrayImage, pixel_delta: u8) -> f64 {
    if previous.dimensions() != current.dimensions() {
        return 1.0;
    }
    let area = previous.width() as u64 * previous.height() as u64;
    if area == 0 {
        return 0.0;
    }

    let changed = previous
        .as_raw()
        .iter()
        .zip(current.as_raw())
        .filter(|(a, b)| a.abs_diff(**b) > pixel_delta)
        .count();

    changed as f64 / area as f64
}

pub fn should_sample(previous: &GrayImage, current: &GrayImage, config: &MotionConfig) -> bool {
    changed_fraction(previous, current, config.pixel_delta) >= config.min_changed_fraction
}

/// Keeps the last sampled crop and decides whether the next one is worth OCR.
pub struct MotionGate {
    config: MotionConfig,
    baseline: Option<GrayImage>,
}

impl MotionGate {
    pub fn new(config: MotionConfig) -> Self {
        Self {
            config,
            baseline: None,
        }
    }

    /// The first crop is always admitted. The baseline only moves when a crop
    /// is admitted, so slow drift still accumulates into a sample.
    pub fn admit(&mut self, current: &GrayImage) -> bool {
        let sample = match &self.baseline {
            None => true,
            Some(previous) => should_sample(previous, current, &self.config),
        };
        if sample {
            self.baseline = Some(current.clone());
        }
        sample
    }
}
