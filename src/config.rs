use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Pixel rectangle of the video frame that holds the combat log text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Roi {
    /// Fails unless the rectangle is non-empty and lies inside a
    /// `frame_width` × `frame_height` frame.
    pub fn validate(&self, frame_width: u32, frame_height: u32) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            bail!("region of interest {self} is empty");
        }
        let right = self.x as u64 + self.width as u64;
        let bottom = self.y as u64 + self.height as u64;
        if right > frame_width as u64 || bottom > frame_height as u64 {
            bail!(
                "region of interest {self} does not fit in a {frame_width}x{frame_height} frame"
            );
        }
        Ok(())
    }
}

impl std::fmt::Display for Roi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{},{},{}", self.x, self.y, self.width, self.height)
    }
}

impl FromStr for Roi {
    type Err = anyhow::Error;

    /// Parses `x,y,width,height`.
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            bail!("expected x,y,width,height but got '{s}'");
        }
        let mut values = [0u32; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .with_context(|| format!("invalid ROI component '{part}' in '{s}'"))?;
        }
        Ok(Roi {
            x: values[0],
            y: values[1],
            width: values[2],
            height: values[3],
        })
    }
}

/// Strategy used to slide a literal fragment over a noisy line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum AlignerKind {
    #[default]
    OffsetHistogram,
    EditDistance,
}

/// Whether repeated attack lines collapse across frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum AttackDedup {
    /// Attack events are always kept.
    #[default]
    Never,
    /// Attack events with identical fields inside the merge window are dropped.
    Exact,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Per-pixel intensity delta (0-255) above which a pixel counts as changed.
    pub pixel_delta: u8,
    /// Fraction of changed ROI pixels at which a frame is sampled.
    pub min_changed_fraction: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            pixel_delta: 30,
            min_changed_fraction: 0.01,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Tesseract language code.
    pub language: String,
    /// Directory holding `tessdata/`; `None` lets Tesseract use its default.
    pub tessdata: Option<String>,
    /// Gaussian sigma applied before binarization (0 disables the blur).
    pub blur_sigma: f32,
    /// Intensity above which a pixel becomes white.
    pub binarize_threshold: u8,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            tessdata: None,
            blur_sigma: 0.8,
            binarize_threshold: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub prefix: String,
    /// Minimum template score for lines that do not start with `prefix`.
    pub min_score: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            prefix: "(Combat):".to_string(),
            min_score: 0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorrectionConfig {
    /// Anchor fragments must score strictly above this before a template is applied.
    pub anchor_threshold: f64,
    pub aligner: AlignerKind,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            anchor_threshold: 0.8,
            aligner: AlignerKind::OffsetHistogram,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Trailing window size as a multiple of the incoming frame's event count.
    pub window_factor: f64,
    /// Largest tolerated share of differing damage digits.
    pub max_mismatch_ratio: f64,
    pub attack_dedup: AttackDedup,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            window_factor: 1.4,
            max_mismatch_ratio: 0.25,
            attack_dedup: AttackDedup::Never,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub roi: Option<Roi>,
    /// Frames OCR'd concurrently per batch. `None` means hardware parallelism.
    pub workers: Option<usize>,
    pub motion: MotionConfig,
    pub ocr: OcrConfig,
    pub filter: FilterConfig,
    pub correction: CorrectionConfig,
    pub merge: MergeConfig,
}

impl PipelineConfig {
    pub fn worker_count(&self) -> usize {
        self.workers
            .filter(|&w| w > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
    }
}

/// Read a JSON pipeline config. Missing fields take their defaults.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Cannot read config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Parse error in {}", path.display()))
}
