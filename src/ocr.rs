use anyhow::{Context, Result};
use image::GrayImage;
use imageproc::filter::gaussian_blur_f32;
use leptess::{LepTess, Variable};
use std::io::Cursor;

use crate::align::template_score;
use crate::config::{FilterConfig, OcrConfig};

/// Maps a binarized crop to raw, possibly multi-line text.
pub trait OcrEngine {
    fn recognize(&mut self, image: &GrayImage) -> Result<String>;
}

/// Creates one engine per worker. Engines are never shared between workers.
pub trait EngineFactory: Send + Sync + 'static {
    fn create(&self) -> Result<Box<dyn OcrEngine>>;
}

/// Tesseract via leptess, single uniform block of text.
pub struct TesseractEngine {
    lt: LepTess,
}

impl TesseractEngine {
    pub fn new(tessdata: Option<&str>, language: &str) -> Result<Self> {
        let mut lt = LepTess::new(tessdata, language)
            .context("Failed to initialize Tesseract. Is Tesseract installed?")?;
        lt.set_variable(Variable::TesseditPagesegMode, "6")
            .context("Failed to set page segmentation mode")?;
        Ok(Self { lt })
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&mut self, image: &GrayImage) -> Result<String> {
        // leptess wants an encoded image
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .context("Failed to encode crop as PNG")?;

        // Replaces whatever image the previous call left behind
        self.lt
            .set_image_from_mem(&png)
            .context("Failed to load crop into Tesseract")?;
        self.lt.set_source_resolution(300);

        self.lt
            .get_utf8_text()
            .context("Failed to extract text from crop")
    }
}

pub struct TesseractFactory {
    pub language: String,
    pub tessdata: Option<String>,
}

impl TesseractFactory {
    pub fn from_config(config: &OcrConfig) -> Self {
        Self {
            language: config.language.clone(),
            tessdata: config.tessdata.clone(),
        }
    }
}

impl EngineFactory for TesseractFactory {
    fn create(&self) -> Result<Box<dyn OcrEngine>> {
        let engine = TesseractEngine::new(self.tessdata.as_deref(), &self.language)?;
        Ok(Box::new(engine))
    }
}

/// Blur then hard threshold, the form the engine expects.
pub fn binarize(crop: &GrayImage, config: &OcrConfig) -> GrayImage {
    let mut img = if config.blur_sigma > 0.0 {
        gaussian_blur_f32(crop, config.blur_sigma)
    } else {
        crop.clone()
    };
    for p in img.pixels_mut() {
        p[0] = if p[0] > config.binarize_threshold { 255 } else { 0 };
    }
    img
}

/// Keeps OCR lines that plausibly belong to the combat log.
#[derive(Debug, Clone)]
pub struct LineFilter {
    prefix: String,
    min_score: f64,
}

impl LineFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            prefix: config.prefix.clone(),
            min_score: config.min_score,
        }
    }

    pub fn accepts(&self, line: &str) -> bool {
        if line.trim().is_empty() {
            return false;
        }
        line.starts_with(&self.prefix) || template_score(line, &self.prefix) >= self.min_score
    }

    /// Surviving lines of `text`, in OCR order, trailing whitespace removed.
    pub fn filter(&self, text: &str) -> Vec<String> {
        text.lines()
            .map(str::trim_end)
            .filter(|line| self.accepts(line))
            .map(str::to_string)
            .collect()
    }
}
