//! In-memory frame sources and scripted OCR engines for tests.

use anyhow::{bail, Result};
use image::GrayImage;
use std::collections::HashSet;
use std::time::Duration;

use crate::ocr::{EngineFactory, OcrEngine};
use crate::video::{Frame, FrameSource, VideoInfo};

pub struct ScriptedSource {
    info: VideoInfo,
    crops: std::vec::IntoIter<GrayImage>,
    next_index: u64,
}

impl ScriptedSource {
    pub fn new(fps: f64, crops: Vec<GrayImage>) -> Self {
        let (width, height) = crops.first().map_or((0, 0), |c| c.dimensions());
        Self {
            info: VideoInfo {
                fps,
                width,
                height,
                total_frames: crops.len() as u64,
            },
            crops: crops.into_iter(),
            next_index: 0,
        }
    }
}

impl FrameSource for ScriptedSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.crops.next().map(|pixels| {
            let index = self.next_index;
            self.next_index += 1;
            Frame {
                index,
                timestamp: index as f64 / self.info.fps,
                pixels,
            }
        }))
    }
}

/// A crop whose left `tenths`/10 of the columns are white.
pub fn striped_crop(tenths: u32) -> GrayImage {
    GrayImage::from_fn(200, 20, |x, _| {
        if x < tenths * 20 {
            image::Luma([255])
        } else {
            image::Luma([0])
        }
    })
}

/// Recovers `tenths` from a (blurred, binarized) striped crop.
pub fn read_stripe(image: &GrayImage) -> usize {
    let white = image.pixels().filter(|p| p[0] > 127).count();
    let total = (image.width() * image.height()).max(1) as f64;
    (white as f64 / total * 10.0).round() as usize
}

/// Answers with `script[read_stripe(image)]`.
pub struct StripeEngine {
    script: Vec<String>,
}

impl OcrEngine for StripeEngine {
    fn recognize(&mut self, image: &GrayImage) -> Result<String> {
        Ok(self
            .script
            .get(read_stripe(image))
            .cloned()
            .unwrap_or_default())
    }
}

pub struct StripeFactory {
    pub script: Vec<String>,
}

impl EngineFactory for StripeFactory {
    fn create(&self) -> Result<Box<dyn OcrEngine>> {
        Ok(Box::new(StripeEngine {
            script: self.script.clone(),
        }))
    }
}

/// Identifies a frame by crop width, sleeps to force a completion order, and
/// answers `(Combat): frame <width>`.
pub struct WidthEngine {
    delay: fn(u32) -> Duration,
}

impl OcrEngine for WidthEngine {
    fn recognize(&mut self, image: &GrayImage) -> Result<String> {
        std::thread::sleep((self.delay)(image.width()));
        Ok(format!("(Combat): frame {}\n", image.width()))
    }
}

pub struct WidthFactory {
    pub delay: fn(u32) -> Duration,
}

impl EngineFactory for WidthFactory {
    fn create(&self) -> Result<Box<dyn OcrEngine>> {
        Ok(Box::new(WidthEngine { delay: self.delay }))
    }
}

/// Fails the n-th engine creation for every n in `fail_on`.
pub struct FlakyFactory {
    pub fail_on: HashSet<usize>,
    pub created: std::sync::atomic::AtomicUsize,
}

impl EngineFactory for FlakyFactory {
    fn create(&self) -> Result<Box<dyn OcrEngine>> {
        let n = self
            .created
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.fail_on.contains(&n) {
            bail!("engine {n} failed to initialize");
        }
        Ok(Box::new(WidthEngine {
            delay: |_| Duration::ZERO,
        }))
    }
}

/// Creates working engines whose `recognize` fails on crops of the given widths.
pub struct BlindFactory {
    pub blind_widths: HashSet<u32>,
}

pub struct BlindEngine {
    blind_widths: HashSet<u32>,
}

impl OcrEngine for BlindEngine {
    fn recognize(&mut self, image: &GrayImage) -> Result<String> {
        if self.blind_widths.contains(&image.width()) {
            bail!("no text recognized in {}-wide crop", image.width());
        }
        Ok(format!("(Combat): frame {}\n", image.width()))
    }
}

impl EngineFactory for BlindFactory {
    fn create(&self) -> Result<Box<dyn OcrEngine>> {
        Ok(Box::new(BlindEngine {
            blind_widths: self.blind_widths.clone(),
        }))
    }
}
