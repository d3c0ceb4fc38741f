//! Scripted OCR engine for tests.
//!
//! Preprocessing strategies resize to distinct canvases, so the engine tells
//! them apart by the width of the image it receives.

use std::cell::RefCell;
use std::collections::HashMap;

use anyhow::{anyhow, Result};
use image::{GrayImage, Luma};

use super::captured::CapturedImage;
use super::engine::{OcrEngine, OcrOutput};
use super::recognition::RecognitionConfig;

#[derive(Default)]
pub struct ScriptedOcr {
    by_width: HashMap<u32, OcrOutput>,
    fallback: Option<OcrOutput>,
    fail: bool,
    calls: RefCell<Vec<(u32, &'static str)>>,
}

impl ScriptedOcr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `text` from any image of this width.
    pub fn on_width(mut self, width: u32, text: &str, confidence: f32) -> Self {
        self.by_width.insert(width, OcrOutput::new(text, confidence));
        self
    }

    /// Reads `text` from everything not otherwise scripted.
    pub fn always(mut self, text: &str, confidence: f32) -> Self {
        self.fallback = Some(OcrOutput::new(text, confidence));
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn calls_for_width(&self, width: u32) -> usize {
        self.calls.borrow().iter().filter(|(w, _)| *w == width).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl OcrEngine for ScriptedOcr {
    fn recognize(&self, image: &CapturedImage, config: &RecognitionConfig) -> Result<OcrOutput> {
        let width = image.dimensions().map(|(w, _)| w).unwrap_or(0);
        self.calls.borrow_mut().push((width, config.name));
        if self.fail {
            return Err(anyhow!("scripted failure"));
        }
        Ok(self
            .by_width
            .get(&width)
            .or(self.fallback.as_ref())
            .cloned()
            .unwrap_or_else(OcrOutput::empty))
    }
}

/// A 100x40 image with dark glyph-like bars, the size of a typical
/// challenge element.
pub fn sample_challenge() -> CapturedImage {
    let img = GrayImage::from_fn(100, 40, |x, y| {
        if (x / 5) % 4 == 1 && (8..32).contains(&y) {
            Luma([30])
        } else {
            Luma([220])
        }
    });
    CapturedImage::from_gray(&img).expect("encode sample challenge")
}
