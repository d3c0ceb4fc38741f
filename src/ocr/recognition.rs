//! Multi-config digit recognition and result fusion.

use super::captured::CapturedImage;
use super::engine::{OcrEngine, OcrOutput};
use super::extract::{clean_digits, leading_window, ANSWER_LEN};

pub const DIGIT_WHITELIST: &str = "0123456789";

/// One Tesseract invocation profile. Every profile restricts output to
/// decimal digits.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RecognitionConfig {
    pub name: &'static str,
    /// Tesseract `--psm`
    pub page_segmentation: u8,
    /// Tesseract `--oem`
    pub engine_mode: u8,
    pub parameters: &'static [(&'static str, &'static str)],
}

impl RecognitionConfig {
    /// All `-c` variables, whitelist first.
    pub fn variables(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        std::iter::once(("tessedit_char_whitelist", DIGIT_WHITELIST))
            .chain(self.parameters.iter().copied())
    }
}

/// The five profiles run against every preprocessed image, in order.
pub const RECOGNITION_CONFIGS: [RecognitionConfig; 5] = [
    RecognitionConfig {
        name: "noise-cleanup",
        page_segmentation: 6,
        engine_mode: 1,
        parameters: &[
            ("classify_enable_learning", "0"),
            ("classify_enable_adaptive_matcher", "0"),
            ("textord_noise_rejwords", "1"),
            ("textord_noise_rejrows", "1"),
            ("textord_noise_normratio", "2"),
            ("textord_noise_syfract", "0.2"),
            ("textord_noise_sizefract", "0.1"),
        ],
    },
    RecognitionConfig {
        name: "single-word",
        page_segmentation: 8,
        engine_mode: 2,
        parameters: &[
            ("classify_max_rating", "10.0"),
            ("classify_max_certainty_margin", "4.5"),
            ("textord_noise_rejwords", "1"),
            ("edges_max_children_per_outline", "10"),
        ],
    },
    RecognitionConfig {
        name: "legacy-line",
        page_segmentation: 7,
        engine_mode: 0,
        parameters: &[
            ("classify_enable_learning", "0"),
            ("textord_noise_rejwords", "1"),
            ("textord_noise_rejrows", "1"),
        ],
    },
    RecognitionConfig {
        name: "raw-line",
        page_segmentation: 13,
        engine_mode: 2,
        parameters: &[
            ("preserve_interword_spaces", "0"),
            ("textord_noise_rejwords", "1"),
        ],
    },
    RecognitionConfig {
        name: "single-char",
        page_segmentation: 10,
        engine_mode: 1,
        parameters: &[("classify_enable_learning", "0")],
    },
];

/// Profile used with the backup preprocessing variants.
pub const BACKUP_CONFIG: RecognitionConfig = RecognitionConfig {
    name: "backup-block",
    page_segmentation: 6,
    engine_mode: 1,
    parameters: &[("classify_enable_learning", "0")],
};

/// Profile for the last-ditch pass on the unprocessed capture.
pub const BARE_CONFIG: RecognitionConfig = RecognitionConfig {
    name: "bare-word",
    page_segmentation: 8,
    engine_mode: 1,
    parameters: &[],
};

/// A cleaned reading from one profile.
#[derive(Clone, Debug, PartialEq)]
pub struct RecognitionResult {
    pub text: String,
    /// Clamped to 0..=100
    pub confidence: f32,
    pub config_name: &'static str,
    pub length: usize,
}

impl RecognitionResult {
    /// Keeps only readings of 3 to 5 digits.
    pub fn from_output(config_name: &'static str, output: &OcrOutput) -> Option<Self> {
        let text = clean_digits(&output.text);
        let length = text.len();
        if !(3..=5).contains(&length) {
            return None;
        }
        Some(Self {
            text,
            confidence: if output.confidence.is_nan() {
                0.0
            } else {
                output.confidence.clamp(0.0, 100.0)
            },
            config_name,
            length,
        })
    }
}

/// The fused reading for one preprocessed image.
#[derive(Clone, Debug, PartialEq)]
pub struct FusedReading {
    pub text: String,
    pub confidence: f32,
    pub config_name: &'static str,
    /// Only 3 digits were read
    pub partial: bool,
}

/// Runs every profile over an image.
pub trait Recognizer {
    fn recognize_all(&self, image: &CapturedImage) -> Vec<RecognitionResult>;
}

/// Sequential recognizer over an OCR engine. Profiles that error or read
/// nothing usable are skipped.
pub struct RecognitionEngine<'a> {
    ocr: &'a dyn OcrEngine,
    configs: &'a [RecognitionConfig],
}

impl<'a> RecognitionEngine<'a> {
    pub fn new(ocr: &'a dyn OcrEngine) -> Self {
        Self {
            ocr,
            configs: &RECOGNITION_CONFIGS,
        }
    }
}

impl Recognizer for RecognitionEngine<'_> {
    fn recognize_all(&self, image: &CapturedImage) -> Vec<RecognitionResult> {
        let mut results = Vec::new();
        for config in self.configs {
            match self.ocr.recognize(image, config) {
                Ok(output) => {
                    tracing::debug!(
                        "OCR {}: '{}' ({:.1})",
                        config.name,
                        output.text.trim(),
                        output.confidence
                    );
                    if let Some(result) = RecognitionResult::from_output(config.name, &output) {
                        results.push(result);
                    }
                }
                Err(e) => {
                    tracing::debug!("OCR {} failed: {:#}", config.name, e);
                }
            }
        }
        results
    }
}

/// Picks one reading: the most confident 4-digit result if any exists,
/// otherwise the most confident result cut to 4 digits. Earlier results win
/// ties.
pub fn fuse(results: &[RecognitionResult]) -> Option<FusedReading> {
    if let Some(best) = results
        .iter()
        .filter(|r| r.length == ANSWER_LEN)
        .fold(None, most_confident)
    {
        return Some(FusedReading {
            text: best.text.clone(),
            confidence: best.confidence,
            config_name: best.config_name,
            partial: false,
        });
    }

    let best = results.iter().fold(None, most_confident)?;
    let text = leading_window(&best.text, ANSWER_LEN);
    Some(FusedReading {
        partial: text.len() < ANSWER_LEN,
        text,
        confidence: best.confidence,
        config_name: best.config_name,
    })
}

fn most_confident<'a>(
    best: Option<&'a RecognitionResult>,
    r: &'a RecognitionResult,
) -> Option<&'a RecognitionResult> {
    match best {
        Some(b) if b.confidence >= r.confidence => Some(b),
        _ => Some(r),
    }
}
