use anyhow::{anyhow, Context, Result};
use std::process::Command;
use tempfile::NamedTempFile;

use super::captured::CapturedImage;
use super::recognition::RecognitionConfig;
use super::setup::{locate_tesseract, TesseractPaths};
use crate::config::OcrConfig;

/// Represents a line of OCR text
#[derive(Debug, Clone)]
pub struct OcrLine {
    pub text: String,
    pub words: Vec<OcrWord>,
}

/// Represents a single word from OCR with confidence score
#[derive(Debug, Clone)]
pub struct OcrWord {
    pub text: String,
    pub confidence: f32,
}

/// Raw engine output for one image and one configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrOutput {
    pub text: String,
    /// Mean word confidence, 0 when nothing was recognized
    pub confidence: f32,
}

impl OcrOutput {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }

    pub fn empty() -> Self {
        Self::new("", 0.0)
    }

    fn from_lines(lines: &[OcrLine]) -> Self {
        let words: Vec<&OcrWord> = lines.iter().flat_map(|l| l.words.iter()).collect();
        if words.is_empty() {
            return Self::empty();
        }
        let confidence = words.iter().map(|w| w.confidence).sum::<f32>() / words.len() as f32;
        let text = lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Self { text, confidence }
    }
}

/// The OCR seam. Tests substitute a scripted engine.
pub trait OcrEngine {
    fn recognize(&self, image: &CapturedImage, config: &RecognitionConfig) -> Result<OcrOutput>;
}

/// Runs the tesseract executable once per call.
pub struct TesseractEngine {
    paths: TesseractPaths,
    language: String,
}

impl TesseractEngine {
    pub fn new(paths: TesseractPaths, language: impl Into<String>) -> Self {
        Self {
            paths,
            language: language.into(),
        }
    }

    pub fn from_config(config: &OcrConfig) -> Result<Self> {
        Ok(Self::new(locate_tesseract(config)?, config.language.clone()))
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&self, image: &CapturedImage, config: &RecognitionConfig) -> Result<OcrOutput> {
        // Save image to temporary file
        let temp_input = NamedTempFile::with_suffix(".png")?;
        std::fs::write(temp_input.path(), image.as_bytes())?;

        // Tesseract adds the .tsv extension itself
        let temp_output = NamedTempFile::new()?;
        let output_base = temp_output.path().to_string_lossy().to_string();

        let mut command = Command::new(&self.paths.executable);
        command.arg(temp_input.path()).arg(&output_base);
        if let Some(dir) = &self.paths.tessdata {
            command.arg("--tessdata-dir").arg(dir);
        }
        command
            .arg("-l")
            .arg(&self.language)
            .arg("--psm")
            .arg(config.page_segmentation.to_string())
            .arg("--oem")
            .arg(config.engine_mode.to_string());
        for (key, value) in config.variables() {
            command.arg("-c").arg(format!("{}={}", key, value));
        }
        command.arg("tsv");

        let output = command.output().context("Failed to run tesseract")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Tesseract failed ({}): {}", config.name, stderr.trim()));
        }

        let tsv_path = format!("{}.tsv", output_base);
        let tsv_content = std::fs::read_to_string(&tsv_path)
            .map_err(|e| anyhow!("Failed to read Tesseract output: {}", e))?;
        let _ = std::fs::remove_file(&tsv_path);

        let lines = parse_tsv_output(&tsv_content);
        Ok(OcrOutput::from_lines(&lines))
    }
}

/// Parses Tesseract TSV output into structured OcrLine data
fn parse_tsv_output(tsv: &str) -> Vec<OcrLine> {
    let mut lines: Vec<OcrLine> = Vec::new();
    let mut current_key: Option<(i32, i32, i32)> = None;
    let mut current_words: Vec<OcrWord> = Vec::new();

    // Skip header
    for row in tsv.lines().skip(1) {
        // level, page_num, block_num, par_num, line_num, word_num,
        // left, top, width, height, conf, text
        let fields: Vec<&str> = row.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }

        let level: i32 = fields[0].parse().unwrap_or(-1);
        let block: i32 = fields[2].parse().unwrap_or(-1);
        let par: i32 = fields[3].parse().unwrap_or(-1);
        let line_num: i32 = fields[4].parse().unwrap_or(-1);
        let conf: f32 = fields[10].parse().unwrap_or(-1.0);
        let text = fields[11].trim();

        // Level 5 = word
        if level != 5 || text.is_empty() || conf < 0.0 {
            continue;
        }

        let key = (block, par, line_num);
        if current_key.is_some_and(|k| k != key) {
            push_line(&mut lines, std::mem::take(&mut current_words));
        }
        current_key = Some(key);

        current_words.push(OcrWord {
            text: text.to_string(),
            confidence: conf,
        });
    }

    push_line(&mut lines, current_words);
    lines
}

fn push_line(lines: &mut Vec<OcrLine>, words: Vec<OcrWord>) {
    if words.is_empty() {
        return;
    }
    let text = words
        .iter()
        .map(|w| w.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    lines.push(OcrLine { text, words });
}
