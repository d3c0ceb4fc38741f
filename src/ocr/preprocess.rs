//! Challenge image preprocessing.
//!
//! Each strategy is a fixed pipeline of greyscale image operations. The
//! pipelines are data (`&[Step]`) so the orchestrator and the backup path
//! share one interpreter. A pipeline never fails from the caller's point of
//! view: any error returns the original image unchanged.

use anyhow::{bail, Result};
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use imageproc::filter::{gaussian_blur_f32, median_filter};

use super::captured::CapturedImage;

/// A single greyscale operation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Step {
    Resize {
        width: u32,
        height: u32,
        filter: FilterType,
    },
    /// Stretch the histogram to the full 0..=255 range
    Normalize,
    Gamma(f32),
    Blur(f32),
    /// `p >= t` becomes white, everything else black
    Threshold(u8),
    /// Median of a `size`-wide window; sizes below 2 are a no-op
    Median(u32),
    /// Kernel sum is used as the divisor (1 when the sum is zero)
    Convolve {
        width: u32,
        height: u32,
        kernel: &'static [f32],
    },
    Negate,
}

const NEGATIVE_ROW: [f32; 5] = [-1.0; 5];
const EDGE_KERNEL: [f32; 9] = [-1.0, -2.0, -1.0, -2.0, 13.0, -2.0, -1.0, -2.0, -1.0];
const SHARPEN_KERNEL: [f32; 9] = [0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0];

const AGGRESSIVE: &[Step] = &[
    Step::Resize {
        width: 300,
        height: 120,
        filter: FilterType::CatmullRom,
    },
    Step::Normalize,
    Step::Gamma(1.5),
    Step::Blur(0.3),
    Step::Threshold(100),
    Step::Median(2),
    Step::Convolve {
        width: 5,
        height: 1,
        kernel: &NEGATIVE_ROW,
    },
    Step::Convolve {
        width: 1,
        height: 5,
        kernel: &NEGATIVE_ROW,
    },
    Step::Convolve {
        width: 3,
        height: 3,
        kernel: &EDGE_KERNEL,
    },
    Step::Threshold(130),
    Step::Median(1),
];

const CONSERVATIVE: &[Step] = &[
    Step::Resize {
        width: 240,
        height: 96,
        filter: FilterType::Nearest,
    },
    Step::Normalize,
    Step::Gamma(1.3),
    Step::Threshold(115),
    Step::Median(1),
    Step::Convolve {
        width: 3,
        height: 3,
        kernel: &SHARPEN_KERNEL,
    },
    Step::Threshold(128),
];

const ORIGINAL: &[Step] = &[
    Step::Resize {
        width: 200,
        height: 80,
        filter: FilterType::Nearest,
    },
    Step::Normalize,
    Step::Threshold(120),
];

const EXTREME_AGGRESSIVE: &[Step] = &[
    Step::Resize {
        width: 400,
        height: 160,
        filter: FilterType::CatmullRom,
    },
    Step::Normalize,
    Step::Gamma(2.0),
    Step::Threshold(90),
    Step::Median(3),
    Step::Blur(0.5),
    Step::Threshold(140),
];

const INVERTED: &[Step] = &[
    Step::Resize {
        width: 250,
        height: 100,
        filter: FilterType::Nearest,
    },
    Step::Negate,
    Step::Normalize,
    Step::Threshold(100),
    Step::Median(2),
];

/// Primary preprocessing strategies, in the order they are tried.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Strategy {
    Aggressive,
    Conservative,
    Original,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [
        Strategy::Aggressive,
        Strategy::Conservative,
        Strategy::Original,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Aggressive => "aggressive",
            Strategy::Conservative => "conservative",
            Strategy::Original => "original",
        }
    }

    pub fn steps(&self) -> &'static [Step] {
        match self {
            Strategy::Aggressive => AGGRESSIVE,
            Strategy::Conservative => CONSERVATIVE,
            Strategy::Original => ORIGINAL,
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Last-resort preprocessing variants used after every strategy has failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackupVariant {
    ExtremeAggressive,
    Inverted,
}

impl BackupVariant {
    pub const ALL: [BackupVariant; 2] = [BackupVariant::ExtremeAggressive, BackupVariant::Inverted];

    pub fn name(&self) -> &'static str {
        match self {
            BackupVariant::ExtremeAggressive => "extreme-aggressive",
            BackupVariant::Inverted => "inverted",
        }
    }

    pub fn steps(&self) -> &'static [Step] {
        match self {
            BackupVariant::ExtremeAggressive => EXTREME_AGGRESSIVE,
            BackupVariant::Inverted => INVERTED,
        }
    }
}

/// Runs a strategy pipeline. Returns the input unchanged on any failure.
pub fn preprocess(image: &CapturedImage, strategy: Strategy) -> CapturedImage {
    run_or_original(image, strategy.steps(), strategy.name())
}

/// Runs a backup pipeline. Returns the input unchanged on any failure.
pub fn preprocess_backup(image: &CapturedImage, variant: BackupVariant) -> CapturedImage {
    run_or_original(image, variant.steps(), variant.name())
}

fn run_or_original(image: &CapturedImage, steps: &[Step], name: &str) -> CapturedImage {
    match run_pipeline(image, steps) {
        Ok(processed) => processed,
        Err(e) => {
            tracing::warn!("Preprocessing '{}' failed, using original image: {:#}", name, e);
            image.clone()
        }
    }
}

/// Decodes, converts to greyscale, applies `steps` in order and re-encodes.
pub fn run_pipeline(image: &CapturedImage, steps: &[Step]) -> Result<CapturedImage> {
    let mut gray = image.decode()?.to_luma8();
    if gray.width() == 0 || gray.height() == 0 {
        bail!("Empty image");
    }
    for step in steps {
        gray = apply(gray, step);
    }
    CapturedImage::from_gray(&gray)
}

fn apply(img: GrayImage, step: &Step) -> GrayImage {
    match *step {
        Step::Resize {
            width,
            height,
            filter,
        } => imageops::resize(&img, width, height, filter),
        Step::Normalize => normalize(img),
        Step::Gamma(gamma) => apply_gamma(img, gamma),
        Step::Blur(sigma) => gaussian_blur_f32(&img, sigma),
        Step::Threshold(t) => threshold(img, t),
        Step::Median(size) => {
            let radius = size / 2;
            if radius == 0 {
                img
            } else {
                median_filter(&img, radius, radius)
            }
        }
        Step::Convolve {
            width,
            height,
            kernel,
        } => convolve(&img, width, height, kernel),
        Step::Negate => {
            let mut img = img;
            imageops::invert(&mut img);
            img
        }
    }
}

/// Linear stretch so the darkest pixel becomes 0 and the brightest 255.
pub fn normalize(mut img: GrayImage) -> GrayImage {
    let (min, max) = img
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));
    if max <= min {
        return img;
    }
    let range = (max - min) as f32;
    for p in img.pixels_mut() {
        p[0] = (((p[0] - min) as f32 / range) * 255.0).round() as u8;
    }
    img
}

/// Brightens mid-tones for `gamma > 1`.
pub fn apply_gamma(mut img: GrayImage, gamma: f32) -> GrayImage {
    if gamma <= 0.0 {
        return img;
    }
    let lut: Vec<u8> = (0..=255u16)
        .map(|v| ((v as f32 / 255.0).powf(1.0 / gamma) * 255.0).round().clamp(0.0, 255.0) as u8)
        .collect();
    for p in img.pixels_mut() {
        p[0] = lut[p[0] as usize];
    }
    img
}

pub fn threshold(mut img: GrayImage, t: u8) -> GrayImage {
    for p in img.pixels_mut() {
        p[0] = if p[0] >= t { 255 } else { 0 };
    }
    img
}

/// Convolves with a `width`x`height` kernel, clamping coordinates at the
/// border. The kernel sum is the divisor; a zero sum divides by 1.
pub fn convolve(img: &GrayImage, width: u32, height: u32, kernel: &[f32]) -> GrayImage {
    if kernel.len() != (width * height) as usize || width == 0 || height == 0 {
        return img.clone();
    }
    let sum: f32 = kernel.iter().sum();
    let scale = if sum == 0.0 { 1.0 } else { sum };
    let (w, h) = img.dimensions();
    let (cx, cy) = ((width / 2) as i64, (height / 2) as i64);

    GrayImage::from_fn(w, h, |x, y| {
        let mut acc = 0.0f32;
        for ky in 0..height {
            for kx in 0..width {
                let sx = (x as i64 + kx as i64 - cx).clamp(0, w as i64 - 1) as u32;
                let sy = (y as i64 + ky as i64 - cy).clamp(0, h as i64 - 1) as u32;
                acc += kernel[(ky * width + kx) as usize] * img.get_pixel(sx, sy)[0] as f32;
            }
        }
        Luma([(acc / scale).round().clamp(0.0, 255.0) as u8])
    })
}
