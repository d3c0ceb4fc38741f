//! Fallback recognition used once every preprocessing strategy has failed.

use crate::ocr::engine::OcrEngine;
use crate::ocr::extract::{clean_digits, fit_to_answer};
use crate::ocr::preprocess::{preprocess_backup, BackupVariant};
use crate::ocr::recognition::{BACKUP_CONFIG, BARE_CONFIG};
use crate::ocr::CapturedImage;

/// Tries the harsher preprocessing variants with a single profile. Returns
/// the first reading of at least three digits, fitted to four.
pub fn secondary(ocr: &dyn OcrEngine, image: &CapturedImage) -> Option<String> {
    for variant in BackupVariant::ALL {
        let processed = preprocess_backup(image, variant);
        match ocr.recognize(&processed, &BACKUP_CONFIG) {
            Ok(output) => {
                let digits = clean_digits(&output.text);
                tracing::debug!("Backup {}: '{}'", variant.name(), digits);
                if digits.len() >= 3 {
                    tracing::info!("Backup {} read '{}'", variant.name(), digits);
                    return Some(fit_to_answer(&digits));
                }
            }
            Err(e) => tracing::debug!("Backup {} failed: {:#}", variant.name(), e),
        }
    }
    None
}

/// Runs OCR on the unprocessed capture. Returns whatever digits were read,
/// which may be too few to be an answer.
pub fn bare(ocr: &dyn OcrEngine, image: &CapturedImage) -> Option<String> {
    match ocr.recognize(image, &BARE_CONFIG) {
        Ok(output) => {
            let digits = clean_digits(&output.text);
            tracing::info!("Bare OCR read '{}'", digits);
            (!digits.is_empty()).then_some(digits)
        }
        Err(e) => {
            tracing::warn!("Bare OCR failed: {:#}", e);
            None
        }
    }
}
