//! Terminal error taxonomy.
//!
//! Transient failures inside the browser and OCR seams are plain
//! `anyhow::Error`s and are absorbed by retries. Only conditions that
//! survive a full retry budget become a `HarnessError`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("challenge unresolved after {attempts} attempts (last reading: {})", last.as_deref().unwrap_or("none"))]
    UnresolvedChallenge { attempts: u32, last: Option<String> },

    #[error("challenge capture failed {failures} times in a row")]
    ChallengeCaptureFailed { failures: u32 },

    #[error("challenge answer rejected after {submissions} submissions")]
    ChallengeRejected { submissions: u32 },

    #[error("frame '{name}' unreachable after {attempts} attempts{}", diagnostic_note(.diagnostic))]
    FrameUnavailable {
        name: String,
        attempts: u32,
        diagnostic: Option<PathBuf>,
    },

    #[error("element '{description}' unavailable after {attempts} attempts{}", diagnostic_note(.diagnostic))]
    ElementUnavailable {
        description: String,
        attempts: u32,
        diagnostic: Option<PathBuf>,
    },

    #[error("browser session failed: {0}")]
    Browser(String),

    #[error("scenario file error: {0}")]
    Scenario(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type HarnessResult<T> = Result<T, HarnessError>;

fn diagnostic_note(diagnostic: &Option<PathBuf>) -> String {
    match diagnostic {
        Some(path) => format!(" (diagnostic: {})", path.display()),
        None => String::new(),
    }
}
