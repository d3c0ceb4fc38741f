//! Checkout Harness
//!
//! Drives a browser through scripted checkout scenarios and cross-checks the
//! resulting state across several back-office sites. The reusable core is:
//!
//! - `ocr`: image preprocessing, multi-config Tesseract recognition and
//!   result fusion for 4-digit visual challenges
//! - `challenge`: the solve-and-submit loop for challenge-protected forms
//! - `resilience`: retrying element waits, screenshots with fallback and
//!   verified frame acquisition, with diagnostics on exhaustion
//! - `scenario`: the sequential scenario runner that wires it together

pub mod browser;
pub mod challenge;
pub mod config;
pub mod error;
pub mod logging;
pub mod ocr;
pub mod paths;
pub mod resilience;
pub mod scenario;

pub use config::HarnessConfig;
pub use error::{HarnessError, HarnessResult};
