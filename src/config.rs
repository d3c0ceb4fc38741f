//! Harness configuration.
//!
//! Loads settings from a JSON file (by default `config.json` next to the
//! executable). Every field has a default, so a partial file only overrides
//! what it names. A missing or unreadable file falls back to defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::resilience::policy::{CaptureOptions, FrameOptions, WaitOptions};

/// Complete harness configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// WebDriver endpoint (chromedriver, geckodriver, selenium grid)
    pub webdriver_url: String,
    /// Run the browser without a visible window
    pub headless: bool,
    /// Root directory for per-scenario artifacts and the outcome table
    pub records_dir: PathBuf,
    pub ocr: OcrConfig,
    pub challenge: ChallengeConfig,
    pub login: LoginConfig,
    /// Defaults for resilience primitives when a step does not override them
    pub defaults: ResilienceDefaults,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            headless: false,
            records_dir: PathBuf::from("records"),
            ocr: OcrConfig::default(),
            challenge: ChallengeConfig::default(),
            login: LoginConfig::default(),
            defaults: ResilienceDefaults::default(),
        }
    }
}

/// Tesseract location and language data.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Explicit path to the tesseract executable
    pub tesseract_path: Option<PathBuf>,
    /// Explicit tessdata directory
    pub tessdata_dir: Option<PathBuf>,
    pub language: String,
    /// Download `<language>.traineddata` when no tessdata directory is found
    pub download_tessdata: bool,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_path: None,
            tessdata_dir: None,
            language: "eng".to_string(),
            download_tessdata: true,
        }
    }
}

/// Selectors and timing for the 4-digit challenge image.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengeConfig {
    pub image_selector: String,
    pub refresh_selector: String,
    /// Pause before each capture so the image can finish rendering
    pub settle_ms: u64,
    pub image_timeout_ms: u64,
    /// Pause after clicking refresh
    pub refresh_delay_ms: u64,
    pub max_attempts: u32,
    /// Consecutive capture failures tolerated before giving up
    pub max_capture_failures: u32,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            image_selector: ".dcp-pic img".to_string(),
            refresh_selector: ".drf-link".to_string(),
            settle_ms: 2000,
            image_timeout_ms: 10000,
            refresh_delay_ms: 3000,
            max_attempts: 3,
            max_capture_failures: 5,
        }
    }
}

/// Login form protected by a challenge.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginConfig {
    pub answer_selector: String,
    pub submit_selector: String,
    /// Popup shown when the answer is rejected
    pub rejection_selector: String,
    /// Text the popup must contain to count as a rejection (empty = any popup)
    pub rejection_text: String,
    pub dismiss_selector: String,
    pub max_submissions: u32,
    /// Pause after submitting before checking for a rejection
    pub response_delay_ms: u64,
    pub rejection_timeout_ms: u64,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            answer_selector: "#captcha".to_string(),
            submit_selector: "#btnLogin".to_string(),
            rejection_selector: ".popup-message".to_string(),
            rejection_text: "驗證碼".to_string(),
            dismiss_selector: ".popup-message button".to_string(),
            max_submissions: 5,
            response_delay_ms: 2000,
            rejection_timeout_ms: 3000,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceDefaults {
    pub wait: WaitOptions,
    pub capture: CaptureOptions,
    pub frame: FrameOptions,
}

impl HarnessConfig {
    /// Loads configuration from `path`, or from `config.json` next to the
    /// executable (then in the working directory) when no path is given.
    /// Falls back to defaults on any error.
    pub fn load(path: Option<&Path>) -> Self {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let beside_exe = crate::paths::get_exe_dir().join("config.json");
                if beside_exe.exists() {
                    beside_exe
                } else {
                    PathBuf::from("config.json")
                }
            }
        };

        tracing::info!("Looking for config at: {}", config_path.display());

        if !config_path.exists() {
            tracing::info!("No config file found, using defaults");
            return Self::default();
        }

        match fs::read_to_string(&config_path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Config loaded from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse {}: {}. Using defaults.",
                        config_path.display(),
                        e
                    );
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read {}: {}. Using defaults.",
                    config_path.display(),
                    e
                );
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::ElementState;

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.challenge.max_attempts, 3);
        assert_eq!(config.challenge.settle_ms, 2000);
        assert_eq!(config.challenge.image_timeout_ms, 10000);
        assert_eq!(config.challenge.refresh_delay_ms, 3000);
        assert_eq!(config.login.max_submissions, 5);
        assert_eq!(config.defaults.wait.timeout_ms, 15000);
        assert_eq!(config.defaults.wait.retries, 3);
        assert!(config.defaults.wait.reload_on_fail);
        assert_eq!(config.defaults.capture.retries, 2);
        assert!(config.defaults.capture.fallback_to_page);
        assert_eq!(config.defaults.frame.max_retries, 5);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{
            "headless": true,
            "challenge": { "max_attempts": 4 },
            "defaults": { "wait": { "state": "attached", "retries": 1 } }
        }"#;
        let config: HarnessConfig = serde_json::from_str(json).unwrap();
        assert!(config.headless);
        assert_eq!(config.challenge.max_attempts, 4);
        assert_eq!(config.challenge.image_selector, ".dcp-pic img");
        assert_eq!(config.defaults.wait.state, ElementState::Attached);
        assert_eq!(config.defaults.wait.retries, 1);
        assert_eq!(config.defaults.wait.timeout_ms, 15000);
        assert_eq!(config.webdriver_url, "http://localhost:9515");
    }

    #[test]
    fn test_load_falls_back_on_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        let config = HarnessConfig::load(Some(&path));
        assert_eq!(config.records_dir, PathBuf::from("records"));
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "records_dir": "out" }"#).unwrap();
        let config = HarnessConfig::load(Some(&path));
        assert_eq!(config.records_dir, PathBuf::from("out"));
    }
}
