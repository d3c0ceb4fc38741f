//! Visual challenge solver.
//!
//! The solver sequences through: AwaitImage → Capture → Recognize → Accept,
//! detouring through RefreshAndRetry when a capture or a reading fails.
//! Attempts are bounded by `max_attempts`; an image that never shows up uses
//! one. Failed screenshots have their own bound and do not consume an attempt.

pub mod backup;
pub mod login;

use std::time::Duration;

use crate::browser::{ElementState, Page};
use crate::config::ChallengeConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::ocr::engine::OcrEngine;
use crate::ocr::recognition::RecognitionEngine;
use crate::ocr::strategy::StrategyOrchestrator;
use crate::ocr::{normalize_answer, CapturedImage};

pub use login::submit_with_challenge;

/// Challenge solver states.
#[derive(Debug, Clone, PartialEq)]
pub enum ChallengeState {
    /// Waiting for the challenge image to be visible
    AwaitImage,
    /// Screenshotting the challenge element
    Capture,
    /// Running OCR on a capture
    Recognize(CapturedImage),
    /// Validating a raw reading
    Accept(String),
    /// Requesting a new challenge image
    RefreshAndRetry,
    /// Solved with a 4-digit answer
    Done(String),
    /// Gave up
    Failed,
}

impl std::fmt::Display for ChallengeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChallengeState::AwaitImage => write!(f, "Awaiting image"),
            ChallengeState::Capture => write!(f, "Capturing"),
            ChallengeState::Recognize(_) => write!(f, "Recognizing"),
            ChallengeState::Accept(text) => write!(f, "Accepting '{}'", text),
            ChallengeState::RefreshAndRetry => write!(f, "Refreshing"),
            ChallengeState::Done(answer) => write!(f, "Done: {}", answer),
            ChallengeState::Failed => write!(f, "Failed"),
        }
    }
}

pub struct ChallengeSolver<'a> {
    ocr: &'a dyn OcrEngine,
    config: ChallengeConfig,
}

impl<'a> ChallengeSolver<'a> {
    pub fn new(ocr: &'a dyn OcrEngine, config: ChallengeConfig) -> Self {
        Self { ocr, config }
    }

    pub fn config(&self) -> &ChallengeConfig {
        &self.config
    }

    /// Solves the challenge currently shown on `page`. Success is always
    /// exactly four digits.
    pub fn solve(&self, page: &dyn Page) -> HarnessResult<String> {
        let mut run = SolveRun::new(self, page);
        while run.step() {}
        run.finish()
    }

    /// Orchestrated strategies first, then the backup variants, then OCR on
    /// the raw capture.
    pub fn recognize(&self, image: &CapturedImage) -> Option<String> {
        let recognizer = RecognitionEngine::new(self.ocr);
        if let Some(answer) = StrategyOrchestrator::new(&recognizer).solve(image) {
            return Some(answer);
        }
        tracing::info!("All strategies failed, trying backup variants");
        if let Some(answer) = backup::secondary(self.ocr, image) {
            return Some(answer);
        }
        tracing::info!("Backup variants failed, trying bare OCR");
        backup::bare(self.ocr, image)
    }
}

/// State for one `solve` call.
struct SolveRun<'s, 'a> {
    solver: &'s ChallengeSolver<'a>,
    page: &'s dyn Page,
    state: ChallengeState,
    attempts: u32,
    capture_failures: u32,
    last_reading: Option<String>,
    failure: Option<HarnessError>,
}

impl<'s, 'a> SolveRun<'s, 'a> {
    fn new(solver: &'s ChallengeSolver<'a>, page: &'s dyn Page) -> Self {
        Self {
            solver,
            page,
            state: ChallengeState::AwaitImage,
            attempts: 0,
            capture_failures: 0,
            last_reading: None,
            failure: None,
        }
    }

    fn config(&self) -> &ChallengeConfig {
        &self.solver.config
    }

    /// Advances by one state. Returns `false` once terminal.
    fn step(&mut self) -> bool {
        let state = std::mem::replace(&mut self.state, ChallengeState::Failed);
        tracing::debug!("Challenge state: {}", state);

        self.state = match state {
            ChallengeState::AwaitImage => {
                let timeout = Duration::from_millis(self.config().image_timeout_ms);
                match self
                    .page
                    .wait_for_selector(&self.config().image_selector, ElementState::Visible, timeout)
                {
                    Ok(()) => {
                        self.page.pause(Duration::from_millis(self.config().settle_ms));
                        ChallengeState::Capture
                    }
                    Err(e) => {
                        self.attempts += 1;
                        tracing::warn!(
                            "Challenge image not visible (attempt {}/{}): {:#}",
                            self.attempts,
                            self.config().max_attempts,
                            e
                        );
                        self.retry_or_fail()
                    }
                }
            }

            ChallengeState::Capture => {
                let timeout = Duration::from_millis(self.config().image_timeout_ms);
                match self
                    .page
                    .screenshot_element(&self.config().image_selector, timeout)
                {
                    Ok(bytes) => {
                        self.capture_failures = 0;
                        ChallengeState::Recognize(CapturedImage::from_png(bytes))
                    }
                    Err(e) => self.capture_failed(format!("screenshot failed: {:#}", e)),
                }
            }

            ChallengeState::Recognize(image) => {
                self.attempts += 1;
                tracing::info!(
                    "Challenge attempt {}/{}",
                    self.attempts,
                    self.config().max_attempts
                );
                match self.solver.recognize(&image) {
                    Some(reading) => ChallengeState::Accept(reading),
                    None => {
                        tracing::warn!("No digits recognized");
                        self.retry_or_fail()
                    }
                }
            }

            ChallengeState::Accept(reading) => {
                self.last_reading = Some(reading.clone());
                match normalize_answer(&reading) {
                    Some(answer) => {
                        tracing::info!("Challenge answer: {}", answer);
                        ChallengeState::Done(answer)
                    }
                    None => {
                        tracing::warn!("Reading '{}' is too short", reading);
                        self.retry_or_fail()
                    }
                }
            }

            ChallengeState::RefreshAndRetry => {
                if let Err(e) = self.page.click(&self.config().refresh_selector) {
                    tracing::warn!("Refresh click failed: {:#}", e);
                }
                self.page
                    .pause(Duration::from_millis(self.config().refresh_delay_ms));
                ChallengeState::AwaitImage
            }

            terminal @ (ChallengeState::Done(_) | ChallengeState::Failed) => {
                self.state = terminal;
                return false;
            }
        };

        !matches!(self.state, ChallengeState::Done(_) | ChallengeState::Failed)
    }

    fn capture_failed(&mut self, reason: String) -> ChallengeState {
        self.capture_failures += 1;
        tracing::warn!(
            "Challenge capture failed ({}/{}): {}",
            self.capture_failures,
            self.config().max_capture_failures,
            reason
        );
        if self.capture_failures >= self.config().max_capture_failures {
            self.failure = Some(HarnessError::ChallengeCaptureFailed {
                failures: self.capture_failures,
            });
            return ChallengeState::Failed;
        }
        ChallengeState::RefreshAndRetry
    }

    fn retry_or_fail(&mut self) -> ChallengeState {
        if self.attempts >= self.config().max_attempts {
            self.failure = Some(HarnessError::UnresolvedChallenge {
                attempts: self.attempts,
                last: self.last_reading.clone(),
            });
            return ChallengeState::Failed;
        }
        ChallengeState::RefreshAndRetry
    }

    fn finish(self) -> HarnessResult<String> {
        match self.state {
            ChallengeState::Done(answer) => Ok(answer),
            _ => {
                let error = self.failure.unwrap_or(HarnessError::UnresolvedChallenge {
                    attempts: self.attempts,
                    last: self.last_reading,
                });
                tracing::error!("{}", error);
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::mock::MockPage;
    use crate::ocr::testing::ScriptedOcr;

    const IMAGE: &str = ".dcp-pic img";
    const REFRESH: &str = ".drf-link";

    fn solver(ocr: &ScriptedOcr) -> ChallengeSolver<'_> {
        ChallengeSolver::new(ocr, ChallengeConfig::default())
    }

    #[test]
    fn test_solves_on_first_attempt() {
        let ocr = ScriptedOcr::new().always("4821", 88.0);
        let page = MockPage::new().with_element(IMAGE);
        assert_eq!(solver(&ocr).solve(&page).unwrap(), "4821");
        assert_eq!(page.count(&format!("click:{}", REFRESH)), 0);
        assert_eq!(page.count("pause:2000"), 1);
    }

    #[test]
    fn test_conservative_reading() {
        let ocr = ScriptedOcr::new().on_width(240, "7 7 8 9", 92.0);
        let page = MockPage::new().with_element(IMAGE);
        assert_eq!(solver(&ocr).solve(&page).unwrap(), "7789");
    }

    #[test]
    fn test_three_digit_reading_padded() {
        let ocr = ScriptedOcr::new().always("123", 70.0);
        let page = MockPage::new().with_element(IMAGE);
        assert_eq!(solver(&ocr).solve(&page).unwrap(), "1230");
    }

    #[test]
    fn test_five_digit_reading_truncated() {
        let ocr = ScriptedOcr::new().always("12345", 70.0);
        let page = MockPage::new().with_element(IMAGE);
        assert_eq!(solver(&ocr).solve(&page).unwrap(), "1234");
    }

    #[test]
    fn test_bare_reading_used_last() {
        // Only the raw 100px-wide capture yields digits
        let ocr = ScriptedOcr::new().on_width(100, "5 1 7 3", 30.0);
        let page = MockPage::new().with_element(IMAGE);
        assert_eq!(solver(&ocr).solve(&page).unwrap(), "5173");
    }

    #[test]
    fn test_exhaustion_is_terminal_error() {
        let ocr = ScriptedOcr::new().always("7", 50.0);
        let page = MockPage::new().with_element(IMAGE);
        let err = solver(&ocr).solve(&page).unwrap_err();
        match err {
            HarnessError::UnresolvedChallenge { attempts, last } => {
                assert_eq!(attempts, 3);
                assert_eq!(last.as_deref(), Some("7"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(page.count(&format!("click:{}", REFRESH)), 2);
        assert_eq!(page.count("pause:3000"), 2);
    }

    #[test]
    fn test_capture_failure_does_not_consume_attempt() {
        let ocr = ScriptedOcr::new().always("4821", 88.0);
        let page = MockPage::new()
            .with_element(IMAGE)
            .with_element_shots(IMAGE, vec![None, None]);
        let config = ChallengeConfig {
            max_attempts: 1,
            ..Default::default()
        };
        let answer = ChallengeSolver::new(&ocr, config).solve(&page).unwrap();
        assert_eq!(answer, "4821");
        assert_eq!(page.count(&format!("click:{}", REFRESH)), 2);
        assert_eq!(page.count(&format!("shot:{}", IMAGE)), 3);
    }

    #[test]
    fn test_missing_image_consumes_attempts() {
        let ocr = ScriptedOcr::new().always("4821", 88.0);
        let page = MockPage::new();
        let err = solver(&ocr).solve(&page).unwrap_err();
        match err {
            HarnessError::UnresolvedChallenge { attempts, last } => {
                assert_eq!(attempts, 3);
                assert_eq!(last, None);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(page.count(&format!("wait:{}", IMAGE)), 3);
        assert_eq!(page.count(&format!("click:{}", REFRESH)), 2);
        assert_eq!(ocr.total_calls(), 0);
    }

    #[test]
    fn test_late_image_found_within_attempts() {
        let ocr = ScriptedOcr::new().always("4821", 88.0);
        let page = MockPage::new().with_late_element(IMAGE, 2);
        assert_eq!(solver(&ocr).solve(&page).unwrap(), "4821");
        assert_eq!(page.count(&format!("click:{}", REFRESH)), 2);
    }

    #[test]
    fn test_screenshot_failures_are_bounded() {
        let ocr = ScriptedOcr::new().always("4821", 88.0);
        let page = MockPage::new()
            .with_element(IMAGE)
            .with_element_shots(IMAGE, vec![None; 5]);
        let err = solver(&ocr).solve(&page).unwrap_err();
        assert!(matches!(err, HarnessError::ChallengeCaptureFailed { failures: 5 }));
        assert_eq!(page.count(&format!("shot:{}", IMAGE)), 5);
        assert_eq!(ocr.total_calls(), 0);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ChallengeState::Done("1234".into()).to_string(), "Done: 1234");
        assert_eq!(ChallengeState::RefreshAndRetry.to_string(), "Refreshing");
    }
}
