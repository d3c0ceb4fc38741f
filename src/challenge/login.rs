//! Submitting a challenge-protected form.
//!
//! A rejected answer raises a popup. The loop dismisses it, restores any
//! fields the site cleared, requests a new image and solves again, up to
//! `max_submissions` times.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::browser::{ElementState, Page};
use crate::config::LoginConfig;
use crate::error::{HarnessError, HarnessResult};

use super::ChallengeSolver;

/// A form field to restore after a rejection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValue {
    pub selector: String,
    pub value: String,
}

/// Solves, fills and submits until the answer is accepted. Returns the
/// number of submissions used.
pub fn submit_with_challenge(
    page: &dyn Page,
    solver: &ChallengeSolver<'_>,
    login: &LoginConfig,
    refill: &[FieldValue],
) -> HarnessResult<u32> {
    let max = login.max_submissions.max(1);

    for submission in 1..=max {
        tracing::info!("Challenge submission {}/{}", submission, max);
        let answer = solver.solve(page)?;

        if let Err(e) = page
            .fill(&login.answer_selector, &answer)
            .and_then(|()| page.click(&login.submit_selector))
        {
            tracing::warn!("Submitting answer failed: {:#}", e);
            request_new_image(page, solver);
            continue;
        }
        page.pause(Duration::from_millis(login.response_delay_ms));

        if !is_rejected(page, login) {
            tracing::info!("Challenge accepted after {} submission(s)", submission);
            return Ok(submission);
        }

        tracing::warn!("Challenge answer {} rejected", answer);
        if let Err(e) = page.click(&login.dismiss_selector) {
            tracing::warn!("Dismissing rejection popup failed: {:#}", e);
        }
        page.pause(Duration::from_millis(1000));
        for field in refill {
            if let Err(e) = page.fill(&field.selector, &field.value) {
                tracing::warn!("Restoring {} failed: {:#}", field.selector, e);
            }
        }
        request_new_image(page, solver);
    }

    let error = HarnessError::ChallengeRejected { submissions: max };
    tracing::error!("{}", error);
    Err(error)
}

fn is_rejected(page: &dyn Page, login: &LoginConfig) -> bool {
    let timeout = Duration::from_millis(login.rejection_timeout_ms);
    if page
        .wait_for_selector(&login.rejection_selector, ElementState::Visible, timeout)
        .is_err()
    {
        return false;
    }
    if login.rejection_text.is_empty() {
        return true;
    }
    match page.text_content(&login.rejection_selector) {
        Ok(Some(text)) => text.contains(&login.rejection_text),
        Ok(None) => false,
        Err(e) => {
            tracing::warn!("Reading rejection popup failed: {:#}", e);
            false
        }
    }
}

fn request_new_image(page: &dyn Page, solver: &ChallengeSolver<'_>) {
    let config = solver.config();
    if let Err(e) = page.click(&config.refresh_selector) {
        tracing::warn!("Refresh click failed: {:#}", e);
    }
    page.pause(Duration::from_millis(config.refresh_delay_ms));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::mock::MockPage;
    use crate::config::ChallengeConfig;
    use crate::ocr::testing::ScriptedOcr;

    fn login_page(rejections: u32) -> MockPage {
        let login = LoginConfig::default();
        MockPage::new().with_element(".dcp-pic img").rejecting(
            &login.submit_selector,
            &login.rejection_selector,
            &login.dismiss_selector,
            "驗證碼錯誤",
            rejections,
        )
    }

    #[test]
    fn test_accepted_first_time() {
        let ocr = ScriptedOcr::new().always("4821", 90.0);
        let solver = ChallengeSolver::new(&ocr, ChallengeConfig::default());
        let page = login_page(0);
        let used = submit_with_challenge(&page, &solver, &LoginConfig::default(), &[]).unwrap();
        assert_eq!(used, 1);
        assert_eq!(page.count("fill:#captcha=4821"), 1);
    }

    #[test]
    fn test_rejection_refills_and_retries() {
        let ocr = ScriptedOcr::new().always("4821", 90.0);
        let solver = ChallengeSolver::new(&ocr, ChallengeConfig::default());
        let page = login_page(2);
        let refill = vec![FieldValue {
            selector: "#password".to_string(),
            value: "secret".to_string(),
        }];
        let used = submit_with_challenge(&page, &solver, &LoginConfig::default(), &refill).unwrap();
        assert_eq!(used, 3);
        assert_eq!(page.count("fill:#password=secret"), 2);
        assert_eq!(page.count("click:.popup-message button"), 2);
        assert_eq!(page.count("click:.drf-link"), 2);
    }

    #[test]
    fn test_rejections_are_bounded() {
        let ocr = ScriptedOcr::new().always("4821", 90.0);
        let solver = ChallengeSolver::new(&ocr, ChallengeConfig::default());
        let page = login_page(u32::MAX);
        let login = LoginConfig {
            max_submissions: 2,
            ..Default::default()
        };
        let err = submit_with_challenge(&page, &solver, &login, &[]).unwrap_err();
        assert!(matches!(err, HarnessError::ChallengeRejected { submissions: 2 }));
        assert_eq!(page.count("click:#btnLogin"), 2);
    }

    #[test]
    fn test_unrelated_popup_is_not_rejection() {
        let ocr = ScriptedOcr::new().always("4821", 90.0);
        let solver = ChallengeSolver::new(&ocr, ChallengeConfig::default());
        let login = LoginConfig::default();
        let page = MockPage::new().with_element(".dcp-pic img").rejecting(
            &login.submit_selector,
            &login.rejection_selector,
            &login.dismiss_selector,
            "Welcome back",
            1,
        );
        assert_eq!(submit_with_challenge(&page, &solver, &login, &[]).unwrap(), 1);
    }

    #[test]
    fn test_unsolvable_challenge_propagates() {
        let ocr = ScriptedOcr::new();
        let solver = ChallengeSolver::new(&ocr, ChallengeConfig::default());
        let page = login_page(0);
        let err = submit_with_challenge(&page, &solver, &LoginConfig::default(), &[]).unwrap_err();
        assert!(matches!(err, HarnessError::UnresolvedChallenge { .. }));
        assert_eq!(page.count("click:#btnLogin"), 0);
    }

    #[test]
    fn test_failed_submit_requests_new_image() {
        let ocr = ScriptedOcr::new().always("4821", 90.0);
        let solver = ChallengeSolver::new(&ocr, ChallengeConfig::default());
        let login = LoginConfig {
            max_submissions: 2,
            ..Default::default()
        };
        let page = login_page(0).with_failing_action(&login.submit_selector);
        let err = submit_with_challenge(&page, &solver, &login, &[]).unwrap_err();
        assert!(matches!(err, HarnessError::ChallengeRejected { submissions: 2 }));
        assert_eq!(page.count("click:.drf-link"), 2);
        assert_eq!(page.count("pause:2000"), 2);
    }
}
