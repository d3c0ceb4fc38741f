use crate::browser::Page;
use crate::error::{HarnessError, HarnessResult};

use super::diagnose::Diagnostics;
use super::policy::{FallbackAction, WaitOptions};

/// Waits for `selector` to reach `options.state`, retrying with a reload or
/// a plain pause in between. Never errors: exhaustion returns `false`.
pub fn wait_for(page: &dyn Page, selector: &str, options: &WaitOptions) -> bool {
    let policy = options.policy();
    let label = options.description.as_deref().unwrap_or(selector);

    let found = policy.run(
        |attempt| match page.wait_for_selector(selector, options.state, policy.timeout_per_attempt) {
            Ok(()) => {
                tracing::info!(
                    "'{}' is {} (attempt {}/{})",
                    label,
                    options.state,
                    attempt,
                    policy.max_attempts
                );
                Some(())
            }
            Err(e) => {
                tracing::warn!(
                    "Waiting for '{}' failed (attempt {}/{}): {:#}",
                    label,
                    attempt,
                    policy.max_attempts,
                    e
                );
                None
            }
        },
        |_| {
            if policy.fallback == FallbackAction::ReloadPage {
                tracing::info!("Reloading page before retrying '{}'", label);
                if let Err(e) = page.reload() {
                    tracing::warn!("Reload failed: {:#}", e);
                }
            }
            page.pause(policy.backoff_delay);
        },
    );

    if found.is_none() {
        tracing::error!(
            "'{}' not {} after {} attempts",
            label,
            options.state,
            policy.max_attempts
        );
    }
    found.is_some()
}

/// `wait_for`, but exhaustion captures a diagnostic and becomes an error.
pub fn wait_for_required(
    page: &dyn Page,
    selector: &str,
    options: &WaitOptions,
    diagnostics: &Diagnostics,
) -> HarnessResult<()> {
    if wait_for(page, selector, options) {
        return Ok(());
    }
    let description = options.description.clone().unwrap_or_else(|| selector.to_string());
    let report = diagnostics.capture(page, &description);
    Err(HarnessError::ElementUnavailable {
        description,
        attempts: options.retries + 1,
        diagnostic: report.primary_path(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::mock::MockPage;

    #[test]
    fn test_three_attempts_then_false() {
        let page = MockPage::new();
        let options = WaitOptions {
            retries: 2,
            reload_on_fail: false,
            ..Default::default()
        };
        assert!(!wait_for(&page, "#missing", &options));
        assert_eq!(page.count("wait:#missing"), 3);
        assert_eq!(page.count("pause:2000"), 2);
        assert_eq!(page.count("reload"), 0);
    }

    #[test]
    fn test_reload_between_attempts() {
        let page = MockPage::new();
        let options = WaitOptions {
            retries: 2,
            ..Default::default()
        };
        assert!(!wait_for(&page, "#missing", &options));
        assert_eq!(page.count("reload"), 2);
        assert_eq!(page.count("pause:3000"), 2);
        assert_eq!(
            page.calls(),
            vec![
                "wait:#missing",
                "reload",
                "pause:3000",
                "wait:#missing",
                "reload",
                "pause:3000",
                "wait:#missing",
            ]
        );
    }

    #[test]
    fn test_late_element_found() {
        let page = MockPage::new().with_late_element(".checkout-btn", 1);
        assert!(wait_for(&page, ".checkout-btn", &WaitOptions::default()));
        assert_eq!(page.count("wait:.checkout-btn"), 2);
    }

    #[test]
    fn test_hidden_state() {
        let page = MockPage::new();
        let options = WaitOptions {
            state: crate::browser::ElementState::Hidden,
            ..Default::default()
        };
        assert!(wait_for(&page, ".loading", &options));
    }

    #[test]
    fn test_required_failure_has_diagnostic() {
        let dir = tempfile::tempdir().unwrap();
        let page = MockPage::new();
        let options = WaitOptions {
            retries: 1,
            reload_on_fail: false,
            description: Some("payment selector".to_string()),
            ..Default::default()
        };
        let err = wait_for_required(&page, "#pay", &options, &Diagnostics::new(dir.path()))
            .unwrap_err();
        match err {
            HarnessError::ElementUnavailable {
                description,
                attempts,
                diagnostic,
            } => {
                assert_eq!(description, "payment selector");
                assert_eq!(attempts, 2);
                assert!(diagnostic.unwrap().exists());
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
