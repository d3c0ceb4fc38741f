use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::browser::ElementState;

/// What a primitive does when an attempt fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FallbackAction {
    None,
    /// Reload the page between attempts
    ReloadPage,
    /// Fall back to a full-page screenshot once attempts run out
    PageScreenshot,
}

/// Bounded retry budget attached to one primitive invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub timeout_per_attempt: Duration,
    pub backoff_delay: Duration,
    pub fallback: FallbackAction,
}

impl RetryPolicy {
    /// Calls `attempt(n)` for n = 1..=max_attempts until it yields a value,
    /// calling `between(n)` after every failed attempt except the last.
    pub fn run<T>(
        &self,
        mut attempt: impl FnMut(u32) -> Option<T>,
        mut between: impl FnMut(u32),
    ) -> Option<T> {
        let max = self.max_attempts.max(1);
        for n in 1..=max {
            if let Some(value) = attempt(n) {
                return Some(value);
            }
            if n < max {
                between(n);
            }
        }
        None
    }
}

/// Options for `wait_for`. `retries` counts attempts after the first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitOptions {
    pub state: ElementState,
    pub timeout_ms: u64,
    pub retries: u32,
    pub reload_on_fail: bool,
    /// Pause between attempts without a reload
    pub backoff_ms: u64,
    /// Pause after a reload
    pub reload_settle_ms: u64,
    /// Human-readable name used in logs and errors
    pub description: Option<String>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            state: ElementState::Visible,
            timeout_ms: 15000,
            retries: 3,
            reload_on_fail: true,
            backoff_ms: 2000,
            reload_settle_ms: 3000,
            description: None,
        }
    }
}

impl WaitOptions {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retries + 1,
            timeout_per_attempt: Duration::from_millis(self.timeout_ms),
            backoff_delay: Duration::from_millis(if self.reload_on_fail {
                self.reload_settle_ms
            } else {
                self.backoff_ms
            }),
            fallback: if self.reload_on_fail {
                FallbackAction::ReloadPage
            } else {
                FallbackAction::None
            },
        }
    }
}

/// Options for `capture`. `retries` counts attempts after the first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureOptions {
    pub timeout_ms: u64,
    pub retries: u32,
    pub fallback_to_page: bool,
    /// Wait for visibility and a short settle before shooting an element
    pub wait_for_stable: bool,
    pub settle_ms: u64,
    pub backoff_ms: u64,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 15000,
            retries: 2,
            fallback_to_page: true,
            wait_for_stable: true,
            settle_ms: 300,
            backoff_ms: 2000,
        }
    }
}

impl CaptureOptions {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retries + 1,
            timeout_per_attempt: Duration::from_millis(self.timeout_ms),
            backoff_delay: Duration::from_millis(self.backoff_ms),
            fallback: if self.fallback_to_page {
                FallbackAction::PageScreenshot
            } else {
                FallbackAction::None
            },
        }
    }
}

/// Options for `get_frame`. `max_retries` is the total attempt count.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameOptions {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// How long to wait for the frame element to be attached
    pub attach_timeout_ms: u64,
    /// How long to wait for the frame body to be reachable
    pub verify_timeout_ms: u64,
}

impl Default for FrameOptions {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_delay_ms: 3000,
            attach_timeout_ms: 8000,
            verify_timeout_ms: 5000,
        }
    }
}

impl FrameOptions {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries.max(1),
            timeout_per_attempt: Duration::from_millis(self.verify_timeout_ms),
            backoff_delay: Duration::from_millis(self.retry_delay_ms),
            fallback: FallbackAction::ReloadPage,
        }
    }

    /// The attempt after which the host page is reloaded once.
    pub fn reload_after(&self) -> u32 {
        (self.max_retries / 2).max(1)
    }
}
