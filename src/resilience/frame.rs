use std::time::Duration;

use crate::browser::{frame_selector, ElementState, FrameHandle, Page};
use crate::error::{HarnessError, HarnessResult};

use super::diagnose::Diagnostics;
use super::policy::FrameOptions;

/// Acquires a named frame whose document is verified reachable. Reloads the
/// host page once partway through the budget; exhaustion writes a diagnostic
/// and fails with `FrameUnavailable`.
pub fn get_frame(
    page: &dyn Page,
    name: &str,
    options: &FrameOptions,
    diagnostics: &Diagnostics,
) -> HarnessResult<FrameHandle> {
    let policy = options.policy();
    let attach_timeout = Duration::from_millis(options.attach_timeout_ms);

    let frame = policy.run(
        |attempt| {
            tracing::info!("Looking for frame '{}' (attempt {}/{})", name, attempt, policy.max_attempts);

            // Host document first
            if let Err(e) = page.wait_for_selector("body", ElementState::Attached, policy.timeout_per_attempt) {
                tracing::warn!("Host page not ready: {:#}", e);
            }

            let frame = locate(page, name, attach_timeout)?;
            match page.frame_body_ready(&frame, policy.timeout_per_attempt) {
                Ok(true) => {
                    tracing::info!("Frame '{}' is ready", name);
                    Some(frame)
                }
                Ok(false) => {
                    tracing::warn!("Frame '{}' exists but its body is not reachable", name);
                    None
                }
                Err(e) => {
                    tracing::warn!("Frame '{}' verification failed: {:#}", name, e);
                    None
                }
            }
        },
        |attempt| {
            if attempt == options.reload_after() {
                tracing::info!("Reloading host page while waiting for frame '{}'", name);
                if let Err(e) = page.reload() {
                    tracing::warn!("Reload failed: {:#}", e);
                }
            }
            page.pause(policy.backoff_delay);
        },
    );

    match frame {
        Some(frame) => Ok(frame),
        None => {
            tracing::error!("Frame '{}' unreachable after {} attempts", name, policy.max_attempts);
            let report = diagnostics.capture(page, &format!("frame {} unreachable", name));
            Err(HarnessError::FrameUnavailable {
                name: name.to_string(),
                attempts: policy.max_attempts,
                diagnostic: report.primary_path(),
            })
        }
    }
}

/// Finds the frame directly, or waits for its element to attach and looks
/// again.
fn locate(page: &dyn Page, name: &str, attach_timeout: Duration) -> Option<FrameHandle> {
    match page.find_frame(name) {
        Ok(Some(frame)) => return Some(frame),
        Ok(None) => {}
        Err(e) => tracing::warn!("Frame lookup failed: {:#}", e),
    }

    page.wait_for_selector(&frame_selector(name), ElementState::Attached, attach_timeout)
        .ok()?;
    page.pause(Duration::from_millis(1000));
    page.find_frame(name).ok().flatten()
}
