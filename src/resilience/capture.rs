use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::browser::{ElementState, Page};
use crate::ocr::CapturedImage;
use crate::paths::fallback_path;

use super::policy::{CaptureOptions, FallbackAction};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureTarget<'a> {
    Element(&'a str),
    Page,
}

/// Screenshots `target` to `path`. An element that cannot be captured falls
/// back to a full-page shot at `<stem>_fullpage.png`. Never errors: returns
/// the file written by this call, or `None` if nothing was.
pub fn capture(
    page: &dyn Page,
    target: CaptureTarget<'_>,
    path: &Path,
    options: &CaptureOptions,
) -> Option<PathBuf> {
    let policy = options.policy();

    let captured = policy.run(
        |attempt| match shoot(page, target, options).and_then(|img| img.save(path)) {
            Ok(()) => {
                tracing::info!("Captured {}", path.display());
                Some(())
            }
            Err(e) => {
                tracing::warn!(
                    "Capture of {} failed (attempt {}/{}): {:#}",
                    path.display(),
                    attempt,
                    policy.max_attempts,
                    e
                );
                None
            }
        },
        |_| page.pause(policy.backoff_delay),
    );
    if captured.is_some() {
        return Some(path.to_path_buf());
    }

    if policy.fallback == FallbackAction::PageScreenshot && matches!(target, CaptureTarget::Element(_)) {
        let fallback = fallback_path(path);
        tracing::info!("Falling back to full-page capture at {}", fallback.display());
        match page
            .screenshot_page()
            .and_then(|bytes| CapturedImage::from_png(bytes).save(&fallback))
        {
            Ok(()) => return Some(fallback),
            Err(e) => tracing::error!("Full-page fallback failed: {:#}", e),
        }
    }

    tracing::error!("Could not capture {}", path.display());
    None
}

fn shoot(page: &dyn Page, target: CaptureTarget<'_>, options: &CaptureOptions) -> Result<CapturedImage> {
    let timeout = options.policy().timeout_per_attempt;
    let bytes = match target {
        CaptureTarget::Element(selector) => {
            if options.wait_for_stable {
                page.wait_for_selector(selector, ElementState::Visible, timeout / 2)?;
                page.pause(std::time::Duration::from_millis(options.settle_ms));
            }
            page.screenshot_element(selector, timeout)?
        }
        CaptureTarget::Page => page.screenshot_page()?,
    };
    Ok(CapturedImage::from_png(bytes))
}
