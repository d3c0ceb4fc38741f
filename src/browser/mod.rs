//! Browser seam.
//!
//! Everything above this module talks to a `Page`; the WebDriver session is
//! one implementation and tests use a scripted one. The trait is
//! synchronous and takes `&self` throughout, so resilience primitives can
//! borrow the page freely.

pub mod tabs;
pub mod webdriver;

#[cfg(test)]
pub(crate) mod mock;

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use tabs::{TabEvent, TabTracker};
pub use webdriver::{WebDriverFactory, WebDriverPage};

/// Element condition to wait for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementState {
    #[default]
    Visible,
    Attached,
    Hidden,
}

impl std::fmt::Display for ElementState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElementState::Visible => write!(f, "visible"),
            ElementState::Attached => write!(f, "attached"),
            ElementState::Hidden => write!(f, "hidden"),
        }
    }
}

/// A named frame in the top-level document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameHandle {
    pub name: String,
}

impl FrameHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// CSS selector matching the frame element by name.
    pub fn selector(&self) -> String {
        frame_selector(&self.name)
    }
}

pub fn frame_selector(name: &str) -> String {
    format!("iframe[name=\"{0}\"], frame[name=\"{0}\"]", name)
}

/// One browser tab's worth of automation capability.
///
/// Frame lookups always resolve from the top-level document. Errors are
/// transient from the caller's point of view.
pub trait Page {
    fn goto(&self, url: &str) -> Result<()>;
    fn reload(&self) -> Result<()>;

    fn wait_for_selector(&self, selector: &str, state: ElementState, timeout: Duration) -> Result<()>;
    fn click(&self, selector: &str) -> Result<()>;
    /// Clears the field, then types `value`.
    fn fill(&self, selector: &str, value: &str) -> Result<()>;
    /// Selects an `<option>` by its value.
    fn select_option(&self, selector: &str, value: &str) -> Result<()>;
    /// Visible text of the first match, or `None` if nothing matches.
    fn text_content(&self, selector: &str) -> Result<Option<String>>;

    /// PNG of one element, waiting up to `timeout` for it to exist.
    fn screenshot_element(&self, selector: &str, timeout: Duration) -> Result<Vec<u8>>;
    /// PNG of the whole viewport.
    fn screenshot_page(&self) -> Result<Vec<u8>>;

    fn find_frame(&self, name: &str) -> Result<Option<FrameHandle>>;
    /// Whether the frame's document has a reachable body within `timeout`.
    fn frame_body_ready(&self, frame: &FrameHandle, timeout: Duration) -> Result<bool>;
    /// Directs subsequent element operations into `frame`.
    fn enter_frame(&self, frame: &FrameHandle) -> Result<()>;
    /// Returns to the top-level document.
    fn leave_frame(&self) -> Result<()>;

    /// Runs `script` as a function body and returns its JSON result.
    fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    fn window_handles(&self) -> Result<Vec<String>>;
    fn current_window(&self) -> Result<String>;
    fn switch_to_window(&self, handle: &str) -> Result<()>;

    /// Fixed delay between actions.
    fn pause(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Opens a fresh, isolated page per scenario. Dropping the page tears the
/// session down.
pub trait BrowserFactory {
    fn open(&self) -> Result<Box<dyn Page>>;
}
