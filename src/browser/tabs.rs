//! Explicit tab tracking.
//!
//! The active tab only changes through `TabEvent`s, never as a side effect
//! of some other operation.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Result};

use super::Page;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TabEvent {
    Opened(String),
    BroughtToFront(String),
    Closed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TabTracker {
    main: String,
    active: Option<String>,
    latest: Option<String>,
    known: BTreeSet<String>,
}

impl TabTracker {
    /// Starts tracking with `main` as the only known and active tab.
    pub fn new(main: impl Into<String>) -> Self {
        let main = main.into();
        Self {
            known: BTreeSet::from([main.clone()]),
            active: Some(main.clone()),
            latest: None,
            main,
        }
    }

    pub fn apply(&mut self, event: TabEvent) -> Result<()> {
        match event {
            TabEvent::Opened(handle) => {
                self.known.insert(handle.clone());
                self.latest = Some(handle);
            }
            TabEvent::BroughtToFront(handle) => {
                if !self.known.contains(&handle) {
                    bail!("Cannot bring unknown tab {} to front", handle);
                }
                self.active = Some(handle);
            }
            TabEvent::Closed(handle) => {
                self.known.remove(&handle);
                if self.active.as_deref() == Some(handle.as_str()) {
                    self.active = None;
                }
                if self.latest.as_deref() == Some(handle.as_str()) {
                    self.latest = None;
                }
            }
        }
        Ok(())
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn main(&self) -> &str {
        &self.main
    }

    /// Most recently opened tab that is still open.
    pub fn latest(&self) -> Option<&str> {
        self.latest.as_deref()
    }

    pub fn is_known(&self, handle: &str) -> bool {
        self.known.contains(handle)
    }

    /// Handles in `handles` not yet known to the tracker.
    pub fn unseen<'a>(&self, handles: &'a [String]) -> Vec<&'a str> {
        handles
            .iter()
            .filter(|h| !self.known.contains(h.as_str()))
            .map(String::as_str)
            .collect()
    }
}

/// Waits for a tab the tracker has not seen, records it and brings it to
/// the front.
pub fn follow_new_tab(page: &dyn Page, tracker: &mut TabTracker, timeout: Duration) -> Result<String> {
    let deadline = Instant::now() + timeout;
    loop {
        let handles = page.window_handles()?;
        if let Some(handle) = tracker.unseen(&handles).first().map(|h| h.to_string()) {
            tracker.apply(TabEvent::Opened(handle.clone()))?;
            bring_to_front(page, tracker, &handle)?;
            tracing::info!("Switched to new tab {}", handle);
            return Ok(handle);
        }
        if Instant::now() >= deadline {
            return Err(anyhow!("No new tab opened within {:?}", timeout));
        }
        page.pause(Duration::from_millis(500));
    }
}

/// Switches the page to a known tab.
pub fn bring_to_front(page: &dyn Page, tracker: &mut TabTracker, handle: &str) -> Result<()> {
    if !tracker.is_known(handle) {
        bail!("Cannot bring unknown tab {} to front", handle);
    }
    page.switch_to_window(handle)?;
    tracker.apply(TabEvent::BroughtToFront(handle.to_string()))
}
