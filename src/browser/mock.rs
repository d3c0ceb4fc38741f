//! Scripted `Page` for tests.
//!
//! Elements can be made to appear after a number of waits, screenshots can
//! be scripted to fail, frames can be made to appear late, and a submit
//! button can be made to raise a rejection popup. Every call is recorded,
//! and `pause` records instead of sleeping.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde_json::Value;

use super::{ElementState, FrameHandle, Page};
use crate::ocr::testing::sample_challenge;

#[derive(Clone, Debug)]
struct ElementScript {
    /// Waits that fail before the element shows up
    hidden_for: u32,
    text: Option<String>,
}

#[derive(Clone, Debug)]
struct FrameScript {
    /// `find_frame` calls that miss before the frame is found
    missing_for: u32,
    body_ready: bool,
}

#[derive(Clone, Debug)]
struct RejectionScript {
    submit: String,
    popup: String,
    dismiss: String,
    remaining: u32,
}

pub struct MockPage {
    elements: RefCell<HashMap<String, ElementScript>>,
    frames: RefCell<HashMap<String, FrameScript>>,
    element_shots: RefCell<HashMap<String, VecDeque<Option<Vec<u8>>>>>,
    page_shot_fails: Cell<bool>,
    failing_actions: RefCell<HashSet<String>>,
    evaluate_result: RefCell<Value>,
    windows: RefCell<Vec<String>>,
    current: RefCell<String>,
    rejection: RefCell<Option<RejectionScript>>,
    calls: RefCell<Vec<String>>,
}

impl MockPage {
    pub fn new() -> Self {
        Self {
            elements: RefCell::new(HashMap::new()),
            frames: RefCell::new(HashMap::new()),
            element_shots: RefCell::new(HashMap::new()),
            page_shot_fails: Cell::new(false),
            failing_actions: RefCell::new(HashSet::new()),
            evaluate_result: RefCell::new(Value::Null),
            windows: RefCell::new(vec!["main".to_string()]),
            current: RefCell::new("main".to_string()),
            rejection: RefCell::new(None),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Element visible immediately.
    pub fn with_element(self, selector: &str) -> Self {
        self.with_late_element(selector, 0)
    }

    /// Element that fails `waits` waits before becoming visible.
    pub fn with_late_element(self, selector: &str, waits: u32) -> Self {
        self.elements.borrow_mut().insert(
            selector.to_string(),
            ElementScript {
                hidden_for: waits,
                text: None,
            },
        );
        self
    }

    pub fn with_text(self, selector: &str, text: &str) -> Self {
        self.elements.borrow_mut().insert(
            selector.to_string(),
            ElementScript {
                hidden_for: 0,
                text: Some(text.to_string()),
            },
        );
        self
    }

    /// Scripted element screenshots; `None` entries fail. Once the script
    /// runs out, present elements screenshot as the sample challenge.
    pub fn with_element_shots(self, selector: &str, shots: Vec<Option<Vec<u8>>>) -> Self {
        self.element_shots
            .borrow_mut()
            .insert(selector.to_string(), shots.into());
        self
    }

    pub fn with_failing_page_shot(self) -> Self {
        self.page_shot_fails.set(true);
        self
    }

    /// Makes `click`/`fill`/`select_option` on this selector fail.
    pub fn with_failing_action(self, selector: &str) -> Self {
        self.failing_actions.borrow_mut().insert(selector.to_string());
        self
    }

    pub fn with_frame(self, name: &str, missing_for: u32, body_ready: bool) -> Self {
        self.frames.borrow_mut().insert(
            name.to_string(),
            FrameScript {
                missing_for,
                body_ready,
            },
        );
        self
    }

    pub fn with_evaluate_result(self, value: Value) -> Self {
        *self.evaluate_result.borrow_mut() = value;
        self
    }

    pub fn with_windows(self, handles: &[&str]) -> Self {
        *self.windows.borrow_mut() = handles.iter().map(|h| h.to_string()).collect();
        if let Some(first) = handles.first() {
            *self.current.borrow_mut() = first.to_string();
        }
        self
    }

    /// Clicking `submit` shows `popup` (with `text`) for the first `times`
    /// submissions. Clicking `dismiss` hides it again.
    pub fn rejecting(self, submit: &str, popup: &str, dismiss: &str, text: &str, times: u32) -> Self {
        *self.rejection.borrow_mut() = Some(RejectionScript {
            submit: submit.to_string(),
            popup: popup.to_string(),
            dismiss: dismiss.to_string(),
            remaining: times,
        });
        self.elements.borrow_mut().insert(
            popup.to_string(),
            ElementScript {
                hidden_for: u32::MAX,
                text: Some(text.to_string()),
            },
        );
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.borrow().iter().filter(|c| c.as_str() == call).count()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }

    fn is_visible(&self, selector: &str) -> bool {
        self.elements
            .borrow()
            .get(selector)
            .is_some_and(|e| e.hidden_for == 0)
    }

    fn set_visible(&self, selector: &str, visible: bool) {
        if let Some(element) = self.elements.borrow_mut().get_mut(selector) {
            element.hidden_for = if visible { 0 } else { u32::MAX };
        }
    }

    fn check_action(&self, selector: &str) -> Result<()> {
        if self.failing_actions.borrow().contains(selector) {
            return Err(anyhow!("scripted failure on {}", selector));
        }
        Ok(())
    }
}

impl Page for MockPage {
    fn goto(&self, url: &str) -> Result<()> {
        self.record(format!("goto:{}", url));
        Ok(())
    }

    fn reload(&self) -> Result<()> {
        self.record("reload".to_string());
        Ok(())
    }

    fn wait_for_selector(&self, selector: &str, state: ElementState, _timeout: Duration) -> Result<()> {
        self.record(format!("wait:{}", selector));
        let mut elements = self.elements.borrow_mut();
        let visible = match elements.get_mut(selector) {
            Some(element) if element.hidden_for == 0 => true,
            Some(element) => {
                if element.hidden_for != u32::MAX {
                    element.hidden_for -= 1;
                }
                false
            }
            None => false,
        };
        match (state, visible) {
            (ElementState::Hidden, false) => Ok(()),
            (ElementState::Hidden, true) => Err(anyhow!("{} still visible", selector)),
            (_, true) => Ok(()),
            (_, false) => Err(anyhow!("timeout waiting for {}", selector)),
        }
    }

    fn click(&self, selector: &str) -> Result<()> {
        self.record(format!("click:{}", selector));
        self.check_action(selector)?;

        let script = self.rejection.borrow().clone();
        if let Some(script) = script {
            if selector == script.submit {
                let reject = script.remaining > 0;
                if reject {
                    if let Some(s) = self.rejection.borrow_mut().as_mut() {
                        s.remaining -= 1;
                    }
                }
                self.set_visible(&script.popup, reject);
            } else if selector == script.dismiss {
                self.set_visible(&script.popup, false);
            }
        }
        Ok(())
    }

    fn fill(&self, selector: &str, value: &str) -> Result<()> {
        self.record(format!("fill:{}={}", selector, value));
        self.check_action(selector)
    }

    fn select_option(&self, selector: &str, value: &str) -> Result<()> {
        self.record(format!("select:{}={}", selector, value));
        self.check_action(selector)
    }

    fn text_content(&self, selector: &str) -> Result<Option<String>> {
        self.record(format!("text:{}", selector));
        let elements = self.elements.borrow();
        Ok(elements
            .get(selector)
            .filter(|e| e.hidden_for == 0)
            .map(|e| e.text.clone().unwrap_or_default()))
    }

    fn screenshot_element(&self, selector: &str, _timeout: Duration) -> Result<Vec<u8>> {
        self.record(format!("shot:{}", selector));
        let scripted = self
            .element_shots
            .borrow_mut()
            .get_mut(selector)
            .and_then(|queue| queue.pop_front());
        match scripted {
            Some(Some(bytes)) => Ok(bytes),
            Some(None) => Err(anyhow!("scripted screenshot failure for {}", selector)),
            None if self.is_visible(selector) => Ok(sample_challenge().as_bytes().to_vec()),
            None => Err(anyhow!("no element {}", selector)),
        }
    }

    fn screenshot_page(&self) -> Result<Vec<u8>> {
        self.record("shot:page".to_string());
        if self.page_shot_fails.get() {
            return Err(anyhow!("scripted page screenshot failure"));
        }
        Ok(sample_challenge().as_bytes().to_vec())
    }

    fn find_frame(&self, name: &str) -> Result<Option<FrameHandle>> {
        self.record(format!("find_frame:{}", name));
        let mut frames = self.frames.borrow_mut();
        match frames.get_mut(name) {
            Some(frame) if frame.missing_for == 0 => Ok(Some(FrameHandle::new(name))),
            Some(frame) => {
                frame.missing_for -= 1;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn frame_body_ready(&self, frame: &FrameHandle, _timeout: Duration) -> Result<bool> {
        self.record(format!("frame_ready:{}", frame.name));
        Ok(self
            .frames
            .borrow()
            .get(&frame.name)
            .is_some_and(|f| f.body_ready))
    }

    fn enter_frame(&self, frame: &FrameHandle) -> Result<()> {
        self.record(format!("enter_frame:{}", frame.name));
        Ok(())
    }

    fn leave_frame(&self) -> Result<()> {
        self.record("leave_frame".to_string());
        Ok(())
    }

    fn evaluate(&self, _script: &str) -> Result<Value> {
        self.record("evaluate".to_string());
        Ok(self.evaluate_result.borrow().clone())
    }

    fn window_handles(&self) -> Result<Vec<String>> {
        Ok(self.windows.borrow().clone())
    }

    fn current_window(&self) -> Result<String> {
        Ok(self.current.borrow().clone())
    }

    fn switch_to_window(&self, handle: &str) -> Result<()> {
        self.record(format!("switch:{}", handle));
        if !self.windows.borrow().iter().any(|w| w == handle) {
            return Err(anyhow!("no such window {}", handle));
        }
        *self.current.borrow_mut() = handle.to_string();
        Ok(())
    }

    fn pause(&self, duration: Duration) {
        self.record(format!("pause:{}", duration.as_millis()));
    }
}
