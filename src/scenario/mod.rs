//! Scenario descriptors and outcomes.
//!
//! A scenario is a named, ordered list of steps plus the checkout
//! parameters its steps refer to through `{placeholders}`. Scenario files
//! hold either one descriptor or an array of them.

pub mod csv_writer;
pub mod runner;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::challenge::login::FieldValue;
use crate::error::{HarnessError, HarnessResult};
use crate::resilience::{CaptureOptions, FrameOptions, WaitOptions};

pub use runner::ScenarioRunner;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDescriptor {
    pub name: String,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub invoice: Option<String>,
    #[serde(default)]
    pub logistics: Option<String>,
    /// Artifact key → file name inside the scenario's records directory
    #[serde(default)]
    pub artifacts: BTreeMap<String, String>,
    pub steps: Vec<ScenarioStep>,
}

fn default_new_tab_timeout() -> u64 {
    10000
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabTarget {
    #[default]
    Main,
    Latest,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScenarioStep {
    Goto {
        url: String,
    },
    WaitFor {
        selector: String,
        #[serde(default)]
        options: Option<WaitOptions>,
        /// Exhaustion fails the scenario instead of continuing
        #[serde(default)]
        required: bool,
    },
    Click {
        selector: String,
    },
    Fill {
        selector: String,
        value: String,
    },
    Select {
        selector: String,
        value: String,
    },
    Capture {
        artifact: String,
        /// Element to capture; the whole page when absent
        #[serde(default)]
        selector: Option<String>,
        #[serde(default)]
        options: Option<CaptureOptions>,
    },
    EnterFrame {
        name: String,
        #[serde(default)]
        options: Option<FrameOptions>,
    },
    LeaveFrame,
    SwitchToNewTab {
        #[serde(default = "default_new_tab_timeout")]
        timeout_ms: u64,
    },
    BringToFront {
        #[serde(default)]
        tab: TabTarget,
    },
    /// Solves the challenge and types the answer into `answer_selector`
    SolveChallenge {
        answer_selector: String,
    },
    /// Solve-fill-submit loop with rejection handling
    LoginWithChallenge {
        #[serde(default)]
        refill: Vec<FieldValue>,
    },
    /// Stores an element's text (or the first regex capture group) under `key`
    ExtractText {
        selector: String,
        key: String,
        #[serde(default)]
        pattern: Option<String>,
    },
    Pause {
        ms: u64,
    },
}

impl ScenarioStep {
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioStep::Goto { .. } => "goto",
            ScenarioStep::WaitFor { .. } => "wait_for",
            ScenarioStep::Click { .. } => "click",
            ScenarioStep::Fill { .. } => "fill",
            ScenarioStep::Select { .. } => "select",
            ScenarioStep::Capture { .. } => "capture",
            ScenarioStep::EnterFrame { .. } => "enter_frame",
            ScenarioStep::LeaveFrame => "leave_frame",
            ScenarioStep::SwitchToNewTab { .. } => "switch_to_new_tab",
            ScenarioStep::BringToFront { .. } => "bring_to_front",
            ScenarioStep::SolveChallenge { .. } => "solve_challenge",
            ScenarioStep::LoginWithChallenge { .. } => "login_with_challenge",
            ScenarioStep::ExtractText { .. } => "extract_text",
            ScenarioStep::Pause { .. } => "pause",
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScenarioFile {
    Many(Vec<ScenarioDescriptor>),
    One(ScenarioDescriptor),
}

impl ScenarioDescriptor {
    /// Loads every descriptor in a scenario file.
    pub fn load_all(path: &Path) -> HarnessResult<Vec<ScenarioDescriptor>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| HarnessError::Scenario(format!("{}: {}", path.display(), e)))?;
        let parsed: ScenarioFile = serde_json::from_str(&contents)
            .map_err(|e| HarnessError::Scenario(format!("{}: {}", path.display(), e)))?;
        Ok(match parsed {
            ScenarioFile::Many(list) => list,
            ScenarioFile::One(one) => vec![one],
        })
    }

    /// Values available to `{placeholder}` substitution.
    pub fn variables(&self) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        vars.insert("scenario".to_string(), self.name.clone());
        let optional = [
            ("product_id", &self.product_id),
            ("payment_method", &self.payment_method),
            ("invoice", &self.invoice),
            ("logistics", &self.logistics),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                vars.insert(key.to_string(), value.clone());
            }
        }
        vars
    }

    /// File name for an artifact key, or the key itself when undeclared.
    pub fn artifact_file<'a>(&'a self, key: &'a str) -> &'a str {
        self.artifacts.get(key).map(String::as_str).unwrap_or(key)
    }
}

/// Replaces `{name}` with its value. Unknown placeholders are left intact.
pub fn expand(template: &str, vars: &BTreeMap<String, String>) -> String {
    let Ok(pattern) = Regex::new(r"\{([A-Za-z0-9_]+)\}") else {
        return template.to_string();
    };
    pattern
        .replace_all(template, |caps: &Captures| {
            vars.get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Result of one scenario run.
#[derive(Clone, Debug)]
pub struct ScenarioOutcome {
    pub name: String,
    pub passed: bool,
    pub error: Option<String>,
    pub extracted: BTreeMap<String, String>,
    pub artifacts: Vec<PathBuf>,
    pub started_at: DateTime<Local>,
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::ElementState;

    const SCENARIO: &str = r##"{
        "name": "test000",
        "product_id": "16",
        "payment_method": "credit",
        "artifacts": { "cart": "2A.png" },
        "steps": [
            { "action": "goto", "url": "https://shop.test/product/{product_id}" },
            { "action": "wait_for", "selector": ".add-to-cart",
              "options": { "state": "attached", "retries": 1 }, "required": true },
            { "action": "click", "selector": ".add-to-cart" },
            { "action": "select", "selector": "#payment", "value": "{payment_method}" },
            { "action": "capture", "artifact": "cart", "selector": ".cart" },
            { "action": "enter_frame", "name": "mainFrame" },
            { "action": "leave_frame" },
            { "action": "switch_to_new_tab" },
            { "action": "bring_to_front", "tab": "main" },
            { "action": "login_with_challenge",
              "refill": [{ "selector": "#password", "value": "pw" }] },
            { "action": "extract_text", "selector": ".order-no", "key": "order_id",
              "pattern": "(TS\\d+)" },
            { "action": "pause", "ms": 500 }
        ]
    }"##;

    #[test]
    fn test_parse_descriptor() {
        let scenario: ScenarioDescriptor = serde_json::from_str(SCENARIO).unwrap();
        assert_eq!(scenario.name, "test000");
        assert_eq!(scenario.steps.len(), 12);
        match &scenario.steps[1] {
            ScenarioStep::WaitFor {
                options: Some(options),
                required,
                ..
            } => {
                assert!(*required);
                assert_eq!(options.state, ElementState::Attached);
                assert_eq!(options.retries, 1);
                assert_eq!(options.timeout_ms, 15000);
            }
            other => panic!("unexpected step {:?}", other),
        }
        assert_eq!(
            scenario.steps[7],
            ScenarioStep::SwitchToNewTab { timeout_ms: 10000 }
        );
        assert_eq!(scenario.artifact_file("cart"), "2A.png");
        assert_eq!(scenario.artifact_file("41A"), "41A");
    }

    #[test]
    fn test_unknown_action_rejected() {
        let json = r#"{ "name": "x", "steps": [{ "action": "teleport" }] }"#;
        assert!(serde_json::from_str::<ScenarioDescriptor>(json).is_err());
    }

    #[test]
    fn test_load_single_and_many() {
        let dir = tempfile::tempdir().unwrap();
        let one = dir.path().join("one.json");
        std::fs::write(&one, SCENARIO).unwrap();
        assert_eq!(ScenarioDescriptor::load_all(&one).unwrap().len(), 1);

        let many = dir.path().join("many.json");
        std::fs::write(&many, format!("[{0}, {0}]", SCENARIO)).unwrap();
        assert_eq!(ScenarioDescriptor::load_all(&many).unwrap().len(), 2);

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{}").unwrap();
        assert!(matches!(
            ScenarioDescriptor::load_all(&bad),
            Err(HarnessError::Scenario(_))
        ));
    }

    #[test]
    fn test_expand_placeholders() {
        let scenario: ScenarioDescriptor = serde_json::from_str(SCENARIO).unwrap();
        let vars = scenario.variables();
        assert_eq!(
            expand("https://shop.test/product/{product_id}?s={scenario}", &vars),
            "https://shop.test/product/16?s=test000"
        );
        assert_eq!(expand("{invoice}", &vars), "{invoice}");
        assert_eq!(expand("no placeholders", &vars), "no placeholders");
    }
}
