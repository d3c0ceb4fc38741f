//! Failure diagnostics: a full-page screenshot plus a JSON inventory of the
//! page's form controls and visible error messages.

use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::browser::Page;
use crate::paths::diagnostic_base;

/// Collects page state in one round trip.
pub const INVENTORY_SCRIPT: &str = r#"
const describe = (el) => {
  const style = window.getComputedStyle(el);
  const rect = el.getBoundingClientRect();
  return {
    tag: el.tagName.toLowerCase(),
    type: el.getAttribute('type'),
    id: el.id || null,
    name: el.getAttribute('name'),
    className: typeof el.className === 'string' && el.className ? el.className : null,
    visible: style.display !== 'none' && style.visibility !== 'hidden' && rect.width > 0 && rect.height > 0,
    options: el.tagName === 'SELECT'
      ? Array.from(el.options).map((o) => ({ value: o.value, text: o.text }))
      : []
  };
};
const errors = Array.from(document.querySelectorAll('.error, [class*="error"], .alert, [role="alert"]'))
  .map((e) => (e.innerText || '').trim())
  .filter((t) => t.length > 0);
return {
  url: window.location.href,
  title: document.title,
  readyState: document.readyState,
  errors: errors,
  elements: Array.from(document.querySelectorAll('form, input, select, textarea, button')).map(describe)
};
"#;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    pub ready_state: String,
    pub errors: Vec<String>,
    pub elements: Vec<FormElement>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FormElement {
    pub tag: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub id: Option<String>,
    pub name: Option<String>,
    pub class_name: Option<String>,
    pub visible: bool,
    pub options: Vec<SelectOption>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectOption {
    pub value: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticReport {
    pub description: String,
    pub screenshot: Option<PathBuf>,
    pub report: Option<PathBuf>,
    pub snapshot: Option<PageSnapshot>,
}

impl DiagnosticReport {
    /// The artifact an error message should point at.
    pub fn primary_path(&self) -> Option<PathBuf> {
        self.screenshot.clone().or_else(|| self.report.clone())
    }
}

#[derive(Serialize)]
struct ReportFile<'a> {
    description: &'a str,
    captured_at: String,
    snapshot: Option<&'a PageSnapshot>,
}

/// Writes diagnostics into one scenario's records directory.
#[derive(Clone, Debug)]
pub struct Diagnostics {
    dir: PathBuf,
}

impl Diagnostics {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Best effort: every failure here is logged and skipped.
    pub fn capture(&self, page: &dyn Page, description: &str) -> DiagnosticReport {
        let base = diagnostic_base(&self.dir, description);
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            tracing::warn!("Cannot create diagnostics dir {}: {}", self.dir.display(), e);
        }

        let screenshot = with_extension(&base, "png");
        let screenshot = match page.screenshot_page() {
            Ok(bytes) => match std::fs::write(&screenshot, bytes) {
                Ok(()) => Some(screenshot),
                Err(e) => {
                    tracing::warn!("Failed to write diagnostic screenshot: {}", e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!("Diagnostic screenshot failed: {:#}", e);
                None
            }
        };

        let snapshot = match page.evaluate(INVENTORY_SCRIPT) {
            Ok(value) => match serde_json::from_value::<PageSnapshot>(value) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    tracing::warn!("Unexpected page inventory shape: {}", e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!("Page inventory failed: {:#}", e);
                None
            }
        };

        if let Some(snapshot) = &snapshot {
            tracing::info!(
                "Diagnostic '{}': url={} title='{}' readyState={} elements={}",
                description,
                snapshot.url,
                snapshot.title,
                snapshot.ready_state,
                snapshot.elements.len()
            );
            for error in &snapshot.errors {
                tracing::info!("Page error message: {}", error);
            }
        }

        let report = with_extension(&base, "json");
        let file = ReportFile {
            description,
            captured_at: Local::now().to_rfc3339(),
            snapshot: snapshot.as_ref(),
        };
        let report = match serde_json::to_string_pretty(&file)
            .map_err(anyhow::Error::from)
            .and_then(|json| std::fs::write(&report, json).map_err(anyhow::Error::from))
        {
            Ok(()) => Some(report),
            Err(e) => {
                tracing::warn!("Failed to write diagnostic report: {:#}", e);
                None
            }
        };

        DiagnosticReport {
            description: description.to_string(),
            screenshot,
            report,
            snapshot,
        }
    }
}

fn with_extension(base: &Path, ext: &str) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}
