//! Scenario runner.
//!
//! Scenarios run one after another. Each gets a fresh page from the
//! `BrowserFactory`, its own records directory and its own `RunLog`, and the
//! page is torn down before the next scenario starts. A failing scenario is
//! recorded and the suite moves on.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use regex::Regex;

use crate::browser::tabs::{bring_to_front, follow_new_tab};
use crate::browser::{BrowserFactory, Page, TabTracker};
use crate::challenge::login::{submit_with_challenge, FieldValue};
use crate::challenge::ChallengeSolver;
use crate::config::HarnessConfig;
use crate::logging::{LogSinks, RunLog};
use crate::ocr::engine::OcrEngine;
use crate::paths;
use crate::resilience::{capture, get_frame, wait_for, wait_for_required, CaptureTarget, Diagnostics};

use super::{csv_writer, expand, ScenarioDescriptor, ScenarioOutcome, ScenarioStep, TabTarget};

pub struct ScenarioRunner<'a> {
    config: &'a HarnessConfig,
    browsers: &'a dyn BrowserFactory,
    ocr: &'a dyn OcrEngine,
    sinks: LogSinks,
}

/// What a scenario produced, kept even when it fails partway.
#[derive(Default)]
struct RunRecord {
    extracted: BTreeMap<String, String>,
    artifacts: Vec<PathBuf>,
}

impl<'a> ScenarioRunner<'a> {
    pub fn new(config: &'a HarnessConfig, browsers: &'a dyn BrowserFactory, ocr: &'a dyn OcrEngine) -> Self {
        Self {
            config,
            browsers,
            ocr,
            sinks: LogSinks::default(),
        }
    }

    pub fn with_sinks(mut self, sinks: LogSinks) -> Self {
        self.sinks = sinks;
        self
    }

    /// Runs every scenario in order.
    pub fn run_all(&self, scenarios: &[ScenarioDescriptor]) -> Vec<ScenarioOutcome> {
        scenarios.iter().map(|s| self.run(s)).collect()
    }

    pub fn run(&self, scenario: &ScenarioDescriptor) -> ScenarioOutcome {
        let started_at = Local::now();
        let timer = Instant::now();
        let records = &self.config.records_dir;

        let scenario_dir = match paths::ensure_scenario_dir(records, &scenario.name) {
            Ok(dir) => dir,
            Err(e) => {
                tracing::warn!("Cannot create records dir for {}: {}", scenario.name, e);
                paths::scenario_dir(records, &scenario.name)
            }
        };
        let log = match RunLog::open(records, &scenario.name, self.sinks) {
            Ok(log) => Some(log),
            Err(e) => {
                tracing::warn!("Scenario log unavailable: {:#}", e);
                None
            }
        };

        tracing::info!(
            "Scenario '{}' started ({} steps)",
            scenario.name,
            scenario.steps.len()
        );

        let mut record = RunRecord::default();
        let result = self
            .browsers
            .open()
            .context("Failed to open browser")
            .and_then(|page| {
                let result = self.execute(page.as_ref(), scenario, scenario_dir, &mut record);
                drop(page);
                result
            });

        let outcome = ScenarioOutcome {
            name: scenario.name.clone(),
            passed: result.is_ok(),
            error: result.err().map(|e| format!("{:#}", e)),
            extracted: record.extracted,
            artifacts: record.artifacts,
            started_at,
            duration_ms: timer.elapsed().as_millis() as u64,
        };

        match &outcome.error {
            None => tracing::info!("Scenario '{}' passed in {} ms", outcome.name, outcome.duration_ms),
            Some(e) => tracing::error!("Scenario '{}' failed: {}", outcome.name, e),
        }

        if let Err(e) = csv_writer::append_outcome(&paths::outcomes_csv(records), &outcome) {
            tracing::warn!("Failed to record outcome: {:#}", e);
        }
        if let Some(log) = log {
            if let Err(e) = log.close() {
                tracing::warn!("{:#}", e);
            }
        }

        outcome
    }

    fn execute(
        &self,
        page: &dyn Page,
        scenario: &ScenarioDescriptor,
        scenario_dir: PathBuf,
        record: &mut RunRecord,
    ) -> Result<()> {
        let mut ctx = StepContext {
            page,
            scenario,
            config: self.config,
            solver: ChallengeSolver::new(self.ocr, self.config.challenge.clone()),
            diagnostics: Diagnostics::new(scenario_dir),
            tabs: TabTracker::new(page.current_window()?),
            vars: scenario.variables(),
            record,
        };

        let total = scenario.steps.len();
        for (index, step) in scenario.steps.iter().enumerate() {
            tracing::info!("Step {}/{}: {}", index + 1, total, step.name());
            ctx.run_step(step)
                .with_context(|| format!("step {} ({}) failed", index + 1, step.name()))?;
        }
        Ok(())
    }
}

struct StepContext<'r> {
    page: &'r dyn Page,
    scenario: &'r ScenarioDescriptor,
    config: &'r HarnessConfig,
    solver: ChallengeSolver<'r>,
    diagnostics: Diagnostics,
    tabs: TabTracker,
    vars: BTreeMap<String, String>,
    record: &'r mut RunRecord,
}

impl StepContext<'_> {
    fn expand(&self, template: &str) -> String {
        expand(template, &self.vars)
    }

    fn run_step(&mut self, step: &ScenarioStep) -> Result<()> {
        let page = self.page;
        match step {
            ScenarioStep::Goto { url } => {
                let url = self.expand(url);
                tracing::info!("Navigating to {}", url);
                page.goto(&url)?;
            }

            ScenarioStep::WaitFor {
                selector,
                options,
                required,
            } => {
                let selector = self.expand(selector);
                let options = options.clone().unwrap_or_else(|| self.config.defaults.wait.clone());
                if *required {
                    wait_for_required(page, &selector, &options, &self.diagnostics)?;
                } else if !wait_for(page, &selector, &options) {
                    tracing::warn!("'{}' never appeared, continuing", selector);
                }
            }

            ScenarioStep::Click { selector } => page.click(&self.expand(selector))?,

            ScenarioStep::Fill { selector, value } => {
                page.fill(&self.expand(selector), &self.expand(value))?
            }

            ScenarioStep::Select { selector, value } => {
                page.select_option(&self.expand(selector), &self.expand(value))?
            }

            ScenarioStep::Capture {
                artifact,
                selector,
                options,
            } => {
                let file = self.expand(self.scenario.artifact_file(artifact));
                let path = paths::artifact_path(&self.config.records_dir, &self.scenario.name, &file);
                let options = options.clone().unwrap_or_else(|| self.config.defaults.capture.clone());
                let selector = selector.as_deref().map(|s| self.expand(s));
                let target = match &selector {
                    Some(s) => CaptureTarget::Element(s),
                    None => CaptureTarget::Page,
                };

                match capture(page, target, &path, &options) {
                    Some(written) => self.record.artifacts.push(written),
                    None => tracing::warn!("Artifact '{}' was not captured", artifact),
                }
            }

            ScenarioStep::EnterFrame { name, options } => {
                let options = options.clone().unwrap_or_else(|| self.config.defaults.frame.clone());
                let frame = get_frame(page, name, &options, &self.diagnostics)?;
                page.enter_frame(&frame)?;
            }

            ScenarioStep::LeaveFrame => page.leave_frame()?,

            ScenarioStep::SwitchToNewTab { timeout_ms } => {
                follow_new_tab(page, &mut self.tabs, Duration::from_millis(*timeout_ms))?;
            }

            ScenarioStep::BringToFront { tab } => {
                let handle = match tab {
                    TabTarget::Main => self.tabs.main().to_string(),
                    TabTarget::Latest => self
                        .tabs
                        .latest()
                        .ok_or_else(|| anyhow!("No tab has been opened yet"))?
                        .to_string(),
                };
                bring_to_front(page, &mut self.tabs, &handle)?;
            }

            ScenarioStep::SolveChallenge { answer_selector } => {
                let answer = self.solver.solve(page)?;
                page.fill(&self.expand(answer_selector), &answer)?;
            }

            ScenarioStep::LoginWithChallenge { refill } => {
                let refill: Vec<FieldValue> = refill
                    .iter()
                    .map(|f| FieldValue {
                        selector: self.expand(&f.selector),
                        value: self.expand(&f.value),
                    })
                    .collect();
                submit_with_challenge(page, &self.solver, &self.config.login, &refill)?;
            }

            ScenarioStep::ExtractText {
                selector,
                key,
                pattern,
            } => {
                let selector = self.expand(selector);
                let text = page
                    .text_content(&selector)?
                    .ok_or_else(|| anyhow!("No element matches '{}'", selector))?;
                let value = match pattern {
                    Some(pattern) => extract_match(&text, pattern)?,
                    None => text.trim().to_string(),
                };
                tracing::info!("Extracted {} = {}", key, value);
                self.vars.insert(key.clone(), value.clone());
                self.record.extracted.insert(key.clone(), value);
            }

            ScenarioStep::Pause { ms } => page.pause(Duration::from_millis(*ms)),
        }
        Ok(())
    }
}

/// First capture group of `pattern` in `text`, or the whole match when the
/// pattern has no groups.
fn extract_match(text: &str, pattern: &str) -> Result<String> {
    let regex = Regex::new(pattern).with_context(|| format!("Invalid pattern '{}'", pattern))?;
    let caps = regex
        .captures(text)
        .ok_or_else(|| anyhow!("'{}' does not match '{}'", text.trim(), pattern))?;
    let value = caps.get(1).or_else(|| caps.get(0)).map(|m| m.as_str().to_string());
    value.ok_or_else(|| anyhow!("'{}' does not match '{}'", text.trim(), pattern))
}
