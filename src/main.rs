//! Checkout Harness
//!
//! Command-line entry point: runs scenario files against a WebDriver
//! endpoint, or exercises the challenge OCR on saved images.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use checkout_harness::browser::WebDriverFactory;
use checkout_harness::challenge::ChallengeSolver;
use checkout_harness::logging::RunLog;
use checkout_harness::ocr::preprocess::preprocess_backup;
use checkout_harness::ocr::{normalize_answer, preprocess, BackupVariant, CapturedImage, Strategy, TesseractEngine};
use checkout_harness::scenario::{ScenarioDescriptor, ScenarioRunner};
use checkout_harness::HarnessConfig;

#[derive(Parser)]
#[command(name = "checkout-harness", version, about = "Scripted checkout scenarios with challenge OCR")]
struct Cli {
    /// Config file (defaults to config.json next to the executable)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every scenario in the given files, in order
    Run {
        #[arg(required = true)]
        scenarios: Vec<PathBuf>,
        /// Only run scenarios with these names
        #[arg(long)]
        only: Vec<String>,
    },
    /// Solve a saved challenge image and print the answer
    Solve { image: PathBuf },
    /// Write every preprocessing variant of an image for inspection
    Preprocess {
        image: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log = RunLog::console();
    let config = HarnessConfig::load(cli.config.as_deref());

    match cli.command {
        Command::Run { scenarios, only } => run(&config, &scenarios, &only),
        Command::Solve { image } => solve(&config, &image),
        Command::Preprocess { image, out } => write_variants(&image, &out),
    }
}

fn run(config: &HarnessConfig, files: &[PathBuf], only: &[String]) -> Result<()> {
    let mut scenarios = Vec::new();
    for file in files {
        scenarios.extend(ScenarioDescriptor::load_all(file)?);
    }
    if !only.is_empty() {
        scenarios.retain(|s| only.contains(&s.name));
    }
    if scenarios.is_empty() {
        bail!("No scenarios to run");
    }

    let ocr = TesseractEngine::from_config(&config.ocr).context("Tesseract is not available")?;
    let browsers = WebDriverFactory::new(&config.webdriver_url, config.headless);
    let outcomes = ScenarioRunner::new(config, &browsers, &ocr).run_all(&scenarios);

    let failed = outcomes.iter().filter(|o| !o.passed).count();
    for outcome in &outcomes {
        let status = if outcome.passed { "PASS" } else { "FAIL" };
        println!("{} {} ({} ms)", status, outcome.name, outcome.duration_ms);
        if let Some(error) = &outcome.error {
            println!("     {}", error);
        }
    }
    println!("{}/{} scenarios passed", outcomes.len() - failed, outcomes.len());

    if failed > 0 {
        bail!("{} scenario(s) failed", failed);
    }
    Ok(())
}

fn solve(config: &HarnessConfig, path: &Path) -> Result<()> {
    let image = CapturedImage::load(path)?;
    let ocr = TesseractEngine::from_config(&config.ocr).context("Tesseract is not available")?;
    let solver = ChallengeSolver::new(&ocr, config.challenge.clone());

    match solver.recognize(&image).as_deref().and_then(normalize_answer) {
        Some(answer) => {
            println!("{}", answer);
            Ok(())
        }
        None => bail!("No answer recognized in {}", path.display()),
    }
}

fn write_variants(path: &Path, out: &Path) -> Result<()> {
    let image = CapturedImage::load(path)?;
    std::fs::create_dir_all(out).with_context(|| format!("Failed to create {}", out.display()))?;

    for strategy in Strategy::ALL {
        let target = out.join(format!("{}.png", strategy.name()));
        preprocess(&image, strategy).save(&target)?;
        println!("{}", target.display());
    }
    for variant in BackupVariant::ALL {
        let target = out.join(format!("{}.png", variant.name()));
        preprocess_backup(&image, variant).save(&target)?;
        println!("{}", target.display());
    }
    Ok(())
}
