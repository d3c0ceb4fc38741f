use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::Local;

static EXE_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the directory containing the executable.
pub fn get_exe_dir() -> &'static PathBuf {
    EXE_DIR.get_or_init(|| {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

/// Returns the local Tesseract directory: `<data_local_dir>/checkout-harness/tesseract/`
pub fn get_tesseract_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("checkout-harness")
        .join("tesseract")
}

/// Returns the per-scenario records directory: `<records>/<scenario>/`
pub fn scenario_dir(records: &Path, scenario: &str) -> PathBuf {
    records.join(sanitize(scenario))
}

/// Returns the scenario log file: `<records>/<scenario>/<scenario>_log.txt`
pub fn log_file(records: &Path, scenario: &str) -> PathBuf {
    let name = sanitize(scenario);
    records.join(&name).join(format!("{}_log.txt", name))
}

/// Returns the append-only outcome table: `<records>/outcomes.csv`
pub fn outcomes_csv(records: &Path) -> PathBuf {
    records.join("outcomes.csv")
}

/// Resolves an artifact name to a PNG path inside the scenario directory.
pub fn artifact_path(records: &Path, scenario: &str, artifact: &str) -> PathBuf {
    let file = if artifact.to_ascii_lowercase().ends_with(".png") {
        artifact.to_string()
    } else {
        format!("{}.png", artifact)
    };
    scenario_dir(records, scenario).join(file)
}

/// Derives the full-page fallback path: `foo.png` → `foo_fullpage.png`
pub fn fallback_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "capture".to_string());
    path.with_file_name(format!("{}_fullpage.png", stem))
}

/// Returns a timestamped base path (no extension) for a diagnostic artifact.
pub fn diagnostic_base(dir: &Path, description: &str) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("diagnostic-{}-{}", sanitize(description), timestamp))
}

/// Ensures the scenario records directory exists. Call at scenario start.
pub fn ensure_scenario_dir(records: &Path, scenario: &str) -> std::io::Result<PathBuf> {
    let dir = scenario_dir(records, scenario);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Replaces anything that is not safe in a file name with `-`.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}
