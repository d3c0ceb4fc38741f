use anyhow::{anyhow, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::OcrConfig;
use crate::paths::get_tesseract_dir;

const TESSDATA_REPO: &str = "https://github.com/tesseract-ocr/tessdata/raw/main";

/// Resolved Tesseract installation.
#[derive(Clone, Debug)]
pub struct TesseractPaths {
    pub executable: PathBuf,
    /// `None` lets tesseract use its compiled-in data directory
    pub tessdata: Option<PathBuf>,
}

/// Finds the executable and language data, downloading the data if allowed.
pub fn locate_tesseract(config: &OcrConfig) -> Result<TesseractPaths> {
    let executable = find_tesseract_executable(config.tesseract_path.as_deref())?;
    tracing::info!("Tesseract executable: {}", executable.display());

    let tessdata = match find_tessdata_dir(config.tessdata_dir.as_deref(), &config.language) {
        Some(dir) => Some(dir),
        None if config.download_tessdata => {
            let dir = get_tesseract_dir().join("tessdata");
            download_tessdata(&dir, &config.language)?;
            Some(dir)
        }
        None => {
            tracing::warn!(
                "No tessdata directory with {}.traineddata found, relying on tesseract defaults",
                config.language
            );
            None
        }
    };

    if let Some(dir) = &tessdata {
        tracing::info!("Tessdata directory: {}", dir.display());
    }

    Ok(TesseractPaths {
        executable,
        tessdata,
    })
}

/// Finds the Tesseract executable: explicit path, our local dir, PATH, then
/// common install locations.
pub fn find_tesseract_executable(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        tracing::warn!("Configured tesseract path {} does not exist", path.display());
    }

    let local_exe = get_tesseract_dir().join(executable_name());
    if local_exe.exists() {
        return Ok(local_exe);
    }

    if let Ok(output) = Command::new("tesseract").arg("--version").output() {
        if output.status.success() {
            return Ok(PathBuf::from("tesseract"));
        }
    }

    let common_paths = [
        r"C:\Program Files\Tesseract-OCR\tesseract.exe",
        r"C:\Program Files (x86)\Tesseract-OCR\tesseract.exe",
        "/usr/bin/tesseract",
        "/usr/local/bin/tesseract",
        "/opt/homebrew/bin/tesseract",
    ];

    for path in &common_paths {
        let p = PathBuf::from(path);
        if p.exists() {
            return Ok(p);
        }
    }

    Err(anyhow!(
        "Tesseract not found. Install tesseract-ocr or set ocr.tesseract_path in config.json."
    ))
}

/// Finds a tessdata directory containing `<language>.traineddata`.
pub fn find_tessdata_dir(explicit: Option<&Path>, language: &str) -> Option<PathBuf> {
    let file = format!("{}.traineddata", language);
    let has_language = |dir: &Path| dir.join(&file).exists();

    if let Some(dir) = explicit {
        if has_language(dir) {
            return Some(dir.to_path_buf());
        }
        tracing::warn!("Configured tessdata dir {} lacks {}", dir.display(), file);
    }

    let local = get_tesseract_dir().join("tessdata");
    if has_language(&local) {
        return Some(local);
    }

    if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
        let p = PathBuf::from(&prefix);
        if has_language(&p) {
            return Some(p);
        }
        let p = p.join("tessdata");
        if has_language(&p) {
            return Some(p);
        }
    }

    let system_paths = [
        r"C:\Program Files\Tesseract-OCR\tessdata",
        r"C:\Program Files (x86)\Tesseract-OCR\tessdata",
        "/usr/share/tesseract-ocr/5/tessdata",
        "/usr/share/tesseract-ocr/4.00/tessdata",
        "/usr/share/tessdata",
        "/usr/local/share/tessdata",
        "/opt/homebrew/share/tessdata",
    ];

    system_paths
        .iter()
        .map(PathBuf::from)
        .find(|p| has_language(p))
}

/// Downloads `<language>.traineddata` into `tessdata_dir`.
fn download_tessdata(tessdata_dir: &Path, language: &str) -> Result<()> {
    let url = format!("{}/{}.traineddata", TESSDATA_REPO, language);
    let target = tessdata_dir.join(format!("{}.traineddata", language));

    fs::create_dir_all(tessdata_dir)?;
    tracing::info!("Downloading {}.traineddata...", language);

    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()?;

    let response = client
        .get(&url)
        .header("User-Agent", "checkout-harness")
        .send()?;

    if !response.status().is_success() {
        return Err(anyhow!(
            "Failed to download {}.traineddata: HTTP {}",
            language,
            response.status()
        ));
    }

    let bytes = response.bytes()?;
    let mut file = fs::File::create(&target)?;
    file.write_all(&bytes)?;

    tracing::info!(
        "Downloaded {}.traineddata ({} bytes)",
        language,
        bytes.len()
    );

    Ok(())
}

fn executable_name() -> &'static str {
    if cfg!(windows) { "tesseract.exe" } else { "tesseract" }
}
