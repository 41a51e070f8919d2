use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
}

/// Source of media durations for progress and ETA
pub trait DurationProbe {
    fn probe_duration(&self, path: &Path) -> Result<f64>;
}

impl<F> DurationProbe for F
where
    F: Fn(&Path) -> Result<f64>,
{
    fn probe_duration(&self, path: &Path) -> Result<f64> {
        self(path)
    }
}

/// Probes durations by running ffprobe
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    pub ffprobe_path: PathBuf,
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self {
            ffprobe_path: PathBuf::from("ffprobe"),
        }
    }
}

impl FfprobeProbe {
    pub fn new(ffprobe_path: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
        }
    }
}

impl DurationProbe for FfprobeProbe {
    fn probe_duration(&self, path: &Path) -> Result<f64> {
        let output = Command::new(&self.ffprobe_path)
            .arg("-v")
            .arg("quiet")
            .arg("-print_format")
            .arg("json")
            .arg("-show_format")
            .arg(path)
            .output()
            .with_context(|| format!("Failed to execute {}", self.ffprobe_path.display()))?;

        if !output.status.success() {
            anyhow::bail!(
                "ffprobe failed for {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr)
            );
        }

        parse_ffprobe_duration(&String::from_utf8_lossy(&output.stdout))
    }
}

fn first_version_line(binary: &Path) -> Result<String> {
    let output = Command::new(binary).arg("-version").output().with_context(|| {
        format!(
            "Failed to execute {}. Is it installed and in PATH?",
            binary.display()
        )
    })?;

    if !output.status.success() {
        anyhow::bail!(
            "{} -version failed with status: {}",
            binary.display(),
            output.status
        );
    }

    let version_output = String::from_utf8_lossy(&output.stdout);
    let first_line = version_output.lines().next().unwrap_or("Unknown version");

    Ok(first_line.to_string())
}

/// Check if ffmpeg is available and return its version line
pub fn ffmpeg_version(ffmpeg: &Path) -> Result<String> {
    first_version_line(ffmpeg)
}

pub fn ffprobe_version(ffprobe: &Path) -> Result<String> {
    first_version_line(ffprobe)
}

/// Parse the format duration out of ffprobe's JSON report
pub fn parse_ffprobe_duration(json: &str) -> Result<f64> {
    let probe: FfprobeOutput =
        serde_json::from_str(json).context("Failed to parse ffprobe JSON output")?;

    let duration_str = probe
        .format
        .duration
        .context("No duration found in ffprobe output")?;

    let duration = duration_str
        .parse::<f64>()
        .context("Failed to parse duration as float")?;

    if !duration.is_finite() || duration < 0.0 {
        anyhow::bail!("ffprobe reported an invalid duration: {}", duration_str);
    }

    Ok(duration)
}
