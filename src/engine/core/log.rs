use super::types::JobId;
use anyhow::{Context, Result};
use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Location of the render log for one job
pub fn render_log_path(log_dir: &Path, job_id: JobId) -> PathBuf {
    log_dir.join("renders").join(format!("{}.log", job_id))
}

/// Append a timestamped line to the job's render log, creating it if needed
pub fn write_render_log(log_dir: &Path, job_id: JobId, message: &str) -> Result<()> {
    let log_path = render_log_path(log_dir, job_id);
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log dir {}", parent.display()))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open render log {}", log_path.display()))?;

    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    for line in message.lines() {
        writeln!(file, "[{}] {}", timestamp, line)?;
    }
    Ok(())
}
