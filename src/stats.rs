// Statistics tracking and persistence

use crate::config::config_dir;
use crate::engine::{Job, JobId, ProgressSnapshot, Slot};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::warn;

/// Finished renders kept in stats.json; older ones only count in the totals
const MAX_RECORDS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Completed,
    Error,
    Stopped,
}

/// Receives job lifecycle notifications from the orchestrator
pub trait StatsSink {
    fn record_start(&mut self, job: &Job);
    fn record_progress(&mut self, job_id: JobId, snapshot: &ProgressSnapshot);
    fn record_terminal(&mut self, job: &Job, outcome: Outcome, detail: Option<&str>);
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStats;

impl StatsSink for NullStats {
    fn record_start(&mut self, _job: &Job) {}
    fn record_progress(&mut self, _job_id: JobId, _snapshot: &ProgressSnapshot) {}
    fn record_terminal(&mut self, _job: &Job, _outcome: Outcome, _detail: Option<&str>) {}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenderRecord {
    pub job_id: JobId,
    pub input: PathBuf,
    pub output: PathBuf,
    pub slot: Option<Slot>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Source media duration
    pub duration_s: f64,
    /// Wall-clock time spent rendering
    pub render_time_s: f64,
    pub last_percent: f64,
    pub speed: Option<f64>,
    pub outcome: Option<Outcome>,
    pub detail: Option<String>,
}

impl RenderRecord {
    fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id,
            input: job.input_path.clone(),
            output: job.output_path.clone(),
            slot: job.slot,
            started_at: job.started_at,
            ended_at: None,
            duration_s: job.duration_s,
            render_time_s: 0.0,
            last_percent: 0.0,
            speed: None,
            outcome: None,
            detail: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct LifetimeStats {
    #[serde(default)]
    pub renders: Vec<RenderRecord>,

    #[serde(default)]
    pub total_renders: u64,

    #[serde(default)]
    pub total_successful: u64,

    #[serde(default)]
    pub total_failed: u64,

    #[serde(default)]
    pub total_stopped: u64,

    /// Total wall-clock render time in seconds
    #[serde(default)]
    pub total_render_time_secs: f64,

    /// Last updated timestamp (ISO 8601)
    #[serde(default)]
    pub last_updated: Option<String>,
}

impl LifetimeStats {
    /// Get the path to the stats file
    pub fn stats_path() -> Result<PathBuf> {
        Ok(config_dir()?.join("stats.json"))
    }

    /// Load stats from disk, or return default if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(LifetimeStats::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read stats file: {}", path.display()))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse stats file: {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize stats")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write stats file: {}", path.display()))?;

        Ok(())
    }

    /// Fraction of finished renders that completed, 0.0 when none finished
    pub fn success_rate(&self) -> f64 {
        if self.total_renders == 0 {
            0.0
        } else {
            self.total_successful as f64 / self.total_renders as f64
        }
    }

    pub fn format_render_time(&self) -> String {
        format_duration(self.total_render_time_secs)
    }

    fn push_record(&mut self, record: RenderRecord) {
        self.total_renders += 1;
        self.total_render_time_secs += record.render_time_s;
        match record.outcome {
            Some(Outcome::Completed) => self.total_successful += 1,
            Some(Outcome::Error) => self.total_failed += 1,
            Some(Outcome::Stopped) => self.total_stopped += 1,
            None => {}
        }
        self.renders.push(record);
        if self.renders.len() > MAX_RECORDS {
            let excess = self.renders.len() - MAX_RECORDS;
            self.renders.drain(..excess);
        }
        self.last_updated = Some(Utc::now().to_rfc3339());
    }
}

/// Persists render statistics as JSON, writing at most once per flush
/// interval. Pending changes are written on drop.
#[derive(Debug)]
pub struct StatsRecorder {
    path: PathBuf,
    stats: LifetimeStats,
    in_flight: HashMap<JobId, RenderRecord>,
    flush_interval: Duration,
    last_flush: Option<Instant>,
    dirty: bool,
}

impl StatsRecorder {
    pub fn open(path: impl Into<PathBuf>, flush_interval: Duration) -> Result<Self> {
        let path = path.into();
        let stats = LifetimeStats::load_from(&path)?;
        Ok(Self {
            path,
            stats,
            in_flight: HashMap::new(),
            flush_interval,
            last_flush: None,
            dirty: false,
        })
    }

    /// Recorder backed by `<config dir>/stats.json`
    pub fn open_default(flush_interval: Duration) -> Result<Self> {
        Self::open(LifetimeStats::stats_path()?, flush_interval)
    }

    pub fn lifetime(&self) -> &LifetimeStats {
        &self.stats
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn flush(&mut self) -> Result<()> {
        self.stats.save_to(&self.path)?;
        self.last_flush = Some(Instant::now());
        self.dirty = false;
        Ok(())
    }

    fn maybe_flush(&mut self) {
        if !self.dirty {
            return;
        }
        let due = self
            .last_flush
            .is_none_or(|last| last.elapsed() >= self.flush_interval);
        if due {
            if let Err(e) = self.flush() {
                warn!("could not write stats: {:#}", e);
            }
        }
    }
}

impl StatsSink for StatsRecorder {
    fn record_start(&mut self, job: &Job) {
        self.in_flight.insert(job.id, RenderRecord::from_job(job));
    }

    // In-memory only; persisted with the terminal record
    fn record_progress(&mut self, job_id: JobId, snapshot: &ProgressSnapshot) {
        if let Some(record) = self.in_flight.get_mut(&job_id) {
            record.last_percent = record.last_percent.max(snapshot.percent);
            record.speed = snapshot.speed.or(record.speed);
        }
    }

    fn record_terminal(&mut self, job: &Job, outcome: Outcome, detail: Option<&str>) {
        let mut record = self
            .in_flight
            .remove(&job.id)
            .unwrap_or_else(|| RenderRecord::from_job(job));
        record.ended_at = job.ended_at;
        record.render_time_s = job.elapsed_s();
        record.last_percent = record.last_percent.max(job.progress_pct);
        record.outcome = Some(outcome);
        record.detail = detail.map(str::to_string);

        self.stats.push_record(record);
        self.dirty = true;
        self.maybe_flush();
    }
}

impl Drop for StatsRecorder {
    fn drop(&mut self) {
        if self.dirty {
            if let Err(e) = self.flush() {
                warn!("could not write stats on shutdown: {:#}", e);
            }
        }
    }
}

/// Format bytes as human-readable size
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format duration in seconds as human-readable time
pub fn format_duration(seconds: f64) -> String {
    let total_secs = seconds.max(0.0) as u64;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}
