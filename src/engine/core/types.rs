use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

pub type JobId = Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Paused, // Dispatch paused; the subprocess keeps running
    Completed,
    Error,
    Stopped,
}

impl JobStatus {
    /// Job currently holds a slot
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Processing | JobStatus::Paused)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Error | JobStatus::Stopped
        )
    }
}

/// One of the two execution resources a job can run on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Cpu,
    Gpu,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Cpu => write!(f, "cpu"),
            Slot::Gpu => write!(f, "gpu"),
        }
    }
}

/// Which slots the scheduler is willing to fill
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    #[default]
    Cpu,
    Gpu,
    Duo,
}

impl RenderMode {
    pub fn uses_cpu_slot(self) -> bool {
        matches!(self, RenderMode::Cpu | RenderMode::Duo)
    }

    pub fn uses_gpu_slot(self) -> bool {
        matches!(self, RenderMode::Gpu | RenderMode::Duo)
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderMode::Cpu => write!(f, "cpu"),
            RenderMode::Gpu => write!(f, "gpu"),
            RenderMode::Duo => write!(f, "duo"),
        }
    }
}

impl FromStr for RenderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(RenderMode::Cpu),
            "gpu" => Ok(RenderMode::Gpu),
            "duo" => Ok(RenderMode::Duo),
            other => Err(format!("unknown render mode '{}' (expected cpu, gpu or duo)", other)),
        }
    }
}

/// Telemetry for one `-progress` block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub frame: Option<u64>,
    pub fps: Option<f64>,
    pub bitrate: Option<String>,
    pub total_size: Option<u64>,
    pub out_time_s: f64,
    pub speed: Option<f64>,
    pub percent: f64,
    pub eta_s: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub name: String,
    pub status: JobStatus,

    pub duration_s: f64, // 0.0 when the probe failed
    pub progress_pct: f64,
    pub eta_s: Option<f64>,
    pub out_time_s: f64,
    pub frame: Option<u64>,
    pub fps: Option<f64>,
    pub speed: Option<f64>,
    pub bitrate: Option<String>,
    pub size_bytes: Option<u64>,

    pub slot: Option<Slot>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub error: Option<String>,
}

impl Job {
    /// Create a new pending job
    pub fn new(input_path: PathBuf, output_path: PathBuf, duration_s: f64) -> Self {
        let name = input_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| input_path.display().to_string());

        Self {
            id: Uuid::new_v4(),
            input_path,
            output_path,
            name,
            status: JobStatus::Pending,
            duration_s,
            progress_pct: 0.0,
            eta_s: None,
            out_time_s: 0.0,
            frame: None,
            fps: None,
            speed: None,
            bitrate: None,
            size_bytes: None,
            slot: None,
            started_at: None,
            ended_at: None,
            attempts: 0,
            error: None,
        }
    }

    /// Fold a progress snapshot into the job. Percent never moves backwards.
    pub fn apply_progress(&mut self, snapshot: &ProgressSnapshot) {
        self.progress_pct = self.progress_pct.max(snapshot.percent.clamp(0.0, 100.0));
        self.eta_s = snapshot.eta_s;
        self.out_time_s = snapshot.out_time_s;
        self.frame = snapshot.frame.or(self.frame);
        self.fps = snapshot.fps.or(self.fps);
        self.speed = snapshot.speed.or(self.speed);
        if snapshot.bitrate.is_some() {
            self.bitrate = snapshot.bitrate.clone();
        }
        self.size_bytes = snapshot.total_size.or(self.size_bytes);
    }

    /// Drop all per-run state so the job can be dispatched again
    pub fn reset_for_requeue(&mut self) {
        self.status = JobStatus::Pending;
        self.slot = None;
        self.progress_pct = 0.0;
        self.eta_s = None;
        self.out_time_s = 0.0;
        self.frame = None;
        self.fps = None;
        self.speed = None;
        self.bitrate = None;
        self.size_bytes = None;
        self.started_at = None;
        self.ended_at = None;
    }

    /// Wall-clock seconds between start and end (or now, while running)
    pub fn elapsed_s(&self) -> f64 {
        match self.started_at {
            Some(start) => {
                let end = self.ended_at.unwrap_or_else(Utc::now);
                (end - start).num_milliseconds().max(0) as f64 / 1000.0
            }
            None => 0.0,
        }
    }
}

/// Parser for ffmpeg progress output (key=value format)
#[derive(Debug, Default, Clone)]
pub struct ProgressParser {
    pub frame: Option<u64>,
    pub out_time_us: u64,
    pub fps: Option<f64>,
    pub speed: Option<f64>,
    pub bitrate: Option<String>,
    pub total_size: Option<u64>,
    pub is_complete: bool,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a single line of ffmpeg progress output.
    /// Returns true when the line closes a progress block (`progress=continue|end`).
    pub fn parse_line(&mut self, line: &str) -> bool {
        let Some((key, value)) = line.split_once('=') else {
            return false;
        };
        let value = value.trim();
        match key.trim() {
            "frame" => {
                if let Ok(f) = value.parse::<u64>() {
                    self.frame = Some(f);
                }
            }
            "out_time_us" => {
                if let Ok(us) = value.parse::<u64>() {
                    self.out_time_us = us;
                }
            }
            // Despite the name, ffmpeg reports microseconds here too
            "out_time_ms" => {
                if let Ok(us) = value.parse::<u64>() {
                    self.out_time_us = us;
                }
            }
            "fps" => {
                if let Ok(f) = value.parse::<f64>() {
                    self.fps = Some(f);
                }
            }
            "speed" => {
                // Speed is in format "1.23x", strip the 'x'
                if let Ok(s) = value.trim_end_matches('x').trim().parse::<f64>() {
                    self.speed = Some(s);
                }
            }
            "bitrate" => {
                if value != "N/A" {
                    self.bitrate = Some(value.to_string());
                }
            }
            "total_size" => {
                if let Ok(size) = value.parse::<u64>() {
                    self.total_size = Some(size);
                }
            }
            "progress" => {
                if value == "end" {
                    self.is_complete = true;
                }
                return true;
            }
            _ => {}
        }
        false
    }

    /// Get output time in seconds
    pub fn out_time_s(&self) -> f64 {
        self.out_time_us as f64 / 1_000_000.0
    }

    /// Calculate progress percentage given total duration
    pub fn progress_pct(&self, duration_s: f64) -> f64 {
        if duration_s > 0.0 {
            (self.out_time_s() / duration_s * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        }
    }

    /// Remaining seconds at the current encode speed
    pub fn eta_s(&self, duration_s: f64) -> Option<f64> {
        let speed = self.speed.filter(|s| *s > 0.0)?;
        if duration_s <= 0.0 {
            return None;
        }
        Some(((duration_s - self.out_time_s()) / speed).max(0.0))
    }

    pub fn snapshot(&self, duration_s: f64) -> ProgressSnapshot {
        let percent = if self.is_complete {
            100.0
        } else {
            self.progress_pct(duration_s)
        };
        ProgressSnapshot {
            frame: self.frame,
            fps: self.fps,
            bitrate: self.bitrate.clone(),
            total_size: self.total_size,
            out_time_s: self.out_time_s(),
            speed: self.speed,
            percent,
            eta_s: if self.is_complete {
                Some(0.0)
            } else {
                self.eta_s(duration_s)
            },
        }
    }
}
