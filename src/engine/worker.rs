// Process execution for render jobs: spawn, stream progress, cancel

use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use tracing::{debug, warn};

use super::core::{
    JobId, ProgressParser, ProgressSnapshot, ffmpeg_invocation, format_ffmpeg_args,
    write_render_log,
};

/// Number of stderr lines kept as the failure diagnostic
const STDERR_TAIL_LINES: usize = 30;

/// Identifies one submission of a job. Re-dispatching a job bumps `attempt`,
/// so events from an earlier process can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunTicket {
    pub job_id: JobId,
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunnerEventKind {
    Progress(ProgressSnapshot),
    Completed,
    Failed { error: String },
    /// Process ended because it was cancelled or received a termination signal
    Stopped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunnerEvent {
    pub ticket: RunTicket,
    pub kind: RunnerEventKind,
}

impl RunnerEvent {
    pub fn new(ticket: RunTicket, kind: RunnerEventKind) -> Self {
        Self { ticket, kind }
    }
}

/// One encode to execute
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Encoder arguments, without input/output/progress plumbing
    pub args: Vec<String>,
    pub duration_s: f64,
}

/// Runs render jobs out of band and reports back through a channel.
///
/// `run` must return as soon as the work is submitted. Every accepted run
/// ends with exactly one of `Completed`, `Failed` or `Stopped` on `events`.
pub trait ProcessRunner {
    fn run(
        &mut self,
        ticket: RunTicket,
        request: RenderRequest,
        events: Sender<RunnerEvent>,
    ) -> Result<()>;

    /// Terminate the process for `job_id`. No-op if it already exited.
    fn cancel(&mut self, job_id: JobId);

    fn cancel_all(&mut self);
}

type PidRegistry = Arc<Mutex<HashMap<RunTicket, u32>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs ffmpeg subprocesses, one supervising thread per process
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    ffmpeg: PathBuf,
    log_dir: Option<PathBuf>,
    running: PidRegistry,
    cancelled: Arc<Mutex<HashSet<RunTicket>>>,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegRunner {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            log_dir: None,
            running: Arc::default(),
            cancelled: Arc::default(),
        }
    }

    /// Append per-job render logs under `<log_dir>/renders/`
    pub fn with_render_logs(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(log_dir.into());
        self
    }

    pub fn running_count(&self) -> usize {
        lock(&self.running).len()
    }

    fn terminate_matching<F>(&self, matches: F)
    where
        F: Fn(&RunTicket) -> bool,
    {
        let targets: Vec<(RunTicket, u32)> = lock(&self.running)
            .iter()
            .filter(|(ticket, _)| matches(ticket))
            .map(|(ticket, pid)| (*ticket, *pid))
            .collect();

        let mut cancelled = lock(&self.cancelled);
        for (ticket, pid) in targets {
            cancelled.insert(ticket);
            debug!(job = %ticket.job_id, pid, "terminating ffmpeg");
            terminate(pid);
        }
    }
}

impl ProcessRunner for FfmpegRunner {
    fn run(
        &mut self,
        ticket: RunTicket,
        request: RenderRequest,
        events: Sender<RunnerEvent>,
    ) -> Result<()> {
        let argv = ffmpeg_invocation(&request.input, &request.args, &request.output);
        let display = format_ffmpeg_args(&self.ffmpeg.to_string_lossy(), &argv);

        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(&argv);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.ffmpeg.display()))?;

        let pid = child.id();
        lock(&self.running).insert(ticket, pid);
        debug!(job = %ticket.job_id, pid, attempt = ticket.attempt, "ffmpeg started");

        let log_dir = self.log_dir.clone();
        render_log(&log_dir, ticket.job_id, &format!("$ {}", display));

        let stderr = child.stderr.take().context("Failed to capture stderr")?;
        let stdout = child.stdout.take().context("Failed to capture stdout")?;
        let running = Arc::clone(&self.running);
        let cancelled = Arc::clone(&self.cancelled);
        let duration_s = request.duration_s;

        thread::spawn(move || {
            let stderr_thread = thread::spawn(move || {
                let mut stderr_output = String::new();
                let reader = BufReader::new(stderr);
                for line in reader.lines().map_while(Result::ok) {
                    stderr_output.push_str(&line);
                    stderr_output.push('\n');
                }
                stderr_output
            });

            let mut parser = ProgressParser::new();
            for line in BufReader::new(stdout).lines().map_while(Result::ok) {
                // Keep draining even if the receiver is gone, or ffmpeg blocks on a full pipe
                if parser.parse_line(&line) {
                    let snapshot = parser.snapshot(duration_s);
                    let _ = events
                        .send(RunnerEvent::new(ticket, RunnerEventKind::Progress(snapshot)));
                }
            }

            let status = child.wait();
            let stderr_output = stderr_thread.join().unwrap_or_default();
            lock(&running).remove(&ticket);
            let was_cancelled = lock(&cancelled).remove(&ticket);

            let kind = match status {
                Ok(status) if was_cancelled || was_user_cancelled(&status, &stderr_output) => {
                    RunnerEventKind::Stopped
                }
                Ok(status) if status.success() => RunnerEventKind::Completed,
                Ok(status) => {
                    let tail = stderr_tail(&stderr_output, STDERR_TAIL_LINES);
                    let error = if tail.is_empty() {
                        format!("ffmpeg exited with {}", status)
                    } else {
                        tail
                    };
                    RunnerEventKind::Failed { error }
                }
                Err(e) => RunnerEventKind::Failed {
                    error: format!("Failed to wait for ffmpeg: {}", e),
                },
            };

            let summary = match &kind {
                RunnerEventKind::Completed => "completed".to_string(),
                RunnerEventKind::Stopped => "stopped".to_string(),
                RunnerEventKind::Failed { error } => format!("failed:\n{}", error),
                RunnerEventKind::Progress(_) => String::new(),
            };
            render_log(&log_dir, ticket.job_id, &summary);

            let _ = events.send(RunnerEvent::new(ticket, kind));
        });

        Ok(())
    }

    fn cancel(&mut self, job_id: JobId) {
        self.terminate_matching(|ticket| ticket.job_id == job_id);
    }

    fn cancel_all(&mut self) {
        self.terminate_matching(|_| true);
    }
}

fn render_log(log_dir: &Option<PathBuf>, job_id: JobId, message: &str) {
    if let Some(dir) = log_dir {
        if let Err(e) = write_render_log(dir, job_id, message) {
            warn!(job = %job_id, "could not write render log: {:#}", e);
        }
    }
}

#[cfg(unix)]
fn terminate(pid: u32) {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) has no memory-safety preconditions
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc != 0 {
        debug!(pid, "SIGTERM not delivered (process already gone?)");
    }
}

#[cfg(not(unix))]
fn terminate(pid: u32) {
    let result = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if let Err(e) = result {
        debug!(pid, "taskkill failed: {}", e);
    }
}

/// Check if ffmpeg was terminated by SIGINT/SIGQUIT/SIGTERM
#[cfg(unix)]
fn was_user_cancelled(status: &ExitStatus, stderr: &str) -> bool {
    use std::os::unix::process::ExitStatusExt;

    // Killed outright (rare, ffmpeg usually catches the signal)
    if let Some(signal) = status.signal() {
        if matches!(signal, 2 | 3 | 15) {
            return true;
        }
    }

    // ffmpeg prints "Exiting normally, received signal X" when it catches one
    stderr_reports_signal(stderr)
}

#[cfg(not(unix))]
fn was_user_cancelled(_status: &ExitStatus, stderr: &str) -> bool {
    stderr.contains("received signal")
}

#[cfg_attr(not(unix), allow(dead_code))]
fn stderr_reports_signal(stderr: &str) -> bool {
    stderr.contains("received signal 2")
        || stderr.contains("received signal 3")
        || stderr.contains("received signal 15")
}

/// Last `max_lines` non-empty stderr lines
fn stderr_tail(stderr: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}
