//! Job table, per-job state machine and dispatch.
//!
//! The orchestrator is the single writer for jobs and the scheduler. Runner
//! events arrive on a channel and are applied by [`Orchestrator::process_events`]
//! (or the blocking helpers), so every mutation runs to completion before the
//! next one starts.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::classify::classify;
use super::core::{
    BuildError, DurationProbe, EncodeSettings, FfprobeProbe, Job, JobId, JobStatus,
    ProgressSnapshot, RenderMode, Slot, build_ffmpeg_args, build_job_from_path,
};
use super::scheduler::Scheduler;
use super::validate::{ValidationReport, validate_settings};
use super::worker::{ProcessRunner, RenderRequest, RunTicket, RunnerEvent, RunnerEventKind};
use crate::stats::{NullStats, Outcome, StatsSink};

/// Poll interval used by [`Orchestrator::run_to_completion`]
const PUMP_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("no encode settings have been supplied")]
    MissingSettings,

    #[error("encode settings rejected: {0}")]
    InvalidSettings(ValidationReport),
}

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub mode: RenderMode,
    pub gpu_available: bool,
    /// Outputs go next to their inputs when unset
    pub output_dir: Option<PathBuf>,
    pub output_suffix: String,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            mode: RenderMode::Cpu,
            gpu_available: false,
            output_dir: None,
            output_suffix: "_ffduo".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Snapshot handed to callers
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorState {
    pub jobs: Vec<Job>,
    pub is_processing: bool,
    pub is_paused: bool,
    pub current_job_id: Option<JobId>,
    pub mode: RenderMode,
    pub gpu_available: bool,
}

type Subscriber = Box<dyn FnMut(&[Job])>;

pub struct Orchestrator {
    jobs: Vec<Job>,
    scheduler: Scheduler,
    settings: Option<EncodeSettings>,
    options: OrchestratorOptions,
    runner: Box<dyn ProcessRunner>,
    probe: Box<dyn DurationProbe>,
    stats: Box<dyn StatsSink>,
    events_tx: Sender<RunnerEvent>,
    events_rx: Receiver<RunnerEvent>,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
    is_processing: bool,
    is_paused: bool,
}

impl Orchestrator {
    pub fn new<R>(runner: R, options: OrchestratorOptions) -> Self
    where
        R: ProcessRunner + 'static,
    {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            jobs: Vec::new(),
            scheduler: Scheduler::new(options.mode, options.gpu_available),
            settings: None,
            options,
            runner: Box::new(runner),
            probe: Box::new(FfprobeProbe::default()),
            stats: Box::new(NullStats),
            events_tx,
            events_rx,
            subscribers: Vec::new(),
            next_subscription: 0,
            is_processing: false,
            is_paused: false,
        }
    }

    pub fn with_probe<P>(mut self, probe: P) -> Self
    where
        P: DurationProbe + 'static,
    {
        self.probe = Box::new(probe);
        self
    }

    pub fn with_stats<S>(mut self, stats: S) -> Self
    where
        S: StatsSink + 'static,
    {
        self.stats = Box::new(stats);
        self
    }

    pub fn set_settings(&mut self, settings: EncodeSettings) {
        self.settings = Some(settings);
    }

    pub fn settings(&self) -> Option<&EncodeSettings> {
        self.settings.as_ref()
    }

    // ---- caller-facing operations ----

    /// Create a pending job per input and queue it in arrival order.
    /// Probe failures leave the duration at zero.
    pub fn enqueue<I, P>(&mut self, paths: I) -> Vec<Job>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let defaults = EncodeSettings::default();
        let settings = self.settings.as_ref().unwrap_or(&defaults);

        let mut created = Vec::new();
        for path in paths {
            let job = build_job_from_path(
                path.into(),
                settings,
                self.options.output_dir.as_deref(),
                &self.options.output_suffix,
                &*self.probe,
            );
            debug!(job = %job.id, input = %job.input_path.display(), "queued");
            self.scheduler.enqueue(job.id);
            self.jobs.push(job.clone());
            created.push(job);
        }

        if !created.is_empty() {
            self.dispatch();
            self.notify();
        }
        created
    }

    /// Delete a job that is not running. Returns false for unknown or active jobs.
    pub fn remove(&mut self, id: JobId) -> bool {
        let Some(idx) = self.index_of(id) else {
            return false;
        };
        if self.jobs[idx].status.is_active() {
            return false;
        }
        self.jobs.remove(idx);
        self.scheduler.remove(id);
        self.notify();
        true
    }

    /// Drop every completed, failed or stopped job. Returns how many were removed.
    pub fn clear_finished(&mut self) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|job| !job.status.is_terminal());
        let removed = before - self.jobs.len();
        if removed > 0 {
            self.notify();
        }
        removed
    }

    pub fn start(&mut self) -> Result<(), OrchestratorError> {
        let settings = self
            .settings
            .as_ref()
            .ok_or(OrchestratorError::MissingSettings)?;
        let report = validate_settings(settings, false);
        if report.has_errors() {
            return Err(OrchestratorError::InvalidSettings(report));
        }
        for issue in report.warnings() {
            warn!(field = %issue.field, "{}", issue.message);
        }

        self.is_processing = true;
        self.is_paused = false;
        self.set_active_status(JobStatus::Paused, JobStatus::Processing);
        info!(mode = %self.scheduler.effective_mode(), "processing started");
        self.dispatch();
        self.notify();
        Ok(())
    }

    /// Stop starting new jobs. Running encodes continue and are shown as paused.
    pub fn pause(&mut self) {
        if self.is_paused {
            return;
        }
        self.is_paused = true;
        self.set_active_status(JobStatus::Processing, JobStatus::Paused);
        info!("dispatch paused");
        self.notify();
    }

    pub fn resume(&mut self) {
        self.is_paused = false;
        self.set_active_status(JobStatus::Paused, JobStatus::Processing);
        if self.settings.is_some() {
            self.is_processing = true;
        }
        info!("dispatch resumed");
        self.dispatch();
        self.notify();
    }

    /// Terminate every running encode and halt the queue
    pub fn stop_all(&mut self) {
        self.runner.cancel_all();
        let now = Utc::now();
        for idx in 0..self.jobs.len() {
            if self.jobs[idx].status.is_active() {
                let job = &mut self.jobs[idx];
                job.status = JobStatus::Stopped;
                job.ended_at = Some(now);
                job.eta_s = None;
                self.finish_job(idx, Outcome::Stopped, None);
            }
        }
        self.scheduler.reset_slots();
        self.is_processing = false;
        self.is_paused = false;
        info!("all renders stopped");
        self.notify();
    }

    /// Stop a single job. A running job frees its slot and halts auto-advance;
    /// a pending job is just taken out of the queue. The other slot is untouched.
    pub fn stop_one(&mut self, id: JobId) -> bool {
        let Some(idx) = self.index_of(id) else {
            return false;
        };
        let status = self.jobs[idx].status;
        match status {
            _ if status.is_active() => {
                self.runner.cancel(id);
                self.scheduler.release(id);
                self.is_processing = false;
            }
            JobStatus::Pending => {
                self.scheduler.remove(id);
            }
            _ => return false,
        }

        let job = &mut self.jobs[idx];
        job.status = JobStatus::Stopped;
        job.ended_at = Some(Utc::now());
        job.eta_s = None;
        self.finish_job(idx, Outcome::Stopped, None);
        self.notify();
        true
    }

    pub fn set_mode(&mut self, mode: RenderMode) {
        self.scheduler.set_mode(mode);
        info!(%mode, effective = %self.scheduler.effective_mode(), "render mode changed");
        self.dispatch();
        self.notify();
    }

    /// Update GPU availability. Losing it cancels the encode on the gpu slot
    /// and puts that job back at the head of the queue.
    pub fn set_gpu_available(&mut self, available: bool) {
        if let Some(displaced) = self.scheduler.set_gpu_available(available) {
            self.runner.cancel(displaced);
            if let Some(idx) = self.index_of(displaced) {
                self.jobs[idx].reset_for_requeue();
            }
            warn!(job = %displaced, "GPU lost, job requeued");
        }
        self.dispatch();
        self.notify();
    }

    /// Register a callback that receives the full job list after every change
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&[Job]) + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub, _)| *sub != id);
        self.subscribers.len() != before
    }

    pub fn state(&self) -> OrchestratorState {
        OrchestratorState {
            jobs: self.jobs.clone(),
            is_processing: self.is_processing,
            is_paused: self.is_paused,
            current_job_id: self.current_job_id(),
            mode: self.scheduler.mode(),
            gpu_available: self.scheduler.gpu_available(),
        }
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn job(&self, id: JobId) -> Option<&Job> {
        self.jobs.iter().find(|job| job.id == id)
    }

    pub fn is_processing(&self) -> bool {
        self.is_processing
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused
    }

    /// Job on the cpu slot, else the one on the gpu slot
    pub fn current_job_id(&self) -> Option<JobId> {
        self.scheduler
            .slot(Slot::Cpu)
            .or_else(|| self.scheduler.slot(Slot::Gpu))
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// True while an encode is running or more work will be dispatched
    pub fn is_busy(&self) -> bool {
        self.scheduler.active_count() > 0 || (self.is_processing && !self.is_paused)
    }

    // ---- event pumping ----

    /// Apply every runner event already received. Returns how many were applied.
    pub fn process_events(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            if self.handle_event(event) {
                applied += 1;
            }
        }
        if applied > 0 {
            self.notify();
        }
        applied
    }

    /// Block up to `timeout` for one event, then drain whatever else is queued
    pub fn wait_for_event(&mut self, timeout: Duration) -> usize {
        match self.events_rx.recv_timeout(timeout) {
            Ok(event) => {
                let first = usize::from(self.handle_event(event));
                if first > 0 {
                    self.notify();
                }
                first + self.process_events()
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    /// Pump events until nothing is running and nothing more will start
    pub fn run_to_completion(&mut self) {
        while self.is_busy() {
            self.wait_for_event(PUMP_INTERVAL);
        }
    }

    // ---- internals ----

    fn index_of(&self, id: JobId) -> Option<usize> {
        self.jobs.iter().position(|job| job.id == id)
    }

    fn set_active_status(&mut self, from: JobStatus, to: JobStatus) {
        for job in self.jobs.iter_mut().filter(|job| job.status == from) {
            job.status = to;
        }
    }

    fn is_pending(&self, id: &JobId) -> bool {
        self.jobs
            .iter()
            .any(|job| job.id == *id && job.status == JobStatus::Pending)
    }

    fn dispatch(&mut self) {
        if !self.is_processing || self.is_paused {
            return;
        }
        let Some(settings) = self.settings.clone() else {
            self.is_processing = false;
            return;
        };

        let jobs = &self.jobs;
        let planned = self.scheduler.plan_next(|id| {
            jobs.iter()
                .any(|job| job.id == *id && job.status == JobStatus::Pending)
        });

        for (pos, &(id, slot)) in planned.iter().enumerate() {
            let Some(idx) = self.index_of(id) else {
                continue;
            };

            let built = match build_ffmpeg_args(&settings, slot == Slot::Gpu) {
                Ok(built) => built,
                Err(BuildError::Invalid(report)) => {
                    // Put this and the rest of the plan back in order, then halt
                    for &(rest, _) in planned[pos..].iter().rev() {
                        self.scheduler.requeue_front(rest);
                    }
                    self.is_processing = false;
                    warn!(job = %id, "encode settings rejected, processing halted: {}", report);
                    return;
                }
            };

            self.scheduler.occupy(id, slot);
            let job = &mut self.jobs[idx];
            job.status = JobStatus::Processing;
            job.slot = Some(slot);
            job.started_at = Some(Utc::now());
            job.ended_at = None;
            job.error = None;
            job.attempts += 1;

            let ticket = RunTicket {
                job_id: id,
                attempt: job.attempts,
            };
            let request = RenderRequest {
                input: job.input_path.clone(),
                output: job.output_path.clone(),
                args: built.args,
                duration_s: job.duration_s,
            };
            info!(
                job = %id,
                %slot,
                encoder = %built.video_encoder,
                input = %job.input_path.display(),
                "render started"
            );
            self.stats.record_start(&self.jobs[idx]);

            if let Err(e) = self.runner.run(ticket, request, self.events_tx.clone()) {
                // Reported through the channel so this call never recurses
                let _ = self.events_tx.send(RunnerEvent::new(
                    ticket,
                    RunnerEventKind::Failed {
                        error: format!("{:#}", e),
                    },
                ));
            }
        }

        if self.scheduler.active_count() == 0
            && !self.scheduler.queued().any(|id| self.is_pending(id))
        {
            self.is_processing = false;
            info!("queue drained");
        }
    }

    /// Apply one runner event. Returns false when it was stale or unknown.
    fn handle_event(&mut self, event: RunnerEvent) -> bool {
        let RunnerEvent { ticket, kind } = event;
        let Some(idx) = self.index_of(ticket.job_id) else {
            return false;
        };
        let job = &self.jobs[idx];
        if job.attempts != ticket.attempt || !job.status.is_active() {
            debug!(job = %ticket.job_id, attempt = ticket.attempt, "ignoring stale runner event");
            return false;
        }

        match kind {
            RunnerEventKind::Progress(snapshot) => self.on_progress(idx, &snapshot),
            RunnerEventKind::Completed => {
                let job = &mut self.jobs[idx];
                job.status = JobStatus::Completed;
                job.progress_pct = 100.0;
                job.eta_s = Some(0.0);
                job.ended_at = Some(Utc::now());
                self.scheduler.release(ticket.job_id);
                self.finish_job(idx, Outcome::Completed, None);
                self.dispatch();
            }
            RunnerEventKind::Failed { error } => {
                let classified = classify(&error);
                debug!(
                    job = %ticket.job_id,
                    kind = ?classified.kind,
                    "raw ffmpeg error: {}",
                    error
                );
                let job = &mut self.jobs[idx];
                job.status = JobStatus::Error;
                job.error = Some(classified.message.clone());
                job.eta_s = None;
                job.ended_at = Some(Utc::now());
                self.scheduler.release(ticket.job_id);
                self.finish_job(idx, Outcome::Error, Some(&classified.message));
                self.dispatch();
            }
            RunnerEventKind::Stopped => {
                let job = &mut self.jobs[idx];
                job.status = JobStatus::Stopped;
                job.eta_s = None;
                job.ended_at = Some(Utc::now());
                self.scheduler.release(ticket.job_id);
                // Externally observed stop: no auto-advance until start/resume
                self.is_processing = false;
                self.finish_job(idx, Outcome::Stopped, None);
            }
        }
        true
    }

    fn on_progress(&mut self, idx: usize, snapshot: &ProgressSnapshot) {
        let job = &mut self.jobs[idx];
        job.apply_progress(snapshot);
        self.stats.record_progress(job.id, snapshot);
    }

    /// Log and record a terminal transition already applied to `jobs[idx]`
    fn finish_job(&mut self, idx: usize, outcome: Outcome, detail: Option<&str>) {
        let job = &self.jobs[idx];
        let elapsed_s = job.elapsed_s();
        let slot = job.slot.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string());
        match outcome {
            Outcome::Completed => {
                info!(job = %job.id, %slot, elapsed_s, name = %job.name, "render completed")
            }
            Outcome::Stopped => {
                info!(job = %job.id, %slot, elapsed_s, name = %job.name, "render stopped")
            }
            Outcome::Error => warn!(
                job = %job.id,
                %slot,
                elapsed_s,
                name = %job.name,
                error = detail.unwrap_or(""),
                "render failed"
            ),
        }
        self.stats.record_terminal(job, outcome, detail);
    }

    fn notify(&mut self) {
        for (_, callback) in self.subscribers.iter_mut() {
            callback(&self.jobs);
        }
    }
}
