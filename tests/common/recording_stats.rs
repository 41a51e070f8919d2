// StatsSink that remembers every call for later inspection

use ffduo::engine::{Job, JobId, ProgressSnapshot};
use ffduo::stats::{Outcome, StatsSink};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub enum StatsCall {
    Start(JobId),
    Progress(JobId, f64),
    Terminal(JobId, Outcome, Option<String>),
}

#[derive(Debug, Clone, Default)]
pub struct RecordingStats {
    calls: Arc<Mutex<Vec<StatsCall>>>,
}

#[allow(dead_code)]
impl RecordingStats {
    pub fn calls(&self) -> Vec<StatsCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn terminals(&self) -> Vec<(JobId, Outcome)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StatsCall::Terminal(id, outcome, _) => Some((id, outcome)),
                _ => None,
            })
            .collect()
    }

    pub fn starts(&self) -> Vec<JobId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StatsCall::Start(id) => Some(id),
                _ => None,
            })
            .collect()
    }
}

impl StatsSink for RecordingStats {
    fn record_start(&mut self, job: &Job) {
        self.calls.lock().unwrap().push(StatsCall::Start(job.id));
    }

    fn record_progress(&mut self, job_id: JobId, snapshot: &ProgressSnapshot) {
        self.calls
            .lock()
            .unwrap()
            .push(StatsCall::Progress(job_id, snapshot.percent));
    }

    fn record_terminal(&mut self, job: &Job, outcome: Outcome, detail: Option<&str>) {
        self.calls.lock().unwrap().push(StatsCall::Terminal(
            job.id,
            outcome,
            detail.map(str::to_string),
        ));
    }
}
