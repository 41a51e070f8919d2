// Caller-facing orchestrator operations: queue edits, pause, GPU loss, stats

use crate::common::recording_stats::StatsCall;
use crate::common::{FakeRunner, RecordingStats, orchestrator, status_of, ten_seconds};
use ffduo::engine::{
    EncodeSettings, JobStatus, Orchestrator, OrchestratorError, OrchestratorOptions,
    ProgressSnapshot, RenderMode, Slot, VideoCodec, classify_message,
};
use ffduo::stats::Outcome;
use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;

#[test]
fn test_enqueue_builds_pending_jobs_with_derived_outputs() {
    let (mut orch, runner) = orchestrator(RenderMode::Cpu, false);
    let jobs = orch.enqueue(["/videos/clip.mov", "/videos/other.mkv"]);

    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|job| job.status == JobStatus::Pending));
    assert_eq!(jobs[0].output_path, PathBuf::from("/videos/clip_ffduo.mp4"));
    assert_eq!(jobs[0].name, "clip.mov");
    assert_eq!(jobs[0].duration_s, 10.0);
    assert_eq!(jobs[0].slot, None);
    assert_eq!(orch.scheduler().queue_len(), 2);
    // Nothing runs before start
    assert!(runner.submissions().is_empty());
}

#[test]
fn test_probe_failure_leaves_duration_at_zero() {
    let runner = FakeRunner::default();
    let mut orch = Orchestrator::new(runner, OrchestratorOptions::default())
        .with_probe(|_: &std::path::Path| -> anyhow::Result<f64> { anyhow::bail!("no ffprobe") });
    let jobs = orch.enqueue(["/videos/a.mp4"]);
    assert_eq!(jobs[0].duration_s, 0.0);
    assert_eq!(jobs[0].status, JobStatus::Pending);
}

#[test]
fn test_render_request_carries_paths_and_duration() {
    let (mut orch, runner) = orchestrator(RenderMode::Cpu, false);
    let jobs = orch.enqueue(["/videos/clip.mov"]);
    orch.start().unwrap();

    let request = runner.last_request(jobs[0].id).unwrap();
    assert_eq!(request.input, PathBuf::from("/videos/clip.mov"));
    assert_eq!(request.output, PathBuf::from("/videos/clip_ffduo.mp4"));
    assert_eq!(request.duration_s, 10.0);
    assert!(!request.args.contains(&"-i".to_string()));
}

#[test]
fn test_remove_pending_job() {
    let (mut orch, _runner) = orchestrator(RenderMode::Cpu, false);
    let jobs = orch.enqueue(["/videos/a.mp4", "/videos/b.mp4"]);

    assert!(orch.remove(jobs[1].id));
    assert!(orch.job(jobs[1].id).is_none());
    assert!(!orch.scheduler().is_queued(jobs[1].id));
    assert!(!orch.remove(jobs[1].id), "second removal is a no-op");
}

#[test]
fn test_remove_processing_job_is_rejected() {
    let (mut orch, _runner) = orchestrator(RenderMode::Cpu, false);
    let jobs = orch.enqueue(["/videos/a.mp4"]);
    orch.start().unwrap();

    assert!(!orch.remove(jobs[0].id));
    assert_eq!(status_of(&orch, jobs[0].id), JobStatus::Processing);
}

#[test]
fn test_start_without_settings_fails() {
    let mut orch = Orchestrator::new(FakeRunner::default(), OrchestratorOptions::default())
        .with_probe(ten_seconds);
    orch.enqueue(["/videos/a.mp4"]);
    let err = orch.start().unwrap_err();
    assert!(matches!(err, OrchestratorError::MissingSettings));
    assert!(!orch.is_processing());
}

#[test]
fn test_start_with_blocking_settings_never_spawns() {
    let (mut orch, runner) = orchestrator(RenderMode::Cpu, false);
    let mut settings = EncodeSettings::default();
    settings.video.codec = VideoCodec::Copy;
    settings.video.deinterlace = true;
    orch.set_settings(settings);
    let jobs = orch.enqueue(["/videos/a.mp4"]);

    match orch.start() {
        Err(OrchestratorError::InvalidSettings(report)) => assert!(report.has_errors()),
        other => panic!("expected InvalidSettings, got {:?}", other),
    }
    assert_eq!(status_of(&orch, jobs[0].id), JobStatus::Pending);
    assert!(runner.submissions().is_empty());
}

#[test]
fn test_failure_message_is_classified() {
    let (mut orch, runner) = orchestrator(RenderMode::Cpu, false);
    let jobs = orch.enqueue(["/videos/a.mp4"]);
    orch.start().unwrap();

    let raw = "[vost#0:0] Unknown encoder 'libfoo'\nConversion failed!";
    runner.fail(jobs[0].id, raw);
    orch.process_events();

    let job = orch.job(jobs[0].id).unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert_eq!(job.error.as_deref(), Some(classify_message(raw).as_str()));
    assert!(job.ended_at.is_some());
}

#[test]
fn test_spawn_failure_fails_job_and_queue_continues() {
    let runner = FakeRunner::failing_spawn();
    let mut orch =
        Orchestrator::new(runner, OrchestratorOptions::default()).with_probe(ten_seconds);
    orch.set_settings(EncodeSettings::default());
    let jobs = orch.enqueue(["/videos/a.mp4", "/videos/b.mp4"]);
    orch.start().unwrap();

    assert_eq!(orch.process_events(), 2);
    for job in &jobs {
        let job = orch.job(job.id).unwrap();
        assert_eq!(job.status, JobStatus::Error);
        let error = job.error.as_deref().unwrap();
        assert!(
            error.starts_with("FFmpeg executable not found at '/missing/ffmpeg'"),
            "{}",
            error
        );
    }
    assert!(!orch.is_processing());
}

#[test]
fn test_progress_is_monotone_and_reaches_stats() {
    let runner = FakeRunner::default();
    let stats = RecordingStats::default();
    let mut orch = Orchestrator::new(runner.clone(), OrchestratorOptions::default())
        .with_probe(ten_seconds)
        .with_stats(stats.clone());
    orch.set_settings(EncodeSettings::default());
    let jobs = orch.enqueue(["/videos/a.mp4"]);
    let id = jobs[0].id;
    orch.start().unwrap();

    runner.progress(
        id,
        ProgressSnapshot {
            percent: 40.0,
            out_time_s: 4.0,
            speed: Some(2.0),
            eta_s: Some(3.0),
            bitrate: Some("2500.0kbits/s".to_string()),
            ..Default::default()
        },
    );
    runner.progress(
        id,
        ProgressSnapshot {
            percent: 30.0,
            ..Default::default()
        },
    );
    assert_eq!(orch.process_events(), 2);

    let job = orch.job(id).unwrap();
    assert_eq!(job.progress_pct, 40.0);
    assert_eq!(job.speed, Some(2.0));
    assert_eq!(job.bitrate.as_deref(), Some("2500.0kbits/s"));

    runner.complete(id);
    orch.process_events();
    assert_eq!(orch.job(id).unwrap().progress_pct, 100.0);

    assert_eq!(
        stats.calls(),
        vec![
            StatsCall::Start(id),
            StatsCall::Progress(id, 40.0),
            StatsCall::Progress(id, 30.0),
            StatsCall::Terminal(id, Outcome::Completed, None),
        ]
    );
}

#[test]
fn test_pause_blocks_dispatch_only() {
    let (mut orch, runner) = orchestrator(RenderMode::Cpu, false);
    let jobs = orch.enqueue(["/videos/a.mp4", "/videos/b.mp4"]);
    let (a, b) = (jobs[0].id, jobs[1].id);
    orch.start().unwrap();

    orch.pause();
    assert!(orch.is_paused());
    assert_eq!(status_of(&orch, a), JobStatus::Paused);
    // The running encode is not signalled
    assert!(runner.cancelled().is_empty());
    assert_eq!(runner.running(), vec![a]);

    // A paused job can still finish; nothing new starts
    runner.complete(a);
    orch.process_events();
    assert_eq!(status_of(&orch, a), JobStatus::Completed);
    assert_eq!(status_of(&orch, b), JobStatus::Pending);

    orch.resume();
    assert!(!orch.is_paused());
    assert_eq!(status_of(&orch, b), JobStatus::Processing);
}

#[test]
fn test_resume_reverts_cosmetic_pause() {
    let (mut orch, _runner) = orchestrator(RenderMode::Cpu, false);
    let jobs = orch.enqueue(["/videos/a.mp4", "/videos/b.mp4"]);
    orch.start().unwrap();

    orch.pause();
    orch.resume();
    assert_eq!(status_of(&orch, jobs[0].id), JobStatus::Processing);
    assert_eq!(status_of(&orch, jobs[1].id), JobStatus::Pending);
}

#[test]
fn test_gpu_loss_requeues_gpu_job_at_front() {
    let (mut orch, runner) = orchestrator(RenderMode::Duo, true);
    let jobs = orch.enqueue(["/videos/a.mp4", "/videos/b.mp4", "/videos/c.mp4"]);
    let (a, b, c) = (jobs[0].id, jobs[1].id, jobs[2].id);
    orch.start().unwrap();
    assert_eq!(orch.job(b).unwrap().slot, Some(Slot::Gpu));

    orch.set_gpu_available(false);

    assert_eq!(runner.cancelled(), vec![b]);
    let displaced = orch.job(b).unwrap();
    assert_eq!(displaced.status, JobStatus::Pending);
    assert_eq!(displaced.slot, None);
    let queued: Vec<_> = orch.scheduler().queued().copied().collect();
    assert_eq!(queued, vec![b, c]);

    let state = orch.state();
    assert_eq!(state.mode, RenderMode::Cpu);
    assert!(!state.gpu_available);

    // Stop acknowledgement for the cancelled attempt is stale
    assert_eq!(orch.process_events(), 0);

    runner.complete(a);
    orch.process_events();
    let rerun = orch.job(b).unwrap();
    assert_eq!(rerun.status, JobStatus::Processing);
    assert_eq!(rerun.slot, Some(Slot::Cpu));
    assert_eq!(rerun.attempts, 2);
    let args = runner.last_request(b).unwrap().args;
    assert!(args.contains(&"libx264".to_string()), "{:?}", args);
}

#[test]
fn test_mode_change_fills_newly_allowed_slot() {
    let (mut orch, _runner) = orchestrator(RenderMode::Cpu, true);
    let jobs = orch.enqueue(["/videos/a.mp4", "/videos/b.mp4"]);
    orch.start().unwrap();
    assert_eq!(status_of(&orch, jobs[1].id), JobStatus::Pending);

    orch.set_mode(RenderMode::Duo);
    assert_eq!(status_of(&orch, jobs[1].id), JobStatus::Processing);
    assert_eq!(orch.job(jobs[1].id).unwrap().slot, Some(Slot::Gpu));
}

#[test]
fn test_stop_all_stops_both_slots() {
    let runner = FakeRunner::default();
    let stats = RecordingStats::default();
    let options = OrchestratorOptions {
        mode: RenderMode::Duo,
        gpu_available: true,
        ..Default::default()
    };
    let mut orch = Orchestrator::new(runner.clone(), options)
        .with_probe(ten_seconds)
        .with_stats(stats.clone());
    orch.set_settings(EncodeSettings::default());
    let jobs = orch.enqueue(["/videos/a.mp4", "/videos/b.mp4", "/videos/c.mp4"]);
    orch.start().unwrap();

    orch.stop_all();

    assert_eq!(runner.cancel_all_calls(), 1);
    assert_eq!(status_of(&orch, jobs[0].id), JobStatus::Stopped);
    assert_eq!(status_of(&orch, jobs[1].id), JobStatus::Stopped);
    assert_eq!(status_of(&orch, jobs[2].id), JobStatus::Pending);
    assert_eq!(orch.scheduler().active_count(), 0);
    assert!(!orch.is_processing());
    assert_eq!(orch.process_events(), 0);
    assert_eq!(
        stats.terminals(),
        vec![
            (jobs[0].id, Outcome::Stopped),
            (jobs[1].id, Outcome::Stopped)
        ]
    );
}

#[test]
fn test_stop_one_pending_job_dequeues_it() {
    let (mut orch, _runner) = orchestrator(RenderMode::Cpu, false);
    let jobs = orch.enqueue(["/videos/a.mp4", "/videos/b.mp4"]);
    orch.start().unwrap();

    assert!(orch.stop_one(jobs[1].id));
    assert_eq!(status_of(&orch, jobs[1].id), JobStatus::Stopped);
    assert!(!orch.scheduler().is_queued(jobs[1].id));
    // Running job is untouched
    assert_eq!(status_of(&orch, jobs[0].id), JobStatus::Processing);
    assert!(!orch.stop_one(jobs[1].id), "already stopped");
}

#[test]
fn test_clear_finished_removes_terminal_jobs() {
    let (mut orch, runner) = orchestrator(RenderMode::Cpu, false);
    let jobs = orch.enqueue(["/videos/a.mp4", "/videos/b.mp4", "/videos/c.mp4"]);
    orch.start().unwrap();

    runner.complete(jobs[0].id);
    orch.process_events();
    runner.fail(jobs[1].id, "Conversion failed!");
    orch.process_events();

    assert_eq!(orch.clear_finished(), 2);
    assert_eq!(orch.jobs().len(), 1);
    assert_eq!(orch.jobs()[0].id, jobs[2].id);
    assert_eq!(orch.clear_finished(), 0);
}

#[test]
fn test_subscribers_see_every_change_until_unsubscribed() {
    let (mut orch, _runner) = orchestrator(RenderMode::Cpu, false);
    let calls = Rc::new(Cell::new(0usize));
    let last_len = Rc::new(Cell::new(0usize));

    let sub = {
        let calls = Rc::clone(&calls);
        let last_len = Rc::clone(&last_len);
        orch.subscribe(move |jobs| {
            calls.set(calls.get() + 1);
            last_len.set(jobs.len());
        })
    };

    orch.enqueue(["/videos/a.mp4", "/videos/b.mp4"]);
    assert_eq!(calls.get(), 1);
    assert_eq!(last_len.get(), 2);

    orch.start().unwrap();
    assert_eq!(calls.get(), 2);

    assert!(orch.unsubscribe(sub));
    assert!(!orch.unsubscribe(sub));
    orch.enqueue(["/videos/c.mp4"]);
    assert_eq!(calls.get(), 2);
}

#[test]
fn test_state_serializes() {
    let (mut orch, _runner) = orchestrator(RenderMode::Duo, true);
    let jobs = orch.enqueue(["/videos/a.mp4"]);
    orch.start().unwrap();

    let state = orch.state();
    assert_eq!(state.current_job_id, Some(jobs[0].id));
    assert!(state.is_processing);

    let json = serde_json::to_value(&state).unwrap();
    assert_eq!(json["mode"], "duo");
    assert_eq!(json["jobs"][0]["status"], "processing");
    assert_eq!(json["jobs"][0]["slot"], "cpu");
}
