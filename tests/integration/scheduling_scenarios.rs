// End-to-end dispatch scenarios over the fake runner

use crate::common::{orchestrator, processing_count, status_of};
use ffduo::engine::{JobStatus, RenderMode, Slot};

#[test]
fn test_cpu_mode_runs_one_job_at_a_time_in_arrival_order() {
    let (mut orch, runner) = orchestrator(RenderMode::Cpu, false);
    let jobs = orch.enqueue(["/videos/a.mp4", "/videos/b.mp4", "/videos/c.mp4"]);
    let ids: Vec<_> = jobs.iter().map(|j| j.id).collect();

    orch.start().unwrap();

    for (n, id) in ids.iter().enumerate() {
        assert_eq!(
            processing_count(&orch),
            1,
            "exactly one job may run in cpu mode (step {})",
            n
        );
        assert_eq!(status_of(&orch, *id), JobStatus::Processing);
        assert_eq!(orch.job(*id).unwrap().slot, Some(Slot::Cpu));
        assert_eq!(runner.running(), vec![*id]);

        runner.complete(*id);
        assert_eq!(orch.process_events(), 1);
        assert_eq!(status_of(&orch, *id), JobStatus::Completed);
    }

    assert_eq!(runner.submitted_ids(), ids);
    assert!(!orch.is_processing());
    assert_eq!(processing_count(&orch), 0);
}

#[test]
fn test_gpu_mode_without_gpu_degrades_to_cpu_slot() {
    let (mut orch, runner) = orchestrator(RenderMode::Gpu, false);
    let jobs = orch.enqueue(["/videos/a.mp4", "/videos/b.mp4"]);
    orch.start().unwrap();

    assert_eq!(orch.scheduler().effective_mode(), RenderMode::Cpu);
    assert_eq!(orch.job(jobs[0].id).unwrap().slot, Some(Slot::Cpu));
    assert_eq!(status_of(&orch, jobs[1].id), JobStatus::Pending);
    assert_eq!(runner.running().len(), 1);
}

#[test]
fn test_duo_mode_fills_both_slots() {
    let (mut orch, runner) = orchestrator(RenderMode::Duo, true);
    let jobs = orch.enqueue(["/videos/a.mp4", "/videos/b.mp4"]);
    orch.start().unwrap();

    let a = orch.job(jobs[0].id).unwrap();
    let b = orch.job(jobs[1].id).unwrap();
    assert_eq!(a.status, JobStatus::Processing);
    assert_eq!(b.status, JobStatus::Processing);
    assert_eq!(a.slot, Some(Slot::Cpu));
    assert_eq!(b.slot, Some(Slot::Gpu));
    assert_eq!(runner.running().len(), 2);

    // The gpu slot gets the hardware encoder
    let gpu_args = runner.last_request(jobs[1].id).unwrap().args;
    assert!(gpu_args.contains(&"h264_nvenc".to_string()), "{:?}", gpu_args);
    let cpu_args = runner.last_request(jobs[0].id).unwrap().args;
    assert!(cpu_args.contains(&"libx264".to_string()), "{:?}", cpu_args);

    assert_eq!(orch.state().current_job_id, Some(jobs[0].id));
}

#[test]
fn test_cpu_error_does_not_disturb_gpu_job() {
    let (mut orch, runner) = orchestrator(RenderMode::Duo, true);
    let jobs = orch.enqueue(["/videos/a.mp4", "/videos/b.mp4", "/videos/c.mp4"]);
    let (a, b, c) = (jobs[0].id, jobs[1].id, jobs[2].id);
    orch.start().unwrap();

    runner.fail(a, "Conversion failed!");
    orch.process_events();

    assert_eq!(status_of(&orch, a), JobStatus::Error);
    assert!(orch.job(a).unwrap().error.is_some());
    assert_eq!(status_of(&orch, b), JobStatus::Processing);
    // Freed cpu slot picks up the next queued job
    assert_eq!(status_of(&orch, c), JobStatus::Processing);
    assert_eq!(orch.job(c).unwrap().slot, Some(Slot::Cpu));

    runner.complete(b);
    orch.process_events();
    assert_eq!(status_of(&orch, b), JobStatus::Completed);
    assert!(orch.is_processing());

    runner.complete(c);
    orch.process_events();
    assert_eq!(status_of(&orch, c), JobStatus::Completed);
    assert!(!orch.is_processing());
}

#[test]
fn test_stop_one_leaves_other_slot_running_and_halts_queue() {
    let (mut orch, runner) = orchestrator(RenderMode::Duo, true);
    let jobs = orch.enqueue(["/videos/a.mp4", "/videos/b.mp4", "/videos/c.mp4"]);
    let (a, b, c) = (jobs[0].id, jobs[1].id, jobs[2].id);
    orch.start().unwrap();

    assert!(orch.stop_one(a));
    assert_eq!(status_of(&orch, a), JobStatus::Stopped);
    assert_eq!(status_of(&orch, b), JobStatus::Processing);
    assert_eq!(status_of(&orch, c), JobStatus::Pending);
    assert_eq!(runner.cancelled(), vec![a]);
    assert!(!orch.is_processing());

    // The runner's stop acknowledgement arrives after the fact and is ignored
    assert_eq!(orch.process_events(), 0);
    assert_eq!(status_of(&orch, c), JobStatus::Pending);

    runner.complete(b);
    orch.process_events();
    assert_eq!(status_of(&orch, b), JobStatus::Completed);
    assert_eq!(status_of(&orch, c), JobStatus::Pending, "queue must not auto-advance");
    assert!(runner.running().is_empty());

    orch.resume();
    assert_eq!(status_of(&orch, c), JobStatus::Processing);
    assert_eq!(orch.job(c).unwrap().slot, Some(Slot::Cpu));
}

#[test]
fn test_external_stop_halts_auto_advance() {
    let (mut orch, runner) = orchestrator(RenderMode::Cpu, false);
    let jobs = orch.enqueue(["/videos/a.mp4", "/videos/b.mp4"]);
    orch.start().unwrap();

    runner.stop(jobs[0].id);
    assert_eq!(orch.process_events(), 1);
    assert_eq!(status_of(&orch, jobs[0].id), JobStatus::Stopped);
    assert_eq!(status_of(&orch, jobs[1].id), JobStatus::Pending);
    assert!(!orch.is_processing());
    assert!(!orch.is_busy());

    orch.start().unwrap();
    assert_eq!(status_of(&orch, jobs[1].id), JobStatus::Processing);
}

#[test]
fn test_run_to_completion_drains_queue() {
    let (mut orch, runner) = orchestrator(RenderMode::Duo, true);
    let jobs = orch.enqueue(["/videos/a.mp4", "/videos/b.mp4", "/videos/c.mp4"]);
    orch.start().unwrap();

    let worker = runner.clone();
    let finisher = std::thread::spawn(move || {
        let mut finished = 0;
        while finished < 3 {
            for id in worker.running() {
                worker.complete(id);
                finished += 1;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
    });

    orch.run_to_completion();
    finisher.join().unwrap();

    assert!(
        jobs.iter()
            .all(|job| status_of(&orch, job.id) == JobStatus::Completed)
    );
    assert!(!orch.is_busy());
}
