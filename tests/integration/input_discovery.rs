// Directory scanning feeding the queue, and output placement

use crate::common::{FakeRunner, orchestrator, ten_seconds};
use ffduo::engine::{
    EncodeSettings, JobStatus, Orchestrator, OrchestratorOptions, RenderMode, VideoCodec,
    collect_inputs,
};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_scanned_directory_is_queued_in_name_order() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("day2");
    fs::create_dir(&nested).unwrap();
    fs::write(dir.path().join("b.mkv"), b"").unwrap();
    fs::write(dir.path().join("a.mp4"), b"").unwrap();
    fs::write(dir.path().join("notes.txt"), b"").unwrap();
    fs::write(nested.join("c.webm"), b"").unwrap();

    let inputs = collect_inputs(&[dir.path().to_path_buf()]).unwrap();
    let (mut orch, _runner) = orchestrator(RenderMode::Cpu, false);
    let jobs = orch.enqueue(inputs);

    let names: Vec<&str> = jobs.iter().map(|j| j.name.as_str()).collect();
    assert_eq!(names, vec!["a.mp4", "b.mkv", "c.webm"]);
    assert!(jobs.iter().all(|j| j.status == JobStatus::Pending));
}

#[test]
fn test_output_dir_and_container_follow_settings() {
    let out = TempDir::new().unwrap();
    let options = OrchestratorOptions {
        output_dir: Some(out.path().to_path_buf()),
        output_suffix: "_small".to_string(),
        ..Default::default()
    };
    let mut orch = Orchestrator::new(FakeRunner::default(), options).with_probe(ten_seconds);
    let mut settings = EncodeSettings::default();
    settings.video.codec = VideoCodec::Vp9;
    orch.set_settings(settings);

    let jobs = orch.enqueue(["/videos/holiday.mov"]);
    assert_eq!(jobs[0].output_path, out.path().join("holiday_small.webm"));
}

#[test]
fn test_copy_keeps_input_container() {
    let (mut orch, _runner) = orchestrator(RenderMode::Cpu, false);
    let mut settings = EncodeSettings::default();
    settings.video.codec = VideoCodec::Copy;
    orch.set_settings(settings);

    let jobs = orch.enqueue(["/videos/holiday.MOV"]);
    assert_eq!(
        jobs[0].output_path,
        std::path::PathBuf::from("/videos/holiday_ffduo.mov")
    );
}
