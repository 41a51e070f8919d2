use crate::cli::{Cli, Commands, EncodeArgs};
use anyhow::{Context, Result};
use ffduo::engine::{
    self, DurationProbe, EncodeSettings, FfmpegRunner, FfprobeProbe, JobId, JobStatus,
    Orchestrator, OrchestratorOptions,
};
use ffduo::{config, stats};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::filter::LevelFilter;

pub fn run(cli: Cli) {
    let config = config::Config::load().unwrap_or_default();
    init_logging(&config, cli.verbose);

    match cli.command {
        Commands::Encode { paths, encode } => handle_encode(&config, &paths, &encode),
        Commands::DryRun { paths, encode } => handle_dry_run(&config, &paths, &encode),
        Commands::Probe { file } => handle_probe(&config, &file),
        Commands::CheckFfmpeg => handle_check_ffmpeg(&config),
        Commands::ExplainError { file, text } => handle_explain_error(file, text),
        Commands::InitConfig => handle_init_config(),
    }
}

fn init_logging(config: &config::Config, verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        config.logging.level.parse().unwrap_or(LevelFilter::INFO)
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn exit_on_error<T>(result: Result<T>) -> T {
    result.unwrap_or_else(|e| {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    })
}

/// Config defaults, then the settings file, then individual flags
fn resolve_settings(args: &EncodeArgs) -> Result<EncodeSettings> {
    let mut settings = match &args.settings {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse settings file: {}", path.display()))?
        }
        None => EncodeSettings::default(),
    };

    if let Some(codec) = args.video_codec {
        settings.video.codec = codec;
    }
    if let Some(codec) = args.audio_codec {
        settings.audio.codec = codec;
    }
    if args.crf.is_some() {
        settings.video.crf = args.crf;
    }
    if args.bitrate.is_some() {
        settings.video.bitrate_kbps = args.bitrate;
    }
    if args.preset.is_some() {
        settings.video.preset = args.preset.clone();
    }
    if args.audio_bitrate.is_some() {
        settings.audio.bitrate_kbps = args.audio_bitrate;
    }
    Ok(settings)
}

fn orchestrator_options(config: &config::Config, args: &EncodeArgs) -> OrchestratorOptions {
    OrchestratorOptions {
        mode: args.mode.unwrap_or(config.defaults.render_mode),
        gpu_available: args.gpu || config.defaults.gpu_available,
        output_dir: args
            .output_dir
            .clone()
            .or_else(|| config.defaults.output_dir.clone()),
        output_suffix: args
            .suffix
            .clone()
            .unwrap_or_else(|| config.defaults.output_suffix.clone()),
    }
}

fn collect_or_exit(paths: &[PathBuf]) -> Vec<PathBuf> {
    let inputs = exit_on_error(engine::collect_inputs(paths));
    if inputs.is_empty() {
        eprintln!("No video files found");
        process::exit(0);
    }
    inputs
}

fn build_orchestrator(config: &config::Config, args: &EncodeArgs) -> Orchestrator {
    let mut runner = FfmpegRunner::new(&config.paths.ffmpeg);
    if config.logging.render_logs {
        match config.log_dir() {
            Ok(dir) => runner = runner.with_render_logs(dir),
            Err(e) => warn!("render logs disabled: {:#}", e),
        }
    }

    let orch = Orchestrator::new(runner, orchestrator_options(config, args))
        .with_probe(FfprobeProbe::new(&config.paths.ffprobe));

    if !config.stats.enabled {
        return orch;
    }
    let interval = Duration::from_secs(config.stats.flush_interval_secs);
    match stats::StatsRecorder::open_default(interval) {
        Ok(recorder) => orch.with_stats(recorder),
        Err(e) => {
            warn!("statistics disabled: {:#}", e);
            orch
        }
    }
}

fn handle_encode(config: &config::Config, paths: &[PathBuf], args: &EncodeArgs) {
    let settings = exit_on_error(resolve_settings(args));
    let inputs = collect_or_exit(paths);

    let mut orch = build_orchestrator(config, args);
    orch.set_settings(settings);

    // Print each status change once, plus progress every 10%
    let mut last_seen: HashMap<JobId, (JobStatus, u32)> = HashMap::new();
    orch.subscribe(move |jobs| {
        for job in jobs {
            let decile = (job.progress_pct / 10.0) as u32;
            let previous = last_seen.insert(job.id, (job.status, decile));
            if previous == Some((job.status, decile)) {
                continue;
            }
            match job.status {
                JobStatus::Processing
                    if previous.map(|(s, _)| s) != Some(JobStatus::Processing) =>
                {
                    let slot = job.slot.map(|s| s.to_string()).unwrap_or_default();
                    println!("[{}] started  {}", slot, job.name);
                }
                JobStatus::Processing => {
                    let eta = job
                        .eta_s
                        .map(stats::format_duration)
                        .unwrap_or_else(|| "-".to_string());
                    println!("          {} {:>5.1}%  eta {}", job.name, job.progress_pct, eta);
                }
                JobStatus::Completed => {
                    let size = job
                        .size_bytes
                        .map(|bytes| format!(" ({})", stats::format_bytes(bytes)))
                        .unwrap_or_default();
                    println!("[done]    {} -> {}{}", job.name, job.output_path.display(), size)
                }
                JobStatus::Error => println!(
                    "[error]   {}: {}",
                    job.name,
                    job.error.as_deref().unwrap_or("unknown error")
                ),
                JobStatus::Stopped => println!("[stopped] {}", job.name),
                JobStatus::Pending | JobStatus::Paused => {}
            }
        }
    });

    let jobs = orch.enqueue(inputs);
    println!("Queued {} job(s)", jobs.len());

    if let Err(e) = orch.start() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
    orch.run_to_completion();

    let failed = orch
        .jobs()
        .iter()
        .filter(|job| job.status == JobStatus::Error)
        .count();
    let completed = orch
        .jobs()
        .iter()
        .filter(|job| job.status == JobStatus::Completed)
        .count();
    println!("Completed: {}, failed: {}", completed, failed);
    drop(orch);

    if failed > 0 {
        process::exit(1);
    }
}

fn handle_dry_run(config: &config::Config, paths: &[PathBuf], args: &EncodeArgs) {
    let settings = exit_on_error(resolve_settings(args));
    let inputs = collect_or_exit(paths);
    let options = orchestrator_options(config, args);

    let report = engine::validate_settings(&settings, false);
    for issue in report.warnings() {
        println!("warning: {}", issue);
    }
    if report.has_errors() {
        eprintln!("Error: encode settings rejected: {}", report);
        process::exit(1);
    }

    let probe = FfprobeProbe::new(&config.paths.ffprobe);
    let program = config.paths.ffmpeg.to_string_lossy();
    // Alternate slots the way duo mode would fill them
    let duo = options.gpu_available && options.mode.uses_gpu_slot();
    let cpu_too = !options.gpu_available || options.mode.uses_cpu_slot();

    for (n, input) in inputs.into_iter().enumerate() {
        let job = engine::build_job_from_path(
            input,
            &settings,
            options.output_dir.as_deref(),
            &options.output_suffix,
            &probe,
        );
        let prefer_hardware = duo && (!cpu_too || n % 2 == 1);
        match engine::build_ffmpeg_args(&settings, prefer_hardware) {
            Ok(built) => {
                let argv =
                    engine::ffmpeg_invocation(&job.input_path, &built.args, &job.output_path);
                println!("{}", engine::format_ffmpeg_args(&program, &argv));
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        }
    }
}

fn handle_probe(config: &config::Config, file: &Path) {
    let probe = FfprobeProbe::new(&config.paths.ffprobe);
    match probe.probe_duration(file) {
        Ok(duration) => {
            println!("Duration: {:.2} seconds", duration);
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn handle_check_ffmpeg(config: &config::Config) {
    match engine::ffmpeg_version(&config.paths.ffmpeg) {
        Ok(version) => {
            println!("ffmpeg found: {}", version);
            match engine::ffprobe_version(&config.paths.ffprobe) {
                Ok(probe_version) => {
                    println!("ffprobe found: {}", probe_version);
                    process::exit(0);
                }
                Err(e) => {
                    eprintln!("Error: {:#}", e);
                    process::exit(1);
                }
            }
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn handle_explain_error(file: Option<PathBuf>, text: Option<String>) {
    let raw = match (file, text) {
        (Some(path), _) => exit_on_error(
            std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display())),
        ),
        (None, Some(text)) => text,
        (None, None) => {
            let mut buf = String::new();
            exit_on_error(
                std::io::stdin()
                    .read_to_string(&mut buf)
                    .context("Failed to read stdin"),
            );
            buf
        }
    };

    let classified = engine::classify(&raw);
    println!("{}", classified.message);
}

fn handle_init_config() {
    match config::Config::load() {
        Ok(cfg) => {
            match config::Config::config_path() {
                Ok(path) => println!("Config loaded successfully from {}", path.display()),
                Err(e) => println!("Config loaded, but config path unknown: {:#}", e),
            }
            println!("{:#?}", cfg);
        }
        Err(e) => {
            // Leave a broken file for the user to fix rather than clobbering it
            if let Ok(path) = config::Config::config_path() {
                if path.exists() {
                    eprintln!("Config at {} is invalid: {:#}", path.display(), e);
                    eprintln!("Fix it, or delete it to regenerate the defaults.");
                    process::exit(1);
                }
            }

            println!("Could not load config: {:#}", e);
            println!("Creating default config...");
            match config::Config::ensure_default() {
                Ok(path) => println!("Default config saved to {}", path.display()),
                Err(err) => {
                    eprintln!("Failed to save default config: {:#}", err);
                    process::exit(1);
                }
            }
        }
    }
}
