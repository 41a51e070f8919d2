use super::ffmpeg_info::DurationProbe;
use super::settings::EncodeSettings;
use super::types::Job;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Default video file extensions to scan for
const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "webm", "mov", "avi", "flv", "m4v", "wmv", "mpg", "mpeg", "ts",
];

/// Check if a path has a video file extension
pub fn is_video_file(path: &Path) -> bool {
    if let Some(ext) = path.extension() {
        if let Some(ext_str) = ext.to_str() {
            return VIDEO_EXTENSIONS.contains(&ext_str.to_lowercase().as_str());
        }
    }
    false
}

/// Scan a directory recursively for video files and invoke a callback for each file found
pub fn scan_streaming<F>(root: &Path, mut on_file: F) -> Result<()>
where
    F: FnMut(PathBuf),
{
    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.is_file() && is_video_file(path) {
            on_file(path.to_path_buf());
        }
    }

    Ok(())
}

/// Expand a mix of files and directories into a flat input list.
/// Explicit files are kept whatever their extension; directories are scanned.
pub fn collect_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            scan_streaming(path, |found| files.push(found))?;
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

/// `<output dir or input dir>/<stem><suffix>.<container>`
pub fn derive_output_path(
    input: &Path,
    output_dir: Option<&Path>,
    suffix: &str,
    container: &str,
) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let dir = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    let mut output = dir.join(format!("{}{}.{}", stem, suffix, container));

    // Never render onto the source file
    if output == input {
        output = dir.join(format!("{}{}_out.{}", stem, suffix, container));
    }
    output
}

/// Build a pending job for one input. A failed probe leaves the duration at
/// zero, which disables percent and ETA but not the encode.
pub fn build_job_from_path<P>(
    input_path: PathBuf,
    settings: &EncodeSettings,
    output_dir: Option<&Path>,
    suffix: &str,
    probe: &P,
) -> Job
where
    P: DurationProbe + ?Sized,
{
    let container = settings.output_container(&input_path);
    let output_path = derive_output_path(&input_path, output_dir, suffix, &container);
    let duration_s = match probe.probe_duration(&input_path) {
        Ok(duration) => duration,
        Err(e) => {
            warn!(input = %input_path.display(), "duration probe failed: {:#}", e);
            0.0
        }
    };
    Job::new(input_path, output_path, duration_s)
}
