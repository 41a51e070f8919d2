//! Pre-flight checks for encode settings before building FFmpeg arguments.

use crate::engine::core::codecs::{
    EQ_FREQUENCY_RANGE, EQ_GAIN_DB_RANGE, FONT_SIZE_RANGE, FPS_RANGE, GAIN_DB_RANGE,
    MAX_VIDEO_BITRATE_KBPS, MIN_VIDEO_BITRATE_KBPS, NOISE_REDUCTION_RANGE, PITCH_SEMITONE_RANGE,
    SAFE_AUDIO_BITRATE_KBPS, SAFE_AUDIO_CHANNELS, SAFE_AUDIO_SAMPLE_RATE, SPEED_RANGE,
    VOLUME_PCT_RANGE, audio_constraints, in_range, preset_index,
};
use crate::engine::core::even_dimensions;
use crate::engine::core::resolve_video_encoder;
use crate::engine::core::settings::{AudioSettings, EncodeSettings, VideoSettings};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Blocks the build
    Error,
    /// Resolved by substituting a safe encoder
    Override,
    /// Value clamped or ignored
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issues_with(&self, severity: Severity) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.severity == severity)
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues_with(Severity::Error)
    }

    /// Everything that does not block the build
    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity != Severity::Error)
    }

    fn push(&mut self, severity: Severity, field: &str, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity,
            field: field.to_string(),
            message: message.into(),
        });
    }

    fn error(&mut self, field: &str, message: impl Into<String>) {
        self.push(Severity::Error, field, message);
    }

    fn warn(&mut self, field: &str, message: impl Into<String>) {
        self.push(Severity::Warning, field, message);
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let errors: Vec<String> = self.errors().map(|i| i.to_string()).collect();
        if errors.is_empty() {
            write!(f, "no blocking errors")
        } else {
            write!(f, "{}", errors.join("; "))
        }
    }
}

/// Enumerate blocking incompatibilities and non-blocking clamps.
///
/// The builder applies the same clamps regardless, so warnings never
/// prevent a build.
pub fn validate_settings(settings: &EncodeSettings, prefer_hardware: bool) -> ValidationReport {
    let mut report = ValidationReport::default();

    check_video(&mut report, settings, prefer_hardware);
    if !settings.audio.disabled {
        check_audio(&mut report, &settings.audio, settings.video.speed);
    }

    report
}

fn check_video(report: &mut ValidationReport, settings: &EncodeSettings, prefer_hardware: bool) {
    let video = &settings.video;
    let encoder = resolve_video_encoder(video.codec, prefer_hardware);

    if !encoder.constraints.supports_filters {
        let filters = video.active_filters();
        if !filters.is_empty() {
            report.error(
                "video.filters",
                format!(
                    "filters ({}) cannot be applied when the video codec is copy",
                    filters.join(", ")
                ),
            );
        }
        if video.has_transform() {
            report.error(
                "video.rotation",
                "rotation and flip require re-encoding and cannot be combined with video copy",
            );
        }
        if settings.watermark.is_some() {
            report.error(
                "watermark",
                "a watermark cannot be burned in when the video codec is copy",
            );
        }
    }
    if encoder.constraints.passthrough {
        if video.fixed_fps().is_some() {
            report.error(
                "video.fps",
                "changing the frame rate requires re-encoding; use auto fps with video copy",
            );
        }
        if video.crf.is_some() || video.bitrate_kbps.is_some() {
            report.warn("video.crf", "quality and bitrate are ignored with video copy");
        }
        return;
    }

    if encoder.fell_back {
        report.warn(
            "video.codec",
            format!(
                "{} has no hardware encoder; falling back to {}",
                video.codec, encoder.name
            ),
        );
    }

    check_video_quality(report, video, &encoder);

    if let Some(fps) = video.fixed_fps() {
        if !in_range(fps, FPS_RANGE) {
            report.warn(
                "video.fps",
                format!("{} fps out of range; clamped to {}-{}", fps, FPS_RANGE.0, FPS_RANGE.1),
            );
        }
    }

    if let Some((w, h)) = video.resolution {
        let (ew, eh) = even_dimensions(w, h);
        if ew < 2 || eh < 2 {
            report.warn("video.resolution", format!("{}x{} is too small; scaling skipped", w, h));
        } else if (ew, eh) != (w, h) {
            report.warn(
                "video.resolution",
                format!("{}x{} rounded down to even {}x{}", w, h, ew, eh),
            );
        }
    }

    if !in_range(video.speed, SPEED_RANGE) {
        report.warn(
            "video.speed",
            format!(
                "speed factor {} out of range; clamped to {}-{}",
                video.speed, SPEED_RANGE.0, SPEED_RANGE.1
            ),
        );
    }

    if let Some(preset) = video.preset.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        if preset_index(&preset.to_ascii_lowercase()).is_none() {
            report.warn("video.preset", format!("unknown preset '{}'; using medium", preset));
        }
    }

    if let Some(wm) = &settings.watermark {
        if wm.text.trim().is_empty() {
            report.warn("watermark.text", "watermark text is empty; watermark skipped");
        }
        if !(FONT_SIZE_RANGE.0..=FONT_SIZE_RANGE.1).contains(&wm.font_size) {
            report.warn(
                "watermark.font_size",
                format!(
                    "font size {} clamped to {}-{}",
                    wm.font_size, FONT_SIZE_RANGE.0, FONT_SIZE_RANGE.1
                ),
            );
        }
        if !in_range(wm.opacity, (0.0, 1.0)) {
            report.warn("watermark.opacity", format!("opacity {} clamped to 0-1", wm.opacity));
        }
    }
}

fn check_video_quality(
    report: &mut ValidationReport,
    video: &VideoSettings,
    encoder: &crate::engine::core::ResolvedEncoder,
) {
    if let Some(crf) = video.crf {
        let (label, (lo, hi)) = if encoder.hardware {
            ("CQ", encoder.constraints.cq_range)
        } else {
            ("CRF", encoder.constraints.crf_range)
        };
        if !(lo..=hi).contains(&crf) {
            report.warn(
                "video.crf",
                format!(
                    "{} {} out of range for {}; clamped to {}-{}",
                    label, crf, encoder.name, lo, hi
                ),
            );
        }
    }
    if let Some(kbps) = video.bitrate_kbps {
        if !(MIN_VIDEO_BITRATE_KBPS..=MAX_VIDEO_BITRATE_KBPS).contains(&kbps) {
            report.warn(
                "video.bitrate",
                format!(
                    "{} kb/s clamped to {}-{} kb/s",
                    kbps, MIN_VIDEO_BITRATE_KBPS, MAX_VIDEO_BITRATE_KBPS
                ),
            );
        }
    }
}

fn check_audio(report: &mut ValidationReport, audio: &AudioSettings, tempo: f64) {
    let constraints = audio_constraints(audio.codec);

    if !constraints.supports_filters {
        let filters = audio.active_filters(tempo);
        if !filters.is_empty() {
            report.push(
                Severity::Override,
                "audio.codec",
                format!(
                    "audio copy cannot carry filters ({}); re-encoding as aac {}k, {} channels, {} Hz",
                    filters.join(", "),
                    SAFE_AUDIO_BITRATE_KBPS,
                    SAFE_AUDIO_CHANNELS,
                    SAFE_AUDIO_SAMPLE_RATE
                ),
            );
        }
    }
    if constraints.passthrough {
        return;
    }

    if let Some(requested) = audio.sample_rate {
        if let Some(actual) = constraints.clamp_sample_rate(Some(requested)) {
            if actual != requested {
                report.warn(
                    "audio.sample_rate",
                    format!(
                        "{} Hz not supported by {}; using {} Hz",
                        requested, audio.codec, actual
                    ),
                );
            }
        }
    }
    if let Some(requested) = audio.channels {
        if let Some(actual) = constraints.clamp_channels(Some(requested)) {
            if actual != requested {
                report.warn(
                    "audio.channels",
                    format!(
                        "{} channels not supported by {}; using {}",
                        requested, audio.codec, actual
                    ),
                );
            }
        }
    }
    if let Some(requested) = audio.bitrate_kbps {
        match constraints.clamp_bitrate(Some(requested)) {
            Some(actual) if actual != requested => report.warn(
                "audio.bitrate",
                format!("{} kb/s not offered by {}; using {} kb/s", requested, audio.codec, actual),
            ),
            None if constraints.lossless => report.warn(
                "audio.bitrate",
                format!("{} is lossless; {} kb/s ignored", audio.codec, requested),
            ),
            None => report.warn(
                "audio.bitrate",
                format!("{} has no bitrate choices; {} kb/s ignored", audio.codec, requested),
            ),
            _ => {}
        }
    }

    check_audio_range(report, "audio.volume", audio.volume_pct, VOLUME_PCT_RANGE);
    check_audio_range(report, "audio.gain", audio.gain_db, GAIN_DB_RANGE);
    check_audio_range(report, "audio.pitch", audio.pitch_semitones, PITCH_SEMITONE_RANGE);
    check_audio_range(
        report,
        "audio.noise_reduction",
        audio.noise_reduction,
        NOISE_REDUCTION_RANGE,
    );
    for band in &audio.equalizer {
        check_audio_range(report, "audio.equalizer.gain", band.gain_db, EQ_GAIN_DB_RANGE);
        check_audio_range(
            report,
            "audio.equalizer.frequency",
            band.frequency_hz,
            EQ_FREQUENCY_RANGE,
        );
    }
}

fn check_audio_range(report: &mut ValidationReport, field: &str, value: f64, range: (f64, f64)) {
    if !in_range(value, range) {
        report.warn(
            field,
            format!("{} out of range; clamped to {} to {}", value, range.0, range.1),
        );
    }
}
