use super::codecs::{
    DEFAULT_PRESET, EQ_FREQUENCY_RANGE, EQ_GAIN_DB_RANGE, FONT_SIZE_RANGE, FPS_RANGE,
    GAIN_DB_RANGE, NOISE_REDUCTION_RANGE, PITCH_SEMITONE_RANGE, PRESETS, SAFE_AUDIO_BITRATE_KBPS,
    SAFE_AUDIO_CHANNELS, SAFE_AUDIO_CODEC, SAFE_AUDIO_SAMPLE_RATE, SPEED_RANGE, VOLUME_PCT_RANGE,
    VideoConstraints, audio_constraints, clamp_f64, clamp_video_bitrate, preset_index,
    video_constraints,
};
use super::settings::{
    AudioEffect, AudioSettings, EncodeSettings, Flip, Rotation, VideoCodec, VideoSettings,
    WatermarkPosition, WatermarkSettings,
};
use crate::engine::validate::{Severity, ValidationReport, validate_settings};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// Constant quality used by hardware encoders when neither CQ nor bitrate is set
pub const DEFAULT_HW_CQ: u32 = 23;

// Index-aligned with PRESETS (ultrafast..veryslow)
const SVT_AV1_PRESETS: [u32; 9] = [12, 11, 10, 9, 8, 6, 4, 2, 1];
const NVENC_PRESETS: [u32; 9] = [1, 1, 2, 3, 3, 4, 5, 6, 7];

/// Encoder arguments for one job, without input/output
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltCommand {
    pub args: Vec<String>,
    pub warnings: Vec<String>,
    pub video_encoder: String,
    pub hardware: bool,
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid encode settings: {0}")]
    Invalid(ValidationReport),
}

/// Concrete video encoder picked for a codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedEncoder {
    pub name: &'static str,
    pub hardware: bool,
    /// Hardware was asked for but the codec has none
    pub fell_back: bool,
    pub constraints: &'static VideoConstraints,
}

pub fn resolve_video_encoder(codec: VideoCodec, prefer_hardware: bool) -> ResolvedEncoder {
    let constraints = video_constraints(codec);
    if constraints.passthrough {
        return ResolvedEncoder {
            name: constraints.software_encoder,
            hardware: false,
            fell_back: false,
            constraints,
        };
    }
    match (prefer_hardware, constraints.hardware_encoder) {
        (true, Some(hw)) => ResolvedEncoder {
            name: hw,
            hardware: true,
            fell_back: false,
            constraints,
        },
        (prefer, _) => ResolvedEncoder {
            name: constraints.software_encoder,
            hardware: false,
            fell_back: prefer,
            constraints,
        },
    }
}

/// Build the encoder arguments for `settings`.
///
/// Blocking pre-flight errors are returned as `BuildError::Invalid`; clamps,
/// hardware fallbacks and audio overrides come back as warnings.
pub fn build_ffmpeg_args(
    settings: &EncodeSettings,
    prefer_hardware: bool,
) -> Result<BuiltCommand, BuildError> {
    let report = validate_settings(settings, prefer_hardware);
    if report.has_errors() {
        return Err(BuildError::Invalid(report));
    }

    let encoder = resolve_video_encoder(settings.video.codec, prefer_hardware);
    let mut args = Vec::new();

    apply_video_settings(&mut args, &settings.video, settings.watermark.as_ref(), &encoder);
    apply_audio_settings(&mut args, &settings.audio, settings.video.speed);
    apply_additional_args(&mut args, &settings.video.extra_args);

    for issue in report.issues_with(Severity::Override) {
        warn!(field = %issue.field, "{}", issue.message);
    }

    Ok(BuiltCommand {
        args,
        warnings: report.warnings().map(|i| i.to_string()).collect(),
        video_encoder: encoder.name.to_string(),
        hardware: encoder.hardware,
    })
}

/// Full ffmpeg argument list (without the program name) for one run.
/// Progress is reported as key=value lines on stdout.
pub fn ffmpeg_invocation(input: &Path, args: &[String], output: &Path) -> Vec<String> {
    let mut full = vec![
        "-hide_banner".to_string(),
        "-y".to_string(),
        "-i".to_string(),
        input.display().to_string(),
    ];
    full.extend(args.iter().cloned());
    full.extend(
        ["-progress", "pipe:1", "-stats_period", "0.5", "-nostats"]
            .iter()
            .map(|s| s.to_string()),
    );
    full.push(output.display().to_string());
    full
}

/// Render arguments as a shell-safe string for display
pub fn format_ffmpeg_args(program: &str, args: &[String]) -> String {
    let words = std::iter::once(program).chain(args.iter().map(String::as_str));
    shlex::try_join(words).unwrap_or_else(|_| {
        // Arguments containing NUL bytes cannot be quoted
        let mut joined = program.to_string();
        for arg in args {
            joined.push(' ');
            joined.push_str(arg);
        }
        joined
    })
}

fn fmt_num(value: f64) -> String {
    let s = format!("{:.3}", value);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

pub fn even_dimensions(width: u32, height: u32) -> (u32, u32) {
    (width - width % 2, height - height % 2)
}

fn apply_video_settings(
    args: &mut Vec<String>,
    video: &VideoSettings,
    watermark: Option<&WatermarkSettings>,
    encoder: &ResolvedEncoder,
) {
    if encoder.constraints.passthrough {
        args.push("-c:v".into());
        args.push("copy".into());
        return;
    }

    let filters = build_video_filters(video, watermark);
    if !filters.is_empty() {
        args.push("-vf".into());
        args.push(filters.join(","));
    }

    if let Some(fps) = video.fixed_fps() {
        args.push("-r".into());
        args.push(fmt_num(clamp_f64(fps, FPS_RANGE)));
    }

    args.push("-c:v".into());
    args.push(encoder.name.into());

    if encoder.hardware {
        apply_hardware_rate_control(args, video, encoder.constraints);
    } else {
        apply_software_rate_control(args, video, encoder.constraints);
    }

    apply_preset(args, video, encoder);
}

fn apply_software_rate_control(
    args: &mut Vec<String>,
    video: &VideoSettings,
    constraints: &VideoConstraints,
) {
    let crf = video.crf.map(|c| constraints.clamp_crf(c));
    let bitrate = video.bitrate_kbps.map(clamp_video_bitrate);
    let is_vp9 = constraints.codec == VideoCodec::Vp9;

    match (crf, bitrate) {
        (Some(q), Some(b)) => {
            args.push("-crf".into());
            args.push(q.to_string());
            if is_vp9 {
                // libvpx constrained quality: -b:v acts as the ceiling
                args.push("-b:v".into());
                args.push(format!("{}k", b));
            } else {
                args.push("-maxrate".into());
                args.push(format!("{}k", b));
                args.push("-bufsize".into());
                args.push(format!("{}k", b * 2));
            }
        }
        (Some(q), None) => {
            args.push("-crf".into());
            args.push(q.to_string());
            if is_vp9 {
                args.push("-b:v".into());
                args.push("0".into());
            }
        }
        (None, Some(b)) => {
            args.push("-b:v".into());
            args.push(format!("{}k", b));
        }
        (None, None) => {}
    }
}

/// `-b:v 0` leaves the rate uncapped; a ceiling replaces it with maxrate/bufsize
fn push_constant_quality(args: &mut Vec<String>, cq: u32, ceiling_kbps: Option<u32>) {
    args.push("-rc".into());
    args.push("vbr".into());
    args.push("-cq".into());
    args.push(cq.to_string());
    match ceiling_kbps {
        Some(b) => {
            args.push("-maxrate".into());
            args.push(format!("{}k", b));
            args.push("-bufsize".into());
            args.push(format!("{}k", b * 2));
        }
        None => {
            args.push("-b:v".into());
            args.push("0".into());
        }
    }
}

fn push_adaptive_quantization(args: &mut Vec<String>) {
    args.push("-spatial-aq".into());
    args.push("1".into());
    args.push("-temporal-aq".into());
    args.push("1".into());
}

fn apply_hardware_rate_control(
    args: &mut Vec<String>,
    video: &VideoSettings,
    constraints: &VideoConstraints,
) {
    let cq = video.crf.map(|c| constraints.clamp_cq(c));
    let bitrate = video.bitrate_kbps.map(clamp_video_bitrate);

    match (cq, bitrate) {
        (Some(q), ceiling) => {
            push_constant_quality(args, q, ceiling);
            push_adaptive_quantization(args);
        }
        (None, Some(b)) => {
            args.push("-rc".into());
            args.push("vbr".into());
            args.push("-b:v".into());
            args.push(format!("{}k", b));
            args.push("-maxrate".into());
            args.push(format!("{}k", b * 3 / 2));
            args.push("-bufsize".into());
            args.push(format!("{}k", b * 2));
        }
        (None, None) => {
            push_constant_quality(args, constraints.clamp_cq(DEFAULT_HW_CQ), None);
            push_adaptive_quantization(args);
        }
    }
}

fn apply_preset(args: &mut Vec<String>, video: &VideoSettings, encoder: &ResolvedEncoder) {
    let Some(requested) = video.preset.as_deref().map(str::trim).filter(|p| !p.is_empty()) else {
        return;
    };
    let idx = preset_index(&requested.to_ascii_lowercase())
        .or_else(|| preset_index(DEFAULT_PRESET))
        .unwrap_or(PRESETS.len() / 2);

    if encoder.hardware {
        args.push("-preset".into());
        args.push(format!("p{}", NVENC_PRESETS[idx]));
        return;
    }

    match encoder.constraints.codec {
        VideoCodec::Vp9 => {
            // cpu-used: 0 = slowest, 8 = fastest
            args.push("-deadline".into());
            args.push("good".into());
            args.push("-cpu-used".into());
            args.push((PRESETS.len() - 1 - idx).to_string());
        }
        VideoCodec::Av1 => {
            args.push("-preset".into());
            args.push(SVT_AV1_PRESETS[idx].to_string());
        }
        _ => {
            args.push("-preset".into());
            args.push(PRESETS[idx].into());
        }
    }
}

fn build_video_filters(
    video: &VideoSettings,
    watermark: Option<&WatermarkSettings>,
) -> Vec<String> {
    let mut filters = Vec::new();

    if video.deinterlace {
        filters.push("yadif".to_string());
    }
    if video.denoise {
        filters.push("hqdn3d".to_string());
    }
    if let Some((w, h)) = video.resolution {
        let (w, h) = even_dimensions(w, h);
        if w >= 2 && h >= 2 {
            filters.push(format!("scale={}:{}", w, h));
        }
    }
    match video.rotation {
        Rotation::None => {}
        Rotation::Cw90 => filters.push("transpose=1".to_string()),
        Rotation::Cw180 => filters.push("hflip,vflip".to_string()),
        Rotation::Cw270 => filters.push("transpose=2".to_string()),
    }
    match video.flip {
        Flip::None => {}
        Flip::Horizontal => filters.push("hflip".to_string()),
        Flip::Vertical => filters.push("vflip".to_string()),
        Flip::Both => filters.push("hflip,vflip".to_string()),
    }
    if video.sharpen {
        filters.push("unsharp=5:5:1.0:5:5:0.0".to_string());
    }
    if video.speed_changed() {
        let speed = clamp_f64(video.speed, SPEED_RANGE);
        filters.push(format!("setpts=PTS/{}", fmt_num(speed)));
    }
    if let Some(wm) = watermark.filter(|w| !w.text.trim().is_empty()) {
        filters.push(drawtext_filter(wm));
    }

    filters
}

fn escape_drawtext(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '\'' | ':' | ',' | '%' | ';' | '[' | ']') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn drawtext_filter(wm: &WatermarkSettings) -> String {
    let (x, y) = match wm.position {
        WatermarkPosition::TopLeft => ("10", "10"),
        WatermarkPosition::TopRight => ("w-tw-10", "10"),
        WatermarkPosition::BottomLeft => ("10", "h-th-10"),
        WatermarkPosition::BottomRight => ("w-tw-10", "h-th-10"),
        WatermarkPosition::Center => ("(w-tw)/2", "(h-th)/2"),
    };
    let font_size = wm.font_size.clamp(FONT_SIZE_RANGE.0, FONT_SIZE_RANGE.1);
    let opacity = clamp_f64(wm.opacity, (0.0, 1.0));
    format!(
        "drawtext=text={}:fontsize={}:fontcolor=white@{}:x={}:y={}",
        escape_drawtext(wm.text.trim()),
        font_size,
        fmt_num(opacity),
        x,
        y
    )
}

/// Split a tempo factor into atempo stages within [0.5, 2.0]
fn atempo_chain(tempo: f64) -> Vec<String> {
    let mut remaining = clamp_f64(tempo, SPEED_RANGE);
    let mut stages = Vec::new();
    while remaining > 2.0 {
        stages.push("atempo=2".to_string());
        remaining /= 2.0;
    }
    while remaining < 0.5 {
        stages.push("atempo=0.5".to_string());
        remaining /= 0.5;
    }
    stages.push(format!("atempo={}", fmt_num(remaining)));
    stages
}

fn effect_filter(effect: AudioEffect) -> &'static str {
    match effect {
        AudioEffect::Echo => "aecho=0.8:0.88:60:0.4",
        AudioEffect::Reverb => "aecho=0.8:0.9:1000|1800:0.3|0.25",
        AudioEffect::BassBoost => "bass=g=6",
        AudioEffect::TrebleBoost => "treble=g=4",
        AudioEffect::VocalRemoval => "pan=stereo|c0=c0-c1|c1=c1-c0",
    }
}

/// Audio filter chain; empty when every value is neutral
fn build_audio_filters(audio: &AudioSettings, tempo: f64, sample_rate: u32) -> Vec<String> {
    let active = audio.active_filters(tempo);
    let mut filters = Vec::new();

    if active.contains(&"noise_reduction") {
        // 0..1 maps onto a noise floor of -80..-20 dB
        let level = clamp_f64(audio.noise_reduction, NOISE_REDUCTION_RANGE);
        filters.push(format!("afftdn=nf={}", fmt_num(-80.0 + level * 60.0)));
    }
    if active.contains(&"volume") {
        let pct = clamp_f64(audio.volume_pct, VOLUME_PCT_RANGE);
        filters.push(format!("volume={}", fmt_num(pct / 100.0)));
    }
    if active.contains(&"gain") {
        let db = clamp_f64(audio.gain_db, GAIN_DB_RANGE);
        filters.push(format!("volume={}dB", fmt_num(db)));
    }
    for band in audio.equalizer.iter().filter(|b| b.gain_db != 0.0) {
        filters.push(format!(
            "equalizer=f={}:t=q:w={}:g={}",
            fmt_num(clamp_f64(band.frequency_hz, EQ_FREQUENCY_RANGE)),
            fmt_num(band.width_q.max(0.1)),
            fmt_num(clamp_f64(band.gain_db, EQ_GAIN_DB_RANGE)),
        ));
    }
    let effects: BTreeSet<AudioEffect> = audio.effects.iter().copied().collect();
    for effect in effects {
        filters.push(effect_filter(effect).to_string());
    }
    if active.contains(&"pitch") {
        let semitones = clamp_f64(audio.pitch_semitones, PITCH_SEMITONE_RANGE);
        let ratio = 2f64.powf(semitones / 12.0);
        // asetrate scales whatever rate arrives, so pin the input rate first
        filters.push(format!(
            "aresample={sr},asetrate={},aresample={sr},atempo={}",
            (sample_rate as f64 * ratio).round() as u64,
            fmt_num(1.0 / ratio),
            sr = sample_rate,
        ));
    }
    if active.contains(&"tempo") {
        filters.extend(atempo_chain(tempo));
    }
    if audio.normalize {
        filters.push("loudnorm=I=-16:TP=-1.5:LRA=11".to_string());
    }

    filters
}

fn push_audio_encoder(
    args: &mut Vec<String>,
    encoder: &str,
    bitrate_kbps: Option<u32>,
    sample_rate: Option<u32>,
    channels: Option<u32>,
    filters: &[String],
) {
    args.push("-c:a".into());
    args.push(encoder.into());
    if let Some(b) = bitrate_kbps {
        args.push("-b:a".into());
        args.push(format!("{}k", b));
    }
    if let Some(sr) = sample_rate {
        args.push("-ar".into());
        args.push(sr.to_string());
    }
    if let Some(ch) = channels {
        args.push("-ac".into());
        args.push(ch.to_string());
    }
    if !filters.is_empty() {
        args.push("-af".into());
        args.push(filters.join(","));
    }
}

fn apply_audio_settings(args: &mut Vec<String>, audio: &AudioSettings, tempo: f64) {
    if audio.disabled {
        args.push("-an".into());
        return;
    }

    let constraints = audio_constraints(audio.codec);

    if constraints.passthrough {
        let filters = build_audio_filters(audio, tempo, SAFE_AUDIO_SAMPLE_RATE);
        if filters.is_empty() {
            args.push("-c:a".into());
            args.push("copy".into());
            return;
        }

        // A filtered stream cannot be copied; re-encode with a safe triple instead
        let safe = audio_constraints(SAFE_AUDIO_CODEC);
        warn!(
            encoder = safe.encoder,
            bitrate_kbps = SAFE_AUDIO_BITRATE_KBPS,
            "audio copy requested with active filters; overriding encoder"
        );
        push_audio_encoder(
            args,
            safe.encoder,
            Some(SAFE_AUDIO_BITRATE_KBPS),
            Some(SAFE_AUDIO_SAMPLE_RATE),
            Some(SAFE_AUDIO_CHANNELS),
            &filters,
        );
        return;
    }

    let sample_rate = constraints.clamp_sample_rate(audio.sample_rate);
    let channels = constraints.clamp_channels(audio.channels);
    let bitrate = constraints.clamp_bitrate(audio.bitrate_kbps);
    let filters = build_audio_filters(
        audio,
        tempo,
        sample_rate.unwrap_or(SAFE_AUDIO_SAMPLE_RATE),
    );

    push_audio_encoder(args, constraints.encoder, bitrate, sample_rate, channels, &filters);
}

/// Apply additional user-provided FFmpeg arguments.
/// Uses shell-style parsing so quoted strings with spaces are preserved.
fn apply_additional_args(args: &mut Vec<String>, additional_args: &str) {
    if additional_args.trim().is_empty() {
        return;
    }

    if let Some(parsed) = shlex::split(additional_args) {
        args.extend(parsed);
    } else {
        // Unbalanced quotes: fall back to a plain whitespace split
        args.extend(additional_args.split_whitespace().map(str::to_string));
    }
}
