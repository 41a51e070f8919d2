// Command builder behaviour through the public API

use crate::common::assertions::{
    assert_cmd_contains, assert_cmd_has_flag_value, assert_cmd_not_contains,
    assert_mutually_exclusive, assert_numeric_flag, cmd_string, flag_value,
};
use ffduo::engine::codecs::audio_constraints;
use ffduo::engine::{
    AudioCodec, AudioSettings, BuildError, EncodeSettings, Severity, VideoCodec,
    WatermarkSettings, build_ffmpeg_args, validate_settings,
};

fn build(settings: &EncodeSettings, prefer_hardware: bool) -> Vec<String> {
    build_ffmpeg_args(settings, prefer_hardware)
        .unwrap_or_else(|e| panic!("build failed: {}", e))
        .args
}

#[test]
fn test_h264_quality_and_bitrate_emit_capped_crf() {
    let mut settings = EncodeSettings::default();
    settings.video.crf = Some(23);
    settings.video.bitrate_kbps = Some(4000);

    let args = build(&settings, false);
    let cmd = cmd_string(&args);
    assert_numeric_flag(&args, "-crf", 23);
    assert_cmd_has_flag_value(&cmd, "-maxrate", "4000k");
    assert_cmd_has_flag_value(&cmd, "-bufsize", "8000k");
    assert_cmd_not_contains(&cmd, "-b:v 4000k");
}

#[test]
fn test_video_copy_with_filters_is_blocking() {
    let mut settings = EncodeSettings::default();
    settings.video.codec = VideoCodec::Copy;
    settings.video.sharpen = true;

    match build_ffmpeg_args(&settings, false) {
        Err(BuildError::Invalid(report)) => {
            let fields: Vec<&str> = report.errors().map(|i| i.field.as_str()).collect();
            assert_eq!(fields, vec!["video.filters"]);
        }
        Ok(built) => panic!("copy with filters must not build: {:?}", built.args),
    }
}

#[test]
fn test_video_copy_with_watermark_is_blocking() {
    let mut settings = EncodeSettings::default();
    settings.video.codec = VideoCodec::Copy;
    settings.watermark = Some(WatermarkSettings::new("preview"));
    assert!(build_ffmpeg_args(&settings, false).is_err());
}

#[test]
fn test_plain_video_copy() {
    let mut settings = EncodeSettings::default();
    settings.video.codec = VideoCodec::Copy;
    settings.video.crf = Some(20);

    let built = build_ffmpeg_args(&settings, true).unwrap();
    let cmd = cmd_string(&built.args);
    assert_cmd_has_flag_value(&cmd, "-c:v", "copy");
    assert_cmd_not_contains(&cmd, "-vf");
    assert_cmd_not_contains(&cmd, "-crf");
    assert!(!built.hardware);
    assert_eq!(built.warnings.len(), 1, "{:?}", built.warnings);
}

#[test]
fn test_audio_copy_with_filters_is_overridden_to_safe_encoder() {
    let mut settings = EncodeSettings::default();
    settings.audio.codec = AudioCodec::Copy;
    settings.audio.volume_pct = 150.0;

    let report = validate_settings(&settings, false);
    assert!(!report.has_errors());
    assert_eq!(report.issues_with(Severity::Override).count(), 1);

    let built = build_ffmpeg_args(&settings, false).unwrap();
    let cmd = cmd_string(&built.args);
    assert_cmd_contains(&cmd, "-c:a aac -b:a 192k -ar 48000 -ac 2 -af volume=1.5");
    assert_cmd_not_contains(&cmd, "-c:a copy");
    assert!(built.warnings.iter().any(|w| w.contains("audio copy")));
}

#[test]
fn test_audio_copy_without_filters_stays_copy() {
    let mut settings = EncodeSettings::default();
    settings.audio.codec = AudioCodec::Copy;
    settings.audio.bitrate_kbps = Some(320);

    let args = build(&settings, false);
    let cmd = cmd_string(&args);
    assert_cmd_has_flag_value(&cmd, "-c:a", "copy");
    assert_cmd_not_contains(&cmd, "-b:a");
    assert_cmd_not_contains(&cmd, "-af");
}

#[test]
fn test_speed_change_on_copy_audio_overrides() {
    let mut settings = EncodeSettings::default();
    settings.video.speed = 2.0;
    settings.audio.codec = AudioCodec::Copy;

    let args = build(&settings, false);
    assert_eq!(flag_value(&args, "-vf"), Some("setpts=PTS/2"));
    assert_eq!(flag_value(&args, "-c:a"), Some("aac"));
    assert_eq!(flag_value(&args, "-af"), Some("atempo=2"));
}

#[test]
fn test_hardware_request_without_hardware_encoder_falls_back() {
    let mut settings = EncodeSettings::default();
    settings.video.codec = VideoCodec::Vp9;
    settings.audio = AudioSettings::with_codec(AudioCodec::Opus);

    let built = build_ffmpeg_args(&settings, true).unwrap();
    assert_eq!(built.video_encoder, "libvpx-vp9");
    assert!(!built.hardware);
    assert!(
        built.warnings.iter().any(|w| w.contains("falling back")),
        "{:?}",
        built.warnings
    );
}

#[test]
fn test_hardware_encoders_per_codec() {
    for (codec, encoder) in [
        (VideoCodec::H264, "h264_nvenc"),
        (VideoCodec::H265, "hevc_nvenc"),
        (VideoCodec::Av1, "av1_nvenc"),
    ] {
        let mut settings = EncodeSettings::default();
        settings.video.codec = codec;
        let built = build_ffmpeg_args(&settings, true).unwrap();
        assert_eq!(built.video_encoder, encoder);
        assert!(built.hardware);
        let cmd = cmd_string(&built.args);
        assert_cmd_has_flag_value(&cmd, "-cq", "23");
        assert_mutually_exclusive(&cmd, "-crf", "-cq");
    }
}

#[test]
fn test_opus_always_uses_48k() {
    for requested in [None, Some(8000), Some(44100), Some(96000)] {
        let mut settings = EncodeSettings::default();
        settings.audio = AudioSettings::with_codec(AudioCodec::Opus);
        settings.audio.sample_rate = requested;
        let args = build(&settings, false);
        assert_eq!(flag_value(&args, "-c:a"), Some("libopus"));
        assert_numeric_flag(&args, "-ar", 48000);
    }
}

#[test]
fn test_mp3_always_uses_44k() {
    for requested in [None, Some(22050), Some(48000)] {
        let mut settings = EncodeSettings::default();
        settings.audio = AudioSettings::with_codec(AudioCodec::Mp3);
        settings.audio.sample_rate = requested;
        let args = build(&settings, false);
        assert_eq!(flag_value(&args, "-c:a"), Some("libmp3lame"));
        assert_numeric_flag(&args, "-ar", 44100);
    }
}

#[test]
fn test_emitted_audio_values_are_allowed_by_codec() {
    let codecs = [
        AudioCodec::Aac,
        AudioCodec::Mp3,
        AudioCodec::Opus,
        AudioCodec::Vorbis,
        AudioCodec::Ac3,
    ];
    for codec in codecs {
        let constraints = audio_constraints(codec);
        let mut settings = EncodeSettings::default();
        settings.audio = AudioSettings::with_codec(codec);
        settings.audio.bitrate_kbps = Some(999);
        settings.audio.channels = Some(5);
        settings.audio.sample_rate = Some(50000);

        let args = build(&settings, false);
        let bitrate: u32 = flag_value(&args, "-b:a")
            .and_then(|b| b.trim_end_matches('k').parse().ok())
            .unwrap();
        let rate: u32 = flag_value(&args, "-ar").and_then(|r| r.parse().ok()).unwrap();
        let channels: u32 = flag_value(&args, "-ac").and_then(|c| c.parse().ok()).unwrap();

        assert!(constraints.bitrates_kbps.contains(&bitrate), "{} {}", codec, bitrate);
        assert!(constraints.sample_rates.contains(&rate), "{} {}", codec, rate);
        assert!(constraints.channels.contains(&channels), "{} {}", codec, channels);
    }
}

#[test]
fn test_lossless_audio_omits_bitrate() {
    let mut settings = EncodeSettings::default();
    settings.audio = AudioSettings::with_codec(AudioCodec::Flac);
    settings.audio.bitrate_kbps = Some(320);

    let args = build(&settings, false);
    assert_eq!(flag_value(&args, "-c:a"), Some("flac"));
    assert_eq!(flag_value(&args, "-b:a"), None);
}

#[test]
fn test_resolution_rounds_down_to_even() {
    let mut settings = EncodeSettings::default();
    settings.video.resolution = Some((1281, 721));
    let args = build(&settings, false);
    assert_eq!(flag_value(&args, "-vf"), Some("scale=1280:720"));
}

#[test]
fn test_settings_load_from_toml() {
    let settings: EncodeSettings = toml::from_str(
        r#"
        [video]
        codec = "h265"
        crf = 28
        preset = "slow"

        [audio]
        codec = "opus"
        normalize = true
        "#,
    )
    .unwrap();

    let args = build(&settings, false);
    let cmd = cmd_string(&args);
    assert_cmd_has_flag_value(&cmd, "-c:v", "libx265");
    assert_cmd_has_flag_value(&cmd, "-preset", "slow");
    assert_cmd_contains(&cmd, "loudnorm");
}
