// Static per-codec rules and the clamp helpers built on them

use super::settings::{AudioCodec, VideoCodec};

/// Allowed parameter sets for one audio codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConstraints {
    pub codec: AudioCodec,
    pub encoder: &'static str,
    pub sample_rates: &'static [u32],
    pub channels: &'static [u32],
    pub min_bitrate_kbps: u32,
    pub max_bitrate_kbps: u32,
    /// Empty for lossless and pass-through codecs
    pub bitrates_kbps: &'static [u32],
    pub default_bitrate_kbps: u32,
    pub lossless: bool,
    pub passthrough: bool,
    pub supports_filters: bool,
}

static AAC: AudioConstraints = AudioConstraints {
    codec: AudioCodec::Aac,
    encoder: "aac",
    sample_rates: &[
        8000, 11025, 12000, 16000, 22050, 24000, 32000, 44100, 48000, 64000, 88200, 96000,
    ],
    channels: &[1, 2, 6, 8],
    min_bitrate_kbps: 64,
    max_bitrate_kbps: 320,
    bitrates_kbps: &[64, 96, 128, 160, 192, 256, 320],
    default_bitrate_kbps: 192,
    lossless: false,
    passthrough: false,
    supports_filters: true,
};

// libmp3lame output is pinned to 44.1 kHz
static MP3: AudioConstraints = AudioConstraints {
    codec: AudioCodec::Mp3,
    encoder: "libmp3lame",
    sample_rates: &[44100],
    channels: &[1, 2],
    min_bitrate_kbps: 64,
    max_bitrate_kbps: 320,
    bitrates_kbps: &[64, 96, 128, 160, 192, 224, 256, 320],
    default_bitrate_kbps: 192,
    lossless: false,
    passthrough: false,
    supports_filters: true,
};

// libopus only accepts 48 kHz input without resampling artefacts
static OPUS: AudioConstraints = AudioConstraints {
    codec: AudioCodec::Opus,
    encoder: "libopus",
    sample_rates: &[48000],
    channels: &[1, 2, 6, 8],
    min_bitrate_kbps: 32,
    max_bitrate_kbps: 256,
    bitrates_kbps: &[32, 48, 64, 96, 128, 160, 192, 256],
    default_bitrate_kbps: 128,
    lossless: false,
    passthrough: false,
    supports_filters: true,
};

static VORBIS: AudioConstraints = AudioConstraints {
    codec: AudioCodec::Vorbis,
    encoder: "libvorbis",
    sample_rates: &[44100, 48000],
    channels: &[1, 2],
    min_bitrate_kbps: 64,
    max_bitrate_kbps: 320,
    bitrates_kbps: &[64, 96, 128, 160, 192, 256, 320],
    default_bitrate_kbps: 160,
    lossless: false,
    passthrough: false,
    supports_filters: true,
};

static FLAC: AudioConstraints = AudioConstraints {
    codec: AudioCodec::Flac,
    encoder: "flac",
    sample_rates: &[44100, 48000, 88200, 96000, 192000],
    channels: &[1, 2, 6],
    min_bitrate_kbps: 0,
    max_bitrate_kbps: 0,
    bitrates_kbps: &[],
    default_bitrate_kbps: 0,
    lossless: true,
    passthrough: false,
    supports_filters: true,
};

static PCM: AudioConstraints = AudioConstraints {
    codec: AudioCodec::Pcm,
    encoder: "pcm_s16le",
    sample_rates: &[44100, 48000, 96000],
    channels: &[1, 2],
    min_bitrate_kbps: 0,
    max_bitrate_kbps: 0,
    bitrates_kbps: &[],
    default_bitrate_kbps: 0,
    lossless: true,
    passthrough: false,
    supports_filters: true,
};

static AC3: AudioConstraints = AudioConstraints {
    codec: AudioCodec::Ac3,
    encoder: "ac3",
    sample_rates: &[32000, 44100, 48000],
    channels: &[1, 2, 6],
    min_bitrate_kbps: 96,
    max_bitrate_kbps: 640,
    bitrates_kbps: &[96, 128, 192, 256, 320, 384, 448, 640],
    default_bitrate_kbps: 384,
    lossless: false,
    passthrough: false,
    supports_filters: true,
};

static AUDIO_COPY: AudioConstraints = AudioConstraints {
    codec: AudioCodec::Copy,
    encoder: "copy",
    sample_rates: &[],
    channels: &[],
    min_bitrate_kbps: 0,
    max_bitrate_kbps: 0,
    bitrates_kbps: &[],
    default_bitrate_kbps: 0,
    lossless: false,
    passthrough: true,
    supports_filters: false,
};

/// Encoder triple substituted when a filtered audio copy is requested
pub const SAFE_AUDIO_CODEC: AudioCodec = AudioCodec::Aac;
pub const SAFE_AUDIO_BITRATE_KBPS: u32 = 192;
pub const SAFE_AUDIO_CHANNELS: u32 = 2;
pub const SAFE_AUDIO_SAMPLE_RATE: u32 = 48000;

pub fn audio_constraints(codec: AudioCodec) -> &'static AudioConstraints {
    match codec {
        AudioCodec::Aac => &AAC,
        AudioCodec::Mp3 => &MP3,
        AudioCodec::Opus => &OPUS,
        AudioCodec::Vorbis => &VORBIS,
        AudioCodec::Flac => &FLAC,
        AudioCodec::Pcm => &PCM,
        AudioCodec::Ac3 => &AC3,
        AudioCodec::Copy => &AUDIO_COPY,
    }
}

/// Closest member of `allowed`; ties resolve to the lower value
fn nearest(allowed: &[u32], target: u32) -> Option<u32> {
    allowed
        .iter()
        .copied()
        .min_by_key(|v| (v.abs_diff(target), *v))
}

impl AudioConstraints {
    pub fn has_bitrate(&self) -> bool {
        !self.bitrates_kbps.is_empty()
    }

    /// Codec mandates a single sample rate
    pub fn fixed_sample_rate(&self) -> Option<u32> {
        match self.sample_rates {
            [only] => Some(*only),
            _ => None,
        }
    }

    /// Nearest allowed sample rate; 48 kHz preferred when nothing was requested
    pub fn clamp_sample_rate(&self, requested: Option<u32>) -> Option<u32> {
        if let Some(fixed) = self.fixed_sample_rate() {
            return Some(fixed);
        }
        nearest(self.sample_rates, requested.unwrap_or(48000))
    }

    /// Nearest allowed channel count; stereo when nothing was requested
    pub fn clamp_channels(&self, requested: Option<u32>) -> Option<u32> {
        nearest(self.channels, requested.unwrap_or(2))
    }

    /// Bound to [min, max] then snap to the nearest discrete choice
    pub fn clamp_bitrate(&self, requested: Option<u32>) -> Option<u32> {
        if !self.has_bitrate() {
            return None;
        }
        let bounded = requested
            .unwrap_or(self.default_bitrate_kbps)
            .clamp(self.min_bitrate_kbps, self.max_bitrate_kbps);
        nearest(self.bitrates_kbps, bounded)
    }
}

/// Encoder mapping and quality bounds for one video codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoConstraints {
    pub codec: VideoCodec,
    pub software_encoder: &'static str,
    pub hardware_encoder: Option<&'static str>,
    /// Valid CRF range for the software encoder
    pub crf_range: (u32, u32),
    /// Valid CQ range for the hardware encoder
    pub cq_range: (u32, u32),
    pub default_container: &'static str,
    pub passthrough: bool,
    pub supports_filters: bool,
}

pub const MIN_VIDEO_BITRATE_KBPS: u32 = 100;
pub const MAX_VIDEO_BITRATE_KBPS: u32 = 200_000;

static H264: VideoConstraints = VideoConstraints {
    codec: VideoCodec::H264,
    software_encoder: "libx264",
    hardware_encoder: Some("h264_nvenc"),
    crf_range: (0, 51),
    cq_range: (0, 51),
    default_container: "mp4",
    passthrough: false,
    supports_filters: true,
};

static H265: VideoConstraints = VideoConstraints {
    codec: VideoCodec::H265,
    software_encoder: "libx265",
    hardware_encoder: Some("hevc_nvenc"),
    crf_range: (0, 51),
    cq_range: (0, 51),
    default_container: "mp4",
    passthrough: false,
    supports_filters: true,
};

static VP9: VideoConstraints = VideoConstraints {
    codec: VideoCodec::Vp9,
    software_encoder: "libvpx-vp9",
    hardware_encoder: None,
    crf_range: (0, 63),
    cq_range: (0, 63),
    default_container: "webm",
    passthrough: false,
    supports_filters: true,
};

static AV1: VideoConstraints = VideoConstraints {
    codec: VideoCodec::Av1,
    software_encoder: "libsvtav1",
    hardware_encoder: Some("av1_nvenc"),
    crf_range: (1, 63),
    cq_range: (0, 63),
    default_container: "mkv",
    passthrough: false,
    supports_filters: true,
};

static VIDEO_COPY: VideoConstraints = VideoConstraints {
    codec: VideoCodec::Copy,
    software_encoder: "copy",
    hardware_encoder: None,
    crf_range: (0, 0),
    cq_range: (0, 0),
    default_container: "mkv",
    passthrough: true,
    supports_filters: false,
};

pub fn video_constraints(codec: VideoCodec) -> &'static VideoConstraints {
    match codec {
        VideoCodec::H264 => &H264,
        VideoCodec::H265 => &H265,
        VideoCodec::Vp9 => &VP9,
        VideoCodec::Av1 => &AV1,
        VideoCodec::Copy => &VIDEO_COPY,
    }
}

impl VideoConstraints {
    pub fn is_hardware_acceleratable(&self) -> bool {
        self.hardware_encoder.is_some()
    }

    pub fn clamp_crf(&self, crf: u32) -> u32 {
        crf.clamp(self.crf_range.0, self.crf_range.1)
    }

    pub fn clamp_cq(&self, cq: u32) -> u32 {
        cq.clamp(self.cq_range.0, self.cq_range.1)
    }
}

pub fn clamp_video_bitrate(kbps: u32) -> u32 {
    kbps.clamp(MIN_VIDEO_BITRATE_KBPS, MAX_VIDEO_BITRATE_KBPS)
}

/// Software preset names, fastest first
pub const PRESETS: &[&str] = &[
    "ultrafast",
    "superfast",
    "veryfast",
    "faster",
    "fast",
    "medium",
    "slow",
    "slower",
    "veryslow",
];

pub const DEFAULT_PRESET: &str = "medium";

pub fn preset_index(name: &str) -> Option<usize> {
    PRESETS.iter().position(|p| *p == name)
}

// Filter parameter bounds shared by validation and the builder
pub const SPEED_RANGE: (f64, f64) = (0.25, 4.0);
pub const FPS_RANGE: (f64, f64) = (1.0, 240.0);
pub const VOLUME_PCT_RANGE: (f64, f64) = (0.0, 400.0);
pub const GAIN_DB_RANGE: (f64, f64) = (-30.0, 30.0);
pub const PITCH_SEMITONE_RANGE: (f64, f64) = (-12.0, 12.0);
pub const NOISE_REDUCTION_RANGE: (f64, f64) = (0.0, 1.0);
pub const EQ_GAIN_DB_RANGE: (f64, f64) = (-20.0, 20.0);
pub const EQ_FREQUENCY_RANGE: (f64, f64) = (20.0, 20_000.0);
pub const FONT_SIZE_RANGE: (u32, u32) = (8, 200);

/// Clamp into `range`, mapping NaN onto the lower bound
pub fn clamp_f64(value: f64, range: (f64, f64)) -> f64 {
    if value.is_nan() {
        range.0
    } else {
        value.clamp(range.0, range.1)
    }
}

pub fn in_range(value: f64, range: (f64, f64)) -> bool {
    value >= range.0 && value <= range.1
}
