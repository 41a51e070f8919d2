// Encode settings fed to the command builder

use super::codecs::video_constraints;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

const NEUTRAL_EPSILON: f64 = 1e-6;

fn differs(value: f64, neutral: f64) -> bool {
    (value - neutral).abs() > NEUTRAL_EPSILON
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    #[default]
    H264,
    H265,
    Vp9,
    Av1,
    Copy,
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VideoCodec::H264 => "h264",
            VideoCodec::H265 => "h265",
            VideoCodec::Vp9 => "vp9",
            VideoCodec::Av1 => "av1",
            VideoCodec::Copy => "copy",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for VideoCodec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "h264" | "avc" | "x264" => Ok(VideoCodec::H264),
            "h265" | "hevc" | "x265" => Ok(VideoCodec::H265),
            "vp9" => Ok(VideoCodec::Vp9),
            "av1" => Ok(VideoCodec::Av1),
            "copy" => Ok(VideoCodec::Copy),
            other => Err(format!("unknown video codec '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    #[default]
    Aac,
    Mp3,
    Opus,
    Vorbis,
    Flac,
    Pcm,
    Ac3,
    Copy,
}

impl fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AudioCodec::Aac => "aac",
            AudioCodec::Mp3 => "mp3",
            AudioCodec::Opus => "opus",
            AudioCodec::Vorbis => "vorbis",
            AudioCodec::Flac => "flac",
            AudioCodec::Pcm => "pcm",
            AudioCodec::Ac3 => "ac3",
            AudioCodec::Copy => "copy",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for AudioCodec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aac" => Ok(AudioCodec::Aac),
            "mp3" => Ok(AudioCodec::Mp3),
            "opus" => Ok(AudioCodec::Opus),
            "vorbis" => Ok(AudioCodec::Vorbis),
            "flac" => Ok(AudioCodec::Flac),
            "pcm" | "wav" => Ok(AudioCodec::Pcm),
            "ac3" => Ok(AudioCodec::Ac3),
            "copy" => Ok(AudioCodec::Copy),
            other => Err(format!("unknown audio codec '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Flip {
    #[default]
    None,
    Horizontal,
    Vertical,
    Both,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AudioEffect {
    Echo,
    Reverb,
    BassBoost,
    TrebleBoost,
    VocalRemoval,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EqBand {
    pub frequency_hz: f64,
    pub gain_db: f64,
    #[serde(default = "default_eq_width")]
    pub width_q: f64,
}

fn default_eq_width() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoSettings {
    #[serde(default)]
    pub codec: VideoCodec,

    /// Constant-quality value (CRF for software, CQ for hardware)
    #[serde(default)]
    pub crf: Option<u32>,

    #[serde(default)]
    pub bitrate_kbps: Option<u32>,

    /// Keep the source frame rate; `fps` is ignored while set
    #[serde(default = "default_true")]
    pub auto_fps: bool,

    #[serde(default)]
    pub fps: Option<f64>,

    /// Target (width, height); rounded down to even numbers
    #[serde(default)]
    pub resolution: Option<(u32, u32)>,

    #[serde(default)]
    pub preset: Option<String>,

    /// Playback speed factor, 1.0 = unchanged
    #[serde(default = "default_speed")]
    pub speed: f64,

    #[serde(default)]
    pub rotation: Rotation,

    #[serde(default)]
    pub flip: Flip,

    #[serde(default)]
    pub deinterlace: bool,

    #[serde(default)]
    pub denoise: bool,

    #[serde(default)]
    pub sharpen: bool,

    /// Output container extension; the codec's default when unset
    #[serde(default)]
    pub container: Option<String>,

    /// Extra encoder arguments, shell-quoted
    #[serde(default)]
    pub extra_args: String,
}

fn default_true() -> bool {
    true
}

fn default_speed() -> f64 {
    1.0
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            codec: VideoCodec::default(),
            crf: None,
            bitrate_kbps: None,
            auto_fps: true,
            fps: None,
            resolution: None,
            preset: None,
            speed: default_speed(),
            rotation: Rotation::None,
            flip: Flip::None,
            deinterlace: false,
            denoise: false,
            sharpen: false,
            container: None,
            extra_args: String::new(),
        }
    }
}

impl VideoSettings {
    pub fn with_codec(codec: VideoCodec) -> Self {
        Self {
            codec,
            ..Self::default()
        }
    }

    /// Fixed output frame rate, if one was requested
    pub fn fixed_fps(&self) -> Option<f64> {
        if self.auto_fps { None } else { self.fps }
    }

    pub fn speed_changed(&self) -> bool {
        differs(self.speed, 1.0)
    }

    /// Names of enabled filter-graph fragments other than rotation/flip
    pub fn active_filters(&self) -> Vec<&'static str> {
        let mut active = Vec::new();
        if self.deinterlace {
            active.push("deinterlace");
        }
        if self.denoise {
            active.push("denoise");
        }
        if self.resolution.is_some() {
            active.push("scale");
        }
        if self.sharpen {
            active.push("sharpen");
        }
        if self.speed_changed() {
            active.push("speed");
        }
        active
    }

    pub fn has_transform(&self) -> bool {
        self.rotation != Rotation::None || self.flip != Flip::None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioSettings {
    #[serde(default)]
    pub codec: AudioCodec,

    #[serde(default)]
    pub bitrate_kbps: Option<u32>,

    #[serde(default)]
    pub channels: Option<u32>,

    #[serde(default)]
    pub sample_rate: Option<u32>,

    /// Linear volume in percent, 100 = unchanged
    #[serde(default = "default_volume")]
    pub volume_pct: f64,

    #[serde(default)]
    pub gain_db: f64,

    #[serde(default)]
    pub normalize: bool,

    #[serde(default)]
    pub pitch_semitones: f64,

    /// 0.0 (off) to 1.0 (strongest)
    #[serde(default)]
    pub noise_reduction: f64,

    #[serde(default)]
    pub equalizer: Vec<EqBand>,

    #[serde(default)]
    pub effects: Vec<AudioEffect>,

    /// Drop the audio stream entirely
    #[serde(default)]
    pub disabled: bool,
}

fn default_volume() -> f64 {
    100.0
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            codec: AudioCodec::default(),
            bitrate_kbps: None,
            channels: None,
            sample_rate: None,
            volume_pct: default_volume(),
            gain_db: 0.0,
            normalize: false,
            pitch_semitones: 0.0,
            noise_reduction: 0.0,
            equalizer: Vec::new(),
            effects: Vec::new(),
            disabled: false,
        }
    }
}

impl AudioSettings {
    pub fn with_codec(codec: AudioCodec) -> Self {
        Self {
            codec,
            ..Self::default()
        }
    }

    /// Names of audio filters that differ from their neutral value.
    /// `tempo` is the playback speed inherited from the video settings.
    pub fn active_filters(&self, tempo: f64) -> Vec<&'static str> {
        let mut active = Vec::new();
        if differs(self.volume_pct, 100.0) {
            active.push("volume");
        }
        if differs(self.gain_db, 0.0) {
            active.push("gain");
        }
        if self.normalize {
            active.push("normalize");
        }
        if differs(self.pitch_semitones, 0.0) {
            active.push("pitch");
        }
        if self.noise_reduction > NEUTRAL_EPSILON {
            active.push("noise_reduction");
        }
        if self.equalizer.iter().any(|b| differs(b.gain_db, 0.0)) {
            active.push("equalizer");
        }
        if !self.effects.is_empty() {
            active.push("effects");
        }
        if differs(tempo, 1.0) {
            active.push("tempo");
        }
        active
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
    Center,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatermarkSettings {
    pub text: String,

    #[serde(default)]
    pub position: WatermarkPosition,

    #[serde(default = "default_font_size")]
    pub font_size: u32,

    /// 0.0 (invisible) to 1.0 (opaque)
    #[serde(default = "default_opacity")]
    pub opacity: f64,
}

fn default_font_size() -> u32 {
    24
}

fn default_opacity() -> f64 {
    0.5
}

impl WatermarkSettings {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            position: WatermarkPosition::default(),
            font_size: default_font_size(),
            opacity: default_opacity(),
        }
    }
}

/// Everything the command builder needs for one encode
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EncodeSettings {
    #[serde(default)]
    pub video: VideoSettings,

    #[serde(default)]
    pub audio: AudioSettings,

    #[serde(default)]
    pub watermark: Option<WatermarkSettings>,
}

impl EncodeSettings {
    /// Output container extension. Stream copy keeps the input's extension.
    pub fn output_container(&self, input: &Path) -> String {
        if let Some(container) = self.video.container.as_deref() {
            let container = container.trim().trim_start_matches('.');
            if !container.is_empty() {
                return container.to_ascii_lowercase();
            }
        }
        if self.video.codec == VideoCodec::Copy {
            if let Some(ext) = input.extension().and_then(|e| e.to_str()) {
                return ext.to_ascii_lowercase();
            }
        }
        video_constraints(self.video.codec).default_container.to_string()
    }
}
