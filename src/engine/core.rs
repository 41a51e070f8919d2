pub mod codecs;
mod ffmpeg_cmd;
mod ffmpeg_info;
mod log;
mod scan;
pub mod settings;
mod types;

pub use ffmpeg_cmd::{
    BuildError, BuiltCommand, DEFAULT_HW_CQ, ResolvedEncoder, build_ffmpeg_args, even_dimensions,
    ffmpeg_invocation, format_ffmpeg_args, resolve_video_encoder,
};
pub use ffmpeg_info::{
    DurationProbe, FfprobeProbe, ffmpeg_version, ffprobe_version, parse_ffprobe_duration,
};
pub use log::{render_log_path, write_render_log};
pub use scan::{
    build_job_from_path, collect_inputs, derive_output_path, is_video_file, scan_streaming,
};
pub use settings::{
    AudioCodec, AudioEffect, AudioSettings, EncodeSettings, EqBand, Flip, Rotation, VideoCodec,
    VideoSettings, WatermarkPosition, WatermarkSettings,
};
pub use types::{Job, JobId, JobStatus, ProgressParser, ProgressSnapshot, RenderMode, Slot};
