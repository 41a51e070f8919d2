use clap::{Args, Parser, Subcommand};
use ffduo::engine::{AudioCodec, RenderMode, VideoCodec};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ffduo")]
#[command(about = "FFmpeg batch transcoder with CPU/GPU dual-slot scheduling", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log at debug level regardless of the configured level
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Encode files (directories are scanned for videos)
    Encode {
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        encode: EncodeArgs,
    },

    /// Show ffmpeg commands without executing (dry run)
    DryRun {
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        encode: EncodeArgs,
    },

    /// Probe a video file to get its duration
    Probe {
        /// Path to the video file
        file: PathBuf,
    },

    /// Check if ffmpeg and ffprobe are installed
    CheckFfmpeg,

    /// Turn raw ffmpeg error output into a short explanation
    ExplainError {
        /// Read the diagnostic text from a file (e.g. a render log)
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,

        /// Diagnostic text; read from stdin when neither this nor --file is given
        text: Option<String>,
    },

    /// Show config status and location, or create default config if missing
    InitConfig,
}

/// Scheduling and encode overrides shared by `encode` and `dry-run`
#[derive(Args, Debug, Clone, Default)]
pub struct EncodeArgs {
    /// Render mode: cpu, gpu or duo (overrides config)
    #[arg(long)]
    pub mode: Option<RenderMode>,

    /// Treat a hardware encoder as available (overrides config)
    #[arg(long)]
    pub gpu: bool,

    /// TOML file with [video], [audio] and [watermark] sections
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Video codec: h264, h265, vp9, av1 or copy
    #[arg(long)]
    pub video_codec: Option<VideoCodec>,

    /// Audio codec: aac, mp3, opus, vorbis, flac, pcm, ac3 or copy
    #[arg(long)]
    pub audio_codec: Option<AudioCodec>,

    /// Constant quality (CRF for software encoders, CQ for NVENC)
    #[arg(long)]
    pub crf: Option<u32>,

    /// Video bitrate in kb/s (a ceiling when --crf is also given)
    #[arg(long, value_name = "KBPS")]
    pub bitrate: Option<u32>,

    /// Speed preset, ultrafast..veryslow
    #[arg(long)]
    pub preset: Option<String>,

    /// Audio bitrate in kb/s, snapped to the codec's choices
    #[arg(long, value_name = "KBPS")]
    pub audio_bitrate: Option<u32>,

    /// Write outputs here instead of next to each input
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Suffix appended to output file stems (overrides config)
    #[arg(long)]
    pub suffix: Option<String>,
}

pub fn parse() -> Cli {
    Cli::parse()
}
