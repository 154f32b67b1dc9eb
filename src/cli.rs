// Command line interface for temporalfix

use std::path::PathBuf;

use clap::Parser;

/// Streaming wrapper around the vs_temporal_fix VapourSynth script.
///
/// Decodes the input video with FFmpeg, pipes raw frames through the
/// temporal-fix filter and re-encodes the result, without ever holding
/// the whole file in memory.
#[derive(Debug, Clone, Parser)]
#[command(name = "temporalfix", version, about)]
pub struct Args {
    /// Input video file
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output video file. If not specified, a suffix is appended to the
    /// input filename.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Suffix used when no output filename is specified
    #[arg(long, default_value = "_fixed")]
    pub suffix: String,

    /// Temporal radius: number of frames to average over. Higher means
    /// more stable; reduce it if you get ghosting on small movements.
    #[arg(short = 'r', long = "t-radius", value_parser = clap::value_parser!(u32).range(1..=10), default_value_t = 6)]
    pub t_radius: u32,

    /// Suppression strength of temporal inconsistencies. Higher means
    /// more aggressive.
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..=400), default_value_t = 300)]
    pub strength: u32,

    /// Seek the input to this position (HOURS:MM:SS.MILLISECONDS)
    #[arg(long)]
    pub ss: Option<String>,

    /// Limit the duration of data read from the input
    /// (HOURS:MM:SS.MILLISECONDS)
    #[arg(long)]
    pub t: Option<String>,

    /// Stop reading the input at this position. --to and --t are
    /// mutually exclusive, --t has priority.
    #[arg(long)]
    pub to: Option<String>,

    /// Video encoder
    #[arg(long = "encoder", value_enum, default_value_t = crate::encoding::VideoEncoder::H264)]
    pub encoder: crate::encoding::VideoEncoder,

    /// FFmpeg pixel format for the output (rgb/yuv only).
    /// Recommended: yuv420p, yuv420p10le, yuv420p12le
    #[arg(long = "pix-fmt", default_value = "yuv420p")]
    pub pix_fmt: String,

    /// FFmpeg encoder preset
    #[arg(long, value_parser = PRESETS)]
    pub preset: Option<String>,

    /// FFmpeg CRF
    #[arg(long)]
    pub crf: Option<i32>,

    /// FFmpeg tune setting
    #[arg(long, value_parser = TUNES)]
    pub tune: Option<String>,

    /// Custom options appended to the FFmpeg encoder command
    #[arg(long = "ffmpeg-args", default_value = "", allow_hyphen_values = true)]
    pub ffmpeg_args: String,

    /// Run the encoder in benchmark mode (no output file)
    #[arg(long)]
    pub benchmark: bool,

    /// Write a debug log file next to the output media
    #[arg(long)]
    pub log: bool,

    /// Display additional info
    #[arg(long)]
    pub debug: bool,
}

const PRESETS: [&str; 9] = [
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

const TUNES: [&str; 6] = [
    "film",
    "animation",
    "grain",
    "stillimage",
    "fastdecode",
    "zerolatency",
];

impl Args {
    /// True when any clipping option was given; clipping disables
    /// audio/subtitle passthrough.
    pub fn has_clipping(&self) -> bool {
        self.ss.is_some() || self.t.is_some() || self.to.is_some()
    }
}
