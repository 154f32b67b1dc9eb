// Media probing
//
// Runs ffprobe once per input file and turns its JSON output into typed,
// immutable records. Everything the pipeline needs to know about the input
// (geometry, frame rate, frame count, color properties, stream counts for
// passthrough) is validated here, before any process is spawned.

pub mod pixel_format;

pub use pixel_format::{pixel_format, ChannelOrder, FrameGeometry, PixelFormat};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;

use crate::config::ToolPaths;
use crate::timecode::FrameRate;

/// Error type for media probing
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ffprobe failed: {0}")]
    Probe(String),

    #[error("failed to parse ffprobe output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no video stream in {0}")]
    NoVideoStream(PathBuf),

    #[error("pixel format \"{0}\" is not supported")]
    UnsupportedPixelFormat(String),

    #[error("malformed {field} in probe data")]
    Malformed { field: &'static str },
}

/// Field order of the first video stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOrder {
    Progressive,
    TopFieldFirst,
    BottomFieldFirst,
    TopCodedBottomDisplayed,
    BottomCodedTopDisplayed,
}

impl FieldOrder {
    fn parse(s: &str) -> Self {
        match s {
            "tt" => Self::TopFieldFirst,
            "bb" => Self::BottomFieldFirst,
            "tb" => Self::TopCodedBottomDisplayed,
            "bt" => Self::BottomCodedTopDisplayed,
            _ => Self::Progressive,
        }
    }
}

/// Properties of the first video stream of the probed media
#[derive(Debug, Clone)]
pub struct VideoInfo {
    pub filepath: PathBuf,
    pub width: u32,
    pub height: u32,
    pub pix_fmt: String,
    pub pixel_format: &'static PixelFormat,
    /// Sample aspect ratio
    pub sar: (u32, u32),
    /// Display aspect ratio
    pub dar: (u32, u32),
    pub field_order: FieldOrder,
    pub is_interlaced: bool,
    pub frame_rate: FrameRate,
    pub avg_frame_rate: FrameRate,
    pub is_frame_rate_fixed: bool,
    pub codec: String,
    pub profile: Option<String>,
    pub color_range: Option<String>,
    pub color_space: Option<String>,
    pub color_transfer: Option<String>,
    pub color_primaries: Option<String>,
    pub duration: f64,
    pub frame_count: u64,
    /// Stream tags, minus bookkeeping entries re-generated on encode
    pub metadata: HashMap<String, String>,
}

/// Audio/subtitle sides only matter for passthrough mapping
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamCount {
    pub nstreams: usize,
}

#[derive(Debug, Clone)]
pub struct MediaInfo {
    pub video: VideoInfo,
    pub audio: StreamCount,
    pub subtitles: StreamCount,
}

// ffprobe JSON shapes; only the fields this tool reads

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: String,
    codec_name: Option<String>,
    profile: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    pix_fmt: Option<String>,
    sample_aspect_ratio: Option<String>,
    display_aspect_ratio: Option<String>,
    field_order: Option<String>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    color_range: Option<String>,
    color_space: Option<String>,
    color_transfer: Option<String>,
    color_primaries: Option<String>,
    tags: Option<HashMap<String, String>>,
}

/// Stream tags dropped from the copied metadata; they are regenerated by
/// the encoder or meaningless after the transform
const DROPPED_TAGS: &[&str] = &[
    "duration",
    "encoder",
    "creation_time",
    "handler_name",
    "vendor_id",
];

/// Probe a media file with ffprobe and extract typed info about its first
/// video stream plus audio/subtitle stream counts.
pub fn probe_media(tools: &ToolPaths, path: &Path) -> Result<MediaInfo, MediaError> {
    let output = Command::new(&tools.ffprobe)
        .args(["-v", "error", "-show_format", "-show_streams", "-of", "json"])
        .arg(path)
        .output()?;
    if !output.status.success() {
        return Err(MediaError::Probe(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    let probe: ProbeOutput = serde_json::from_slice(&output.stdout)?;
    media_info_from_probe(path, probe)
}

fn media_info_from_probe(path: &Path, probe: ProbeOutput) -> Result<MediaInfo, MediaError> {
    let audio = StreamCount {
        nstreams: probe.streams.iter().filter(|s| s.codec_type == "audio").count(),
    };
    let subtitles = StreamCount {
        nstreams: probe
            .streams
            .iter()
            .filter(|s| s.codec_type == "subtitle")
            .count(),
    };

    // Only the first video stream is used
    let stream = probe
        .streams
        .into_iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::NoVideoStream(path.to_path_buf()))?;

    let duration: f64 = probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse().ok())
        .ok_or(MediaError::Malformed { field: "duration" })?;

    let pix_fmt = stream
        .pix_fmt
        .ok_or(MediaError::Malformed { field: "pix_fmt" })?;
    let pixel_format = pixel_format(&pix_fmt)
        .ok_or_else(|| MediaError::UnsupportedPixelFormat(pix_fmt.clone()))?;

    let width = stream.width.ok_or(MediaError::Malformed { field: "width" })?;
    let height = stream
        .height
        .ok_or(MediaError::Malformed { field: "height" })?;

    let frame_rate = stream
        .r_frame_rate
        .as_deref()
        .and_then(FrameRate::parse)
        .ok_or(MediaError::Malformed { field: "r_frame_rate" })?;
    let avg_frame_rate = stream
        .avg_frame_rate
        .as_deref()
        .and_then(FrameRate::parse)
        .unwrap_or(frame_rate);

    let field_order = stream
        .field_order
        .as_deref()
        .map(FieldOrder::parse)
        .unwrap_or(FieldOrder::Progressive);

    let mut metadata: HashMap<String, String> = stream.tags.clone().unwrap_or_default();
    metadata.retain(|k, _| !DROPPED_TAGS.contains(&k.to_ascii_lowercase().as_str()));

    let mut frame_count = (duration * frame_rate.as_f64()).round() as u64;
    let mut frame_rate = frame_rate;
    let mut avg_frame_rate = avg_frame_rate;

    // A NUMBER_OF_FRAMES tag (mkvmerge statistics) is more reliable than
    // duration * rate; when it disagrees, trust it and refine the rate.
    if let Some(tag_count) = stream
        .tags
        .as_ref()
        .and_then(|t| t.get("NUMBER_OF_FRAMES"))
        .and_then(|v| v.parse::<u64>().ok())
    {
        if tag_count != frame_count && duration > 0.0 {
            frame_count = tag_count;
            let refined = FrameRate::new(
                (tag_count as f64 / duration * 1000.0).round() as u32,
                1000,
            );
            frame_rate = refined;
            avg_frame_rate = refined;
        }
    }

    let video = VideoInfo {
        filepath: path.to_path_buf(),
        width,
        height,
        pix_fmt,
        pixel_format,
        sar: parse_ratio(stream.sample_aspect_ratio.as_deref()),
        dar: parse_ratio(stream.display_aspect_ratio.as_deref()),
        field_order,
        is_interlaced: field_order != FieldOrder::Progressive,
        is_frame_rate_fixed: frame_rate == avg_frame_rate,
        frame_rate,
        avg_frame_rate,
        codec: stream.codec_name.unwrap_or_default(),
        profile: stream
            .profile
            .map(|p| p.replace(' ', "_").to_ascii_lowercase()),
        color_range: stream.color_range,
        color_space: stream.color_space,
        color_transfer: stream.color_transfer,
        color_primaries: stream.color_primaries,
        duration,
        frame_count,
        metadata,
    };

    Ok(MediaInfo {
        video,
        audio,
        subtitles,
    })
}

/// Parse "n:m" aspect ratios, defaulting to square
fn parse_ratio(s: Option<&str>) -> (u32, u32) {
    s.and_then(|s| {
        let (n, m) = s.split_once(':')?;
        Some((n.parse().ok()?, m.parse().ok()?))
    })
    .unwrap_or((1, 1))
}

impl VideoInfo {
    /// One-line human readable summary, e.g.
    /// "1500 frames, 1920x1080, 29.97 fps, yuv420p"
    pub fn summary(&self) -> String {
        let mut s = format!(
            "{} frames, {}x{}, {} fps, {}",
            self.frame_count, self.width, self.height, self.frame_rate, self.pix_fmt
        );
        if self.sar != (1, 1) {
            s.push_str(&format!(", SAR {}:{}", self.sar.0, self.sar.1));
        }
        if self.dar != (1, 1) {
            s.push_str(&format!(", DAR {}:{}", self.dar.0, self.dar.1));
        }
        s
    }
}
