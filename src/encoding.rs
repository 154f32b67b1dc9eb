// Encoder selection and parameters
//
// Maps the command line to an explicit parameter set consumed by the
// FFmpeg encoder command builder. The intermediate pixel format (the one
// travelling on the raw pipes) is negotiated here as well.

use std::path::{Path, PathBuf};

use crate::cli::Args;
use crate::media::{pixel_format, PixelFormat};

/// Supported video encoders
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum VideoEncoder {
    H264,
    H265,
    Ffv1,
    Vp9,
}

impl VideoEncoder {
    /// FFmpeg -vcodec name
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            VideoEncoder::H264 => "libx264",
            VideoEncoder::H265 => "libx265",
            VideoEncoder::Ffv1 => "ffv1",
            VideoEncoder::Vp9 => "libvpx-vp9",
        }
    }

    /// Container extension used for derived output names
    pub fn extension(&self) -> &'static str {
        ".mkv"
    }
}

/// Everything the encoder command builder needs, resolved once
#[derive(Debug, Clone)]
pub struct EncoderParams {
    pub output: PathBuf,
    pub encoder: VideoEncoder,
    /// Output pixel format (not the pipe format)
    pub pix_fmt: String,
    pub preset: Option<String>,
    pub tune: Option<String>,
    pub crf: Option<i32>,
    /// Raw user-supplied FFmpeg options, split on whitespace
    pub extra_args: Vec<String>,
    /// Copy audio/subtitle streams from the source (disabled by clipping)
    pub copy_audio: bool,
    pub benchmark: bool,
    pub overwrite: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("pixel format \"{0}\" is not supported")]
    UnsupportedPixelFormat(String),
}

impl EncoderParams {
    /// Build encoder parameters from the command line. A `-pix_fmt` inside
    /// `--ffmpeg-args` overrides the dedicated option, matching FFmpeg's
    /// last-wins behavior.
    pub fn from_args(args: &Args) -> Result<Self, EncodingError> {
        let extra_args: Vec<String> = args
            .ffmpeg_args
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let mut pix_fmt = args.pix_fmt.clone();
        if let Some(pos) = extra_args.iter().position(|a| a == "-pix_fmt") {
            if let Some(v) = extra_args.get(pos + 1) {
                pix_fmt = v.clone();
            }
        }
        if pixel_format(&pix_fmt).is_none() {
            return Err(EncodingError::UnsupportedPixelFormat(pix_fmt));
        }

        let output = match &args.output {
            Some(path) => path.clone(),
            None => derived_output_path(
                &args.input,
                &args.suffix,
                args.t_radius,
                args.strength,
                args.encoder.extension(),
            ),
        };

        Ok(Self {
            output,
            encoder: args.encoder,
            pix_fmt,
            preset: args.preset.clone(),
            tune: args.tune.clone(),
            crf: args.crf,
            extra_args,
            copy_audio: !args.has_clipping(),
            benchmark: args.benchmark,
            overwrite: true,
        })
    }

    /// Pixel format used on the raw pipes between the three stages.
    /// 8-bit 4:2:0 output streams as-is; anything deeper goes through
    /// 16-bit 4:4:4 to avoid precision loss in the filter.
    pub fn intermediate_format(&self) -> &'static PixelFormat {
        let name = if self.pix_fmt == "yuv420p" {
            "yuv420p"
        } else {
            "yuv444p16le"
        };
        pixel_format(name).expect("intermediate formats are in the table")
    }
}

/// Output path derived from the input name, suffix and filter settings:
/// `<dir>/<stem><suffix>_<radius>_<strength><ext>`
fn derived_output_path(
    input: &Path,
    suffix: &str,
    t_radius: u32,
    strength: u32,
    extension: &str,
) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = format!("{stem}{suffix}_{t_radius}_{strength}{extension}");
    match input.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn derived_name_includes_settings() {
        let path = derived_output_path(Path::new("/videos/clip.mkv"), "_fixed", 6, 300, ".mkv");
        assert_eq!(path, PathBuf::from("/videos/clip_fixed_6_300.mkv"));
    }

    #[test]
    fn params_from_defaults() {
        let args = Args::parse_from(["temporalfix", "-i", "/videos/clip.mkv"]);
        let params = EncoderParams::from_args(&args).unwrap();
        assert_eq!(params.output, PathBuf::from("/videos/clip_fixed_6_300.mkv"));
        assert_eq!(params.encoder, VideoEncoder::H264);
        assert!(params.copy_audio);
        assert_eq!(params.intermediate_format().name, "yuv420p");
    }

    #[test]
    fn deep_output_uses_16bit_pipe() {
        let args = Args::parse_from(["temporalfix", "-i", "a.mkv", "--pix-fmt", "yuv420p10le"]);
        let params = EncoderParams::from_args(&args).unwrap();
        assert_eq!(params.intermediate_format().name, "yuv444p16le");
    }

    #[test]
    fn ffmpeg_args_pix_fmt_wins() {
        let args = Args::parse_from([
            "temporalfix",
            "-i",
            "a.mkv",
            "--ffmpeg-args",
            "-pix_fmt yuv420p12le",
        ]);
        let params = EncoderParams::from_args(&args).unwrap();
        assert_eq!(params.pix_fmt, "yuv420p12le");
    }

    #[test]
    fn clipping_disables_passthrough() {
        let args = Args::parse_from(["temporalfix", "-i", "a.mkv", "--ss", "00:00:10.000"]);
        let params = EncoderParams::from_args(&args).unwrap();
        assert!(!params.copy_audio);
    }

    #[test]
    fn bogus_pixel_format_is_rejected() {
        let args = Args::parse_from(["temporalfix", "-i", "a.mkv", "--pix-fmt", "notafmt"]);
        assert!(EncoderParams::from_args(&args).is_err());
    }
}
