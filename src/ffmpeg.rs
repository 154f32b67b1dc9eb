// FFmpeg command construction
//
// Builds the argument lists for the decoder (media file -> raw frames on
// stdout) and the encoder (raw frames on stdin -> container file). Both
// ends of the pipe describe frames with the same negotiated geometry; the
// builders only ever read it from `FrameGeometry` / the intermediate
// pixel format name.

use std::path::Path;
use std::process::{Command, Stdio};

use crate::config::ToolPaths;
use crate::encoding::EncoderParams;
use crate::media::{MediaInfo, PixelFormat, VideoInfo};

/// Input clipping options, pass-through strings in FFmpeg time syntax
#[derive(Debug, Clone, Default)]
pub struct ClipRange {
    pub ss: Option<String>,
    pub t: Option<String>,
    pub to: Option<String>,
}

impl ClipRange {
    /// -ss before -i (input seeking), -t/-to after; -t wins over -to
    fn extend(&self, args: &mut Vec<String>, before_input: bool) {
        if before_input {
            if let Some(ss) = &self.ss {
                args.extend(["-ss".into(), ss.clone()]);
            }
        } else if let Some(t) = &self.t {
            args.extend(["-t".into(), t.clone()]);
        } else if let Some(to) = &self.to {
            args.extend(["-to".into(), to.clone()]);
        }
    }
}

/// Arguments of the decoder process: decode the input file and emit raw
/// frames in the intermediate pixel format on stdout.
pub fn decoder_args(
    video: &VideoInfo,
    clip: &ClipRange,
    intermediate: &PixelFormat,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "warning".into(),
        "-nostats".into(),
    ];
    clip.extend(&mut args, true);
    args.extend(["-i".into(), video.filepath.to_string_lossy().into_owned()]);
    clip.extend(&mut args, false);
    args.extend([
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        intermediate.name.into(),
        "pipe:1".into(),
    ]);
    args
}

/// Arguments of the encoder process: consume raw frames on stdin, copy
/// audio/subtitles from the original when enabled, write the container.
pub fn encoder_args(
    media: &MediaInfo,
    params: &EncoderParams,
    intermediate: &PixelFormat,
) -> Vec<String> {
    let video = &media.video;
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-stats".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pixel_format".into(),
        intermediate.name.into(),
        "-video_size".into(),
        format!("{}x{}", video.width, video.height),
        "-r".into(),
        video.frame_rate.to_ffmpeg_arg(),
        "-i".into(),
        "pipe:0".into(),
    ];

    let passthrough = params.copy_audio && media.audio.nstreams > 0;
    if passthrough {
        args.extend(["-i".into(), video.filepath.to_string_lossy().into_owned()]);
    }

    if params.benchmark {
        args.extend(["-benchmark".into(), "-f".into(), "null".into(), "-".into()]);
        return args;
    }

    // Aspect ratios survive the raw pipe only if re-applied here
    let mut vf: Vec<String> = Vec::new();
    if video.sar != (1, 1) {
        vf.push(format!("setsar={}/{}", video.sar.0, video.sar.1));
    }
    if video.dar != (1, 1) {
        vf.push(format!("setdar={}/{}", video.dar.0, video.dar.1));
    }
    if !vf.is_empty() {
        args.extend(["-vf".into(), vf.join(",")]);
    }

    args.extend(["-map".into(), "0:v".into()]);

    // Color properties copied from the source unless user-overridden
    let colors: [(&str, &Option<String>); 4] = [
        ("colorspace", &video.color_space),
        ("color_trc", &video.color_transfer),
        ("color_primaries", &video.color_primaries),
        ("color_range", &video.color_range),
    ];
    for (option, value) in colors {
        if let Some(value) = value {
            if !params.extra_args.iter().any(|a| a == &format!("-{option}")) {
                args.extend([format!("-{option}"), value.clone()]);
            }
        }
    }

    let has = |opt: &str| params.extra_args.iter().any(|a| a == opt);
    if !has("-vcodec") {
        args.extend(["-vcodec".into(), params.encoder.ffmpeg_name().into()]);
    }
    if !has("-pix_fmt") {
        args.extend(["-pix_fmt".into(), params.pix_fmt.clone()]);
    }
    if let Some(preset) = &params.preset {
        if !has("-preset") {
            args.extend(["-preset".into(), preset.clone()]);
        }
    }
    if let Some(tune) = &params.tune {
        if !has("-tune") {
            args.extend(["-tune".into(), tune.clone()]);
        }
    }
    if let Some(crf) = params.crf {
        if !has("-crf") {
            args.extend(["-crf".into(), crf.to_string()]);
        }
    }

    if passthrough {
        args.extend(["-map".into(), "1:a".into(), "-acodec".into(), "copy".into()]);
        if media.subtitles.nstreams > 0 {
            args.extend(["-map".into(), "1:s".into(), "-scodec".into(), "copy".into()]);
        }
    }

    args.extend(params.extra_args.iter().cloned());

    // MKV keeps the source stream tags plus a record of the filter settings
    if params
        .output
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("mkv"))
    {
        args.extend(["-movflags".into(), "use_metadata_tags".into()]);
        for (k, v) in &video.metadata {
            args.extend(["-metadata:s:v:0".into(), format!("{k}={v}")]);
        }
    }

    args.push(params.output.to_string_lossy().into_owned());
    if params.overwrite {
        args.push("-y".into());
    }
    args
}

/// Tag recorded on the output video stream describing the applied filter
pub fn filter_metadata_tag(t_radius: u32, strength: u32) -> (String, String) {
    (
        "vs_temporal_fix".to_string(),
        format!("tr={t_radius}, strength={strength}"),
    )
}

/// Assemble a ready-to-spawn decoder command
pub fn decoder_command(
    tools: &ToolPaths,
    video: &VideoInfo,
    clip: &ClipRange,
    intermediate: &PixelFormat,
) -> Command {
    let mut cmd = Command::new(&tools.ffmpeg);
    cmd.args(decoder_args(video, clip, intermediate))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

/// Assemble a ready-to-spawn encoder command
pub fn encoder_command(
    tools: &ToolPaths,
    media: &MediaInfo,
    params: &EncoderParams,
    intermediate: &PixelFormat,
) -> Command {
    let mut cmd = Command::new(&tools.ffmpeg);
    cmd.args(encoder_args(media, params, intermediate))
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    cmd
}

/// Render an argument list for logging
pub fn display_command(program: &Path, args: &[String]) -> String {
    let mut s = program.to_string_lossy().into_owned();
    for a in args {
        s.push(' ');
        s.push_str(a);
    }
    s
}
