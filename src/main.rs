use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use clap::Parser;

use temporalfix::cli::Args;
use temporalfix::config::ToolPaths;
use temporalfix::encoding::EncoderParams;
use temporalfix::ffmpeg::{self, ClipRange};
use temporalfix::media::{probe_media, FrameGeometry};
use temporalfix::pipeline::{Pipeline, PipelineSettings};
use temporalfix::timecode::{parse_sexagesimal, seconds_to_frames, seconds_to_sexagesimal};
use temporalfix::vapoursynth;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let params = EncoderParams::from_args(&args)?;
    init_logging(&args, &params.output)?;

    let tools = ToolPaths::resolve();
    let missing = tools.missing_tools();
    if !missing.is_empty() {
        bail!("missing external tools: {}", missing.join(", "));
    }

    if !args.input.is_file() {
        bail!("input file not found: {}", args.input.display());
    }
    if !args.benchmark {
        if params.output == args.input {
            bail!("output would overwrite the input file");
        }
        if let Some(dir) = params.output.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)
                    .with_context(|| format!("cannot create output directory {}", dir.display()))?;
            }
        }
    }

    let mut media = probe_media(&tools, &args.input)
        .with_context(|| format!("cannot probe {}", args.input.display()))?;
    println!("Input:  {}", args.input.display());
    println!("        {}", media.video.summary());
    if args.benchmark {
        println!("Output: benchmark mode, no file written");
    } else {
        println!("Output: {}", params.output.display());
    }

    let clip = ClipRange {
        ss: args.ss.clone(),
        t: args.t.clone(),
        to: args.to.clone(),
    };
    let frame_count = clipped_frame_count(&media.video, &clip)?;
    if frame_count == 0 {
        bail!("the selected range contains no frames");
    }
    if args.has_clipping() {
        log::info!(
            "processing {frame_count} of {} frames",
            media.video.frame_count
        );
        log::info!("clipping enabled, audio/subtitle passthrough disabled");
    }

    let intermediate = params.intermediate_format();
    let geometry = FrameGeometry::new(media.video.width, media.video.height, intermediate);
    log::debug!(
        "pipe format {}, {} bytes per frame",
        intermediate.name,
        geometry.frame_size()
    );

    // the applied filter settings travel with the output stream
    let (tag, value) = ffmpeg::filter_metadata_tag(args.t_radius, args.strength);
    media.video.metadata.insert(tag, value);

    let decoder_args = ffmpeg::decoder_args(&media.video, &clip, intermediate);
    let encoder_args = ffmpeg::encoder_args(&media, &params, intermediate);
    let filter_args = vapoursynth::filter_args(
        &tools,
        media.video.width,
        media.video.height,
        args.t_radius,
        args.strength,
    );
    log::debug!(
        "decoder: {}",
        ffmpeg::display_command(&tools.ffmpeg, &decoder_args)
    );
    log::debug!(
        "filter:  {}",
        ffmpeg::display_command(&tools.vspipe, &filter_args)
    );
    log::debug!(
        "encoder: {}",
        ffmpeg::display_command(&tools.ffmpeg, &encoder_args)
    );

    let decoder = ffmpeg::decoder_command(&tools, &media.video, &clip, intermediate);
    let filter = vapoursynth::filter_command(
        &tools,
        media.video.width,
        media.video.height,
        args.t_radius,
        args.strength,
    );
    let encoder = ffmpeg::encoder_command(&tools, &media, &params, intermediate);

    let settings = PipelineSettings::new(geometry.frame_size(), frame_count);
    let started = Instant::now();
    let report = Pipeline::new(settings, decoder, filter, encoder)
        .run()
        .map_err(|e| {
            log::error!("{e}");
            e
        })
        .with_context(|| format!("failed to generate {}", params.output.display()))?;

    log::debug!(
        "{} frames decoded, {} chunks encoded, {} trailing bytes",
        report.frames_decoded,
        report.frames_encoded,
        report.trailing_bytes
    );

    if args.debug && !args.benchmark {
        verify_output(&tools, &params.output, frame_count);
    }

    let elapsed = seconds_to_sexagesimal(started.elapsed().as_secs_f64());
    println!("Done in {elapsed}.");
    Ok(())
}

fn init_logging(args: &Args, output: &Path) -> anyhow::Result<()> {
    let level = if args.debug { "debug" } else { "info" };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));
    if args.log {
        let mut name = output.as_os_str().to_owned();
        name.push(".log");
        let path = PathBuf::from(name);
        let file = fs::File::create(&path)
            .with_context(|| format!("cannot create log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

/// Frames the decoder will emit once input clipping is applied
fn clipped_frame_count(
    video: &temporalfix::media::VideoInfo,
    clip: &ClipRange,
) -> anyhow::Result<u64> {
    let parse = |label: &str, value: &Option<String>| -> anyhow::Result<Option<f64>> {
        match value {
            Some(s) => parse_sexagesimal(s)
                .map(Some)
                .with_context(|| format!("invalid {label} timecode \"{s}\"")),
            None => Ok(None),
        }
    };

    let start = parse("--ss", &clip.ss)?.unwrap_or(0.0);
    let end = if let Some(t) = parse("--t", &clip.t)? {
        start + t
    } else if let Some(to) = parse("--to", &clip.to)? {
        to
    } else {
        video.duration
    };
    let end = end.min(video.duration);
    if end <= start {
        return Ok(0);
    }

    let frames = seconds_to_frames(end - start, video.frame_rate);
    Ok(frames.min(video.frame_count))
}

/// Best-effort sanity check on the generated file
fn verify_output(tools: &ToolPaths, output: &Path, expected_frames: u64) {
    match probe_media(tools, output) {
        Ok(media) => {
            println!("Result: {}", media.video.summary());
            if media.video.frame_count != expected_frames {
                log::warn!(
                    "output has {} frames, expected {expected_frames}",
                    media.video.frame_count
                );
            }
        }
        Err(e) => log::warn!("cannot probe the generated file: {e}"),
    }
}
