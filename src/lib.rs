// Temporalfix - streaming temporal-consistency fixer for video files
// Main library entry point

pub mod cli;
pub mod config;
pub mod encoding;
pub mod ffmpeg;
pub mod media;
pub mod pipeline;
pub mod timecode;
pub mod vapoursynth;
