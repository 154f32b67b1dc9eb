// VapourSynth filter process invocation
//
// The temporal-fix filter lives in a VapourSynth script driven through
// vspipe: raw frames in on stdin, filtered frames of identical geometry
// out on stdout. vspipe embeds its own Python runtime, so the child
// environment is scrubbed of anything that could make it pick up an
// unrelated interpreter installation, and PATH is rebuilt from a known
// set of directories instead of being inherited.

use std::ffi::OsString;
use std::process::{Command, Stdio};

use crate::config::ToolPaths;

/// Environment variables whose name or value contains one of these
/// substrings (case-insensitive) are removed before spawning vspipe
pub const ENV_BLOCKLIST: &[&str] = &["python", "conda", "vapoursynth", "ffmpeg"];

/// Arguments of the vspipe process
pub fn filter_args(tools: &ToolPaths, width: u32, height: u32, t_radius: u32, strength: u32) -> Vec<String> {
    vec![
        tools.filter_script.to_string_lossy().into_owned(),
        "--arg".into(),
        format!("width={width}"),
        "--arg".into(),
        format!("height={height}"),
        "--arg".into(),
        format!("tr={t_radius}"),
        "--arg".into(),
        format!("strength={strength}"),
        "-".into(),
    ]
}

/// Filter the inherited environment down to what vspipe may see.
/// Exposed over plain pairs so the policy is testable without touching
/// the real process environment.
pub fn scrub_env<I>(vars: I) -> Vec<(OsString, OsString)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter(|(key, value)| {
            if key.eq_ignore_ascii_case("PATH") {
                return false;
            }
            let key = key.to_string_lossy().to_lowercase();
            let value = value.to_string_lossy().to_lowercase();
            !ENV_BLOCKLIST
                .iter()
                .any(|n| key.contains(n) || value.contains(n))
        })
        .collect()
}

/// PATH rebuilt from the configured directories only
fn filter_path(tools: &ToolPaths) -> OsString {
    std::env::join_paths(&tools.vs_search_dirs).unwrap_or_default()
}

/// Assemble a ready-to-spawn vspipe command with a scrubbed environment
pub fn filter_command(
    tools: &ToolPaths,
    width: u32,
    height: u32,
    t_radius: u32,
    strength: u32,
) -> Command {
    let mut cmd = Command::new(&tools.vspipe);
    cmd.args(filter_args(tools, width, height, t_radius, strength))
        .env_clear()
        .envs(scrub_env(std::env::vars_os()))
        .env("PATH", filter_path(tools))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}
