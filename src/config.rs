// Tool path configuration
//
// The external tools (ffmpeg, ffprobe, vspipe) and the VapourSynth script
// are resolved exactly once at startup into an explicit `ToolPaths` value
// that is passed down to the pipeline. An optional TOML file can override
// each location; otherwise conventional locations next to the executable
// are tried, falling back to bare names resolved through PATH.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Name of the VapourSynth script driven through vspipe
pub const FILTER_SCRIPT_NAME: &str = "vstf.vpy";

/// Resolved locations of every external collaborator
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub vspipe: PathBuf,
    /// VapourSynth script containing the temporal-fix filter graph
    pub filter_script: PathBuf,
    /// Directories used to rebuild PATH for the vspipe subprocess
    pub vs_search_dirs: Vec<PathBuf>,
}

/// On-disk override file, all fields optional
#[derive(Debug, Default, Deserialize)]
struct ToolPathsFile {
    ffmpeg: Option<PathBuf>,
    ffprobe: Option<PathBuf>,
    vspipe: Option<PathBuf>,
    filter_script: Option<PathBuf>,
    vs_search_dirs: Option<Vec<PathBuf>>,
}

impl ToolPaths {
    /// Resolve tool paths from the config file (if any) and conventional
    /// locations rooted at the installation directory.
    pub fn resolve() -> Self {
        let root_dir = install_root();
        let overrides = ToolPathsFile::load();

        let external = root_dir.join("external");
        let ffmpeg_dir = external.join("ffmpeg");
        let vspython_dir = external.join("vspython");

        let ffmpeg = overrides
            .ffmpeg
            .unwrap_or_else(|| locate(&ffmpeg_dir, "ffmpeg"));
        let ffprobe = overrides
            .ffprobe
            .unwrap_or_else(|| locate(&ffmpeg_dir, "ffprobe"));
        let vspipe = overrides.vspipe.unwrap_or_else(|| {
            if cfg!(windows) {
                vspython_dir.join("VSPipe.exe")
            } else {
                PathBuf::from("/usr/bin/vspipe")
            }
        });
        let filter_script = overrides
            .filter_script
            .unwrap_or_else(|| root_dir.join(FILTER_SCRIPT_NAME));

        let vs_search_dirs = overrides.vs_search_dirs.unwrap_or_else(|| {
            let mut dirs = vec![root_dir.clone()];
            if cfg!(windows) {
                for sub in ["", "vs-plugins", "vs-scripts", "Scripts"] {
                    dirs.push(vspython_dir.join(sub));
                }
            } else {
                dirs.push(PathBuf::from("/usr/lib/x86_64-linux-gnu/vapoursynth"));
                dirs.push(PathBuf::from("/usr/lib/bin"));
            }
            dirs
        });

        Self {
            ffmpeg,
            ffprobe,
            vspipe,
            filter_script,
            vs_search_dirs,
        }
    }

    /// Names of tools whose explicit path does not exist on disk.
    /// Bare names (to be resolved through PATH at spawn time) are not
    /// checked here.
    pub fn missing_tools(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        for (name, path) in [
            ("FFmpeg", &self.ffmpeg),
            ("FFprobe", &self.ffprobe),
            ("VSPipe", &self.vspipe),
        ] {
            if path.is_absolute() && !path.exists() {
                missing.push(name);
            }
        }
        if !self.filter_script.exists() {
            missing.push(FILTER_SCRIPT_NAME);
        }
        missing
    }
}

impl ToolPathsFile {
    /// Load overrides from the user config file, or defaults
    fn load() -> Self {
        let Some(path) = config_file_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(file) => file,
                Err(e) => {
                    log::warn!("Failed to parse {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

/// Directory the tool is installed in (executable directory, falling back
/// to the working directory)
fn install_root() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Pick the bundled tool binary when present, else the bare name for a
/// PATH lookup
fn locate(dir: &Path, name: &str) -> PathBuf {
    let file = if cfg!(windows) {
        format!("{name}.exe")
    } else {
        name.to_string()
    };
    let bundled = dir.join(&file);
    if bundled.exists() {
        bundled
    } else {
        PathBuf::from(file)
    }
}

/// User config file path
fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("temporalfix").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_names_are_not_reported_missing() {
        let tools = ToolPaths {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            vspipe: PathBuf::from("vspipe"),
            filter_script: PathBuf::from("/nonexistent/vstf.vpy"),
            vs_search_dirs: Vec::new(),
        };
        assert_eq!(tools.missing_tools(), vec![FILTER_SCRIPT_NAME]);
    }

    #[test]
    fn absolute_missing_paths_are_reported() {
        let tools = ToolPaths {
            ffmpeg: PathBuf::from("/nonexistent/ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            vspipe: PathBuf::from("/nonexistent/vspipe"),
            filter_script: PathBuf::from("/nonexistent/vstf.vpy"),
            vs_search_dirs: Vec::new(),
        };
        let missing = tools.missing_tools();
        assert!(missing.contains(&"FFmpeg"));
        assert!(missing.contains(&"VSPipe"));
        assert!(!missing.contains(&"FFprobe"));
    }
}
