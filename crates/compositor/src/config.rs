//! Command line and runtime configuration

use std::path::PathBuf;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Help text for `-h/--help`.
pub const USAGE: &str = "\
compositor - window compositor

usage: compositor [-n [-g WxH]] [-h] [command ...]

 -n --nested     Run in a window.
 -g --geometry   Set the size of the server framebuffer.
 -h --help       Show this help message.

Trailing arguments name the first client to start in place of the
default greeter.
";

/// Parsed command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    /// Run nested inside another display instead of fullscreen
    pub nested: bool,
    /// Virtual framebuffer size from `-g WxH`
    pub geometry: Option<(u32, u32)>,
    pub help: bool,
    /// Command to start as the first client (empty = the configured greeter)
    pub exec: Vec<String>,
}

impl Options {
    /// Parse arguments (without the program name).
    pub fn parse(args: &[String]) -> Result<Options> {
        let mut options = Options::default();
        let mut iter = args.iter().peekable();

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "-n" | "--nested" | "--nest" => options.nested = true,
                "-h" | "--help" => options.help = true,
                "-g" | "--geometry" => {
                    let Some(value) = iter.next() else {
                        bail!("missing argument for {arg}");
                    };
                    options.geometry = Some(parse_geometry(value)?);
                }
                _ => {
                    // First non-flag argument starts the exec command
                    options.exec.push(arg.clone());
                    options.exec.extend(iter.by_ref().cloned());
                }
            }
        }
        Ok(options)
    }
}

fn parse_geometry(value: &str) -> Result<(u32, u32)> {
    let Some((w, h)) = value.split_once('x') else {
        bail!("invalid geometry {value:?}, expected WxH");
    };
    match (w.parse::<u32>(), h.parse::<u32>()) {
        (Ok(w), Ok(h)) if w > 0 && h > 0 => Ok((w, h)),
        _ => bail!("invalid geometry {value:?}, expected WxH"),
    }
}

/// Ambient configuration, loaded from `compositor/config.toml` under the XDG
/// config directory or `/etc`, falling back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory the preloaded font files live in
    pub font_dir: PathBuf,

    /// Raw 64x64 ARGB32 cursor sprite
    pub cursor_sprite: PathBuf,

    /// First client started when no command is given on the command line
    pub greeter: String,

    /// Mouse device node
    pub mouse_device: PathBuf,

    /// Keyboard device node
    pub keyboard_device: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            font_dir: PathBuf::from("/usr/share/fonts"),
            cursor_sprite: PathBuf::from("/usr/share/compositor/arrow.argb"),
            greeter: "/usr/libexec/greeter".to_string(),
            mouse_device: PathBuf::from("/dev/mouse"),
            keyboard_device: PathBuf::from("/dev/kbd"),
        }
    }
}

impl Config {
    /// Load configuration from disk, falling back to defaults.
    pub fn load() -> Self {
        let paths = [
            config_dir().map(|dir| dir.join("compositor/config.toml")),
            Some(PathBuf::from("/etc/compositor/config.toml")),
        ];

        for path in paths.into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(content) => match toml::from_str::<Config>(&content) {
                    Ok(config) => {
                        tracing::info!(?path, "loaded configuration");
                        return config;
                    }
                    Err(error) => {
                        tracing::warn!(?path, %error, "failed to parse config");
                    }
                },
                Err(error) => {
                    tracing::warn!(?path, %error, "failed to read config");
                }
            }
        }

        tracing::info!("using default configuration");
        Self::default()
    }
}

fn config_dir() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
}
