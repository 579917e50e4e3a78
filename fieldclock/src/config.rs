use anyhow::{Context, Result};
use directories::ProjectDirs;
use fieldclock_core::{CONFIG_FILE, DEFAULT_SOCKET_PATH};
use ratatui::style::Color;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub theme: Theme,
    pub icons: Icons,
    pub timing: Timing,
    pub day: DayConfig,
    pub ipc: IpcConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Theme {
    #[serde(deserialize_with = "hex_to_color")]
    pub background: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub foreground: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub selection: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub black: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub red: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub green: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub yellow: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub blue: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub magenta: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub cyan: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub gray: Color,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Icons {
    pub work_day: String,
    pub task_list: String,
    pub play: String,
    pub pause: String,
    pub not_started: String,
    pub done: String,
    pub select: String,
    pub input_cursor: String,
    pub separator: String,
    pub header_left: String,
    pub header_right: String,
}

/// Refresh and save cadence.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Timing {
    /// Redraw interval for live `HH:MM:SS` values.
    pub live_refresh_secs: u64,
    /// Redraw interval for the minute-resolution task list when idle.
    pub list_refresh_secs: u64,
    pub autosave_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DayConfig {
    pub target_hours: f64,
    pub notify: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IpcConfig {
    pub socket_path: PathBuf,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            background: Color::Rgb(9, 14, 19),
            foreground: Color::Rgb(197, 201, 199),
            selection: Color::Rgb(230, 195, 132),
            black: Color::Rgb(13, 12, 12),
            red: Color::Rgb(228, 104, 118),
            green: Color::Rgb(138, 154, 123),
            yellow: Color::Rgb(196, 178, 138),
            blue: Color::Rgb(127, 180, 202),
            magenta: Color::Rgb(162, 146, 163),
            cyan: Color::Rgb(122, 168, 159),
            gray: Color::Rgb(164, 167, 164),
        }
    }
}

impl Default for Icons {
    fn default() -> Self {
        Self {
            work_day: "◷".to_string(),
            task_list: "⬢".to_string(),
            play: "▶".to_string(),
            pause: "⏸".to_string(),
            not_started: "☐".to_string(),
            done: "☑".to_string(),
            select: "▸".to_string(),
            input_cursor: "▊".to_string(),
            separator: "│".to_string(),
            header_left: "⟪ ".to_string(),
            header_right: " ⟫".to_string(),
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            live_refresh_secs: 1,
            list_refresh_secs: 60,
            autosave_secs: 5,
        }
    }
}

impl Timing {
    pub fn live_refresh(&self) -> Duration {
        Duration::from_secs(self.live_refresh_secs.max(1))
    }

    pub fn list_refresh(&self) -> Duration {
        Duration::from_secs(self.list_refresh_secs.max(1))
    }

    pub fn autosave(&self) -> Duration {
        Duration::from_secs(self.autosave_secs.max(1))
    }
}

impl Default for DayConfig {
    fn default() -> Self {
        Self {
            target_hours: 8.0,
            notify: true,
        }
    }
}

impl DayConfig {
    pub fn target_secs(&self) -> u64 {
        (self.target_hours.max(0.0) * 3600.0) as u64
    }
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
        }
    }
}

fn hex_to_color<'de, D>(deserializer: D) -> Result<Color, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = serde::Deserialize::deserialize(deserializer)?;
    if !s.is_ascii() || !s.starts_with('#') || s.len() != 7 {
        return Err(serde::de::Error::custom("invalid hex color format"));
    }
    let r = u8::from_str_radix(&s[1..3], 16).map_err(serde::de::Error::custom)?;
    let g = u8::from_str_radix(&s[3..5], 16).map_err(serde::de::Error::custom)?;
    let b = u8::from_str_radix(&s[5..7], 16).map_err(serde::de::Error::custom)?;
    Ok(Color::Rgb(r, g, b))
}

pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "fieldclock", "fieldclock")
}

pub fn parse_config(source: &str) -> Result<Config> {
    toml::from_str(source).context("Failed to parse fieldclock configuration")
}

pub fn load_config() -> Result<Config> {
    match project_dirs() {
        Some(proj_dirs) => {
            let path = proj_dirs.config_dir().join(CONFIG_FILE);
            if path.exists() {
                let config_str = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file at {:?}", path))?;
                parse_config(&config_str)
                    .with_context(|| format!("Failed to parse config file at {:?}", path))
            } else {
                Ok(Config::default())
            }
        }
        None => Ok(Config::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.timing.live_refresh_secs, 1);
        assert_eq!(config.timing.list_refresh_secs, 60);
        assert_eq!(config.timing.autosave_secs, 5);
        assert_eq!(config.day.target_secs(), 8 * 3600);
        assert_eq!(config.ipc.socket_path, PathBuf::from(DEFAULT_SOCKET_PATH));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = parse_config(
            r##"
            [timing]
            list_refresh_secs = 30

            [day]
            target_hours = 7.5

            [theme]
            green = "#00ff00"
            "##,
        )
        .unwrap();
        assert_eq!(config.timing.live_refresh_secs, 1);
        assert_eq!(config.timing.list_refresh_secs, 30);
        assert_eq!(config.day.target_secs(), 27_000);
        assert!(config.day.notify);
        assert_eq!(config.theme.green, Color::Rgb(0, 255, 0));
        assert_eq!(config.theme.red, Theme::default().red);
    }

    #[test]
    fn bad_colour_is_rejected() {
        assert!(parse_config("[theme]\nred = \"red\"\n").is_err());
        assert!(parse_config("[theme]\nred = \"#aébcd\"\n").is_err());
        assert!(parse_config("[theme]\nred = \"#gg0000\"\n").is_err());
    }

    #[test]
    fn zero_intervals_are_raised_to_one_second() {
        let config = parse_config("[timing]\nlive_refresh_secs = 0\n").unwrap();
        assert_eq!(config.timing.live_refresh(), Duration::from_secs(1));
    }
}
