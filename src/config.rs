use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::layout;
use crate::lemmy;

const DEFAULT_ENV_PREFIX: &str = "THREADVIEW";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub lemmy: LemmyConfig,
    #[serde(default)]
    pub ui: UIConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub player: PlayerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LemmyConfig {
    #[serde(default = "default_instance")]
    pub instance: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt: Option<String>,
}

impl Default for LemmyConfig {
    fn default() -> Self {
        Self {
            instance: default_instance(),
            user_agent: default_user_agent(),
            username: String::new(),
            jwt: None,
        }
    }
}

fn default_instance() -> String {
    lemmy::DEFAULT_INSTANCE.to_string()
}

fn default_user_agent() -> String {
    format!("threadview/{}", crate::VERSION)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UIConfig {
    #[serde(default = "default_tick_rate", with = "humantime_serde")]
    pub tick_rate: Duration,
    /// Length of the entry transition; the view counts as settled after it.
    #[serde(default = "default_settle_delay", with = "humantime_serde")]
    pub settle_delay: Duration,
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            tick_rate: default_tick_rate(),
            settle_delay: default_settle_delay(),
        }
    }
}

fn default_tick_rate() -> Duration {
    Duration::from_millis(120)
}

fn default_settle_delay() -> Duration {
    Duration::from_millis(300)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayoutConfig {
    #[serde(default = "default_overlay_gap")]
    pub overlay_gap: f64,
    #[serde(default = "default_initial_overlay_height")]
    pub initial_overlay_height: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            overlay_gap: default_overlay_gap(),
            initial_overlay_height: default_initial_overlay_height(),
        }
    }
}

fn default_overlay_gap() -> f64 {
    layout::DEFAULT_OVERLAY_GAP
}

fn default_initial_overlay_height() -> f64 {
    layout::DEFAULT_OVERLAY_HEIGHT
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerConfig {
    #[serde(default = "default_video_command")]
    pub video_command: Vec<String>,
    #[serde(default = "default_video_detach")]
    pub video_detach: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            video_command: default_video_command(),
            video_detach: default_video_detach(),
        }
    }
}

fn default_video_command() -> Vec<String> {
    vec!["mpv".into(), "%URL%".into()]
}

fn default_video_detach() -> bool {
    true
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    let path = options.config_file.clone().or_else(default_config_path);
    if let Some(path) = path {
        if path.exists() {
            let from_file = read_config_file(&path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.lemmy.instance.is_empty() {
        base.lemmy.instance = other.lemmy.instance;
    }
    if !other.lemmy.user_agent.is_empty() {
        base.lemmy.user_agent = other.lemmy.user_agent;
    }
    if !other.lemmy.username.is_empty() {
        base.lemmy.username = other.lemmy.username;
    }
    if other.lemmy.jwt.is_some() {
        base.lemmy.jwt = other.lemmy.jwt;
    }

    if !other.ui.tick_rate.is_zero() {
        base.ui.tick_rate = other.ui.tick_rate;
    }
    base.ui.settle_delay = other.ui.settle_delay;

    if other.layout.overlay_gap >= 0.0 {
        base.layout.overlay_gap = other.layout.overlay_gap;
    }
    if other.layout.initial_overlay_height >= 0.0 {
        base.layout.initial_overlay_height = other.layout.initial_overlay_height;
    }

    if !other.player.video_command.is_empty() {
        base.player.video_command = other.player.video_command;
    }
    base.player.video_detach = other.player.video_detach;

    base
}

/// Applies `PREFIX_SECTION__FIELD=value` overrides on top of `cfg`.
fn apply_env(cfg: &mut Config, prefix: &str) {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "lemmy.instance" => cfg.lemmy.instance = value,
        "lemmy.user_agent" => cfg.lemmy.user_agent = value,
        "lemmy.username" => cfg.lemmy.username = value,
        "lemmy.jwt" => cfg.lemmy.jwt = Some(value).filter(|jwt| !jwt.trim().is_empty()),
        "ui.tick_rate" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.ui.tick_rate = duration;
            }
        }
        "ui.settle_delay" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.ui.settle_delay = duration;
            }
        }
        "layout.overlay_gap" => {
            if let Ok(parsed) = value.parse::<f64>() {
                cfg.layout.overlay_gap = parsed;
            }
        }
        "layout.initial_overlay_height" => {
            if let Ok(parsed) = value.parse::<f64>() {
                cfg.layout.initial_overlay_height = parsed;
            }
        }
        "player.video_command" => {
            cfg.player.video_command = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        "player.video_detach" => {
            cfg.player.video_detach = crate::debug::is_truthy(&value);
        }
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("threadview").join("config.yaml"))
}

/// Stores the account used for replies so the next run starts logged in.
pub fn save_session(path: Option<PathBuf>, username: &str, jwt: &str) -> Result<PathBuf> {
    let username = username.trim();
    anyhow::ensure!(!username.is_empty(), "config: lemmy.username is required");
    anyhow::ensure!(!jwt.trim().is_empty(), "config: lemmy.jwt is required");

    let path = if let Some(path) = path {
        path
    } else {
        default_config_path().context("config: unable to determine default config path")?
    };

    let mut cfg = if path.exists() {
        read_config_file(&path)?
    } else {
        Config::default()
    };

    cfg.lemmy.username = username.to_string();
    cfg.lemmy.jwt = Some(jwt.trim().to_string());

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("config: failed to create directory {}", parent.display()))?;
    }

    let contents = serde_yaml::to_string(&cfg).context("config: failed to serialize config")?;
    fs::write(&path, contents)
        .with_context(|| format!("config: failed to write file {}", path.display()))?;

    Ok(path)
}
