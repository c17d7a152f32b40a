use std::process::{Command, Stdio};

use anyhow::{anyhow, bail, Context, Result};

use crate::config::PlayerConfig;
use crate::debug;
use crate::media::Hero;

const URL_PLACEHOLDER: &str = "%URL%";

/// Expands the configured player template. A template without `%URL%` gets
/// the url appended as the last argument.
pub fn build_command(template: &[String], url: &str) -> Result<(String, Vec<String>)> {
    let (program, rest) = template
        .split_first()
        .ok_or_else(|| anyhow!("player: video_command is empty"))?;
    if program.trim().is_empty() {
        bail!("player: video_command program is empty");
    }
    let mut args: Vec<String> = rest
        .iter()
        .map(|arg| arg.replace(URL_PLACEHOLDER, url))
        .collect();
    if !template.iter().any(|arg| arg.contains(URL_PLACEHOLDER)) {
        args.push(url.to_string());
    }
    Ok((program.replace(URL_PLACEHOLDER, url), args))
}

/// Plays a video with the external player. Detached players run in the
/// background; otherwise this blocks until the player exits.
pub fn play_video(url: &str, cfg: &PlayerConfig) -> Result<()> {
    let (program, args) = build_command(&cfg.video_command, url)?;
    debug::log(format!("player: {program} {}", args.join(" ")));
    let mut command = Command::new(&program);
    command.args(&args);

    if cfg.video_detach {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("player: launch {program}"))?;
        return Ok(());
    }

    let status = command
        .status()
        .with_context(|| format!("player: run {program}"))?;
    if !status.success() {
        bail!("player: {program} exited with {status}");
    }
    Ok(())
}

pub fn open_link(url: &str) -> Result<()> {
    debug::log(format!("player: open {url}"));
    webbrowser::open(url).with_context(|| format!("open {url}"))
}

pub fn open_hero(hero: &Hero, cfg: &PlayerConfig) -> Result<()> {
    match hero {
        Hero::Video { url } => play_video(url, cfg),
        Hero::Image { url, .. } => open_link(url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn replaces_placeholder() {
        let (program, args) =
            build_command(&template(&["mpv", "--fs", "%URL%"]), "https://v.example/a.mp4").unwrap();
        assert_eq!(program, "mpv");
        assert_eq!(args, vec!["--fs", "https://v.example/a.mp4"]);
    }

    #[test]
    fn appends_url_without_placeholder() {
        let (_, args) = build_command(&template(&["vlc"]), "https://v.example/a.mp4").unwrap();
        assert_eq!(args, vec!["https://v.example/a.mp4"]);
    }

    #[test]
    fn rejects_empty_template() {
        assert!(build_command(&[], "x").is_err());
        assert!(build_command(&template(&[" "]), "x").is_err());
    }
}
