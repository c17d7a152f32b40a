use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config;
use crate::data::{FixtureService, Services};
use crate::debug;
use crate::detail::{DetailOptions, PostDetail};
use crate::lemmy::{self, CommentId, CommentSortType, PostId, PostView};
use crate::session;
use crate::ui;

/// What the command line asked to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Post(PostId),
    Comment(CommentId),
}

static POST_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://[^/\s]+/post/(\d+)/?(?:[?#].*)?$").expect("valid post url regex"));
static COMMENT_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://[^/\s]+/comment/(\d+)/?(?:[?#].*)?$").expect("valid comment url regex")
});

pub fn parse_target(raw: &str) -> Result<Target> {
    let raw = raw.trim();
    if let Ok(id) = raw.parse::<i64>() {
        return Ok(Target::Post(PostId(id)));
    }
    if let Some(caps) = POST_URL_RE.captures(raw) {
        let id = caps[1].parse::<i64>().context("post id out of range")?;
        return Ok(Target::Post(PostId(id)));
    }
    if let Some(caps) = COMMENT_URL_RE.captures(raw) {
        let id = caps[1].parse::<i64>().context("comment id out of range")?;
        return Ok(Target::Comment(CommentId(id)));
    }
    bail!("not a post id, post url or comment url: {raw}")
}

/// A post ready to show, with the comment path when opened from a comment.
#[derive(Debug, Clone)]
pub struct Loaded {
    pub post: PostView,
    pub comment_path: Option<String>,
}

pub fn load_target(services: &Services, target: Target) -> Result<Loaded> {
    match target {
        Target::Post(id) => Ok(Loaded {
            post: services.posts.load_post(id)?,
            comment_path: None,
        }),
        Target::Comment(id) => {
            let comment = services.posts.load_comment(id)?;
            let post = services.posts.load_post(comment.comment.post_id)?;
            Ok(Loaded {
                post,
                comment_path: Some(comment.comment.path),
            })
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub target: Option<Target>,
    pub fixture: Option<PathBuf>,
    pub sort: Option<CommentSortType>,
    pub print: bool,
}

pub fn run(opts: RunOptions) -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;
    let (services, target) = build_services(&cfg, &opts)?;
    let sort = opts.sort.unwrap_or_default();

    if opts.print {
        let loaded = load_target(&services, target)?;
        let width = crossterm::terminal::size().map(|(w, _)| w).unwrap_or(80);
        print!("{}", render_print(loaded, sort, &cfg, width));
        return Ok(());
    }

    let initial = cfg
        .lemmy
        .jwt
        .as_deref()
        .and_then(|jwt| session::Account::new(&cfg.lemmy.username, jwt).ok());
    let session = Arc::new(session::Manager::new(initial));

    let mut model = ui::Model::new(ui::Options {
        services,
        session,
        target,
        sort,
        persist_login: opts.fixture.is_none(),
        config: cfg,
        config_path: config::default_path(),
    });
    model.run()
}

fn build_services(cfg: &config::Config, opts: &RunOptions) -> Result<(Services, Target)> {
    if let Some(path) = opts.fixture.as_deref() {
        let fixture = Arc::new(FixtureService::open(path)?);
        let target = opts.target.unwrap_or(Target::Post(fixture.post_id()));
        debug::log(format!("app: offline from {}", path.display()));
        let services = Services {
            posts: fixture.clone(),
            comments: fixture.clone(),
            interactions: fixture,
        };
        return Ok((services, target));
    }

    let Some(target) = opts.target else {
        bail!("missing post id or url (see --help)");
    };
    let client = lemmy::Client::new(lemmy::ClientConfig {
        instance: cfg.lemmy.instance.clone(),
        user_agent: cfg.lemmy.user_agent.clone(),
        http_client: None,
    })
    .context("create lemmy client")?;
    Ok((Services::lemmy(Arc::new(client)), target))
}

/// The header fragment as plain text, one line per rendered row.
pub fn render_print(loaded: Loaded, sort: CommentSortType, cfg: &config::Config, width: u16) -> String {
    let detail = PostDetail::new(
        Some(loaded.post),
        DetailOptions {
            comment_path: loaded.comment_path,
            sort,
            overlay_gap: cfg.layout.overlay_gap,
            initial_overlay_height: cfg.layout.initial_overlay_height,
        },
    );
    let Some(header) = detail.header() else {
        return String::new();
    };
    let block = ui::header_lines(&header, detail.is_collapsed(), width, chrono::Utc::now());
    let mut out = String::new();
    for line in ui::plain_lines(&block.lines) {
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lemmy::fixtures;

    #[test]
    fn parses_ids_and_urls() {
        assert_eq!(parse_target("42").unwrap(), Target::Post(PostId(42)));
        assert_eq!(
            parse_target("https://lemmy.ml/post/7").unwrap(),
            Target::Post(PostId(7))
        );
        assert_eq!(
            parse_target("https://lemmy.world/comment/99?context=3").unwrap(),
            Target::Comment(CommentId(99))
        );
        assert!(parse_target("https://lemmy.ml/c/rust").is_err());
        assert!(parse_target("").is_err());
    }

    #[test]
    fn deep_link_prints_collapsed_header() {
        let cfg = config::Config::default();
        let loaded = Loaded {
            post: fixtures::post(1, None, Some("secret body")),
            comment_path: Some("0.5".into()),
        };
        let out = render_print(loaded, CommentSortType::Hot, &cfg, 80);
        assert!(out.contains("Post 1"));
        assert!(!out.contains("secret body"));

        let loaded = Loaded {
            post: fixtures::post(1, None, Some("secret body")),
            comment_path: None,
        };
        let out = render_print(loaded, CommentSortType::Hot, &cfg, 80);
        assert!(out.contains("secret body"));
    }
}
