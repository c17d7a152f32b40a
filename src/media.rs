use url::Url;

use crate::lemmy::PostView;
use crate::markdown::{self, LoneImage};

const IMAGE_EXTENSIONS: [&str; 6] = ["jpeg", "png", "gif", "jpg", "webp", "jxl"];
const VIDEO_EXTENSIONS: [&str; 3] = ["mp4", "webm", "gifv"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Image,
    Video,
    Embed,
    Text,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hero {
    Image { url: String, alt: Option<String> },
    Video { url: String },
}

impl Hero {
    pub fn url(&self) -> &str {
        match self {
            Hero::Image { url, .. } | Hero::Video { url } => url,
        }
    }
}

/// Content shown under the title: an embed card for the link, then the body.
/// Either part may be absent; both absent means nothing inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Inline<'a> {
    pub embed: Option<&'a str>,
    pub body: Option<&'a str>,
}

impl Inline<'_> {
    pub fn is_empty(&self) -> bool {
        self.embed.is_none() && self.body.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution<'a> {
    pub mode: RenderMode,
    pub hero: Option<Hero>,
    pub inline: Inline<'a>,
}

fn url_extension(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let last = parsed.path_segments()?.last()?;
    let (_, ext) = last.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

pub fn is_url_image(url: &str) -> bool {
    url_extension(url).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

pub fn is_url_video(url: &str) -> bool {
    url_extension(url).is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Picks the presentation for a post's primary content. First match wins:
/// image link, video link, lone body image, body text (with an embed card
/// for a plain link), bare link, nothing.
pub fn resolve<'a>(url: Option<&'a str>, body: Option<&'a str>) -> Resolution<'a> {
    let url = present(url);
    let body = present(body);
    let lone = body.and_then(markdown::find_lone_image);
    // A lone-image body is never rendered as text next to a hero.
    let body_text = body.filter(|_| lone.is_none());

    if let Some(url) = url {
        if is_url_image(url) {
            return Resolution {
                mode: RenderMode::Image,
                hero: Some(Hero::Image {
                    url: url.to_string(),
                    alt: None,
                }),
                inline: Inline {
                    embed: None,
                    body: body_text,
                },
            };
        }
        if is_url_video(url) {
            return Resolution {
                mode: RenderMode::Video,
                hero: Some(Hero::Video {
                    url: url.to_string(),
                }),
                inline: Inline {
                    embed: None,
                    body: body_text,
                },
            };
        }
    }

    if let Some(LoneImage { url: src, alt }) = lone {
        return Resolution {
            mode: RenderMode::Image,
            hero: Some(Hero::Image {
                url: src,
                alt: (!alt.trim().is_empty()).then_some(alt),
            }),
            inline: Inline {
                embed: url,
                body: None,
            },
        };
    }

    match (url, body_text) {
        (embed, Some(body)) => Resolution {
            mode: RenderMode::Text,
            hero: None,
            inline: Inline {
                embed,
                body: Some(body),
            },
        },
        (Some(url), None) => Resolution {
            mode: RenderMode::Embed,
            hero: None,
            inline: Inline {
                embed: Some(url),
                body: None,
            },
        },
        (None, None) => Resolution {
            mode: RenderMode::None,
            hero: None,
            inline: Inline::default(),
        },
    }
}

pub fn resolve_post(post: Option<&PostView>) -> Option<Resolution<'_>> {
    post.map(|view| resolve(view.post.url.as_deref(), view.post.body.as_deref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_url_wins_regardless_of_body() {
        for body in [None, Some("words"), Some("![x](https://a.example/x.png)")] {
            let res = resolve(Some("https://i.example/pic.JPG"), body);
            assert_eq!(res.mode, RenderMode::Image);
            assert_eq!(res.hero.as_ref().map(Hero::url), Some("https://i.example/pic.JPG"));
            assert_eq!(res.inline.embed, None);
        }
    }

    #[test]
    fn image_url_with_lone_image_body_shows_no_body() {
        let res = resolve(
            Some("https://i.example/pic.png"),
            Some("![same](https://i.example/pic.png)"),
        );
        assert_eq!(res.mode, RenderMode::Image);
        assert_eq!(res.inline.body, None);
    }

    #[test]
    fn lone_image_with_plain_link_keeps_embed() {
        let res = resolve(
            Some("https://blog.example/post"),
            Some("![cat](https://i.example/cat.png)"),
        );
        assert_eq!(res.mode, RenderMode::Image);
        assert_eq!(res.hero.as_ref().map(Hero::url), Some("https://i.example/cat.png"));
        assert_eq!(res.inline.embed, Some("https://blog.example/post"));
        assert_eq!(res.inline.body, None);
    }

    #[test]
    fn video_url_resolves_to_video() {
        let res = resolve(Some("https://v.example/clip.webm?x=1"), Some("caption"));
        assert_eq!(res.mode, RenderMode::Video);
        assert_eq!(
            res.hero,
            Some(Hero::Video {
                url: "https://v.example/clip.webm?x=1".into()
            })
        );
        assert_eq!(res.inline.embed, None);
        assert_eq!(res.inline.body, Some("caption"));
    }

    #[test]
    fn lone_body_image_becomes_hero_and_hides_body() {
        let res = resolve(None, Some("![cat](https://i.example/cat.png)"));
        assert_eq!(res.mode, RenderMode::Image);
        assert_eq!(
            res.hero,
            Some(Hero::Image {
                url: "https://i.example/cat.png".into(),
                alt: Some("cat".into())
            })
        );
        assert_eq!(res.inline.body, None);
    }

    #[test]
    fn link_with_body_embeds_then_renders_body() {
        let res = resolve(Some("https://blog.example/post"), Some("my thoughts"));
        assert_eq!(res.mode, RenderMode::Text);
        assert_eq!(res.hero, None);
        assert_eq!(res.inline.embed, Some("https://blog.example/post"));
        assert_eq!(res.inline.body, Some("my thoughts"));
    }

    #[test]
    fn bare_link_is_embed_only() {
        for body in [None, Some("")] {
            let res = resolve(Some("https://blog.example/post"), body);
            assert_eq!(res.mode, RenderMode::Embed);
            assert_eq!(res.inline.embed, Some("https://blog.example/post"));
            assert_eq!(res.inline.body, None);
        }
    }

    #[test]
    fn whitespace_body_still_counts_as_text() {
        let res = resolve(Some("https://blog.example/post"), Some("   "));
        assert_eq!(res.mode, RenderMode::Text);
        assert_eq!(res.inline.embed, Some("https://blog.example/post"));
        assert_eq!(res.inline.body, Some("   "));
    }

    #[test]
    fn nothing_resolves_to_none() {
        let res = resolve(None, None);
        assert_eq!(res.mode, RenderMode::None);
        assert!(res.hero.is_none());
        assert!(res.inline.is_empty());
        assert!(resolve_post(None).is_none());
    }

    #[test]
    fn unparseable_urls_are_not_media() {
        assert!(!is_url_image("not a url.png"));
        assert!(!is_url_video("clip.mp4"));
        assert!(is_url_video("https://v.example/a/b.GIFV"));
        assert!(!is_url_image("https://example.com/png"));
    }

    #[test]
    fn resolution_is_deterministic() {
        let a = resolve(Some("https://x.example/"), Some("body"));
        let b = resolve(Some("https://x.example/"), Some("body"));
        assert_eq!(a, b);
    }
}
