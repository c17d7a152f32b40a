use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

pub const DEFAULT_INSTANCE: &str = "https://lemmy.ml";
const API_PREFIX: &str = "api/v3/";
const COMMENT_PAGE_LIMIT: u32 = 50;
const COMMENT_MAX_DEPTH: u32 = 8;

#[derive(Debug, thiserror::Error)]
pub enum LemmyError {
    #[error("lemmy: unauthorized")]
    Unauthorized,
    #[error("lemmy: rate limited: {0}")]
    RateLimited(String),
    #[error("lemmy: api error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("lemmy: login required")]
    LoginRequired,
    #[error("lemmy: {0} is required")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentId(pub i64);

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
pub enum CommentSortType {
    #[default]
    Hot,
    Top,
    New,
    Old,
    Controversial,
}

impl CommentSortType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommentSortType::Hot => "Hot",
            CommentSortType::Top => "Top",
            CommentSortType::New => "New",
            CommentSortType::Old => "Old",
            CommentSortType::Controversial => "Controversial",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "hot" => Some(CommentSortType::Hot),
            "top" => Some(CommentSortType::Top),
            "new" => Some(CommentSortType::New),
            "old" => Some(CommentSortType::Old),
            "controversial" => Some(CommentSortType::Controversial),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub actor_id: String,
    #[serde(default = "default_true")]
    pub local: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Community {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub actor_id: String,
    #[serde(default = "default_true")]
    pub local: bool,
    #[serde(default)]
    pub nsfw: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub nsfw: bool,
    #[serde(default, deserialize_with = "lemmy_timestamp")]
    pub published: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ap_id: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PostAggregates {
    #[serde(default)]
    pub comments: i64,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub upvotes: i64,
    #[serde(default)]
    pub downvotes: i64,
    #[serde(default)]
    pub featured_community: bool,
    #[serde(default)]
    pub featured_local: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostView {
    pub post: Post,
    pub creator: Person,
    pub community: Community,
    #[serde(default)]
    pub counts: PostAggregates,
}

impl PostView {
    pub fn id(&self) -> PostId {
        self.post.id
    }

    pub fn is_nsfw(&self) -> bool {
        self.post.nsfw || self.community.nsfw
    }

    pub fn is_featured(&self) -> bool {
        self.counts.featured_community || self.counts.featured_local
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub content: String,
    /// Materialized tree path, e.g. `0.12.34` for comment 34 replying to 12.
    pub path: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub removed: bool,
    #[serde(default, deserialize_with = "lemmy_timestamp")]
    pub published: Option<DateTime<Utc>>,
}

impl Comment {
    /// Ancestor and self ids, root first. The leading `0` of a path is dropped.
    pub fn path_ids(&self) -> Vec<i64> {
        parse_comment_path(&self.path)
    }

    pub fn depth(&self) -> usize {
        self.path_ids().len().saturating_sub(1)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CommentAggregates {
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub child_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentView {
    pub comment: Comment,
    pub creator: Person,
    #[serde(default)]
    pub counts: CommentAggregates,
}

impl CommentView {
    pub fn id(&self) -> CommentId {
        self.comment.id
    }
}

pub fn parse_comment_path(path: &str) -> Vec<i64> {
    path.split('.')
        .filter_map(|segment| segment.trim().parse::<i64>().ok())
        .filter(|id| *id != 0)
        .collect()
}

/// `name@host` for remote actors, bare `name` for local ones.
pub fn qualified_name(name: &str, actor_id: &str, local: bool) -> String {
    if local {
        return name.to_string();
    }
    match Url::parse(actor_id)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
    {
        Some(host) => format!("{name}@{host}"),
        None => name.to_string(),
    }
}

fn default_true() -> bool {
    true
}

fn lemmy_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|value| parse_timestamp(&value)))
}

// Older instances send naive timestamps without an offset.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Deserialize)]
struct GetPostResponse {
    post_view: PostView,
}

#[derive(Debug, Deserialize)]
struct GetCommentResponse {
    comment_view: CommentView,
}

#[derive(Debug, Deserialize)]
struct GetCommentsResponse {
    comments: Vec<CommentView>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    jwt: Option<String>,
}

#[derive(Debug, Serialize)]
struct LoginForm<'a> {
    username_or_email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateComment<'a> {
    content: &'a str,
    post_id: PostId,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<CommentId>,
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub instance: String,
    pub user_agent: String,
    pub http_client: Option<HttpClient>,
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            return Err(LemmyError::Missing("user agent").into());
        }
        let instance = if config.instance.trim().is_empty() {
            DEFAULT_INSTANCE.to_string()
        } else {
            config.instance.trim().trim_end_matches('/').to_string()
        };
        let base_url = Url::parse(&format!("{instance}/"))
            .with_context(|| format!("lemmy: parse instance url {instance}"))?
            .join(API_PREFIX)?;
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(Duration::from_secs(20))
                .build()?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
        })
    }

    pub fn get_post(&self, id: PostId) -> Result<PostView> {
        let params = [("id".to_string(), id.to_string())];
        let resp: GetPostResponse = self
            .get("post", &params, None)
            .context("lemmy: fetch post")?;
        Ok(resp.post_view)
    }

    pub fn get_comment(&self, id: CommentId) -> Result<CommentView> {
        let params = [("id".to_string(), id.to_string())];
        let resp: GetCommentResponse = self
            .get("comment", &params, None)
            .context("lemmy: fetch comment")?;
        Ok(resp.comment_view)
    }

    pub fn get_comments(
        &self,
        post_id: PostId,
        sort: CommentSortType,
        parent: Option<CommentId>,
    ) -> Result<Vec<CommentView>> {
        let mut params = vec![
            ("post_id".to_string(), post_id.to_string()),
            ("sort".to_string(), sort.as_str().to_string()),
            ("type_".to_string(), "All".to_string()),
            ("max_depth".to_string(), COMMENT_MAX_DEPTH.to_string()),
            ("limit".to_string(), COMMENT_PAGE_LIMIT.to_string()),
        ];
        if let Some(parent) = parent {
            params.push(("parent_id".to_string(), parent.to_string()));
        }
        let resp: GetCommentsResponse = self
            .get("comment/list", &params, None)
            .context("lemmy: fetch comments")?;
        Ok(resp.comments)
    }

    pub fn login(&self, username: &str, password: &str) -> Result<String> {
        if username.trim().is_empty() {
            return Err(LemmyError::Missing("username").into());
        }
        if password.is_empty() {
            return Err(LemmyError::Missing("password").into());
        }
        let form = LoginForm {
            username_or_email: username.trim(),
            password,
        };
        let url = self.base_url.join("user/login")?;
        let req = self.http.post(url).json(&form);
        let resp: LoginResponse = self.send(req).context("lemmy: login")?.json()?;
        resp.jwt
            .filter(|jwt| !jwt.is_empty())
            .ok_or_else(|| LemmyError::Unauthorized.into())
    }

    pub fn create_comment(
        &self,
        jwt: &str,
        post_id: PostId,
        parent_id: Option<CommentId>,
        content: &str,
    ) -> Result<CommentView> {
        if jwt.is_empty() {
            return Err(LemmyError::LoginRequired.into());
        }
        if content.trim().is_empty() {
            return Err(LemmyError::Missing("comment text").into());
        }
        let body = CreateComment {
            content,
            post_id,
            parent_id,
        };
        let url = self.base_url.join("comment")?;
        let req = self
            .http
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {jwt}"))
            .json(&body);
        let resp: GetCommentResponse = self
            .send(req)
            .context("lemmy: create comment")?
            .json()?;
        Ok(resp.comment_view)
    }

    fn get<T>(&self, path: &str, params: &[(String, String)], jwt: Option<&str>) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let mut url = self.base_url.join(path)?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }
        let mut req = self.http.get(url);
        if let Some(jwt) = jwt {
            req = req.header(AUTHORIZATION, format!("Bearer {jwt}"));
        }
        Ok(self.send(req)?.json()?)
    }

    fn send(&self, req: RequestBuilder) -> Result<Response> {
        let resp = req.header(USER_AGENT, self.user_agent.clone()).send()?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        let err = match status.as_u16() {
            401 => LemmyError::Unauthorized,
            429 => LemmyError::RateLimited(body),
            code => LemmyError::Api { status: code, body },
        };
        Err(err.into())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn person(name: &str) -> Person {
        Person {
            id: 1,
            name: name.into(),
            display_name: None,
            actor_id: format!("https://lemmy.ml/u/{name}"),
            local: true,
        }
    }

    pub fn post(id: i64, url: Option<&str>, body: Option<&str>) -> PostView {
        PostView {
            post: Post {
                id: PostId(id),
                name: format!("Post {id}"),
                url: url.map(str::to_string),
                body: body.map(str::to_string),
                nsfw: false,
                published: None,
                ap_id: String::new(),
            },
            creator: person("alice"),
            community: Community {
                id: 2,
                name: "rust".into(),
                title: "Rust".into(),
                actor_id: "https://lemmy.ml/c/rust".into(),
                local: true,
                nsfw: false,
            },
            counts: PostAggregates::default(),
        }
    }

    pub fn comment(id: i64, path: &str) -> CommentView {
        CommentView {
            comment: Comment {
                id: CommentId(id),
                post_id: PostId(10),
                content: format!("comment {id}"),
                path: path.into(),
                deleted: false,
                removed: false,
                published: None,
            },
            creator: person("bob"),
            counts: CommentAggregates::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_path_drops_root_marker() {
        assert_eq!(parse_comment_path("0.12.34"), vec![12, 34]);
        assert_eq!(parse_comment_path("0"), Vec::<i64>::new());
        assert_eq!(parse_comment_path(""), Vec::<i64>::new());
    }

    #[test]
    fn remote_names_carry_instance() {
        assert_eq!(
            qualified_name("rust", "https://programming.dev/c/rust", false),
            "rust@programming.dev"
        );
        assert_eq!(qualified_name("rust", "https://lemmy.ml/c/rust", true), "rust");
    }

    #[test]
    fn decodes_post_view_with_naive_timestamp() {
        let raw = r#"{
            "post": {"id": 7, "name": "Hello", "url": null, "body": "hi", "nsfw": false,
                     "published": "2023-06-01T10:20:30.123456"},
            "creator": {"id": 1, "name": "alice", "actor_id": "https://lemmy.ml/u/alice", "local": true},
            "community": {"id": 2, "name": "rust", "actor_id": "https://lemmy.ml/c/rust", "local": true},
            "counts": {"comments": 3, "score": 10, "featured_local": true}
        }"#;
        let view: PostView = serde_json::from_str(raw).unwrap();
        assert_eq!(view.id(), PostId(7));
        assert!(view.post.published.is_some());
        assert!(view.is_featured());
        assert!(!view.is_nsfw());
    }

    #[test]
    fn sort_keys_are_case_insensitive() {
        assert_eq!(CommentSortType::from_key("TOP"), Some(CommentSortType::Top));
        assert_eq!(CommentSortType::from_key("bogus"), None);
    }

    #[test]
    fn client_requires_user_agent() {
        let err = Client::new(ClientConfig::default()).err().unwrap();
        assert!(err.to_string().contains("user agent"));
    }
}
