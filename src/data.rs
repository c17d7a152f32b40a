use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use serde::Deserialize;

use crate::lemmy::{
    self, Comment, CommentAggregates, CommentId, CommentSortType, CommentView, Person, PostId,
    PostView,
};

pub trait PostService: Send + Sync {
    fn load_post(&self, id: PostId) -> Result<PostView>;
    fn load_comment(&self, id: CommentId) -> Result<CommentView>;
}

pub trait CommentService: Send + Sync {
    fn load_comments(
        &self,
        post: PostId,
        sort: CommentSortType,
        parent: Option<CommentId>,
    ) -> Result<Vec<CommentView>>;
}

pub trait InteractionService: Send + Sync {
    fn login(&self, username: &str, password: &str) -> Result<String>;
    fn reply(
        &self,
        jwt: &str,
        post: PostId,
        parent: Option<CommentId>,
        text: &str,
    ) -> Result<CommentView>;
}

#[derive(Clone)]
pub struct Services {
    pub posts: Arc<dyn PostService>,
    pub comments: Arc<dyn CommentService>,
    pub interactions: Arc<dyn InteractionService>,
}

impl Services {
    pub fn lemmy(client: Arc<lemmy::Client>) -> Self {
        let api = Arc::new(LemmyService { client });
        Self {
            posts: api.clone(),
            comments: api.clone(),
            interactions: api,
        }
    }

    pub fn fixture(path: &Path) -> Result<Self> {
        let fixture = Arc::new(FixtureService::open(path)?);
        Ok(Self {
            posts: fixture.clone(),
            comments: fixture.clone(),
            interactions: fixture,
        })
    }
}

pub struct LemmyService {
    client: Arc<lemmy::Client>,
}

impl PostService for LemmyService {
    fn load_post(&self, id: PostId) -> Result<PostView> {
        self.client.get_post(id)
    }

    fn load_comment(&self, id: CommentId) -> Result<CommentView> {
        self.client.get_comment(id)
    }
}

impl CommentService for LemmyService {
    fn load_comments(
        &self,
        post: PostId,
        sort: CommentSortType,
        parent: Option<CommentId>,
    ) -> Result<Vec<CommentView>> {
        self.client.get_comments(post, sort, parent)
    }
}

impl InteractionService for LemmyService {
    fn login(&self, username: &str, password: &str) -> Result<String> {
        self.client.login(username, password)
    }

    fn reply(
        &self,
        jwt: &str,
        post: PostId,
        parent: Option<CommentId>,
        text: &str,
    ) -> Result<CommentView> {
        self.client.create_comment(jwt, post, parent, text)
    }
}

/// A post and its comments as saved from the API, for offline reading.
#[derive(Debug, Deserialize)]
pub struct Fixture {
    pub post_view: PostView,
    #[serde(default)]
    pub comments: Vec<CommentView>,
}

/// Serves a single saved post. Logins always succeed and replies are
/// numbered after the highest comment id in the file.
pub struct FixtureService {
    path: PathBuf,
    fixture: Fixture,
    next_id: AtomicI64,
}

impl FixtureService {
    pub fn open(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("fixture: read {}", path.display()))?;
        let fixture: Fixture = serde_json::from_str(&raw)
            .with_context(|| format!("fixture: parse {}", path.display()))?;
        let next_id = fixture
            .comments
            .iter()
            .map(|c| c.id().0)
            .max()
            .unwrap_or(0)
            + 1;
        Ok(Self {
            path: path.to_path_buf(),
            fixture,
            next_id: AtomicI64::new(next_id),
        })
    }

    pub fn post_id(&self) -> PostId {
        self.fixture.post_view.id()
    }
}

impl PostService for FixtureService {
    fn load_post(&self, id: PostId) -> Result<PostView> {
        if id != self.post_id() {
            bail!("fixture: {} holds post {}, not {}", self.path.display(), self.post_id(), id);
        }
        Ok(self.fixture.post_view.clone())
    }

    fn load_comment(&self, id: CommentId) -> Result<CommentView> {
        self.fixture
            .comments
            .iter()
            .find(|c| c.id() == id)
            .cloned()
            .ok_or_else(|| anyhow!("fixture: comment {id} not found"))
    }
}

impl CommentService for FixtureService {
    fn load_comments(
        &self,
        post: PostId,
        _sort: CommentSortType,
        _parent: Option<CommentId>,
    ) -> Result<Vec<CommentView>> {
        if post != self.post_id() {
            return Ok(Vec::new());
        }
        Ok(self.fixture.comments.clone())
    }
}

impl InteractionService for FixtureService {
    fn login(&self, username: &str, _password: &str) -> Result<String> {
        if username.trim().is_empty() {
            bail!("fixture: username is required");
        }
        Ok(format!("offline-{}", username.trim()))
    }

    fn reply(
        &self,
        jwt: &str,
        post: PostId,
        parent: Option<CommentId>,
        text: &str,
    ) -> Result<CommentView> {
        if text.trim().is_empty() {
            bail!("fixture: comment text is required");
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let path = match parent.and_then(|p| self.load_comment(p).ok()) {
            Some(parent) => format!("{}.{id}", parent.comment.path),
            None => format!("0.{id}"),
        };
        let name = jwt.strip_prefix("offline-").unwrap_or("you");
        Ok(CommentView {
            comment: Comment {
                id: CommentId(id),
                post_id: post,
                content: text.to_string(),
                path,
                deleted: false,
                removed: false,
                published: Some(Utc::now()),
            },
            creator: Person {
                id: 0,
                name: name.to_string(),
                display_name: None,
                actor_id: String::new(),
                local: true,
            },
            counts: CommentAggregates {
                score: 1,
                child_count: 0,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FIXTURE: &str = r#"{
        "post_view": {
            "post": {"id": 5, "name": "Saved post", "body": "hello"},
            "creator": {"id": 1, "name": "alice"},
            "community": {"id": 2, "name": "rust"}
        },
        "comments": [
            {"comment": {"id": 11, "post_id": 5, "content": "first", "path": "0.11"},
             "creator": {"id": 3, "name": "bob"}}
        ]
    }"#;

    fn fixture_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FIXTURE.as_bytes()).unwrap();
        file
    }

    #[test]
    fn fixture_serves_its_post() {
        let file = fixture_file();
        let services = Services::fixture(file.path()).unwrap();
        let post = services.posts.load_post(PostId(5)).unwrap();
        assert_eq!(post.post.name, "Saved post");
        assert!(services.posts.load_post(PostId(6)).is_err());
        let comments = services
            .comments
            .load_comments(PostId(5), CommentSortType::Hot, None)
            .unwrap();
        assert_eq!(comments.len(), 1);
    }

    #[test]
    fn fixture_replies_continue_numbering() {
        let file = fixture_file();
        let service = FixtureService::open(file.path()).unwrap();
        let jwt = service.login("carol", "pw").unwrap();
        let reply = service
            .reply(&jwt, PostId(5), Some(CommentId(11)), "me too")
            .unwrap();
        assert_eq!(reply.id(), CommentId(12));
        assert_eq!(reply.comment.path, "0.11.12");
        assert_eq!(reply.creator.name, "carol");
        assert!(service.reply(&jwt, PostId(5), None, "  ").is_err());
    }
}
