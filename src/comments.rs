use std::collections::{HashMap, HashSet};

use crate::lemmy::{parse_comment_path, CommentId, CommentView};
use crate::reply::CommentSink;

#[derive(Debug, Clone, Copy)]
pub struct VisibleComment<'a> {
    pub view: &'a CommentView,
    /// Depth relative to the first shown level.
    pub depth: usize,
    /// Inserted locally and not yet returned by the server.
    pub local: bool,
}

/// The discussion under a post, flattened in tree order.
///
/// Replies written in this session go through [`CommentSink`] and sit at the
/// head until a refresh returns them from the server, at which point the
/// local copy is dropped.
#[derive(Debug, Default)]
pub struct CommentList {
    server: Vec<CommentView>,
    local: Vec<CommentView>,
    comment_path: Option<Vec<i64>>,
}

impl CommentList {
    pub fn new(comment_path: Option<&str>) -> Self {
        Self {
            server: Vec::new(),
            local: Vec::new(),
            comment_path: comment_path.map(parse_comment_path).filter(|ids| !ids.is_empty()),
        }
    }

    pub fn comment_path_active(&self) -> bool {
        self.comment_path.is_some()
    }

    /// Leaves the single-thread view and shows the whole discussion.
    pub fn clear_comment_path(&mut self) {
        self.comment_path = None;
    }

    pub fn replace_all(&mut self, comments: Vec<CommentView>) {
        let known: HashSet<CommentId> = comments.iter().map(CommentView::id).collect();
        self.local.retain(|comment| !known.contains(&comment.id()));
        self.server = tree_order(comments);
    }

    pub fn len(&self) -> usize {
        self.local.len() + self.server.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn visible(&self) -> Vec<VisibleComment<'_>> {
        let mut out: Vec<VisibleComment<'_>> = self
            .local
            .iter()
            .map(|view| VisibleComment {
                view,
                depth: 0,
                local: true,
            })
            .collect();

        let root_depth = self
            .comment_path
            .as_ref()
            .map(|ids| ids.len().saturating_sub(1))
            .unwrap_or(0);

        for view in &self.server {
            let ids = view.comment.path_ids();
            if let Some(root) = self.comment_path.as_ref() {
                if !ids.starts_with(root) {
                    continue;
                }
            }
            out.push(VisibleComment {
                view,
                depth: ids.len().saturating_sub(1).saturating_sub(root_depth),
                local: false,
            });
        }
        out
    }
}

impl CommentSink for CommentList {
    fn prepend_comments(&mut self, comments: Vec<CommentView>) {
        let mut fresh: Vec<CommentView> = comments
            .into_iter()
            .filter(|incoming| {
                !self.local.iter().any(|c| c.id() == incoming.id())
                    && !self.server.iter().any(|c| c.id() == incoming.id())
            })
            .collect();
        fresh.append(&mut self.local);
        self.local = fresh;
    }
}

/// Orders comments depth-first, keeping the server's order among siblings.
/// Comments whose parent is missing are treated as roots.
fn tree_order(comments: Vec<CommentView>) -> Vec<CommentView> {
    let ids: HashSet<i64> = comments.iter().map(|c| c.id().0).collect();
    let mut children: HashMap<Option<i64>, Vec<usize>> = HashMap::new();
    for (index, comment) in comments.iter().enumerate() {
        let path = comment.comment.path_ids();
        let parent = path
            .len()
            .checked_sub(2)
            .and_then(|i| path.get(i).copied())
            .filter(|parent| ids.contains(parent));
        children.entry(parent).or_default().push(index);
    }

    let mut order = Vec::with_capacity(comments.len());
    let mut stack: Vec<usize> = children
        .get(&None)
        .map(|roots| roots.iter().rev().copied().collect())
        .unwrap_or_default();
    while let Some(index) = stack.pop() {
        order.push(index);
        if let Some(kids) = children.get(&Some(comments[index].id().0)) {
            stack.extend(kids.iter().rev().copied());
        }
    }

    let mut slots: Vec<Option<CommentView>> = comments.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|index| slots[index].take())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lemmy::fixtures::comment;

    fn ids(list: &CommentList) -> Vec<i64> {
        list.visible().iter().map(|c| c.view.id().0).collect()
    }

    #[test]
    fn flattens_in_tree_order() {
        let mut list = CommentList::new(None);
        list.replace_all(vec![
            comment(1, "0.1"),
            comment(2, "0.2"),
            comment(3, "0.1.3"),
            comment(4, "0.1.3.4"),
        ]);
        assert_eq!(ids(&list), vec![1, 3, 4, 2]);
        let depths: Vec<usize> = list.visible().iter().map(|c| c.depth).collect();
        assert_eq!(depths, vec![0, 1, 2, 0]);
    }

    #[test]
    fn comment_path_limits_to_subtree() {
        let mut list = CommentList::new(Some("0.1.3"));
        list.replace_all(vec![
            comment(1, "0.1"),
            comment(3, "0.1.3"),
            comment(4, "0.1.3.4"),
            comment(5, "0.1.5"),
        ]);
        assert!(list.comment_path_active());
        assert_eq!(ids(&list), vec![3, 4]);
        assert_eq!(list.visible()[0].depth, 0);

        list.clear_comment_path();
        assert_eq!(ids(&list), vec![1, 3, 4, 5]);
    }

    #[test]
    fn prepend_puts_replies_at_head() {
        let mut list = CommentList::new(None);
        list.replace_all(vec![comment(1, "0.1")]);
        list.prepend_comments(vec![comment(9, "0.9")]);
        list.prepend_comments(vec![comment(10, "0.10")]);
        assert_eq!(ids(&list), vec![10, 9, 1]);
        assert!(list.visible()[0].local);
    }

    #[test]
    fn refresh_reconciles_local_replies() {
        let mut list = CommentList::new(None);
        list.prepend_comments(vec![comment(9, "0.9")]);
        list.prepend_comments(vec![comment(9, "0.9")]);
        assert_eq!(list.len(), 1);

        list.replace_all(vec![comment(1, "0.1"), comment(9, "0.9")]);
        assert_eq!(ids(&list), vec![1, 9]);
        assert!(list.visible().iter().all(|c| !c.local));
    }
}
