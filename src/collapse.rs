use crate::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollapseState {
    Expanded,
    Collapsed,
}

impl CollapseState {
    fn flipped(self) -> Self {
        match self {
            CollapseState::Expanded => CollapseState::Collapsed,
            CollapseState::Collapsed => CollapseState::Expanded,
        }
    }
}

/// What the user activated inside the post header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TapTarget {
    /// A link; the host follows it instead of toggling.
    Anchor(String),
    /// Anything else in the header: title, body, byline.
    Header,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollBehavior {
    Smooth,
    Instant,
}

/// The element the controller keeps anchored after a state change.
pub trait TitleAnchor {
    fn scroll_into_view(&mut self, behavior: ScrollBehavior);
}

#[derive(Debug)]
pub struct CollapseController {
    state: CollapseState,
}

impl CollapseController {
    /// Deep links into a comment subtree start collapsed so the thread is
    /// what the reader sees first.
    pub fn new(comment_path: Option<&str>) -> Self {
        let state = if comment_path.is_some() {
            CollapseState::Collapsed
        } else {
            CollapseState::Expanded
        };
        Self { state }
    }

    pub fn state(&self) -> CollapseState {
        self.state
    }

    pub fn is_collapsed(&self) -> bool {
        self.state == CollapseState::Collapsed
    }

    /// Flips the state unless the tap landed on a link, then scrolls the
    /// title into view. Returns whether the state changed.
    pub fn toggle(&mut self, target: &TapTarget, title: &mut dyn TitleAnchor) -> bool {
        if let TapTarget::Anchor(href) = target {
            debug::log(format!("collapse: ignored tap on link {href}"));
            return false;
        }
        self.state = self.state.flipped();
        debug::log(format!("collapse: now {:?}", self.state));
        title.scroll_into_view(ScrollBehavior::Smooth);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingTitle {
        scrolls: Vec<ScrollBehavior>,
    }

    impl TitleAnchor for RecordingTitle {
        fn scroll_into_view(&mut self, behavior: ScrollBehavior) {
            self.scrolls.push(behavior);
        }
    }

    #[test]
    fn initial_state_follows_comment_path() {
        assert_eq!(CollapseController::new(None).state(), CollapseState::Expanded);
        assert_eq!(
            CollapseController::new(Some("0.5.9")).state(),
            CollapseState::Collapsed
        );
    }

    #[test]
    fn header_tap_flips_and_scrolls_smoothly() {
        let mut title = RecordingTitle::default();
        let mut ctl = CollapseController::new(None);
        assert!(ctl.toggle(&TapTarget::Header, &mut title));
        assert!(ctl.is_collapsed());
        assert_eq!(title.scrolls, vec![ScrollBehavior::Smooth]);
    }

    #[test]
    fn anchor_tap_is_ignored() {
        let mut title = RecordingTitle::default();
        let mut ctl = CollapseController::new(None);
        let changed = ctl.toggle(&TapTarget::Anchor("https://x.example".into()), &mut title);
        assert!(!changed);
        assert_eq!(ctl.state(), CollapseState::Expanded);
        assert!(title.scrolls.is_empty());
    }

    #[test]
    fn double_toggle_round_trips() {
        let mut title = RecordingTitle::default();
        for path in [None, Some("0.1")] {
            let mut ctl = CollapseController::new(path);
            let before = ctl.state();
            ctl.toggle(&TapTarget::Header, &mut title);
            ctl.toggle(&TapTarget::Header, &mut title);
            assert_eq!(ctl.state(), before);
        }
        assert_eq!(title.scrolls.len(), 4);
    }
}
