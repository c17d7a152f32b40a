use std::cell::Cell;
use std::rc::Rc;

use crate::debug;

pub const DEFAULT_OVERLAY_GAP: f64 = 12.0;
pub const DEFAULT_OVERLAY_HEIGHT: f64 = 70.0;

/// Turns the measured height of the floating "view all comments" overlay
/// into bottom padding for the comment list, so the last comment can always
/// scroll clear of it.
#[derive(Debug)]
pub struct LayoutHeightBridge {
    comment_path_active: bool,
    gap: f64,
    measured: Rc<Cell<f64>>,
}

/// Handed to the overlay. Only exists while a comment path is active.
#[derive(Debug, Clone)]
pub struct OverlayHeightReporter {
    measured: Rc<Cell<f64>>,
}

impl OverlayHeightReporter {
    pub fn on_height(&self, height: f64) {
        if self.measured.get() != height {
            debug::log(format!("layout: overlay height {height}"));
        }
        self.measured.set(height);
    }
}

impl LayoutHeightBridge {
    pub fn new(comment_path_active: bool) -> Self {
        Self::with_metrics(comment_path_active, DEFAULT_OVERLAY_GAP, DEFAULT_OVERLAY_HEIGHT)
    }

    pub fn with_metrics(comment_path_active: bool, gap: f64, initial_height: f64) -> Self {
        Self {
            comment_path_active,
            gap: gap.max(0.0),
            measured: Rc::new(Cell::new(initial_height)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.comment_path_active
    }

    pub fn reporter(&self) -> Option<OverlayHeightReporter> {
        self.comment_path_active.then(|| OverlayHeightReporter {
            measured: Rc::clone(&self.measured),
        })
    }

    /// Measured height plus the gap; zero when no overlay is mounted or the
    /// measurement is not positive.
    pub fn bottom_padding(&self) -> f64 {
        if !self.comment_path_active {
            return 0.0;
        }
        let height = self.measured.get();
        if height.is_nan() || height <= 0.0 {
            return 0.0;
        }
        height + self.gap
    }

    /// Padding rounded up to whole terminal rows.
    pub fn bottom_padding_rows(&self) -> u16 {
        self.bottom_padding().ceil().min(f64::from(u16::MAX)) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactive_bridge_has_no_padding_or_reporter() {
        let bridge = LayoutHeightBridge::new(false);
        assert!(bridge.reporter().is_none());
        assert_eq!(bridge.bottom_padding(), 0.0);
    }

    #[test]
    fn reported_height_plus_gap() {
        let bridge = LayoutHeightBridge::new(true);
        assert_eq!(bridge.bottom_padding(), 82.0);
        let reporter = bridge.reporter().unwrap();
        reporter.on_height(3.0);
        assert_eq!(bridge.bottom_padding(), 15.0);
        assert_eq!(bridge.bottom_padding_rows(), 15);
    }

    #[test]
    fn non_positive_heights_collapse_to_zero() {
        let bridge = LayoutHeightBridge::new(true);
        let reporter = bridge.reporter().unwrap();
        for height in [0.0, -4.0, f64::NAN] {
            reporter.on_height(height);
            assert_eq!(bridge.bottom_padding(), 0.0);
        }
    }

    #[test]
    fn fractional_rows_round_up() {
        let bridge = LayoutHeightBridge::with_metrics(true, 1.0, 0.5);
        assert_eq!(bridge.bottom_padding_rows(), 2);
    }
}
