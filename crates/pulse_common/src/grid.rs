//! Window grid builder.
//!
//! A grid is computed once per pass and shared read-only by every host and
//! metric of that pass, so scores at the same window end are comparable.

use tracing::debug;

/// Half-open `[start, end)` interval in Unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Window {
    pub start: i64,
    pub end: i64,
}

/// Ordered window starts plus the averaging length applied to each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowGrid {
    starts: Vec<i64>,
    averaging_window: i64,
}

impl WindowGrid {
    /// Historical grid: `range(min, max, step)` over the global sample bounds.
    ///
    /// Without any samples the range falls back to `[now - time_window, now)`.
    /// A non-positive step yields an empty grid instead of looping forever.
    pub fn historical(
        bounds: Option<(i64, i64)>,
        now: i64,
        time_window: i64,
        step: i64,
        averaging_window: i64,
    ) -> Self {
        let (start, end) = bounds.unwrap_or((now - time_window, now));
        let starts = if step > 0 && start < end {
            let count = (end - start - 1) / step + 1;
            (0..count).map(|i| start + i * step).collect()
        } else {
            Vec::new()
        };

        debug!(
            "[PASS] Historical grid: {} windows from {} to {} (step {}s)",
            starts.len(),
            start,
            end,
            step
        );

        Self {
            starts,
            averaging_window,
        }
    }

    /// Continuous grid: the single trailing window starting at `start_from`.
    pub fn continuous(start_from: i64, averaging_window: i64) -> Self {
        Self {
            starts: vec![start_from],
            averaging_window,
        }
    }

    pub fn starts(&self) -> &[i64] {
        &self.starts
    }

    pub fn averaging_window(&self) -> i64 {
        self.averaging_window
    }

    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    pub fn windows(&self) -> impl Iterator<Item = Window> + '_ {
        self.starts.iter().map(move |&start| Window {
            start,
            end: start + self.averaging_window,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_historical_grid_matches_range() {
        let grid = WindowGrid::historical(Some((100, 400)), 0, 0, 120, 300);
        assert_eq!(grid.starts(), &[100, 220, 340]);
        let windows: Vec<Window> = grid.windows().collect();
        assert_eq!(windows[0], Window { start: 100, end: 400 });
        assert_eq!(windows[2], Window { start: 340, end: 640 });
    }

    #[test]
    fn test_historical_grid_exact_multiple_excludes_end() {
        let grid = WindowGrid::historical(Some((0, 240)), 0, 0, 120, 120);
        assert_eq!(grid.starts(), &[0, 120]);
    }

    #[test]
    fn test_single_sample_bounds_yield_empty_grid() {
        let grid = WindowGrid::historical(Some((500, 500)), 0, 0, 60, 60);
        assert!(grid.is_empty());
    }

    #[test]
    fn test_historical_grid_without_samples_uses_horizon() {
        let grid = WindowGrid::historical(None, 1_000, 300, 120, 60);
        assert_eq!(grid.starts(), &[700, 820, 940]);
    }

    #[test]
    fn test_zero_step_is_empty() {
        let grid = WindowGrid::historical(Some((0, 100)), 0, 0, 0, 60);
        assert!(grid.is_empty());
    }

    #[test]
    fn test_continuous_grid_is_one_window() {
        let grid = WindowGrid::continuous(1_000, 300);
        assert_eq!(grid.len(), 1);
        let window = grid.windows().next().unwrap();
        assert_eq!(window, Window { start: 1_000, end: 1_300 });
    }
}
