//! # Root for utility functions
//!
//! Small, dependency-light helpers shared across modules. Kept separate from
//! the modules that use them since several of them (range overlap, median)
//! are useful in more than one place.
use std::cmp;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Determine the overlap between two ranges, each specified by their start
/// and end coordinates.
/// **NOTE:** ranges are half-open, i.e. `[start, end)`.
///
/// # Examples
///
/// ```
/// use tredcall::utils::range_overlap;
/// assert_eq!(5, range_overlap(0, 10, 5, 15));
/// assert_eq!(0, range_overlap(0, 10, 10, 20));
/// ```
pub fn range_overlap(a_start: i64, a_end: i64, b_start: i64, b_end: i64) -> i64 {
    cmp::max(0, cmp::min(a_end, b_end) - cmp::max(a_start, b_start))
}

/// Median of a slice of `i64` values, via a sorted copy. Returns `None` for
/// an empty slice. For an even-length input this returns `sorted[n/2]`
/// rather than averaging the two central values, so the result is always one
/// of the observed values — used by the Y-chromosome depth probe, where an
/// averaged depth would not correspond to any actual probed region.
///
/// # Examples
///
/// ```
/// use tredcall::utils::median_i64;
/// assert_eq!(Some(3), median_i64(&[5, 1, 3, 2, 4]));
/// assert_eq!(None, median_i64(&[]));
/// ```
pub fn median_i64(values: &[i64]) -> Option<i64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    Some(sorted[sorted.len() / 2])
}

/// Formats a `(mean, std)` pair the way summary output reports insert-size
/// and allele-length spreads, e.g. `"543+/-62bp"`.
///
/// # Examples
///
/// ```
/// use tredcall::utils::mean_std;
/// assert_eq!("543+/-62bp", mean_std(543.2, 62.4));
/// ```
pub fn mean_std(mean: f64, std: f64) -> String {
    format!("{:.0}+/-{:.0}bp", mean, std)
}

/// Cooperative cancellation flag, checked by the caller between grid
/// iterations and between read batches. Cloning shares the same underlying
/// flag, so a driver can hold one clone and hand another to the call.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_overlap_disjoint_and_overlapping() {
        assert_eq!(range_overlap(0, 10, 5, 15), 5);
        assert_eq!(range_overlap(0, 10, 10, 20), 0);
        assert_eq!(range_overlap(5, 15, 0, 10), 5);
        assert_eq!(range_overlap(0, 10, 2, 8), 6);
    }

    #[test]
    fn median_of_five_picks_middle() {
        assert_eq!(median_i64(&[5, 1, 3, 2, 4]), Some(3));
    }

    #[test]
    fn median_of_empty_is_none() {
        assert_eq!(median_i64(&[]), None);
    }

    #[test]
    fn mean_std_formats_like_upstream() {
        assert_eq!(mean_std(543.2, 62.4), "543+/-62bp");
    }

    #[test]
    fn cancellation_token_shares_state_across_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
