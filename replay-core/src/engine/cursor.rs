//! Feed cursors: monotone closed-bar index advance.
//!
//! Cursors are plain indices into shared immutable candle slices. "No bar has
//! closed yet" is `None`; a cursor never moves backwards over the life of a
//! run.

use chrono::{DateTime, Utc};

use crate::domain::{Candle, Interval};

/// Advance a cursor to the last bar whose close time is `<= cur_time`.
///
/// `prev` is clamped into the valid range first, then the cursor walks
/// forward while the next bar's close time (`timestamp + duration`) is at or
/// before `cur_time`. Returns `None` when no bar has closed yet. The result
/// is never behind the (clamped) input.
pub fn advance_index(
    candles: &[Candle],
    prev: Option<usize>,
    cur_time: DateTime<Utc>,
    interval: Interval,
) -> Option<usize> {
    let len = candles.len();
    let duration = interval.duration();

    let mut last = match prev {
        Some(i) if i >= len => return len.checked_sub(1),
        other => other,
    };

    let mut next = last.map_or(0, |i| i + 1);
    while next < len && candles[next].timestamp + duration <= cur_time {
        last = Some(next);
        next += 1;
    }
    last
}

/// One-past-the-end index of the closed prefix of a context feed.
///
/// Returns `next` such that `candles[..next]` is exactly the set of bars
/// whose close time is `<= cur_time`. An empty feed yields 0; a `cur_idx`
/// beyond the feed yields `len`.
pub fn context_window_end(
    candles: &[Candle],
    interval: Interval,
    cur_time: DateTime<Utc>,
    cur_idx: usize,
) -> usize {
    let len = candles.len();
    let duration = interval.duration();

    let mut idx = cur_idx.min(len);
    while idx < len && candles[idx].timestamp + duration <= cur_time {
        idx += 1;
    }
    idx
}
