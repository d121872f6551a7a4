//! Segment locator: floor search over time-sorted segment boundaries.

use crate::model::SegmentInfo;

/// Find the segment active at playback time `t`.
///
/// `segments` must be sorted ascending by `start_time` (see
/// [`crate::model::sort_segments`]). Returns the segment whose start time is
/// the greatest value `<= t`, or `None` if `t` precedes every segment or the
/// list is empty.
pub fn find_active_segment(segments: &[SegmentInfo], t: f64) -> Option<&SegmentInfo> {
    let mut low = 0isize;
    let mut high = segments.len() as isize - 1;

    while low <= high {
        let mid = (low + high) / 2;
        if segments[mid as usize].start_time <= t {
            low = mid + 1;
        } else {
            high = mid - 1;
        }
    }

    if high >= 0 {
        Some(&segments[high as usize])
    } else {
        None
    }
}
