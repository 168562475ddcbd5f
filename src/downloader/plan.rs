//! Split a resource into contiguous byte-range segments.

use crate::types::Segment;

/// Partition `[0, total_size)` into `thread_count` inclusive ranges.
///
/// Every segment but the last spans `total_size / n` bytes; the last one absorbs
/// the remainder. `thread_count` is clamped to `1..=total_size` so no segment is
/// empty. A `total_size` of zero yields no segments.
pub fn plan(total_size: u64, thread_count: u32) -> Vec<Segment> {
    if total_size == 0 {
        return Vec::new();
    }

    let n = u64::from(thread_count).clamp(1, total_size);
    let part_size = total_size / n;

    (0..n)
        .map(|i| {
            let start = i * part_size;
            let end = if i == n - 1 {
                total_size - 1
            } else {
                (i + 1) * part_size - 1
            };
            // n <= thread_count, which is a u32
            Segment::new(i as u32, start, end)
        })
        .collect()
}
