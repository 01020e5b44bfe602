//! Frame index planning.
//!
//! [`plan_frame_indices`] turns stream metadata and a sampling policy into
//! the exact list of source frame indices a decode call will emit. The
//! computation is pure and deterministic: the same inputs always produce the
//! same plan, which is what lets a downstream consumer that samples by
//! timestamp reproduce the selection.
//!
//! # Example
//!
//! ```
//! use vidsample::plan_frame_indices;
//!
//! let plan = plan_frame_indices(125, 24.0, 0.5, None);
//! assert_eq!(plan.as_slice(), &[0, 41, 83, 124]);
//! ```

/// Sampled plan lengths are always a multiple of this factor.
///
/// The consumer groups frames in temporal pairs, so a plan with an odd length
/// would leave the last pair half-filled.
pub const FRAME_FACTOR: u64 = 2;

/// An ordered, duplicate-free list of source frame indices.
///
/// Indices are strictly increasing. A plan produced by
/// [`plan_frame_indices`] only contains indices below the `total_frames` it
/// was computed for.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrameIndexPlan {
    indices: Vec<u64>,
}

impl FrameIndexPlan {
    /// Build a plan from arbitrary indices, sorting and deduplicating them.
    pub fn from_indices(mut indices: Vec<u64>) -> Self {
        indices.sort_unstable();
        indices.dedup();
        Self { indices }
    }

    /// Number of planned frames.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Returns `true` if no frame is planned.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// The planned indices in ascending order.
    pub fn as_slice(&self) -> &[u64] {
        &self.indices
    }

    /// Iterate over the planned indices.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.indices.iter().copied()
    }

    /// First planned index.
    pub fn first(&self) -> Option<u64> {
        self.indices.first().copied()
    }

    /// Last planned index.
    pub fn last(&self) -> Option<u64> {
        self.indices.last().copied()
    }

    /// Returns `true` if `index` is part of the plan.
    pub fn contains(&self, index: u64) -> bool {
        self.indices.binary_search(&index).is_ok()
    }

    /// Return a copy of this plan with every index moved by `offset`.
    ///
    /// Used to turn a plan computed over a time window into absolute stream
    /// indices.
    pub fn shifted(&self, offset: u64) -> Self {
        Self {
            indices: self.indices.iter().map(|index| index + offset).collect(),
        }
    }

    /// Consume the plan and return the raw indices.
    pub fn into_vec(self) -> Vec<u64> {
        self.indices
    }
}

impl IntoIterator for FrameIndexPlan {
    type Item = u64;
    type IntoIter = std::vec::IntoIter<u64>;

    fn into_iter(self) -> Self::IntoIter {
        self.indices.into_iter()
    }
}

/// Compute the frame indices to sample from a stream.
///
/// * `total_frames`: frames in the stream (or in the selected window).
/// * `source_fps`: native frame rate; `<= 0` means unknown, in which case
///   one frame per second is assumed.
/// * `target_fps`: sampling rate; `<= 0` keeps every frame.
/// * `max_frames`: optional cap on the plan length.
///
/// When sampling, the plan length is `round(duration * target_fps)` raised to
/// at least [`FRAME_FACTOR`] and up to the next multiple of it, then clamped
/// to the largest multiple of [`FRAME_FACTOR`] not above `max_frames`. The
/// indices are spread evenly over `[0, total_frames - 1]` with both ends
/// included. Once the length reaches `total_frames`, every frame is kept.
pub fn plan_frame_indices(
    total_frames: u64,
    source_fps: f64,
    target_fps: f64,
    max_frames: Option<u64>,
) -> FrameIndexPlan {
    if total_frames == 0 {
        return FrameIndexPlan::default();
    }
    if total_frames == 1 {
        return FrameIndexPlan { indices: vec![0] };
    }

    if target_fps.is_nan() || target_fps <= 0.0 {
        return match max_frames {
            Some(cap) if cap < total_frames => FrameIndexPlan {
                indices: spread_indices(total_frames, cap.max(1)),
            },
            _ => identity(total_frames),
        };
    }

    let duration = if source_fps > 0.0 {
        total_frames as f64 / source_fps
    } else {
        log::warn!(
            "Unknown source frame rate; assuming one frame per second over {total_frames} frames"
        );
        total_frames as f64
    };

    let raw = (duration * target_fps).round_ties_even();
    let raw = if raw.is_finite() && raw > 0.0 { raw as u64 } else { 0 };

    let mut count = raw.max(FRAME_FACTOR).div_ceil(FRAME_FACTOR) * FRAME_FACTOR;
    if let Some(cap) = max_frames {
        if count > cap {
            count = ((cap / FRAME_FACTOR) * FRAME_FACTOR).max(FRAME_FACTOR);
        }
    }

    log::debug!(
        "Planning {count} of {total_frames} frames (source {source_fps:.3} fps, target {target_fps:.3} fps, cap {max_frames:?})"
    );

    if count >= total_frames {
        return identity(total_frames);
    }

    FrameIndexPlan {
        indices: spread_indices(total_frames, count),
    }
}

fn identity(total_frames: u64) -> FrameIndexPlan {
    FrameIndexPlan {
        indices: (0..total_frames).collect(),
    }
}

/// Spread `count` indices evenly over `[0, total_frames - 1]`.
///
/// Requires `1 <= count <= total_frames`.
fn spread_indices(total_frames: u64, count: u64) -> Vec<u64> {
    let last = total_frames - 1;
    if count == 1 {
        return vec![0];
    }

    let step = last as f64 / (count - 1) as f64;
    let mut indices: Vec<u64> = (0..count)
        .map(|k| {
            if k == count - 1 {
                last
            } else {
                (k as f64 * step).round_ties_even() as u64
            }
        })
        .collect();

    resolve_collisions(&mut indices, last);
    indices
}

/// Make `indices` strictly increasing without changing its length.
///
/// Collisions are pushed forward to the next unused index. If that runs past
/// `last`, a backward pass pulls the tail down again.
fn resolve_collisions(indices: &mut [u64], last: u64) {
    for position in 1..indices.len() {
        if indices[position] <= indices[position - 1] {
            indices[position] = indices[position - 1] + 1;
        }
    }

    let len = indices.len() as u64;
    for (position, index) in indices.iter_mut().enumerate().rev() {
        let ceiling = last - (len - 1 - position as u64);
        if *index > ceiling {
            *index = ceiling;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collisions_are_pushed_forward() {
        let mut indices = vec![0, 1, 1, 2, 9];
        resolve_collisions(&mut indices, 9);
        assert_eq!(indices, vec![0, 1, 2, 3, 9]);
    }

    #[test]
    fn collisions_at_the_end_are_pulled_back() {
        let mut indices = vec![0, 4, 4, 4];
        resolve_collisions(&mut indices, 4);
        assert_eq!(indices, vec![0, 2, 3, 4]);
    }

    #[test]
    fn spread_pins_both_ends() {
        let indices = spread_indices(1000, 7);
        assert_eq!(indices.first(), Some(&0));
        assert_eq!(indices.last(), Some(&999));
        assert_eq!(indices.len(), 7);
    }

    #[test]
    fn spread_rounds_half_to_even() {
        // step = 2.5: 0, 2.5, 5, 7.5, 10 -> 0, 2, 5, 8, 10
        assert_eq!(spread_indices(11, 5), vec![0, 2, 5, 8, 10]);
    }
}
