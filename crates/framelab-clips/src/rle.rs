//! Run-length encoding of per-frame boolean traces.
//!
//! Converts a sequence of `(frame_number, flag)` observations into the
//! maximal closed intervals of "on" frames, bridging short gaps and
//! discarding short runs on request.

use framelab_models::{FrameSupport, SupportError};

/// Encode a boolean trace into closed frame intervals.
///
/// `frame_numbers` and `flags` are parallel sequences ordered by frame
/// number. A run is flushed whenever the next frame's distance from the
/// last "on" frame exceeds `tol`, plus one when that next frame is itself
/// "on". Consequently `k` consecutive "off" frames are bridged iff
/// `k <= tol`. When `min_len > 1`, runs spanning fewer than `min_len`
/// frames are dropped.
///
/// Returns `None` when the input is empty, which callers use to tell
/// "sample has no frames" apart from "no frames matched".
pub fn to_rle(
    frame_numbers: &[u32],
    flags: &[bool],
    tol: u32,
    min_len: u32,
) -> Result<Option<Vec<FrameSupport>>, SupportError> {
    if frame_numbers.is_empty() {
        return Ok(None);
    }

    let mut ranges: Vec<(u32, u32)> = Vec::new();
    let mut run: Option<(u32, u32)> = None;

    for (&frame_number, &flag) in frame_numbers.iter().zip(flags) {
        if let Some((start, last)) = run {
            let gap = i64::from(frame_number) - i64::from(last);
            if gap > i64::from(tol) + i64::from(flag) {
                ranges.push((start, last));
                run = None;
            }
        }

        if flag {
            run = Some(match run {
                Some((start, _)) => (start, frame_number),
                None => (frame_number, frame_number),
            });
        }
    }

    if let Some(range) = run {
        ranges.push(range);
    }

    if min_len > 1 {
        ranges.retain(|&(start, last)| last - start + 1 >= min_len);
    }

    let supports = ranges
        .into_iter()
        .map(|(start, last)| FrameSupport::new(start, last))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(supports))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(supports: &[FrameSupport]) -> Vec<(u32, u32)> {
        supports.iter().map(|s| (*s).into()).collect()
    }

    fn encode(flags: &[bool], tol: u32, min_len: u32) -> Vec<(u32, u32)> {
        let frame_numbers: Vec<u32> = (1..=flags.len() as u32).collect();
        ranges(&to_rle(&frame_numbers, flags, tol, min_len).unwrap().unwrap())
    }

    #[test]
    fn test_empty_input_is_none() {
        assert_eq!(to_rle(&[], &[], 0, 0).unwrap(), None);
    }

    #[test]
    fn test_all_false_is_empty() {
        assert_eq!(encode(&[false, false, false], 0, 0), vec![]);
    }

    #[test]
    fn test_basic_runs() {
        let flags = [true, true, false, false, true, true];
        assert_eq!(encode(&flags, 0, 0), vec![(1, 2), (5, 6)]);
        // two off frames need tol=2 to bridge
        assert_eq!(encode(&flags, 1, 0), vec![(1, 2), (5, 6)]);
        assert_eq!(encode(&flags, 2, 0), vec![(1, 6)]);
    }

    #[test]
    fn test_single_gap_bridged() {
        let flags = [true, true, false, true, true];
        assert_eq!(encode(&flags, 0, 0), vec![(1, 2), (4, 5)]);
        assert_eq!(encode(&flags, 1, 0), vec![(1, 5)]);
    }

    #[test]
    fn test_min_len_filters_short_runs() {
        let flags = [true, false, true, true, true, false, true, true];
        assert_eq!(encode(&flags, 0, 0), vec![(1, 1), (3, 5), (7, 8)]);
        assert_eq!(encode(&flags, 0, 3), vec![(3, 5)]);
        // min_len <= 1 keeps everything
        assert_eq!(encode(&flags, 0, 1), vec![(1, 1), (3, 5), (7, 8)]);
    }

    #[test]
    fn test_sparse_frame_numbers() {
        // frame numbers need not be contiguous; gaps count in frame units
        let frame_numbers = [10, 20, 30];
        let flags = [true, true, true];
        let out = to_rle(&frame_numbers, &flags, 0, 0).unwrap().unwrap();
        assert_eq!(ranges(&out), vec![(10, 10), (20, 20), (30, 30)]);

        let out = to_rle(&frame_numbers, &flags, 10, 0).unwrap().unwrap();
        assert_eq!(ranges(&out), vec![(10, 30)]);
    }

    #[test]
    fn test_trailing_run_is_flushed() {
        assert_eq!(encode(&[false, true, true], 0, 0), vec![(2, 3)]);
    }

    #[test]
    fn test_intervals_disjoint_and_sorted() {
        let flags = [
            true, false, true, true, false, false, true, false, true, true,
        ];
        for tol in 0..3 {
            let out = encode(&flags, tol, 0);
            for pair in out.windows(2) {
                assert!(pair[0].1 < pair[1].0);
            }
            for (start, last) in out {
                assert!(start <= last);
            }
        }
    }

    #[test]
    fn test_idempotent_at_zero_tolerance() {
        let flags = [true, true, false, true, false, false, true, true, true];
        let frame_numbers: Vec<u32> = (1..=flags.len() as u32).collect();
        let first = to_rle(&frame_numbers, &flags, 0, 0).unwrap().unwrap();

        // expand the intervals back to an all-on trace and re-encode
        let on_frames: Vec<u32> = first
            .iter()
            .flat_map(|s| s.first_frame()..=s.last_frame())
            .collect();
        let on_flags = vec![true; on_frames.len()];
        let second = to_rle(&on_frames, &on_flags, 0, 0).unwrap().unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_zero_frame_number_rejected() {
        assert!(to_rle(&[0, 1], &[true, true], 0, 0).is_err());
    }
}
