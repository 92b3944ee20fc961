//! Decoder for log chunks fetched from the device.
//!
//! A chunk is newline-delimited text, one sample per line, fields
//! comma-separated. The logger firmware has grown fields over time, so the
//! decoder is deliberately tolerant: tokens that do not parse as integers are
//! discarded, the timestamp is the *last* integer on the line, and trailing
//! additions do not break older readers. Malformed lines are skipped, never
//! fatal; a corrupt chunk decodes to an empty result.

/// Closed time interval (seconds) where a motion flag was continuously on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Span {
    pub start: f64,
    pub end: f64,
}

/// One decoded chunk: four chart-ready series on a shared time axis plus the
/// per-side motion spans used for highlight shading.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkData {
    pub sample_count: usize,
    pub hb_left: Vec<(f64, f64)>,
    pub hb_right: Vec<(f64, f64)>,
    pub rcwl_left: Vec<(f64, f64)>,
    pub rcwl_right: Vec<(f64, f64)>,
    pub motion_left: Vec<Span>,
    pub motion_right: Vec<Span>,
}

/// Decodes one chunk of log text.
///
/// Line layout after discarding non-integer tokens (at least 5 integers
/// required, otherwise the line is skipped):
///
/// ```text
/// hb_left, hb_right, rcwl_left, rcwl_right [, led_left, led_right, ...], timestamp_ms
/// ```
///
/// The timestamp is always the last integer. The LED flags are only read when
/// 7 or more integers are present; shorter lines default both to off.
/// Timestamps must be strictly increasing within a chunk; duplicate or
/// out-of-order lines (a device restart mid-log writes those) are dropped.
pub fn parse_chunk(text: &str) -> ChunkData {
    let mut data = ChunkData::default();
    let mut times: Vec<f64> = Vec::new();
    let mut led_left: Vec<bool> = Vec::new();
    let mut led_right: Vec<bool> = Vec::new();
    let mut last_ts: i64 = -1;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let ints: Vec<i64> = line
            .split(',')
            .filter_map(|tok| tok.trim().parse::<i64>().ok())
            .collect();
        if ints.len() < 5 {
            continue;
        }

        let ts_ms = ints[ints.len() - 1];
        if ts_ms <= last_ts {
            continue;
        }
        last_ts = ts_ms;

        let (led_l, led_r) = if ints.len() >= 7 {
            (ints[4] != 0, ints[5] != 0)
        } else {
            (false, false)
        };

        let t = ts_ms as f64 / 1000.0;
        data.hb_left.push((t, ints[0] as f64));
        data.hb_right.push((t, ints[1] as f64));
        data.rcwl_left.push((t, if ints[2] != 0 { 1.0 } else { 0.0 }));
        data.rcwl_right.push((t, if ints[3] != 0 { 1.0 } else { 0.0 }));

        times.push(t);
        led_left.push(led_l);
        led_right.push(led_r);
        data.sample_count += 1;
    }

    data.motion_left = compute_spans(&times, &led_left);
    data.motion_right = compute_spans(&times, &led_right);
    data
}

/// Derives on-intervals from a flag sequence over a shared time axis.
///
/// A span opens at the first sample where the flag turns on and closes at the
/// first off sample after the run; a run still on at the end of the chunk
/// closes at the final timestamp. Mismatched lengths or fewer than two
/// samples yield no spans.
pub fn compute_spans(times: &[f64], flags: &[bool]) -> Vec<Span> {
    let mut spans = Vec::new();
    if times.len() != flags.len() || times.len() < 2 {
        return spans;
    }

    let mut start: Option<f64> = None;
    for (&t, &on) in times.iter().zip(flags.iter()) {
        match (start, on) {
            (None, true) => start = Some(t),
            (Some(s), false) => {
                spans.push(Span { start: s, end: t });
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push(Span {
            start: s,
            end: times[times.len() - 1],
        });
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(start: f64, end: f64) -> Span {
        Span { start, end }
    }

    #[test]
    fn decodes_plain_five_field_lines() {
        let data = parse_chunk("10,-3,1,0,100\n12,4,0,1,200\n");
        assert_eq!(data.sample_count, 2);
        assert_eq!(data.hb_left, vec![(0.1, 10.0), (0.2, 12.0)]);
        assert_eq!(data.hb_right, vec![(0.1, -3.0), (0.2, 4.0)]);
        assert_eq!(data.rcwl_left, vec![(0.1, 1.0), (0.2, 0.0)]);
        assert_eq!(data.rcwl_right, vec![(0.1, 0.0), (0.2, 1.0)]);
        // 5-field layout carries no LED flags
        assert!(data.motion_left.is_empty());
        assert!(data.motion_right.is_empty());
    }

    #[test]
    fn seven_field_layout_carries_led_flags() {
        let text = "1,2,0,0,0,0,100\n1,2,0,0,1,0,200\n1,2,0,0,1,0,300\n1,2,0,0,0,1,400\n";
        let data = parse_chunk(text);
        assert_eq!(data.sample_count, 4);
        assert_eq!(data.motion_left, vec![span(0.2, 0.4)]);
        // right flag turns on at the last sample: trailing run closes there
        assert_eq!(data.motion_right, vec![span(0.4, 0.4)]);
    }

    #[test]
    fn all_series_share_the_accepted_count() {
        let data = parse_chunk("1,2,3,4,100\ngarbage\n5,6,7,8,200\n\n9,10,11,12,300");
        assert_eq!(data.sample_count, 3);
        assert_eq!(data.hb_left.len(), 3);
        assert_eq!(data.hb_right.len(), 3);
        assert_eq!(data.rcwl_left.len(), 3);
        assert_eq!(data.rcwl_right.len(), 3);
    }

    #[test]
    fn short_lines_are_dropped() {
        assert_eq!(parse_chunk("1,2,3").sample_count, 0);
        assert_eq!(parse_chunk("1,2,3,4").sample_count, 0);
        assert_eq!(parse_chunk("").sample_count, 0);
        assert_eq!(parse_chunk("\n\n\n").sample_count, 0);
    }

    #[test]
    fn non_integer_tokens_are_discarded_not_fatal() {
        // "x" and "7.5" drop out; five integers survive, last one is the timestamp
        let data = parse_chunk("1, x, 2, 3, 4, 7.5, 500\n");
        assert_eq!(data.sample_count, 1);
        assert_eq!(data.hb_left, vec![(0.5, 1.0)]);
        assert_eq!(data.hb_right, vec![(0.5, 2.0)]);
    }

    #[test]
    fn discarding_below_five_integers_drops_the_line() {
        assert_eq!(parse_chunk("1,2,3,nope,bad\n").sample_count, 0);
    }

    #[test]
    fn non_increasing_timestamps_are_dropped() {
        let data = parse_chunk("1,1,0,0,500\n2,2,0,0,500\n3,3,0,0,400\n4,4,0,0,501\n");
        assert_eq!(data.sample_count, 2);
        assert_eq!(data.hb_left, vec![(0.5, 1.0), (0.501, 4.0)]);
    }

    #[test]
    fn timestamp_zero_is_accepted_first() {
        let data = parse_chunk("1,1,0,0,0\n2,2,0,0,1\n");
        assert_eq!(data.sample_count, 2);
    }

    #[test]
    fn negative_timestamps_never_pass_the_watermark() {
        assert_eq!(parse_chunk("1,1,0,0,-5\n").sample_count, 0);
    }

    #[test]
    fn trailing_extra_integers_shift_the_timestamp_to_the_last() {
        // 8 integers: positions 4-5 are LED flags, position 7 (last) is the timestamp
        let data = parse_chunk("1,2,0,0,1,1,42,1000\n1,2,0,0,0,0,42,2000\n");
        assert_eq!(data.sample_count, 2);
        assert_eq!(data.hb_left, vec![(1.0, 1.0), (2.0, 1.0)]);
        assert_eq!(data.motion_left, vec![span(1.0, 2.0)]);
    }

    #[test]
    fn decoding_garbage_never_panics() {
        for text in [
            ",,,,,",
            "-,-,-,-,-",
            "1,2,3,4,5,6,7,8,9,10,11,12",
            "9999999999999999999999999,1,2,3,4",
            "\u{0},\u{0},\u{0},\u{0},\u{0}",
        ] {
            let _ = parse_chunk(text);
        }
    }

    #[test]
    fn spans_open_and_close_on_transitions() {
        let spans = compute_spans(&[0.0, 1.0, 2.0, 3.0], &[false, true, true, false]);
        assert_eq!(spans, vec![span(1.0, 3.0)]);
    }

    #[test]
    fn trailing_open_run_closes_at_last_timestamp() {
        let spans = compute_spans(&[0.0, 1.0, 2.0], &[true, true, true]);
        assert_eq!(spans, vec![span(0.0, 2.0)]);
    }

    #[test]
    fn multiple_spans_stay_ordered_and_disjoint() {
        let times = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let flags = [false, true, false, true, true, false];
        let spans = compute_spans(&times, &flags);
        assert_eq!(spans, vec![span(1.0, 2.0), span(3.0, 5.0)]);
    }

    #[test]
    fn degenerate_inputs_yield_no_spans() {
        assert!(compute_spans(&[], &[]).is_empty());
        assert!(compute_spans(&[1.0], &[true]).is_empty());
        assert!(compute_spans(&[1.0, 2.0], &[true]).is_empty());
    }
}
