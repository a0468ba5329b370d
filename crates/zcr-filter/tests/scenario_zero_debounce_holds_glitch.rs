use zcr_filter::*;
use zcr_source::{ReadNote, Reading};

fn live(v: f64) -> Reading {
    Reading {
        value: Some(v),
        ts_ms: Some(0),
        note: ReadNote::Live,
    }
}

#[test]
fn single_zero_glitch_never_reaches_the_buffer() {
    let mut filter = ReliabilityFilter::new(FilterConfig::default());
    let mut buf = TickBuffer::new();
    buf.begin_period(zcr_schemas::PeriodKey(1));

    for (i, v) in [0.9, 0.0, 0.7].into_iter().enumerate() {
        let frame = FrameInfo {
            first_frame_of_period: i == 0,
            confirmed_this_period: buf.has_confirmed(),
        };
        let out = filter.process(&live(v), frame);
        if let Some(c) = out.confirmed() {
            buf.record(c);
        }
        if i == 1 {
            // Held, but decisions still see the last stable value.
            assert_eq!(out.candidate(), Some(0.9));
        }
    }

    assert_eq!(buf.count(), 2);
    assert_eq!(buf.last_value(), Some(0.7));
}

#[test]
fn larger_confirm_window_needs_more_frames() {
    let mut filter = ReliabilityFilter::new(FilterConfig {
        zero_confirm_frames: 3,
        ..FilterConfig::default()
    });
    let mid = FrameInfo {
        first_frame_of_period: false,
        confirmed_this_period: true,
    };
    filter.process(&live(1.0), mid);
    assert!(filter.process(&live(0.0), mid).confirmed().is_none());
    assert!(filter.process(&live(0.0), mid).confirmed().is_none());
    assert_eq!(filter.process(&live(0.0), mid).confirmed(), Some(0.0));
}
