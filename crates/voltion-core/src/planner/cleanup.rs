// Copyright (c) 2026 SOLARE S.R.O.
//
// This file is part of VoltION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Plan reconciliation: sort, consolidate, shift.
//!
//! The planner's sub-plans overlap freely; this pass turns them into an
//! ordered, non-overlapping sequence. A missing start means "now" and
//! sorts before everything; a missing stop means "until done" and sorts
//! after everything. Reconciliation is idempotent.

use chrono::{DateTime, TimeZone, Utc};

use voltion_types::{ChargePlanSegment, ChargeType};

/// Millisecond stand-ins for the open bounds.
const OPEN_START: i64 = i64::MIN;
const OPEN_STOP: i64 = i64::MAX;

/// A segment may stretch at most one hour past its nominal duration when
/// shifted toward its successor.
const SHIFT_ALLOWANCE_MS: i64 = 3_600_000;

#[derive(Debug, Clone)]
struct Span {
    start: i64,
    stop: i64,
    level: i16,
    charge_type: ChargeType,
    comment: String,
}

fn to_span(segment: ChargePlanSegment) -> Span {
    Span {
        start: segment
            .charge_start
            .map_or(OPEN_START, |ts| ts.timestamp_millis()),
        stop: segment
            .charge_stop
            .map_or(OPEN_STOP, |ts| ts.timestamp_millis()),
        level: segment.level,
        charge_type: segment.charge_type,
        comment: segment.comment,
    }
}

fn from_span(span: Span) -> ChargePlanSegment {
    let to_ts = |ms: i64| -> Option<DateTime<Utc>> { Utc.timestamp_millis_opt(ms).single() };
    ChargePlanSegment {
        charge_start: (span.start != OPEN_START)
            .then(|| to_ts(span.start))
            .flatten(),
        charge_stop: (span.stop != OPEN_STOP)
            .then(|| to_ts(span.stop))
            .flatten(),
        level: span.level,
        charge_type: span.charge_type,
        comment: span.comment,
    }
}

/// Merge overlapping neighbours, resolve conflicts by level and priority.
fn consolidate(spans: &mut Vec<Span>) {
    let mut i = 0;
    while i + 1 < spans.len() {
        if spans[i + 1].start <= spans[i].stop {
            let same_type = spans[i].charge_type == spans[i + 1].charge_type;
            let contained = spans[i + 1].stop <= spans[i].stop;
            if same_type || contained {
                let b = spans.remove(i + 1);
                let a = &mut spans[i];
                a.stop = a.stop.max(b.stop);
                a.level = a.level.max(b.level);
                i = i.saturating_sub(1);
                continue;
            } else if spans[i].level >= spans[i + 1].level {
                // a wins the overlap, push b out behind it
                spans[i + 1].start = spans[i].stop;
            } else {
                // b wants a higher level, cut a short
                spans[i].stop = spans[i + 1].start;
            }
        }
        i += 1;
    }
}

/// Slide each segment toward its successor when the slack plus the one-hour
/// allowance lets it close the gap entirely.
fn shift(spans: &mut [Span]) -> bool {
    let mut shifted = false;
    for i in 0..spans.len().saturating_sub(1) {
        let next_start = spans[i + 1].start;
        let a = &mut spans[i];
        let room = next_start.saturating_sub(a.stop);
        let allowance = a
            .start
            .saturating_sub(a.stop)
            .saturating_add(SHIFT_ALLOWANCE_MS);
        let amount = room.min(allowance);
        if amount > 0 && a.stop.saturating_add(amount) >= next_start {
            a.stop = next_start;
            a.start = a.start.saturating_add(amount);
            shifted = true;
        }
    }
    shifted
}

/// Reconcile an accumulated plan into its published form.
pub fn cleanup_plan(plan: Vec<ChargePlanSegment>) -> Vec<ChargePlanSegment> {
    let mut spans: Vec<Span> = plan.into_iter().map(to_span).collect();

    spans.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then(b.stop.cmp(&a.stop))
            .then(a.charge_type.priority().cmp(&b.charge_type.priority()))
    });

    consolidate(&mut spans);
    if shift(&mut spans) {
        consolidate(&mut spans);
    }

    spans.into_iter().map(from_span).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, hour, minute, 0).unwrap()
    }

    fn segment(
        start: Option<DateTime<Utc>>,
        stop: Option<DateTime<Utc>>,
        level: i16,
        charge_type: ChargeType,
    ) -> ChargePlanSegment {
        ChargePlanSegment::new(start, stop, level, charge_type, "")
    }

    #[test]
    fn overlap_with_higher_level_truncates_the_earlier_segment() {
        let plan = vec![
            segment(Some(ts(8, 0)), Some(ts(10, 0)), 70, ChargeType::Fill),
            segment(Some(ts(9, 0)), Some(ts(11, 0)), 80, ChargeType::Routine),
        ];
        let out = cleanup_plan(plan);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].charge_stop, Some(ts(9, 0)));
        assert_eq!(out[0].level, 70);
        assert_eq!(out[1].charge_start, Some(ts(9, 0)));
        assert_eq!(out[1].level, 80);
    }

    #[test]
    fn overlap_with_lower_level_pushes_the_later_segment() {
        let plan = vec![
            segment(Some(ts(8, 0)), Some(ts(10, 0)), 80, ChargeType::Routine),
            segment(Some(ts(9, 0)), Some(ts(11, 0)), 70, ChargeType::Fill),
        ];
        let out = cleanup_plan(plan);
        assert_eq!(out[0].charge_stop, Some(ts(10, 0)));
        assert_eq!(out[1].charge_start, Some(ts(10, 0)));
        assert_eq!(out[1].charge_stop, Some(ts(11, 0)));
    }

    #[test]
    fn same_type_segments_merge() {
        let plan = vec![
            segment(Some(ts(8, 0)), Some(ts(9, 30)), 70, ChargeType::Fill),
            segment(Some(ts(9, 0)), Some(ts(11, 0)), 75, ChargeType::Fill),
        ];
        let out = cleanup_plan(plan);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].charge_start, Some(ts(8, 0)));
        assert_eq!(out[0].charge_stop, Some(ts(11, 0)));
        assert_eq!(out[0].level, 75);
    }

    #[test]
    fn contained_segment_is_absorbed() {
        let plan = vec![
            segment(Some(ts(8, 0)), Some(ts(12, 0)), 80, ChargeType::Routine),
            segment(Some(ts(9, 0)), Some(ts(10, 0)), 70, ChargeType::Fill),
        ];
        let out = cleanup_plan(plan);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].charge_type, ChargeType::Routine);
        assert_eq!(out[0].level, 80);
    }

    #[test]
    fn short_segment_shifts_up_against_its_successor() {
        let plan = vec![
            segment(Some(ts(7, 0)), Some(ts(7, 30)), 60, ChargeType::Fill),
            segment(Some(ts(8, 0)), Some(ts(9, 0)), 70, ChargeType::Routine),
        ];
        let out = cleanup_plan(plan);
        assert_eq!(out[0].charge_start, Some(ts(7, 30)));
        assert_eq!(out[0].charge_stop, Some(ts(8, 0)));
        assert_eq!(out[1].charge_start, Some(ts(8, 0)));
        assert_eq!(out[1].charge_stop, Some(ts(9, 0)));
    }

    #[test]
    fn wide_gap_does_not_shift() {
        let plan = vec![
            segment(Some(ts(6, 0)), Some(ts(6, 30)), 60, ChargeType::Fill),
            segment(Some(ts(9, 0)), Some(ts(10, 0)), 70, ChargeType::Routine),
        ];
        let out = cleanup_plan(plan);
        assert_eq!(out[0].charge_start, Some(ts(6, 0)));
        assert_eq!(out[0].charge_stop, Some(ts(6, 30)));
    }

    #[test]
    fn open_bounds_sort_first_and_last() {
        let plan = vec![
            segment(Some(ts(8, 0)), Some(ts(9, 0)), 70, ChargeType::Fill),
            segment(None, Some(ts(6, 0)), 50, ChargeType::Minimum),
        ];
        let out = cleanup_plan(plan);
        assert_eq!(out[0].charge_start, None);
        assert_eq!(out[0].charge_type, ChargeType::Minimum);
    }

    #[test]
    fn emergency_now_segment_absorbs_overlapping_routine() {
        // open start, open stop: swallows everything it touches
        let plan = vec![
            segment(None, None, 100, ChargeType::Calibrate),
            segment(Some(ts(8, 0)), Some(ts(9, 0)), 70, ChargeType::Routine),
        ];
        let out = cleanup_plan(plan);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].charge_type, ChargeType::Calibrate);
        assert_eq!(out[0].level, 100);
    }

    #[test]
    fn ordered_and_non_overlapping_after_cleanup() {
        let plan = vec![
            segment(Some(ts(10, 0)), Some(ts(12, 0)), 60, ChargeType::Fill),
            segment(None, Some(ts(7, 0)), 50, ChargeType::Minimum),
            segment(Some(ts(6, 30)), Some(ts(11, 0)), 80, ChargeType::Trip),
            segment(Some(ts(9, 0)), Some(ts(13, 0)), 70, ChargeType::Routine),
        ];
        let out = cleanup_plan(plan);
        for pair in out.windows(2) {
            let stop = pair[0].charge_stop.expect("interior stops are closed");
            let start = pair[1].charge_start.expect("interior starts are closed");
            assert!(stop <= start, "{stop} > {start}");
        }
    }

    #[test]
    fn cleanup_is_idempotent() {
        let plan = vec![
            segment(Some(ts(7, 0)), Some(ts(7, 30)), 60, ChargeType::Fill),
            segment(Some(ts(8, 0)), Some(ts(9, 0)), 70, ChargeType::Routine),
            segment(Some(ts(8, 30)), Some(ts(11, 0)), 90, ChargeType::Trip),
            segment(None, Some(ts(6, 0)), 50, ChargeType::Minimum),
        ];
        let once = cleanup_plan(plan);
        let twice = cleanup_plan(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_plan_stays_empty() {
        assert!(cleanup_plan(Vec::new()).is_empty());
    }
}
