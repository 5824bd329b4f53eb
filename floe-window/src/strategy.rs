use chrono::{Duration, TimeZone, Timelike, Utc};
use thiserror::Error;

use crate::{MergeFn, RowView, Span, SpanError, Timestamp, Value, ALL_SPAN};

#[derive(Error, Debug)]
pub enum WindowError {
    #[error("invalid window configuration: {0}")]
    Configuration(String),
    #[error(transparent)]
    Span(#[from] SpanError),
}

/// A window strategy: a pure function from timestamp to candidate spans,
/// plus a merge that integrates one value into a chosen span's state.
#[derive(Debug, Clone, Copy)]
pub enum WindowKind {
    All,
    Sliding { width: Duration, period: Duration },
    Session { timeout: Duration },
}

impl WindowKind {
    pub fn fixed(width: Duration) -> Self {
        WindowKind::Sliding {
            width,
            period: width,
        }
    }

    pub fn sliding(width: Duration, period: Duration) -> Self {
        WindowKind::Sliding { width, period }
    }

    pub fn session(timeout: Duration) -> Self {
        WindowKind::Session { timeout }
    }

    /// Candidate spans containing `ts`.
    pub fn apply(&self, ts: Timestamp) -> Result<Vec<Span>, WindowError> {
        match self {
            WindowKind::All => Ok(vec![ALL_SPAN]),
            WindowKind::Sliding { width, period } => sliding_apply(ts, *width, *period),
            WindowKind::Session { timeout } => {
                let s = truncate_to_minute(ts);
                let start = s.timestamp();
                let end = start + timeout.num_seconds();
                Ok(vec![Span::new(start, end)?])
            }
        }
    }

    /// Integrate `value` at `span` (one of the spans `apply` returned for
    /// this event's timestamp) into `state`, via `merge`.
    pub fn merge(
        &self,
        span: &Span,
        value: Value,
        state: &mut dyn RowView,
        merge: &MergeFn<'_>,
    ) -> Result<(), WindowError> {
        match self {
            WindowKind::All | WindowKind::Sliding { .. } => {
                let prior = state.get(span);
                let replaced = if prior.is_some() {
                    vec![*span]
                } else {
                    vec![]
                };
                let merged = merge(prior, vec![value]);
                state.coalesce(*span, replaced, merged);
                Ok(())
            }
            WindowKind::Session { .. } => {
                let mut final_span = *span;
                let mut replaced = Vec::new();
                let mut values = vec![value];

                let mut existing: Vec<Span> =
                    state.spans().into_iter().filter(|s| s.overlap(&final_span)).collect();
                existing.sort();

                for s in existing {
                    let prior = state.get(&s);
                    values = merge(prior, values);
                    final_span = final_span.expand(&s);
                    replaced.push(s);
                }

                state.coalesce(final_span, replaced, values);
                Ok(())
            }
        }
    }
}

fn truncate_to_minute(ts: Timestamp) -> Timestamp {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

fn truncate_to(ts: Timestamp, width: Duration) -> Result<Timestamp, WindowError> {
    let width_secs = width.num_seconds();
    if width_secs <= 0 {
        return Err(WindowError::Configuration(
            "sliding window width must be positive".into(),
        ));
    }
    let minute = truncate_to_minute(ts);
    let secs = minute.timestamp();
    let truncated = secs - secs.rem_euclid(width_secs);
    Ok(Utc
        .timestamp_opt(truncated, 0)
        .single()
        .unwrap_or(minute))
}

fn sliding_apply(ts: Timestamp, width: Duration, period: Duration) -> Result<Vec<Span>, WindowError> {
    let period_secs = period.num_seconds();
    if period_secs <= 0 {
        return Err(WindowError::Configuration(
            "sliding window period must be positive".into(),
        ));
    }
    let width_secs = width.num_seconds();
    let ts_secs = ts.timestamp();

    let mut t0 = truncate_to(ts, width)?.timestamp();
    let mut spans = Vec::new();
    while t0 <= ts_secs {
        if ts_secs >= t0 && ts_secs < t0 + width_secs {
            spans.push(Span::new(t0, t0 + width_secs)?);
        }
        t0 += period_secs;
    }
    Ok(spans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Span;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct FakeRow {
        snapshot: BTreeMap<Span, Vec<Value>>,
        staged: BTreeMap<Span, Vec<Value>>,
        deleted: Vec<Span>,
    }

    impl RowView for FakeRow {
        fn get(&self, span: &Span) -> Option<Vec<Value>> {
            if let Some(v) = self.staged.get(span) {
                return Some(v.clone());
            }
            if self.deleted.contains(span) {
                return None;
            }
            self.snapshot.get(span).cloned()
        }

        fn spans(&self) -> Vec<Span> {
            let mut out: Vec<Span> = self
                .snapshot
                .keys()
                .filter(|s| !self.deleted.contains(s))
                .copied()
                .collect();
            for s in self.staged.keys() {
                if !out.contains(s) {
                    out.push(*s);
                }
            }
            out
        }

        fn coalesce(&mut self, new_span: Span, replaced: Vec<Span>, values: Vec<Value>) {
            self.staged.insert(new_span, values);
            for r in replaced {
                if r != new_span {
                    self.deleted.push(r);
                }
            }
        }
    }

    fn cons(prior: Option<Vec<Value>>, new: Vec<Value>) -> Vec<Value> {
        let mut v = prior.unwrap_or_default();
        v.extend(new);
        v
    }

    #[test]
    fn all_window_has_single_universal_span() {
        let w = WindowKind::All;
        let ts = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let spans = w.apply(ts).unwrap();
        assert_eq!(spans, vec![ALL_SPAN]);
    }

    #[test]
    fn sliding_5m_2m_produces_two_overlapping_spans() {
        let w = WindowKind::sliding(Duration::minutes(5), Duration::minutes(2));
        let ts = Utc.with_ymd_and_hms(2017, 1, 1, 13, 47, 1).unwrap();
        let spans = w.apply(ts).unwrap();
        let expect_a = Span::new(
            Utc.with_ymd_and_hms(2017, 1, 1, 13, 45, 0).unwrap().timestamp(),
            Utc.with_ymd_and_hms(2017, 1, 1, 13, 50, 0).unwrap().timestamp(),
        )
        .unwrap();
        let expect_b = Span::new(
            Utc.with_ymd_and_hms(2017, 1, 1, 13, 47, 0).unwrap().timestamp(),
            Utc.with_ymd_and_hms(2017, 1, 1, 13, 52, 0).unwrap().timestamp(),
        )
        .unwrap();
        assert!(spans.contains(&expect_a));
        assert!(spans.contains(&expect_b));
        assert_eq!(spans.len(), 2);
    }

    #[test]
    fn session_merges_across_gaps_under_timeout() {
        let w = WindowKind::session(Duration::minutes(30));
        let mut row = FakeRow::default();

        let events = [
            (Utc.with_ymd_and_hms(2020, 1, 1, 13, 1, 0).unwrap(), 0),
            (Utc.with_ymd_and_hms(2020, 1, 1, 13, 2, 0).unwrap(), 1),
            (Utc.with_ymd_and_hms(2020, 1, 1, 15, 3, 0).unwrap(), 2),
            (Utc.with_ymd_and_hms(2020, 1, 2, 15, 4, 0).unwrap(), 3),
            (Utc.with_ymd_and_hms(2020, 1, 2, 15, 5, 0).unwrap(), 4),
        ];

        for (ts, v) in events {
            let spans = w.apply(ts).unwrap();
            assert_eq!(spans.len(), 1);
            w.merge(&spans[0], Value::from(v), &mut row, &cons).unwrap();
            // A production Reduce sub-task would Flush here; the fake row
            // applies staged writes immediately so the next merge observes them.
            for (span, values) in std::mem::take(&mut row.staged) {
                row.snapshot.insert(span, values);
            }
            for d in std::mem::take(&mut row.deleted) {
                row.snapshot.remove(&d);
            }
        }

        let mut spans: Vec<Span> = row.snapshot.keys().copied().collect();
        spans.sort();
        assert_eq!(spans.len(), 3);

        let vals_of = |s: &Span| row.snapshot.get(s).unwrap().clone();
        assert_eq!(vals_of(&spans[0]), vec![Value::from(0), Value::from(1)]);
        assert_eq!(vals_of(&spans[1]), vec![Value::from(2)]);
        assert_eq!(vals_of(&spans[2]), vec![Value::from(3), Value::from(4)]);
    }
}
