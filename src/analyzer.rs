//! # Pulse analyzer
//!
//! [`Analyzer::deduce_protocol`] turns a window of recently traced pulses
//! into a proposed [`ProtocolTiming`] row, or a "detection failed" line,
//! without any prior knowledge of the transmitting protocol (spec.md
//! §4.6). It is purely offline: nothing here runs from interrupt
//! context, and nothing here feeds back into [`crate::decoder::Decoder`]
//! automatically — the caller decides whether to add the proposal to a
//! table and `setup` it.

use crate::pulse::{Level, Pulse};
use crate::sink::LineSink;
use crate::table::ProtocolTiming;
use crate::tracer::Tracer;

/// Percent tolerance used to cluster pulses into categories (spec.md
/// §4.6 step 1). This is the analyzer's own clustering tolerance, not a
/// property of any protocol row.
const CLUSTER_TOLERANCE_PERCENT: u32 = 20;

/// Scaling base used for the emitted `makeTimingSpec` counts (spec.md
/// §4.6 step 6).
const EMIT_CLOCK_US: u32 = 10;

/// Minimum number of tracer records before a proposal is attempted
/// (spec.md §6): enough to see both a synch and a data pulse of
/// whichever protocol was transmitting.
pub const MIN_TRACE_RECORDS: usize = 132;

/// Maximum number of distinct duration/level categories tracked during
/// the all-categories pass.
const MAX_CATEGORIES: usize = 6;

/// A running cluster of same-level pulses whose durations all fall
/// within tolerance of each other's weighted average.
#[derive(Debug, Clone, Copy)]
struct PulseCategory {
    level: Level,
    count: u32,
    sum_us: u64,
    min_us: u32,
    max_us: u32,
}

impl PulseCategory {
    fn new(level: Level, duration_us: u32) -> Self {
        Self { level, count: 1, sum_us: duration_us as u64, min_us: duration_us, max_us: duration_us }
    }

    fn avg_us(&self) -> u32 {
        (self.sum_us / self.count.max(1) as u64) as u32
    }

    fn add(&mut self, duration_us: u32) {
        self.sum_us += duration_us as u64;
        self.count += 1;
        self.min_us = self.min_us.min(duration_us);
        self.max_us = self.max_us.max(duration_us);
    }

    fn matches(&self, pulse: Pulse) -> bool {
        self.level == pulse.level() && pulse.is_duration_in_range(self.avg_us(), CLUSTER_TOLERANCE_PERCENT)
    }

    /// Largest observed deviation from the average, as a percent of it;
    /// used only to estimate a tolerance for the emitted proposal.
    fn spread_percent(&self) -> u32 {
        let avg = self.avg_us().max(1);
        let spread = (self.max_us.saturating_sub(self.avg_us())).max(self.avg_us().saturating_sub(self.min_us));
        (spread * 100 / avg).max(1)
    }
}

/// A small fixed-capacity set of [`PulseCategory`]s, built by folding
/// pulses in one at a time: a pulse joins the first existing category
/// whose level matches and whose running average is within tolerance,
/// starts a new category if room remains, or is dropped (and counted)
/// if the set is already at capacity.
struct CategorySet<const CAP: usize> {
    categories: [PulseCategory; CAP],
    len: usize,
    overflow: u32,
}

impl<const CAP: usize> CategorySet<CAP> {
    fn new() -> Self {
        Self {
            categories: [PulseCategory::new(Level::Unknown, 0); CAP],
            len: 0,
            overflow: 0,
        }
    }

    fn absorb(&mut self, pulse: Pulse) {
        for i in 0..self.len {
            if self.categories[i].matches(pulse) {
                self.categories[i].add(pulse.duration_us());
                return;
            }
        }
        if self.len < CAP {
            self.categories[self.len] = PulseCategory::new(pulse.level(), pulse.duration_us());
            self.len += 1;
        } else {
            self.overflow += 1;
        }
    }

    fn as_slice(&self) -> &[PulseCategory] {
        &self.categories[..self.len]
    }

    /// Ascending insertion sort by weighted average; `len` is at most 6.
    fn sort_by_avg(&mut self) {
        let s = &mut self.categories[..self.len];
        for i in 1..s.len() {
            let mut j = i;
            while j > 0 && s[j].avg_us() < s[j - 1].avg_us() {
                s.swap(j, j - 1);
                j -= 1;
            }
        }
    }
}

/// Offline heuristic that proposes a protocol timing from recently
/// traced pulses.
pub struct Analyzer;

impl Analyzer {
    /// Attempt to deduce a protocol timing from `tracer`'s contents,
    /// writing either a `makeTimingSpec<...>` proposal line or a failure
    /// notice to `sink` (spec.md §4.6, §6). Returns the proposed row
    /// (with `id = 0`, left for the caller to assign) on success.
    pub fn deduce_protocol<const CAP: usize>(tracer: &Tracer<CAP>, sink: &mut dyn LineSink) -> Option<ProtocolTiming> {
        let n = tracer.len();
        if n < MIN_TRACE_RECORDS {
            sink.write_line("deduce_protocol: not enough trace records");
            return None;
        }

        // Step 1: all-categories pass.
        let mut all: CategorySet<MAX_CATEGORIES> = CategorySet::new();
        for i in 0..n {
            all.absorb(tracer.record_at(i).pulse());
        }
        all.sort_by_avg();
        let synch_b_ref = match all.as_slice().last() {
            Some(c) => *c,
            None => {
                sink.write_line("deduce_protocol: no categories found");
                return None;
            }
        };

        // Step 2: synch vs. data partition.
        let mut synch: CategorySet<2> = CategorySet::new();
        let mut data: CategorySet<4> = CategorySet::new();
        for i in 0..n {
            let pulse = tracer.record_at(i).pulse();
            let next_is_synch_b = i + 1 < n
                && tracer
                    .record_at(i + 1)
                    .pulse()
                    .is_duration_in_range(synch_b_ref.avg_us(), CLUSTER_TOLERANCE_PERCENT);
            if next_is_synch_b {
                synch.absorb(pulse);
            } else if pulse.is_duration_in_range(synch_b_ref.avg_us(), CLUSTER_TOLERANCE_PERCENT) {
                synch.absorb(pulse);
            } else {
                data.absorb(pulse);
            }
        }

        // Step 3: validation.
        if synch.len != 2 {
            sink.write_line("deduce_protocol: expected exactly 2 synch categories");
            return None;
        }
        if data.len != 4 {
            sink.write_line("deduce_protocol: expected exactly 4 data categories");
            return None;
        }
        synch.sort_by_avg();
        let (shorter_synch, longer_synch) = (synch.categories[0], synch.categories[1]);
        if longer_synch.avg_us() <= shorter_synch.avg_us() * 8 {
            sink.write_line("deduce_protocol: synch ratio guard failed (long <= 8x short)");
            return None;
        }

        // Step 4: data-pair assignment, split by level.
        let mut lo = [PulseCategory::new(Level::Lo, 0); 2];
        let mut hi = [PulseCategory::new(Level::Hi, 0); 2];
        let (mut lo_count, mut hi_count) = (0usize, 0usize);
        for c in data.as_slice() {
            match c.level {
                Level::Lo if lo_count < 2 => {
                    lo[lo_count] = *c;
                    lo_count += 1;
                }
                Level::Hi if hi_count < 2 => {
                    hi[hi_count] = *c;
                    hi_count += 1;
                }
                _ => {}
            }
        }
        if lo_count != 2 || hi_count != 2 {
            sink.write_line("deduce_protocol: data categories not split 2-and-2 by level");
            return None;
        }
        if lo[0].avg_us() > lo[1].avg_us() {
            lo.swap(0, 1);
        }
        if hi[0].avg_us() > hi[1].avg_us() {
            hi.swap(0, 1);
        }
        let (short_lo, long_lo) = (lo[0], lo[1]);
        let (short_hi, long_hi) = (hi[0], hi[1]);

        let inverse = shorter_synch.level == Level::Lo;
        let (d0a, d0b, d1a, d1b) = if inverse {
            (short_lo, long_hi, long_lo, short_hi)
        } else {
            (short_hi, long_lo, long_hi, short_lo)
        };

        // Step 5: ratio guard (long/short > 1.5 for both bit types),
        // kept in integer arithmetic since the analyzer has no need for
        // floating point either.
        if !(d0b.avg_us() * 2 > d0a.avg_us() * 3) || !(d1a.avg_us() * 2 > d1b.avg_us() * 3) {
            sink.write_line("deduce_protocol: data ratio guard failed (long/short <= 1.5)");
            return None;
        }

        // Step 6: emit.
        let round_div = |v: u32| (v + EMIT_CLOCK_US / 2) / EMIT_CLOCK_US;
        let tol_percent = [shorter_synch, longer_synch, d0a, d0b, d1a, d1b]
            .iter()
            .map(PulseCategory::spread_percent)
            .max()
            .unwrap_or(CLUSTER_TOLERANCE_PERCENT)
            .clamp(5, 50);

        let s_a = round_div(shorter_synch.avg_us());
        let s_b = round_div(longer_synch.avg_us());
        let d0a_n = round_div(d0a.avg_us());
        let d0b_n = round_div(d0b.avg_us());
        let d1a_n = round_div(d1a.avg_us());
        let d1b_n = round_div(d1b.avg_us());

        let proposal = ProtocolTiming::from_spec(0, EMIT_CLOCK_US, tol_percent, s_a, s_b, d0a_n, d0b_n, d1a_n, d1b_n, inverse);

        use core::fmt::Write;
        let mut line: crate::line::Line = crate::line::Line::new();
        let _ = write!(
            line,
            "makeTimingSpec<0, {EMIT_CLOCK_US}, {tol_percent}, {s_a}, {s_b}, {d0a_n}, {d0b_n}, {d1a_n}, {d1b_n}, {inverse}>,"
        );
        sink.write_line(line.as_str());

        Some(proposal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::test_support::CollectingSink;

    /// Feed `tracer` ten noise-free messages of protocol row 1 (spec.md
    /// §8): clock=350us, sA=1, sB=31, d0=(1,3), d1=(3,1), normal polarity.
    /// 10 messages * 14 pulses/message = 140 >= MIN_TRACE_RECORDS.
    fn fill_row1_trace<const CAP: usize>(tracer: &mut Tracer<CAP>) {
        let bits = [false, true, false, false, true, true];
        for _ in 0..10 {
            tracer.record(Pulse::new(350, Level::Hi), 1); // synch A
            tracer.record(Pulse::new(10850, Level::Lo), 1); // synch B
            for &bit in &bits {
                if bit {
                    tracer.record(Pulse::new(1050, Level::Hi), 1);
                    tracer.record(Pulse::new(350, Level::Lo), 1);
                } else {
                    tracer.record(Pulse::new(350, Level::Hi), 1);
                    tracer.record(Pulse::new(1050, Level::Lo), 1);
                }
            }
        }
    }

    #[test]
    fn deduces_row1_timing_from_noise_free_trace() {
        let mut tracer: Tracer<200> = Tracer::new();
        fill_row1_trace(&mut tracer);
        let mut sink = CollectingSink::default();

        let proposal = Analyzer::deduce_protocol(&tracer, &mut sink).expect("deduction should succeed");

        assert!(!proposal.inverse);
        assert!(proposal.synch.a.is_within(350));
        assert!(proposal.synch.b.is_within(10850));
        assert!(proposal.data0.a.is_within(350));
        assert!(proposal.data0.b.is_within(1050));
        assert!(proposal.data1.a.is_within(1050));
        assert!(proposal.data1.b.is_within(350));
        assert!(sink.lines.iter().any(|l| l.starts_with("makeTimingSpec<")));
    }

    #[test]
    fn fails_below_minimum_trace_records() {
        let mut tracer: Tracer<200> = Tracer::new();
        for _ in 0..10 {
            tracer.record(Pulse::new(350, Level::Hi), 1);
        }
        let mut sink = CollectingSink::default();
        assert!(Analyzer::deduce_protocol(&tracer, &mut sink).is_none());
        assert!(sink.lines.iter().any(|l| l.contains("not enough trace records")));
    }

    #[test]
    fn fails_when_only_one_level_present() {
        // All-HIGH trace: never forms two synch categories.
        let mut tracer: Tracer<200> = Tracer::new();
        for i in 0..140u32 {
            tracer.record(Pulse::new(300 + (i % 5), Level::Hi), 1);
        }
        let mut sink = CollectingSink::default();
        assert!(Analyzer::deduce_protocol(&tracer, &mut sink).is_none());
    }
}
