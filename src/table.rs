//! # Protocol timing table
//!
//! A [`ProtocolTiming`] row describes one remote-control protocol's pulse
//! timing; a [`ProtocolTable`] is a small, immutable array of them, split
//! into a normal-polarity half and an inverse-polarity half, each sorted
//! ascending by the synch-A lower bound. That ordering is what lets
//! [`ProtocolTable::candidates_for_synch`] break out of its scan early
//! (spec.md §4.2).

use crate::timing::{PulsePairRange, TimeRange};

/// One protocol's full pulse timing specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProtocolTiming {
    /// Caller-assigned identifier, reported back via `received_protocol`.
    pub id: u16,
    /// Whether data transmission starts low-going instead of high-going.
    pub inverse: bool,
    pub synch: PulsePairRange,
    pub data0: PulsePairRange,
    pub data1: PulsePairRange,
}

impl ProtocolTiming {
    /// Build a row from the original's `makeTimingSpec<...>` parameters:
    /// a clock in microseconds, a percent tolerance, and clock-multiple
    /// pulse counts for the synch pair and the two data-bit pairs.
    ///
    /// `d1_a` is expected to be the long half and `d1_b` the short half
    /// (and the reverse for `d0_a`/`d0_b`) — spec.md §3 notes the decoder
    /// does not actually rely on this, only on the A/B windows being
    /// distinct enough to disambiguate 0 from 1.
    #[allow(clippy::too_many_arguments)]
    pub const fn from_spec(
        id: u16,
        clock_us: u32,
        percent_tolerance: u32,
        synch_a: u32,
        synch_b: u32,
        data0_a: u32,
        data0_b: u32,
        data1_a: u32,
        data1_b: u32,
        inverse: bool,
    ) -> Self {
        const fn range(clock_us: u32, count: u32, tol: u32) -> TimeRange {
            TimeRange::from_tolerance(clock_us * count, tol)
        }
        Self {
            id,
            inverse,
            synch: PulsePairRange::new(
                range(clock_us, synch_a, percent_tolerance),
                range(clock_us, synch_b, percent_tolerance),
            ),
            data0: PulsePairRange::new(
                range(clock_us, data0_a, percent_tolerance),
                range(clock_us, data0_b, percent_tolerance),
            ),
            data1: PulsePairRange::new(
                range(clock_us, data1_a, percent_tolerance),
                range(clock_us, data1_b, percent_tolerance),
            ),
        }
    }

    /// Build a row directly from already-computed windows, bypassing the
    /// clock/tolerance parameterization. Used by
    /// [`crate::analyzer::Analyzer`], which only has observed pulse
    /// statistics to work with, not a known clock.
    pub const fn from_ranges(id: u16, inverse: bool, synch: PulsePairRange, data0: PulsePairRange, data1: PulsePairRange) -> Self {
        Self { id, inverse, synch, data0, data1 }
    }

    /// Append a `#,i,{synch}{data0}{data1}` debug row, in the style of the
    /// original's `Debug::dumpRxTimingSpecTable` (spec.md §6).
    pub fn write_row(&self, sink: &mut dyn crate::sink::LineSink) {
        use core::fmt::Write;
        let mut line: crate::line::Line = crate::line::Line::new();
        let _ = write!(
            line,
            "{:>2},{},{{[{}..{}][{}..{}]}}{{[{}..{}][{}..{}]}}{{[{}..{}][{}..{}]}}",
            self.id,
            self.inverse as u8,
            self.synch.a.lo(),
            self.synch.a.hi(),
            self.synch.b.lo(),
            self.synch.b.hi(),
            self.data0.a.lo(),
            self.data0.a.hi(),
            self.data0.b.lo(),
            self.data0.b.hi(),
            self.data1.a.lo(),
            self.data1.a.hi(),
            self.data1.b.lo(),
            self.data1.b.hi(),
        );
        sink.write_line(line.as_str());
    }
}

/// Which polarity half of a [`ProtocolTable`] a candidate or synch pair
/// belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Polarity {
    Normal,
    Inverse,
}

/// An immutable, pre-sorted table of protocol timings, split into a
/// normal-polarity slice followed by an inverse-polarity slice. Built
/// once (typically in `Decoder::setup`, before the ISR is attached) via
/// a small insertion sort — the table has on the order of ten rows, so
/// the sort cost is negligible (spec.md §9).
#[derive(Clone, Copy)]
pub struct ProtocolTable<const N: usize> {
    rows: [ProtocolTiming; N],
    /// Index where the inverse-polarity half begins.
    split: usize,
}

impl<const N: usize> ProtocolTable<N> {
    /// Build a table from arbitrary rows, sorting them into
    /// normal-then-inverse order and, within each half, ascending by the
    /// synch-A lower bound.
    pub fn new(mut rows: [ProtocolTiming; N]) -> Self {
        // Insertion sort: stable, no allocation, fine for ~10 rows.
        for i in 1..N {
            let mut j = i;
            while j > 0 && Self::is_lower(&rows[j], &rows[j - 1]) {
                rows.swap(j, j - 1);
                j -= 1;
            }
        }
        let split = rows.iter().position(|r| r.inverse).unwrap_or(N);
        Self { rows, split }
    }

    fn is_lower(a: &ProtocolTiming, b: &ProtocolTiming) -> bool {
        if a.inverse == b.inverse {
            a.synch.a.lo() < b.synch.a.lo()
        } else {
            !a.inverse && b.inverse
        }
    }

    #[inline]
    pub const fn len(&self) -> usize {
        N
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        N == 0
    }

    pub fn row(&self, index: usize) -> &ProtocolTiming {
        &self.rows[index]
    }

    pub fn normal_slice(&self) -> &[ProtocolTiming] {
        &self.rows[..self.split]
    }

    pub fn inverse_slice(&self) -> &[ProtocolTiming] {
        &self.rows[self.split..]
    }

    fn slice_for(&self, polarity: Polarity) -> (&[ProtocolTiming], usize) {
        match polarity {
            Polarity::Normal => (self.normal_slice(), 0),
            Polarity::Inverse => (self.inverse_slice(), self.split),
        }
    }

    /// Collect every row index (into the global table) in `polarity`'s
    /// slice whose synch pair matches `(pulse_a, pulse_b)`, pushing into
    /// `out`. Stops scanning as soon as a row's synch-A lower bound
    /// exceeds `pulse_a`'s duration, since the slice is sorted ascending
    /// by that bound (spec.md §4.4 `collect_candidates`).
    pub fn candidates_for_synch(
        &self,
        polarity: Polarity,
        pulse_a_duration: u32,
        pulse_b_duration: u32,
        out: &mut crate::container::StackBuffer<usize, { crate::MAX_PROTOCOL_CANDIDATES }>,
    ) {
        let (slice, base) = self.slice_for(polarity);
        for (i, row) in slice.iter().enumerate() {
            if pulse_a_duration < row.synch.a.lo() {
                break;
            }
            if pulse_a_duration < row.synch.a.hi()
                && pulse_b_duration >= row.synch.b.lo()
                && pulse_b_duration < row.synch.b.hi()
            {
                out.push(base + i);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: u16, lo: u32, inverse: bool) -> ProtocolTiming {
        ProtocolTiming::from_spec(id, lo, 20, 1, 31, 1, 3, 3, 1, inverse)
    }

    #[test]
    fn sorts_normal_before_inverse_then_by_synch_a_lo() {
        let table = ProtocolTable::new([row(1, 350, false), row(2, 100, true), row(3, 150, false)]);
        assert_eq!(table.normal_slice().iter().map(|r| r.id).collect::<Vec<_>>(), vec![3, 1]);
        assert_eq!(table.inverse_slice().iter().map(|r| r.id).collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn candidate_scan_breaks_early_past_upper_rows() {
        let table = ProtocolTable::new([row(1, 350, false), row(2, 650, false)]);
        let mut out = crate::container::StackBuffer::<usize, { crate::MAX_PROTOCOL_CANDIDATES }>::new();
        // duration below every row's lower bound -> no candidates
        table.candidates_for_synch(Polarity::Normal, 1, 9000, &mut out);
        assert_eq!(out.len(), 0);
    }
}
