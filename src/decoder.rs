//! # Decoder core
//!
//! [`Decoder`] is the interrupt-driven state machine described in
//! spec.md §4.4: it owns the last two pulses, the in-progress candidate
//! protocol set, the in-progress message bit-stack, and the
//! available/suspended flags. [`Decoder::on_edge`] is the only entry
//! point meant to run inside an interrupt handler; everything else is
//! the foreground-safe read/control API.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::container::{RingBuffer, StackBuffer};
use crate::pulse::{Level, Pulse};
use crate::table::{Polarity, ProtocolTable};
use crate::{MAX_BITS, MAX_PROTOCOL_CANDIDATES, MIN_BITS};

#[cfg(feature = "tracer")]
use crate::table::ProtocolTiming;
#[cfg(feature = "tracer")]
use crate::tracer::Tracer;

/// Capacity of the tracer ring buffer a [`Decoder`] carries when the
/// `tracer` feature is enabled. Comfortably above
/// [`crate::analyzer::MIN_TRACE_RECORDS`] so `deduce_protocol` always
/// has enough history available after a modest capture window.
#[cfg(feature = "tracer")]
pub const TRACE_CAPACITY: usize = 256;

/// The decoder's state is derived, never stored directly (spec.md §4.4):
/// `Available` if the available flag is set, else `Data` if the
/// candidate set is non-empty, else `Sync`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecoderState {
    Sync,
    Data,
    Available,
}

/// The bounded set of protocol-table rows (≤ [`MAX_PROTOCOL_CANDIDATES`])
/// still consistent with every pulse pair seen since the last synch.
#[derive(Default)]
struct ProtocolCandidates {
    indices: StackBuffer<usize, MAX_PROTOCOL_CANDIDATES>,
    polarity: Option<Polarity>,
}

impl ProtocolCandidates {
    fn reset(&mut self) {
        self.indices.reset();
        self.polarity = None;
    }

    fn len(&self) -> usize {
        self.indices.len()
    }

    fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// The bit-stack of a message packet in progress: up to [`MAX_BITS`] bits,
/// MSB first (the first received bit ends up the most significant).
/// Additional bits beyond capacity bump `overflow` without entering the
/// value (spec.md §3).
#[derive(Default)]
struct MessagePacket {
    value: u32,
    bits: u32,
    overflow: u32,
}

impl MessagePacket {
    fn reset(&mut self) {
        self.value = 0;
        self.bits = 0;
        self.overflow = 0;
    }

    fn push_bit(&mut self, bit: bool) {
        if (self.bits as usize) < MAX_BITS {
            self.value = (self.value << 1) | (bit as u32);
            self.bits += 1;
        } else {
            self.overflow += 1;
        }
    }

    fn bits_count(&self) -> usize {
        self.bits as usize + self.overflow as usize
    }
}

/// Outcome of classifying one pulse pair against the current candidate
/// set (spec.md §4.4 `classify_pair`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassifyOutcome {
    SynchPair,
    Data(bool),
    Unknown,
}

fn data_kind(a_range_lo: crate::timing::TimeRange, a_range_hi: crate::timing::TimeRange, duration: u32) -> Option<bool> {
    if a_range_lo.is_within(duration) {
        Some(false)
    } else if a_range_hi.is_within(duration) {
        Some(true)
    } else {
        None
    }
}

/// The interrupt-driven OOK pulse decoder.
///
/// `N` is the number of rows in the protocol table installed via
/// [`Decoder::setup`]. [`Decoder::on_edge`] is safe to call from
/// interrupt context: it never allocates and never blocks.
pub struct Decoder<const N: usize> {
    table: ProtocolTable<N>,
    last_two: RingBuffer<Pulse, 2>,
    candidates: ProtocolCandidates,
    message: MessagePacket,
    available: AtomicBool,
    suspended: AtomicBool,
    data_phase_pulse_count: u8,
    last_interrupt_us: u32,
    #[cfg(feature = "tracer")]
    tracer: Tracer<TRACE_CAPACITY>,
}

impl<const N: usize> Decoder<N> {
    /// Build a decoder with an already-installed protocol table. Foreground
    /// callers that need to swap the table later must first [`Decoder::suspend`]
    /// (spec.md §5): the ISR must never observe a table mid-mutation.
    pub fn new(table: ProtocolTable<N>) -> Self {
        Self {
            table,
            last_two: RingBuffer::new(),
            candidates: ProtocolCandidates::default(),
            message: MessagePacket::default(),
            available: AtomicBool::new(false),
            suspended: AtomicBool::new(false),
            data_phase_pulse_count: 0,
            last_interrupt_us: 0,
            #[cfg(feature = "tracer")]
            tracer: Tracer::new(),
        }
    }

    /// Install (or replace) the protocol table. Call this with the ISR
    /// detached, or while [`Decoder::suspend`]d.
    pub fn setup(&mut self, table: ProtocolTable<N>) {
        self.table = table;
    }

    // ---- ISR entry point -------------------------------------------------

    /// Handle one edge. `pin_high` is the pin level read at the interrupt
    /// (the pulse just ended at the *complementary* level); `t_us` is a
    /// monotonic microsecond timestamp. This is the only method meant to
    /// run inside an interrupt handler.
    pub fn on_edge(&mut self, pin_high: bool, t_us: u32) {
        if self.suspended.load(Ordering::Acquire) {
            return;
        }
        let duration = t_us.wrapping_sub(self.last_interrupt_us);
        self.last_interrupt_us = t_us;
        let level = if pin_high { Level::Lo } else { Level::Hi };
        self.last_two.push(Pulse::new(duration, level));
        self.dispatch();
    }

    fn dispatch(&mut self) {
        if self.available.load(Ordering::Acquire) {
            return; // AVAILABLE: foreground hasn't consumed the packet yet.
        }
        if self.candidates.is_empty() {
            if self.last_two.len() == 2 {
                let pa = *self.last_two.at(0);
                let pb = *self.last_two.at(1);
                self.collect_candidates(pa, pb);
            }
        } else {
            self.data_phase_pulse_count += 1;
            if self.data_phase_pulse_count == 2 {
                self.data_phase_pulse_count = 0;
                let pa = *self.last_two.at(0);
                let pb = *self.last_two.at(1);
                self.handle_data_pair(pa, pb);
            }
        }
    }

    /// spec.md §4.4 `collect_candidates`: pick the polarity slice from
    /// `pa`'s level, then scan it in sorted order, stopping as soon as a
    /// row's synch-A lower bound exceeds `pa`'s duration.
    fn collect_candidates(&mut self, pa: Pulse, pb: Pulse) {
        if pa.level() == pb.level() {
            return; // two same-level pulses are nonsensical; leave state unchanged.
        }
        let polarity = match pa.level() {
            Level::Hi => Polarity::Normal,
            Level::Lo => Polarity::Inverse,
            Level::Unknown => return,
        };
        self.candidates.reset();
        self.candidates.polarity = Some(polarity);
        self.table
            .candidates_for_synch(polarity, pa.duration_us(), pb.duration_us(), &mut self.candidates.indices);
    }

    /// spec.md §4.4 `classify_pair`, iterated last-to-first so removal by
    /// index stays safe.
    fn classify_pair(&mut self, pa: Pulse, pb: Pulse) -> ClassifyOutcome {
        let mut remembered: Option<bool> = None;
        let mut i = self.candidates.len();
        while i > 0 {
            i -= 1;
            let idx = *self.candidates.indices.at(i);
            let row = *self.table.row(idx);

            if row.synch.synch_matches_loose_first(pa.duration_us(), pb.duration_us()) {
                return ClassifyOutcome::SynchPair;
            }

            let a_data = data_kind(row.data0.a, row.data1.a, pa.duration_us());
            let b_data = data_kind(row.data0.b, row.data1.b, pb.duration_us());
            match (a_data, b_data) {
                (Some(bit_a), Some(bit_b)) if bit_a == bit_b => {
                    if remembered.is_none() {
                        remembered = Some(bit_a);
                    }
                }
                _ => {
                    self.candidates.indices.remove(i);
                }
            }
        }
        match remembered {
            Some(bit) => ClassifyOutcome::Data(bit),
            None => ClassifyOutcome::Unknown,
        }
    }

    fn handle_data_pair(&mut self, pa: Pulse, pb: Pulse) {
        match self.classify_pair(pa, pb) {
            ClassifyOutcome::SynchPair => {
                if self.message.bits as usize >= MIN_BITS {
                    self.available.store(true, Ordering::Release);
                } else {
                    self.message.reset();
                    self.candidates.reset();
                    self.collect_candidates(pa, pb);
                }
            }
            ClassifyOutcome::Data(bit) => {
                self.message.push_bit(bit);
            }
            ClassifyOutcome::Unknown => {
                self.message.reset();
                self.candidates.reset();
                self.collect_candidates(pa, pb);
            }
        }
    }

    // ---- foreground API ----------------------------------------------------

    /// The most recently recorded pulse, or a zero-duration
    /// [`Level::Unknown`] pulse before the first edge has arrived.
    pub fn last_pulse(&self) -> Pulse {
        if self.last_two.is_empty() {
            Pulse::default()
        } else {
            *self.last_two.at(self.last_two.len() - 1)
        }
    }

    /// Whether the ISR is currently ignoring edges (spec.md §4.4 `suspend`/`resume`).
    pub fn suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    /// Derived decoder state (spec.md §4.4); mainly useful for diagnostics
    /// and tests, not part of the ISR's own control flow.
    pub fn state(&self) -> DecoderState {
        if self.available.load(Ordering::Acquire) {
            DecoderState::Available
        } else if !self.candidates.is_empty() {
            DecoderState::Data
        } else {
            DecoderState::Sync
        }
    }

    /// True iff a complete message packet is waiting to be read.
    pub fn available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// The accumulated bits as an integer, MSB first. Undefined (but safe)
    /// if called when [`Decoder::available`] is false.
    pub fn received_value(&self) -> u32 {
        self.message.value
    }

    /// Number of bits in the message, including any that overflowed
    /// `MAX_BITS` and were dropped from the value.
    pub fn received_bits_count(&self) -> usize {
        self.message.bits_count()
    }

    /// Number of protocols whose synch and data pulses all matched this
    /// packet.
    pub fn received_protocol_count(&self) -> usize {
        self.candidates.len()
    }

    /// The `id` of the `index`-th matching protocol, or `-1` if out of
    /// range.
    pub fn received_protocol(&self, index: usize) -> i32 {
        if index < self.candidates.len() {
            let row_index = *self.candidates.indices.at(index);
            self.table.row(row_index).id as i32
        } else {
            -1
        }
    }

    /// Clear the message, candidate set, and available flag, if a message
    /// is currently available. Idempotent.
    pub fn reset_available(&mut self) {
        if self.available() {
            self.clear_state();
        }
    }

    /// Stop the ISR from mutating decoder state. Safe to call at any time;
    /// `on_edge` becomes a no-op (other than leaving `last_interrupt_us`
    /// stale) until [`Decoder::resume`].
    pub fn suspend(&mut self) {
        self.suspended.store(true, Ordering::Release);
    }

    /// Resume receiving. If the decoder was suspended, also clears all
    /// state (message, candidates, available flag) so reception starts
    /// fresh.
    pub fn resume(&mut self) {
        if self.suspended.load(Ordering::Acquire) {
            self.clear_state();
            self.suspended.store(false, Ordering::Release);
        }
    }

    fn clear_state(&mut self) {
        self.message.reset();
        self.candidates.reset();
        self.available.store(false, Ordering::Release);
    }
}

/// Methods available when the crate is built with the `tracer` feature:
/// the decoder carries its own [`Tracer`] alongside the ISR state and can
/// answer the diagnostic External Interfaces of spec.md §6 directly,
/// instead of the caller wiring a separate tracer up by hand. This is
/// the "feature flag... that either compiles the tracer in or elides it"
/// variant spec.md §9 describes for the with-tracer/without-tracer
/// receiver split.
#[cfg(feature = "tracer")]
impl<const N: usize> Decoder<N> {
    /// Handle one edge exactly like [`Decoder::on_edge`], additionally
    /// recording the pulse and the ISR's own processing time into the
    /// built-in tracer. `now_us` is a second monotonic read taken just
    /// before returning from the interrupt handler, so
    /// `now_us - t_us` is the time this edge's handling took.
    pub fn on_edge_traced(&mut self, pin_high: bool, t_us: u32, now_us: u32) {
        if self.suspended() {
            return;
        }
        self.on_edge(pin_high, t_us);
        let pulse = self.last_pulse();
        self.tracer.record(pulse, now_us.wrapping_sub(t_us));
    }

    /// Dump the tracer's contents to `sink` (spec.md §4.5, §6).
    pub fn dump_tracer(&self, sink: &mut dyn crate::sink::LineSink) {
        self.tracer.dump(sink);
    }

    /// Run [`crate::analyzer::Analyzer::deduce_protocol`] over the
    /// tracer's contents, writing a proposal or failure notice to
    /// `sink` (spec.md §4.6, §6).
    pub fn deduce_protocol(&self, sink: &mut dyn crate::sink::LineSink) -> Option<ProtocolTiming> {
        crate::analyzer::Analyzer::deduce_protocol(&self.tracer, sink)
    }

    /// Number of trace records currently held.
    pub fn trace_len(&self) -> usize {
        self.tracer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ProtocolTiming;

    // Row 1 from spec.md §8: clock=350us, tol=20%, sA=1, sB=31, d0=(1,3), d1=(3,1), normal.
    fn row1_table() -> ProtocolTable<1> {
        ProtocolTable::new([ProtocolTiming::from_spec(1, 350, 20, 1, 31, 1, 3, 3, 1, false)])
    }

    /// Feed a normal-polarity synch pulse pair (short HIGH, long LOW) at
    /// nominal timing, starting from pin idle HIGH.
    struct PulseFeed<'a, const N: usize> {
        dec: &'a mut Decoder<N>,
        t: u32,
    }

    impl<'a, const N: usize> PulseFeed<'a, N> {
        fn new(dec: &'a mut Decoder<N>) -> Self {
            Self { dec, t: 0 }
        }

        /// Advance `t` by `duration_us` and edge the pin to `pin_high`, i.e.
        /// the pulse that just ended held the complementary level.
        fn edge(&mut self, duration_us: u32, pin_high: bool) -> &mut Self {
            self.t += duration_us;
            self.dec.on_edge(pin_high, self.t);
            self
        }

        /// One normal-polarity synch pair: short HIGH (350us) then long LOW (31*350=10850us).
        fn synch(&mut self) -> &mut Self {
            self.edge(350, false); // HIGH pulse of 350us just ended -> level was HIGH, next reading LOW
            self.edge(10850, true) // LOW pulse of 10850us just ended -> next reading HIGH
        }

        /// One data bit: short=350us, long=3*350=1050us. `one` picks the order
        /// (long-then-short for logical 1, short-then-long for logical 0).
        fn bit(&mut self, one: bool) -> &mut Self {
            if one {
                self.edge(1050, false);
                self.edge(350, true);
            } else {
                self.edge(350, false);
                self.edge(1050, true);
            }
            self
        }
    }

    #[test]
    fn decodes_complete_message_value_010011() {
        let mut dec = Decoder::new(row1_table());
        let mut feed = PulseFeed::new(&mut dec);
        feed.synch();
        for bit in [false, true, false, false, true, true] {
            feed.bit(bit);
        }
        feed.synch();
        assert!(dec.available());
        assert_eq!(dec.received_value(), 0b010011);
        assert_eq!(dec.received_bits_count(), 6);
        assert_eq!(dec.received_protocol_count(), 1);
        assert_eq!(dec.received_protocol(0), 1);
        assert_eq!(dec.received_protocol(1), -1);
    }

    #[test]
    fn decodes_complete_message_value_101100() {
        let mut dec = Decoder::new(row1_table());
        let mut feed = PulseFeed::new(&mut dec);
        feed.synch();
        for bit in [true, false, true, true, false, false] {
            feed.bit(bit);
        }
        feed.synch();
        assert!(dec.available());
        assert_eq!(dec.received_value(), 0x2C);
    }

    #[test]
    fn faulty_bit_returns_to_sync_then_recovers() {
        let mut dec = Decoder::new(row1_table());
        let mut feed = PulseFeed::new(&mut dec);
        feed.synch();
        for bit in [false, true, false, false] {
            feed.bit(bit);
        }
        // Faulty 5th bit: first half at 30% of nominal (105us, well outside
        // both data0.A=[280,420) and data1.A=[840,1260)).
        feed.edge(105, false);
        feed.edge(1050, true);
        feed.synch();
        assert!(!dec.available());
        // The discard drops the in-progress message and candidate set, but
        // the synch pair at the tail of this same `feed.synch()` call is
        // itself valid and is picked back up immediately: the ring buffer
        // always exposes the two most recent pulses, not pulses aligned to
        // message/bit boundaries.
        assert_eq!(dec.received_protocol_count(), 1);

        // A subsequent valid packet is received correctly.
        for bit in [false, true, false, false, true, true] {
            feed.bit(bit);
        }
        feed.synch();
        assert!(dec.available());
        assert_eq!(dec.received_value(), 0x13);
    }

    #[test]
    fn below_min_bits_does_not_latch() {
        let mut dec = Decoder::new(row1_table());
        let mut feed = PulseFeed::new(&mut dec);
        feed.synch();
        for bit in [false, true, false] {
            feed.bit(bit);
        }
        feed.synch();
        assert!(!dec.available());

        for bit in [false, true, false, false, true, true] {
            feed.bit(bit);
        }
        feed.synch();
        assert!(dec.available());
        assert_eq!(dec.received_value(), 0x13);
    }

    #[test]
    fn two_rows_matching_synch_narrow_down_on_first_data_bit() {
        // Row 7: clock=150,tol=20,sA=2,sB=62,d0=(1,6),d1=(6,1)  -> sA=300,sB=9300
        // Row 1: clock=350,tol=20,sA=1,sB=31,d0=(1,3),d1=(3,1)  -> sA=350,sB=10850
        // Pick a synch pulse pair that lands in both tolerance windows.
        let table = ProtocolTable::new([
            ProtocolTiming::from_spec(7, 150, 20, 2, 62, 1, 6, 6, 1, false),
            ProtocolTiming::from_spec(1, 350, 20, 1, 31, 1, 3, 3, 1, false),
        ]);
        let mut dec = Decoder::new(table);
        let mut feed = PulseFeed::new(&mut dec);
        // Row7 window A: [240,360), B:[7440,11160); Row1 window A:[280,420), B:[8680,13020)
        // duration 300 is within both A windows; duration 9500 within both B windows.
        feed.edge(300, false);
        feed.edge(9500, true);
        assert_eq!(dec.received_protocol_count(), 2);
        assert_eq!(dec.received_protocol(0), 7);
        assert_eq!(dec.received_protocol(1), 1);

        // A data bit pulse pair that only one of the two rows' data ranges matches.
        // Row1 data0: A[280,420) B[840,1260); Row7 data0: A[120,180) B[720,1080)
        feed.edge(350, false);
        feed.edge(1050, true);
        assert_eq!(dec.received_protocol_count(), 1);
        assert_eq!(dec.received_protocol(0), 1);
    }

    #[test]
    fn suspend_then_resume_clears_state_and_ignores_edges() {
        let mut dec = Decoder::new(row1_table());
        let mut feed = PulseFeed::new(&mut dec);
        feed.synch();
        feed.bit(false);
        dec.suspend();
        feed.bit(true); // ignored while suspended
        assert_eq!(dec.received_protocol_count(), 1);
        dec.resume();
        assert_eq!(dec.state(), DecoderState::Sync);
        assert_eq!(dec.received_protocol_count(), 0);
    }

    #[test]
    fn reset_available_is_idempotent() {
        let mut dec = Decoder::new(row1_table());
        let mut feed = PulseFeed::new(&mut dec);
        feed.synch();
        for bit in [false, true, false, false, true, true] {
            feed.bit(bit);
        }
        feed.synch();
        assert!(dec.available());
        dec.reset_available();
        assert!(!dec.available());
        dec.reset_available();
        assert!(!dec.available());
    }

    #[test]
    fn same_level_consecutive_pulses_do_not_change_candidates() {
        let mut dec = Decoder::new(row1_table());
        // Force two HIGH pulses in a row by constructing the ring buffer
        // state through on_edge calls that happen to report the same level
        // twice is not directly reachable from outside (levels always
        // alternate from a single pin), so this is exercised at the
        // collect_candidates level instead.
        dec.collect_candidates(Pulse::new(350, Level::Hi), Pulse::new(10850, Level::Hi));
        assert_eq!(dec.received_protocol_count(), 0);
    }

    #[test]
    fn synch_a_outside_every_row_yields_no_candidates() {
        let mut dec = Decoder::new(row1_table());
        dec.collect_candidates(Pulse::new(1, Level::Hi), Pulse::new(10850, Level::Lo));
        assert_eq!(dec.received_protocol_count(), 0);
        dec.collect_candidates(Pulse::new(1_000_000, Level::Hi), Pulse::new(10850, Level::Lo));
        assert_eq!(dec.received_protocol_count(), 0);
    }

    #[cfg(feature = "tracer")]
    #[test]
    fn on_edge_traced_records_pulses_and_ignores_suspended_edges() {
        let mut dec = Decoder::new(row1_table());
        dec.on_edge_traced(false, 350, 352);
        dec.on_edge_traced(true, 350 + 10850, 11204);
        assert_eq!(dec.trace_len(), 2);

        dec.suspend();
        dec.on_edge_traced(false, 350 + 10850 + 350, 11556);
        assert_eq!(dec.trace_len(), 2); // suspended edge not traced either

        use crate::sink::test_support::CollectingSink;
        let mut sink = CollectingSink::default();
        dec.dump_tracer(&mut sink);
        assert_eq!(sink.lines.len(), 3); // 2 pulses + summary
    }
}
