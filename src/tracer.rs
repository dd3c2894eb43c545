//! # Pulse tracer
//!
//! [`Tracer`] records every pulse the decoder sees, together with how long
//! the ISR spent processing it, into a fixed-size ring buffer. It is
//! meant to be driven alongside [`crate::decoder::Decoder::on_edge`] from
//! the same interrupt handler (spec.md §6): call [`Tracer::record`] right
//! after `on_edge` returns, passing a second timestamp so the ISR
//! duration can be measured as `now_us - t_entry_us`.
//!
//! [`Tracer::dump`] is a foreground-only operation: it locks the tracer
//! (so a concurrent interrupt skips recording rather than racing the
//! dump), walks the ring from oldest to newest, and writes one line per
//! record plus a summary line with the average fraction of time spent in
//! the ISR.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::container::RingBuffer;
use crate::pulse::Pulse;
use crate::sink::LineSink;

/// One recorded pulse, plus how long the ISR took to process the edge
/// that produced it.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TraceRecord {
    pulse: Pulse,
    isr_duration_us: u16,
}

impl TraceRecord {
    fn new(pulse: Pulse, isr_duration_us: u32) -> Self {
        Self {
            pulse,
            isr_duration_us: isr_duration_us.min(u16::MAX as u32) as u16,
        }
    }

    pub const fn pulse(&self) -> Pulse {
        self.pulse
    }

    pub const fn isr_duration_us(&self) -> u32 {
        self.isr_duration_us as u32
    }
}

/// A ring buffer of [`TraceRecord`]s, capacity `CAP`. Needs at least 132
/// records for [`crate::analyzer::Analyzer::deduce`] to have enough data
/// for both a synch and a data pulse of every candidate protocol
/// (spec.md §6).
pub struct Tracer<const CAP: usize> {
    records: RingBuffer<TraceRecord, CAP>,
    locked: AtomicBool,
}

impl<const CAP: usize> Default for Tracer<CAP> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAP: usize> Tracer<CAP> {
    pub fn new() -> Self {
        Self {
            records: RingBuffer::new(),
            locked: AtomicBool::new(false),
        }
    }

    /// Record one pulse. A no-op while locked (i.e. while a foreground
    /// dump is in progress), so `dump` never observes a half-written
    /// ring.
    pub fn record(&mut self, pulse: Pulse, isr_duration_us: u32) {
        if self.locked.load(Ordering::Acquire) {
            return;
        }
        self.records.push(TraceRecord::new(pulse, isr_duration_us));
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.records.capacity()
    }

    pub fn record_at(&self, index: usize) -> TraceRecord {
        *self.records.at(index)
    }

    fn lock(&self) {
        self.locked.store(true, Ordering::Release);
    }

    fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    /// Write one line per recorded pulse (oldest first), then a summary
    /// line with the average CPU interrupt load as a percentage.
    pub fn dump(&self, sink: &mut dyn LineSink) {
        use core::fmt::Write;
        self.lock();
        let mut total_pulse_us: u64 = 0;
        let mut total_isr_us: u64 = 0;
        for i in 0..self.records.len() {
            let record = self.records.at(i);
            total_pulse_us += record.pulse.duration_us() as u64;
            total_isr_us += record.isr_duration_us() as u64;

            let mut line: crate::line::Line = crate::line::Line::new();
            let _ = write!(
                line,
                "{},{:?},{}",
                record.pulse.duration_us(),
                record.pulse.level(),
                record.isr_duration_us()
            );
            sink.write_line(line.as_str());
        }
        let percent = if total_pulse_us == 0 {
            0
        } else {
            (total_isr_us * 100) / total_pulse_us
        };
        let mut summary: crate::line::Line = crate::line::Line::new();
        let _ = write!(summary, "cpu_interrupt_load_percent={percent}");
        sink.write_line(summary.as_str());
        self.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pulse::Level;
    use crate::sink::test_support::CollectingSink;

    #[test]
    fn record_and_dump_produce_one_line_per_pulse_plus_summary() {
        let mut tracer: Tracer<4> = Tracer::new();
        tracer.record(Pulse::new(350, Level::Hi), 12);
        tracer.record(Pulse::new(10850, Level::Lo), 15);

        let mut sink = CollectingSink::default();
        tracer.dump(&mut sink);
        assert_eq!(sink.lines.len(), 3);
        assert!(sink.lines[2].starts_with("cpu_interrupt_load_percent="));
    }

    #[test]
    fn overwrites_oldest_once_full() {
        let mut tracer: Tracer<2> = Tracer::new();
        for i in 0..3u32 {
            tracer.record(Pulse::new(100 + i, Level::Hi), 1);
        }
        assert_eq!(tracer.len(), 2);
        assert_eq!(tracer.record_at(0).pulse().duration_us(), 101);
        assert_eq!(tracer.record_at(1).pulse().duration_us(), 102);
    }

    #[test]
    fn dump_locks_out_concurrent_record_calls() {
        // Simulate an ISR firing mid-dump by recording, locking, attempting
        // a record, then unlocking: the attempted record is dropped.
        let mut tracer: Tracer<4> = Tracer::new();
        tracer.record(Pulse::new(350, Level::Hi), 1);
        tracer.locked.store(true, Ordering::Relaxed);
        tracer.record(Pulse::new(999, Level::Hi), 1);
        assert_eq!(tracer.len(), 1);
        tracer.locked.store(false, Ordering::Relaxed);
        tracer.record(Pulse::new(999, Level::Hi), 1);
        assert_eq!(tracer.len(), 2);
    }
}
