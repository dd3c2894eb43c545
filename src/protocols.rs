//! # Canonical protocol table
//!
//! The eleven protocols below are transcribed from the timing constants
//! that ship with the original receiver library, covering the common
//! 433/315MHz fixed-code remotes: PT2262-family encoders, HT6P20B,
//! HS2303-PT, the Conrad RS-200 remote socket, a 1ByOne doorbell button,
//! HT12E, and SM5212, plus three unnamed variants seen in the wild.
//!
//! This table is a starting point, not a fixed inventory — build your
//! own [`crate::table::ProtocolTable`] from a subset of these rows (or
//! rows proposed by [`crate::analyzer::Analyzer`]) to keep
//! `MAX_PROTOCOL_CANDIDATES` meaningful for your deployment.

use crate::table::{ProtocolTable, ProtocolTiming};

/// Number of rows in [`CANONICAL_TABLE`].
pub const CANONICAL_LEN: usize = 11;

/// Build the eleven canonical protocol rows. Exposed as a function (rather
/// than a `const`) because [`ProtocolTable::new`] sorts its rows and a
/// `const fn` can't currently do that for non-`Copy`-free generic N in a
/// `static` initializer; call it once at startup.
pub fn canonical_table() -> ProtocolTable<CANONICAL_LEN> {
    ProtocolTable::new([
        // id, clock_us, tol%, synch_a, synch_b, data0_a, data0_b, data1_a, data1_b, inverse
        ProtocolTiming::from_spec(1, 350, 20, 1, 31, 1, 3, 3, 1, false),
        ProtocolTiming::from_spec(2, 650, 20, 1, 10, 1, 3, 3, 1, false),
        ProtocolTiming::from_spec(3, 100, 20, 30, 71, 4, 11, 9, 6, false),
        ProtocolTiming::from_spec(4, 380, 20, 1, 6, 1, 3, 3, 1, false),
        ProtocolTiming::from_spec(5, 500, 20, 6, 14, 1, 2, 2, 1, false),
        // HT6P20B
        ProtocolTiming::from_spec(6, 450, 20, 1, 23, 1, 2, 2, 1, true),
        // HS2303-PT
        ProtocolTiming::from_spec(7, 150, 20, 2, 62, 1, 6, 6, 1, false),
        // Conrad RS-200
        ProtocolTiming::from_spec(8, 200, 20, 3, 130, 7, 16, 3, 16, false),
        // 1ByOne doorbell
        ProtocolTiming::from_spec(9, 365, 20, 1, 18, 3, 1, 1, 3, true),
        // HT12E
        ProtocolTiming::from_spec(10, 270, 20, 1, 36, 1, 2, 2, 1, true),
        // SM5212
        ProtocolTiming::from_spec(11, 320, 20, 1, 36, 1, 2, 2, 1, true),
    ])
}
