#![cfg_attr(not(test), no_std)]

//! # ook-rc-switch
//!
//! An interrupt-driven decoder for 433/315MHz OOK remote-control
//! protocols: PT2262-family encoders, HT6P20B, HS2303-PT, and the like
//! (see [`protocols::canonical_table`] for the full out-of-the-box
//! list). The crate owns only the pulse-decoding core: it never touches
//! a pin or a clock directly, and never blocks or allocates.
//!
//! ## Quick start
//!
//! ```
//! use ook_rc_switch::{Decoder, protocols};
//!
//! let mut decoder = Decoder::new(protocols::canonical_table());
//!
//! // From your platform's edge-change ISR:
//! // decoder.on_edge(pin_is_high, micros());
//!
//! if decoder.available() {
//!     let value = decoder.received_value();
//!     let bits = decoder.received_bits_count();
//!     let protocol = decoder.received_protocol(0);
//!     let _ = (value, bits, protocol);
//!     decoder.reset_available();
//! }
//! ```
//!
//! ## Available methods
//!
//! - [`Decoder::on_edge`] — the ISR entry point.
//! - [`Decoder::available`]/[`Decoder::received_value`]/
//!   [`Decoder::received_bits_count`]/[`Decoder::received_protocol_count`]/
//!   [`Decoder::received_protocol`] — read a completed packet.
//! - [`Decoder::reset_available`]/[`Decoder::suspend`]/[`Decoder::resume`]/
//!   [`Decoder::setup`] — foreground control.
//! - With the `tracer` feature: [`Decoder::on_edge_traced`],
//!   [`Decoder::dump_tracer`], [`Decoder::deduce_protocol`] — diagnostics
//!   and offline protocol discovery (see [`analyzer::Analyzer`]).

pub mod container;
pub mod decoder;
pub mod protocols;
pub mod pulse;
pub mod sink;
pub mod table;
pub mod timing;

mod line;

#[cfg(feature = "tracer")]
pub mod analyzer;
#[cfg(feature = "tracer")]
pub mod tracer;

pub use decoder::{Decoder, DecoderState};
pub use pulse::{Level, Pulse};
pub use sink::LineSink;
pub use table::{Polarity, ProtocolTable, ProtocolTiming};
pub use timing::{CompareResult, PulsePairRange, TimeRange};

#[cfg(feature = "tracer")]
pub use analyzer::Analyzer;
#[cfg(feature = "tracer")]
pub use tracer::{TraceRecord, Tracer};

/// Maximum bits a message packet can hold before additional bits are
/// counted as overflow instead of entering the decoded value
/// (spec.md §3 `MAX_BITS`).
pub const MAX_BITS: usize = 32;

/// Minimum number of data bits a message must have accumulated before a
/// following synch pair latches it as available (spec.md §4.4 `MIN_BITS`).
/// Shorter in-progress messages are silently discarded.
pub const MIN_BITS: usize = 6;

/// Maximum number of protocol-table rows tracked simultaneously as
/// candidates for one in-progress message (spec.md §3). Extra matches
/// beyond this bump an internal overflow counter and are dropped.
pub const MAX_PROTOCOL_CANDIDATES: usize = 7;
