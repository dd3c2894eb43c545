//! # Diagnostic line sink
//!
//! The dump/deduce diagnostics (spec.md §6, §9 "Dynamic diagnostic sink")
//! are polymorphic over "any line-oriented text output" rather than tied
//! to a particular serial type. Implement [`LineSink`] for whatever your
//! platform uses (a UART wrapper, a `std::io::Write` adapter, a test
//! collector) and hand it to [`crate::decoder::Decoder::dump_tracer`] or
//! [`crate::decoder::Decoder::deduce_protocol`].

/// A single-method sink for line-oriented diagnostic text.
pub trait LineSink {
    /// Write one line (without a trailing newline; the sink adds it).
    fn write_line(&mut self, line: &str);
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::LineSink;

    #[derive(Default)]
    pub struct CollectingSink {
        pub lines: std::vec::Vec<std::string::String>,
    }

    impl LineSink for CollectingSink {
        fn write_line(&mut self, line: &str) {
            self.lines.push(line.into());
        }
    }
}
