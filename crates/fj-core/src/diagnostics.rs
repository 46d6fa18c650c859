//! Per-test diagnostic text produced while compiling.
//!
//! A sink either buffers everything for a single test (so it can be printed
//! only when that test fails) or streams it straight to a writer as it is
//! produced.

use std::fmt;
use std::io::{self, Write};

enum SinkMode {
    Buffered(String),
    Streaming(Box<dyn Write>),
}

pub struct DiagnosticSink {
    mode: SinkMode,
}

impl DiagnosticSink {
    pub fn buffered() -> Self {
        Self {
            mode: SinkMode::Buffered(String::new()),
        }
    }

    pub fn streaming(out: Box<dyn Write>) -> Self {
        Self {
            mode: SinkMode::Streaming(out),
        }
    }

    pub fn stdout() -> Self {
        Self::streaming(Box::new(io::stdout()))
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.mode, SinkMode::Streaming(_))
    }

    pub fn log(&mut self, text: &str) {
        match &mut self.mode {
            SinkMode::Buffered(buf) => buf.push_str(text),
            SinkMode::Streaming(out) => {
                if let Err(err) = out.write_all(text.as_bytes()).and_then(|_| out.flush()) {
                    tracing::warn!(%err, "failed to stream diagnostics");
                }
            }
        }
    }

    /// Buffered text for the current test. Always empty while streaming.
    pub fn contents(&self) -> &str {
        match &self.mode {
            SinkMode::Buffered(buf) => buf,
            SinkMode::Streaming(_) => "",
        }
    }

    pub fn is_empty(&self) -> bool {
        self.contents().is_empty()
    }

    /// Drops buffered text but keeps the allocation for the next test.
    pub fn clear(&mut self) {
        if let SinkMode::Buffered(buf) = &mut self.mode {
            buf.clear();
        }
    }
}

impl Default for DiagnosticSink {
    fn default() -> Self {
        Self::buffered()
    }
}

impl fmt::Write for DiagnosticSink {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.log(s);
        Ok(())
    }
}

impl fmt::Debug for DiagnosticSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.mode {
            SinkMode::Buffered(buf) => f
                .debug_struct("DiagnosticSink")
                .field("buffered", &buf.len())
                .finish(),
            SinkMode::Streaming(_) => f.debug_struct("DiagnosticSink").field("streaming", &true).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write as _;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn buffered_sink_accumulates_until_cleared() {
        let mut sink = DiagnosticSink::buffered();
        sink.log("; begin f\n");
        write!(sink, "size={}", 12).expect("write");
        assert_eq!(sink.contents(), "; begin f\nsize=12");

        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn streaming_sink_writes_through() {
        let out = SharedBuf::default();
        let mut sink = DiagnosticSink::streaming(Box::new(out.clone()));
        sink.log("live");

        assert!(sink.is_streaming());
        assert_eq!(sink.contents(), "");
        assert_eq!(out.0.lock().expect("lock").as_slice(), b"live");
    }
}
