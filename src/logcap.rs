//! Per-call capture of the emulator's log stream. The engine attaches a
//! fresh [LogCapture] to every emulator call and extracts the user-visible
//! lines once the call returns; interceptors are single-use by design of the
//! calling convention, not enforced here.

use std::io;

/// Prefix the runtime puts on user-visible log lines. Everything else on the
/// stream (internal tracing, runtime chatter) is dropped by [extract].
///
/// [extract]: LogCapture::extract
pub const USER_LOG_PREFIX: &str = "LOG:";

/// Append-only byte sink for one emulator call.
#[derive(Default)]
pub struct LogCapture {
    buf: Vec<u8>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter the captured stream down to the ordered user log lines, with
    /// the prefix and line terminators trimmed.
    pub fn extract(self) -> Vec<String> {
        let text = String::from_utf8_lossy(&self.buf);
        text.lines()
            .filter_map(|line| {
                line.strip_prefix(USER_LOG_PREFIX)
                    .map(|rest| rest.trim_start().trim_end_matches('\r').to_string())
            })
            .collect()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_extract_filters_and_trims() {
        let mut cap = LogCapture::new();
        write!(cap, "debug: block sealed\n").unwrap();
        write!(cap, "LOG: \"Hello, World!\"\n").unwrap();
        write!(cap, "LOG: 42\n").unwrap();
        write!(cap, "trace: done").unwrap();
        assert_eq!(cap.extract(), vec!["\"Hello, World!\"", "42"]);
    }

    #[test]
    fn test_extract_preserves_emission_order() {
        let mut cap = LogCapture::new();
        for i in 0..5 {
            writeln!(cap, "{} {}", USER_LOG_PREFIX, i).unwrap();
        }
        assert_eq!(cap.extract(), vec!["0", "1", "2", "3", "4"]);
    }
}
