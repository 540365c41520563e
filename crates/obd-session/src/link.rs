//! Inbound line assembly

use tracing::warn;

/// Default input buffer size in bytes
pub const DEFAULT_LINE_CAPACITY: usize = 512;

/// Collects printable client bytes into command lines
///
/// Printable ASCII (0x20-0x7E) accumulates; CR or LF ends a line. Other
/// bytes are ignored. A line longer than the capacity is dropped whole:
/// the buffer is cleared and everything up to the next terminator is
/// discarded.
#[derive(Debug)]
pub struct LineAssembler {
    buffer: String,
    capacity: usize,
    discarding: bool,
    overflows: u64,
}

impl LineAssembler {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: String::with_capacity(capacity.min(DEFAULT_LINE_CAPACITY)),
            capacity: capacity.max(1),
            discarding: false,
            overflows: 0,
        }
    }

    /// Feed raw bytes, returning every completed line in arrival order
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in bytes {
            match byte {
                b'\r' | b'\n' => {
                    if self.discarding {
                        self.discarding = false;
                    } else if !self.buffer.is_empty() {
                        lines.push(std::mem::take(&mut self.buffer));
                    }
                }
                0x20..=0x7E => {
                    if self.discarding {
                        continue;
                    }
                    if self.buffer.len() >= self.capacity {
                        warn!(capacity = self.capacity, "Command buffer overflow, line dropped");
                        self.buffer.clear();
                        self.discarding = true;
                        self.overflows += 1;
                        continue;
                    }
                    self.buffer.push(byte as char);
                }
                _ => {}
            }
        }
        lines
    }

    /// Forget any partial line
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }

    pub fn pending(&self) -> &str {
        &self.buffer
    }

    pub fn overflows(&self) -> u64 {
        self.overflows
    }
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_LINE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_lines_split_on_cr_and_lf() {
        let mut link = LineAssembler::default();
        assert_eq!(link.push(b"ATZ\rATE0\n\r\n010C"), vec!["ATZ", "ATE0"]);
        assert_eq!(link.pending(), "010C");
        assert_eq!(link.push(b"\r"), vec!["010C"]);
    }

    #[test]
    fn test_non_printable_bytes_ignored() {
        let mut link = LineAssembler::default();
        assert_eq!(link.push(b"01\x000C\x7F\r"), vec!["010C"]);
    }

    #[test]
    fn test_overflow_drops_whole_line() {
        let mut link = LineAssembler::new(4);
        let lines = link.push(b"ABCDEFGH\rATZ\r");
        assert_eq!(lines, vec!["ATZ"]);
        assert_eq!(link.overflows(), 1);
    }

    #[test]
    fn test_exact_capacity_fits() {
        let mut link = LineAssembler::new(4);
        assert_eq!(link.push(b"ATE0\r"), vec!["ATE0"]);
        assert_eq!(link.overflows(), 0);
    }

    proptest! {
        #[test]
        fn prop_lines_never_exceed_capacity(input in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let mut link = LineAssembler::new(16);
            for line in link.push(&input) {
                prop_assert!(!line.is_empty());
                prop_assert!(line.len() <= 16);
                prop_assert!(line.bytes().all(|b| (0x20..=0x7E).contains(&b)));
            }
        }
    }
}
