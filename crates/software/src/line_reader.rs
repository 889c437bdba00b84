//! Splits a byte stream from the serial console into lines.

use heapless::Vec;

/// Longest line the console accepts.
pub const MAX_LINE_LEN: usize = 1024;

/// Buffers bytes until a line terminator (`\r` or `\n`) arrives.
///
/// Empty lines are skipped and NUL bytes are dropped. A line longer than `N` bytes, or one that isn't UTF-8, is
/// discarded whole rather than delivered truncated.
pub struct LineReader<const N: usize = MAX_LINE_LEN> {
    buffer: Vec<u8, N>,
    overflowed: bool,
    complete: bool,
}

impl<const N: usize> Default for LineReader<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> LineReader<N> {
    /// Constructor.
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            overflowed: false,
            complete: false,
        }
    }

    /// Consumes one byte, returning the line it completes, if any. The line is only valid until the next call.
    pub fn push(&mut self, byte: u8) -> Option<&str> {
        if core::mem::take(&mut self.complete) {
            self.buffer.clear();
        }

        match byte {
            b'\r' | b'\n' => {
                self.complete = true;
                if core::mem::take(&mut self.overflowed) {
                    warn!("Discarding line longer than {} bytes", N);
                    return None;
                }
                match core::str::from_utf8(&self.buffer) {
                    Ok("") => None,
                    Ok(line) => Some(line),
                    Err(_) => {
                        warn!("Discarding line which is not UTF-8");
                        None
                    }
                }
            }
            0 => None,
            _ => {
                if self.buffer.push(byte).is_err() {
                    self.overflowed = true;
                }
                None
            }
        }
    }

    /// Consumes `bytes`, calling `on_line` with every line they complete.
    pub fn feed(&mut self, bytes: &[u8], mut on_line: impl FnMut(&str)) {
        for &byte in bytes {
            if let Some(line) = self.push(byte) {
                on_line(line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapless::String;

    fn lines<const N: usize>(reader: &mut LineReader<N>, bytes: &[u8]) -> Vec<String<64>, 8> {
        let mut lines = Vec::new();
        reader.feed(bytes, |line| {
            lines.push(String::try_from(line).unwrap()).unwrap();
        });
        lines
    }

    #[test]
    fn splits_on_either_terminator() {
        let mut reader = LineReader::<64>::new();
        assert_eq!(["CHAN 1", "ROOT D", "END."], lines(&mut reader, b"CHAN 1\r\nROOT D\nEND.\r").as_slice());
    }

    #[test]
    fn lines_may_span_packets() {
        let mut reader = LineReader::<64>::new();
        assert!(lines(&mut reader, b"MAP ax ").is_empty());
        assert!(lines(&mut reader, b"note").is_empty());
        assert_eq!(["MAP ax note"], lines(&mut reader, b"\n").as_slice());
    }

    #[test]
    fn empty_lines_and_nul_are_skipped() {
        let mut reader = LineReader::<64>::new();
        assert_eq!(["dump"], lines(&mut reader, b"\r\n\n\0du\0mp\n").as_slice());
    }

    #[test]
    fn overlong_line_is_discarded() {
        let mut reader = LineReader::<8>::new();
        assert_eq!(
            ["END."],
            lines(&mut reader, b"CHAN 1 ROOT D\nEND.\n").as_slice(),
            "Expected only the second line"
        );

        assert_eq!(["12345678"], lines(&mut reader, b"12345678\n").as_slice(), "A full buffer is not an overflow");
    }

    #[test]
    fn lines_are_returned_one_byte_at_a_time() {
        let mut reader = LineReader::<64>::new();
        let completed: Vec<bool, 16> = b"ROOT D\nEND.\n".iter().map(|&byte| reader.push(byte).is_some()).collect();
        assert_eq!(
            [false, false, false, false, false, false, true, false, false, false, false, true],
            completed.as_slice()
        );
        assert_eq!(None, reader.push(b'\n'), "The previous line is gone");
    }

    #[test]
    fn invalid_utf8_is_discarded() {
        let mut reader = LineReader::<64>::new();
        assert_eq!(["ok"], lines(&mut reader, b"\xFF\xFE\nok\n").as_slice());
    }
}
