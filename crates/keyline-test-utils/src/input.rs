//! Scripted byte streams for driving the character source in tests.

use std::collections::VecDeque;
use std::io::{self, Read};
use std::thread;
use std::time::Duration;

/// A blocking `Read` that replays byte segments, sleeping before each.
///
/// Each `read` call serves at most one segment, so multi-byte sequences
/// can be split across reads on purpose. After the script drains the
/// stream reports end of file, unless [`hold_open`](Self::hold_open) was
/// set, in which case reads park forever (simulating an idle terminal).
pub struct ScriptedInput {
    segments: VecDeque<(Duration, Vec<u8>)>,
    hold_open: bool,
}

impl ScriptedInput {
    pub fn new() -> Self {
        Self {
            segments: VecDeque::new(),
            hold_open: false,
        }
    }

    /// Append a segment served without delay.
    pub fn bytes(self, bytes: &[u8]) -> Self {
        self.after(Duration::ZERO, bytes)
    }

    /// Append a segment served after sleeping `delay`.
    pub fn after(mut self, delay: Duration, bytes: &[u8]) -> Self {
        self.segments.push_back((delay, bytes.to_vec()));
        self
    }

    /// Never report end of file; reads past the script block forever.
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }
}

impl Default for ScriptedInput {
    fn default() -> Self {
        Self::new()
    }
}

impl Read for ScriptedInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.segments.front_mut() {
                Some((delay, bytes)) => {
                    if !delay.is_zero() {
                        thread::sleep(*delay);
                        *delay = Duration::ZERO;
                    }
                    if bytes.is_empty() {
                        self.segments.pop_front();
                        continue;
                    }
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    bytes.drain(..n);
                    if bytes.is_empty() {
                        self.segments.pop_front();
                    }
                    return Ok(n);
                }
                None => {
                    if self.hold_open {
                        loop {
                            thread::park();
                        }
                    }
                    return Ok(0);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_segments_arrive_in_order_then_eof() {
        let mut input = ScriptedInput::new().bytes(b"ab").bytes(b"c");
        let mut buf = [0u8; 8];
        assert_eq!(input.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ab");
        assert_eq!(input.read(&mut buf).unwrap(), 1);
        assert_eq!(&buf[..1], b"c");
        assert_eq!(input.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_delay_applies_before_segment() {
        let mut input = ScriptedInput::new().after(Duration::from_millis(50), b"x");
        let start = Instant::now();
        let mut buf = [0u8; 1];
        input.read(&mut buf).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
