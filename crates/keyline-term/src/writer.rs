//! Buffered encoding writer for the terminal's output stream.

use std::io::{BufWriter, Write};

use crate::encoding::Encoding;
use crate::TermError;

pub struct TermWriter {
    out: BufWriter<Box<dyn Write + Send>>,
    encoding: Encoding,
    scratch: Vec<u8>,
}

impl TermWriter {
    pub fn new(output: Box<dyn Write + Send>, encoding: Encoding) -> Self {
        Self {
            out: BufWriter::new(output),
            encoding,
            scratch: Vec::new(),
        }
    }

    pub fn write_str(&mut self, s: &str) -> Result<(), TermError> {
        self.scratch.clear();
        self.encoding.encode_str(s, &mut self.scratch);
        self.out.write_all(&self.scratch)?;
        Ok(())
    }

    pub fn write_char(&mut self, c: char) -> Result<(), TermError> {
        self.write_str(c.encode_utf8(&mut [0u8; 4]))
    }

    pub fn flush(&mut self) -> Result<(), TermError> {
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Sink(Arc<Mutex<Vec<u8>>>);

    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_writes_are_buffered_until_flush() {
        let sink = Sink::default();
        let mut writer = TermWriter::new(Box::new(sink.clone()), Encoding::Utf8);
        writer.write_str("hello").unwrap();
        assert!(sink.0.lock().unwrap().is_empty());
        writer.flush().unwrap();
        assert_eq!(&*sink.0.lock().unwrap(), b"hello");
    }

    #[test]
    fn test_encoding_applies_to_output() {
        let sink = Sink::default();
        let mut writer = TermWriter::new(Box::new(sink.clone()), Encoding::Utf16Be);
        writer.write_char('A').unwrap();
        writer.flush().unwrap();
        assert_eq!(&*sink.0.lock().unwrap(), &[0x00, 0x41]);
    }
}
