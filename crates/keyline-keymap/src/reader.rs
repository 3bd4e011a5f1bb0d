//! Binding reader: resolves decoded characters into key-map bindings.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use keyline_term::{NonBlockingReader, ReadEvent, TermError};
use tracing::trace;

use crate::keymap::{KeyMap, Lookup, KEYMAP_LENGTH};
use crate::KeymapError;

/// Polling slice for blocking character reads.
const READ_SLICE: Duration = Duration::from_millis(100);

/// Outcome of one [`BindingReader::read_binding_from`] call.
#[derive(Debug, PartialEq)]
pub enum BindingEvent<T> {
    /// A key sequence resolved to this binding.
    Bound(T),
    /// Non-blocking mode and no input immediately available; the
    /// operation buffer is preserved for the next call.
    WouldBlock,
    /// The input stream ended.
    Eof,
}

/// Reads characters from a terminal's character source and resolves them
/// against key maps.
///
/// Characters that cannot start any binding route to the map's no-match
/// binding (or the Unicode binding for code points outside the key
/// range). A buffer that is bound but also prefixes a longer binding is
/// held for the map's ambiguity timeout before being emitted.
pub struct BindingReader {
    source: Arc<NonBlockingReader>,
    op_buffer: String,
    push_back: VecDeque<char>,
    last_binding: Option<String>,
}

impl BindingReader {
    pub fn new(source: Arc<NonBlockingReader>) -> Self {
        Self {
            source,
            op_buffer: String::new(),
            push_back: VecDeque::new(),
            last_binding: None,
        }
    }

    /// Read the next binding, blocking until one resolves. `None` means
    /// end of input.
    pub fn read_binding<T: Clone>(
        &mut self,
        keys: &KeyMap<T>,
    ) -> Result<Option<T>, KeymapError> {
        Ok(match self.read_binding_from(keys, None, true)? {
            BindingEvent::Bound(value) => Some(value),
            _ => None,
        })
    }

    /// As [`read_binding`](Self::read_binding), with a local overlay map
    /// taking precedence over `keys`.
    pub fn read_binding_with<T: Clone>(
        &mut self,
        keys: &KeyMap<T>,
        local: &KeyMap<T>,
    ) -> Result<Option<T>, KeymapError> {
        Ok(match self.read_binding_from(keys, Some(local), true)? {
            BindingEvent::Bound(value) => Some(value),
            _ => None,
        })
    }

    /// Full form: optional local overlay and a blocking flag.
    ///
    /// The local map wins when it yields a match, and a local map
    /// reporting an unresolved prefix suppresses the primary lookup so
    /// the primary cannot disambiguate a sequence the overlay still
    /// considers open. Fallback bindings (Unicode, no-match) and the
    /// ambiguity timeout always come from the primary map.
    pub fn read_binding_from<T: Clone>(
        &mut self,
        keys: &KeyMap<T>,
        local: Option<&KeyMap<T>>,
        block: bool,
    ) -> Result<BindingEvent<T>, KeymapError> {
        self.last_binding = None;
        loop {
            let lookup = match local {
                Some(overlay) => match overlay.get_bound(&self.op_buffer) {
                    Lookup::Unmatched => keys.get_bound(&self.op_buffer),
                    hit => hit,
                },
                None => keys.get_bound(&self.op_buffer),
            };

            match lookup {
                Lookup::Matched { value, remaining } => {
                    let value = value.clone();
                    if remaining > 0 {
                        let keep = self.op_buffer.chars().count() - remaining;
                        let cut = self
                            .op_buffer
                            .char_indices()
                            .nth(keep)
                            .map(|(i, _)| i)
                            .unwrap_or(self.op_buffer.len());
                        let tail = self.op_buffer.split_off(cut);
                        self.run_macro(&tail);
                    }
                    return Ok(BindingEvent::Bound(self.emit(value)));
                }
                Lookup::Ambiguous(value) => {
                    let timeout = keys.ambiguous_timeout();
                    let refine = !timeout.is_zero()
                        && matches!(
                            self.peek_character(Some(timeout))?,
                            ReadEvent::Char(_)
                        );
                    if !refine {
                        let value = value.clone();
                        return Ok(BindingEvent::Bound(self.emit(value)));
                    }
                    trace!(buffer = %self.op_buffer, "ambiguous sequence refined by new input");
                    // A character arrived inside the ambiguity window;
                    // read it below and retry.
                }
                Lookup::Unmatched => {
                    if let Some(cp) = self.op_buffer.chars().next() {
                        let fallback = if (cp as u32) >= KEYMAP_LENGTH {
                            keys.unicode()
                        } else {
                            keys.nomatch()
                        };
                        let fallback = fallback.cloned();
                        self.last_binding = Some(cp.to_string());
                        self.op_buffer.drain(..cp.len_utf8());
                        match fallback {
                            Some(value) => return Ok(BindingEvent::Bound(value)),
                            // Discard the code point and re-query with the
                            // shortened buffer before reading more input.
                            None => continue,
                        }
                    }
                }
                Lookup::Prefix => {}
            }

            let c = if block {
                match self.read_character()? {
                    Some(c) => c,
                    None => return Ok(BindingEvent::Eof),
                }
            } else {
                match self.poll_character()? {
                    ReadEvent::Char(c) => c,
                    ReadEvent::Expired => return Ok(BindingEvent::WouldBlock),
                    ReadEvent::Eof => return Ok(BindingEvent::Eof),
                }
            };
            self.op_buffer.push(c);
        }
    }

    /// Next code point: push-back queue first, then the character source.
    /// `None` means end of input; a closed source reads as end of input.
    pub fn read_character(&mut self) -> Result<Option<char>, KeymapError> {
        if let Some(c) = self.push_back.pop_front() {
            return Ok(Some(c));
        }
        loop {
            match self.source.read(Some(READ_SLICE)) {
                Ok(ReadEvent::Char(c)) => return Ok(Some(c)),
                Ok(ReadEvent::Expired) => continue,
                Ok(ReadEvent::Eof) => return Ok(None),
                Err(TermError::Closed) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Look at the next code point without consuming it.
    pub fn peek_character(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<ReadEvent, KeymapError> {
        if let Some(&c) = self.push_back.front() {
            return Ok(ReadEvent::Char(c));
        }
        match self.source.peek(timeout) {
            Ok(event) => Ok(event),
            Err(TermError::Closed) => Ok(ReadEvent::Eof),
            Err(e) => Err(e.into()),
        }
    }

    /// Queue `input`'s code points for replay ahead of fresh input.
    pub fn run_macro(&mut self, input: &str) {
        self.push_back.extend(input.chars());
    }

    /// Code points read but not yet bound or discarded.
    pub fn current_buffer(&self) -> &str {
        &self.op_buffer
    }

    /// Literal key sequence behind the most recent emission.
    pub fn last_binding(&self) -> Option<&str> {
        self.last_binding.as_deref()
    }

    fn poll_character(&mut self) -> Result<ReadEvent, KeymapError> {
        if let Some(c) = self.push_back.pop_front() {
            return Ok(ReadEvent::Char(c));
        }
        match self.source.read(Some(Duration::ZERO)) {
            Ok(event) => Ok(event),
            Err(TermError::Closed) => Ok(ReadEvent::Eof),
            Err(e) => Err(e.into()),
        }
    }

    fn emit<T>(&mut self, value: T) -> T {
        self.last_binding = Some(std::mem::take(&mut self.op_buffer));
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyline_term::Encoding;
    use std::io::Cursor;

    fn reader_over(bytes: &[u8]) -> BindingReader {
        let source = NonBlockingReader::new(
            "test",
            Box::new(Cursor::new(bytes.to_vec())),
            Encoding::Utf8,
        )
        .unwrap();
        BindingReader::new(Arc::new(source))
    }

    #[test]
    fn test_single_sequence_resolves() {
        let mut keys = KeyMap::new();
        keys.bind("\u{1B}[A", "UP").unwrap();
        let mut reader = reader_over(b"\x1B[A");
        assert_eq!(reader.read_binding(&keys).unwrap(), Some("UP"));
        assert_eq!(reader.last_binding(), Some("\u{1B}[A"));
        assert_eq!(reader.current_buffer(), "");
    }

    #[test]
    fn test_eof_yields_none_twice() {
        let keys: KeyMap<&str> = KeyMap::new();
        let mut reader = reader_over(b"");
        assert_eq!(reader.read_binding(&keys).unwrap(), None);
        assert_eq!(reader.read_binding(&keys).unwrap(), None);
    }

    #[test]
    fn test_macro_drains_before_source() {
        let mut reader = reader_over(b"z");
        reader.run_macro("xy");
        assert_eq!(reader.read_character().unwrap(), Some('x'));
        assert_eq!(reader.read_character().unwrap(), Some('y'));
        assert_eq!(reader.read_character().unwrap(), Some('z'));
    }

    #[test]
    fn test_trailing_characters_are_pushed_back() {
        let mut keys = KeyMap::new();
        keys.set_ambiguous_timeout(Duration::ZERO);
        keys.bind("ab", "AB").unwrap();
        keys.bind("c", "C").unwrap();
        let mut reader = reader_over(b"abc");
        assert_eq!(reader.read_binding(&keys).unwrap(), Some("AB"));
        assert_eq!(reader.last_binding(), Some("ab"));
        assert_eq!(reader.read_binding(&keys).unwrap(), Some("C"));
    }

    #[test]
    fn test_nomatch_consumes_one_code_point_at_a_time() {
        let mut keys = KeyMap::new();
        keys.bind("ab", "AB").unwrap();
        keys.set_nomatch(Some("NM"));
        let mut reader = reader_over(b"ac");
        assert_eq!(reader.read_binding(&keys).unwrap(), Some("NM"));
        assert_eq!(reader.last_binding(), Some("a"));
        assert_eq!(reader.current_buffer(), "c");
        assert_eq!(reader.read_binding(&keys).unwrap(), Some("NM"));
        assert_eq!(reader.last_binding(), Some("c"));
        assert_eq!(reader.current_buffer(), "");
    }

    #[test]
    fn test_unicode_fall_through() {
        let mut keys = KeyMap::new();
        keys.set_unicode(Some("UNI"));
        keys.set_nomatch(Some("NM"));
        let mut reader = reader_over("é!".as_bytes());
        assert_eq!(reader.read_binding(&keys).unwrap(), Some("UNI"));
        assert_eq!(reader.last_binding(), Some("é"));
        assert_eq!(reader.read_binding(&keys).unwrap(), Some("NM"));
        assert_eq!(reader.last_binding(), Some("!"));
    }

    #[test]
    fn test_absent_fallback_discards_and_continues() {
        let mut keys = KeyMap::new();
        keys.bind("b", "B").unwrap();
        let mut reader = reader_over(b"ab");
        // 'a' cannot match and there is no nomatch binding; it is
        // discarded and 'b' resolves.
        assert_eq!(reader.read_binding(&keys).unwrap(), Some("B"));
        assert_eq!(reader.last_binding(), Some("b"));
    }

    #[test]
    fn test_zero_timeout_resolves_ambiguity_immediately() {
        let mut keys = KeyMap::new();
        keys.set_ambiguous_timeout(Duration::ZERO);
        keys.bind("a", "A").unwrap();
        keys.bind("ab", "AB").unwrap();
        let mut reader = reader_over(b"a");
        assert_eq!(reader.read_binding(&keys).unwrap(), Some("A"));
    }

    #[test]
    fn test_local_map_takes_precedence() {
        let mut primary = KeyMap::new();
        primary.bind("x", "P").unwrap();
        let mut local = KeyMap::new();
        local.bind("x", "L").unwrap();
        let mut reader = reader_over(b"x");
        assert_eq!(
            reader.read_binding_with(&primary, &local).unwrap(),
            Some("L")
        );
    }

    #[test]
    fn test_nonblocking_returns_would_block_and_keeps_buffer() {
        let source = NonBlockingReader::new(
            "stalled",
            Box::new(keyline_test_utils::ScriptedInput::new().hold_open()),
            Encoding::Utf8,
        )
        .unwrap();
        let mut reader = BindingReader::new(Arc::new(source));
        let mut keys = KeyMap::new();
        keys.bind("ab", "AB").unwrap();
        reader.run_macro("a");
        assert_eq!(
            reader.read_binding_from(&keys, None, false).unwrap(),
            BindingEvent::WouldBlock
        );
        assert_eq!(reader.current_buffer(), "a");
        // The preserved buffer resolves once the rest arrives.
        reader.run_macro("b");
        assert_eq!(
            reader.read_binding_from(&keys, None, false).unwrap(),
            BindingEvent::Bound("AB")
        );
    }
}
