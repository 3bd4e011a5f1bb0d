//! Non-blocking character source over a blocking byte stream.
//!
//! A pump thread performs the blocking reads and decodes bytes into
//! characters; callers take them off a shared queue with a timeout. The
//! pump exits on end of stream, on a read error, or once the source is
//! closed; closing also wakes every waiting caller.

use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::encoding::{Decoder, Encoding};
use crate::TermError;

/// Outcome of a timed read or peek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadEvent {
    /// The next character from the stream.
    Char(char),
    /// No character arrived within the timeout.
    Expired,
    /// The underlying stream ended.
    Eof,
}

/// Character source with `read(timeout)` / `peek(timeout)` semantics.
///
/// A timeout of `None` blocks indefinitely; `Duration::ZERO` polls.
pub struct NonBlockingReader {
    shared: Arc<Shared>,
    name: String,
}

struct Shared {
    state: Mutex<State>,
    readable: Condvar,
}

#[derive(Default)]
struct State {
    chars: VecDeque<char>,
    eof: bool,
    closed: bool,
    failed: Option<(io::ErrorKind, String)>,
}

impl NonBlockingReader {
    /// Spawn the pump thread over `input` and start decoding.
    pub fn new(
        name: impl Into<String>,
        input: Box<dyn Read + Send>,
        encoding: Encoding,
    ) -> Result<Self, TermError> {
        let name = name.into();
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            readable: Condvar::new(),
        });
        let pump_shared = shared.clone();
        thread::Builder::new()
            .name(format!("keyline-reader-{name}"))
            .spawn(move || pump(pump_shared, input, encoding))?;
        Ok(Self { shared, name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take the next character, waiting up to `timeout`.
    pub fn read(&self, timeout: Option<Duration>) -> Result<ReadEvent, TermError> {
        self.wait_event(timeout, true)
    }

    /// Look at the next character without consuming it.
    pub fn peek(&self, timeout: Option<Duration>) -> Result<ReadEvent, TermError> {
        self.wait_event(timeout, false)
    }

    /// Mark the source closed. Pending and future reads fail with
    /// [`TermError::Closed`]; blocked callers wake immediately.
    pub fn close(&self) {
        let mut state = self.shared.state.lock().unwrap();
        if !state.closed {
            state.closed = true;
            debug!(name = %self.name, "character source closed");
        }
        drop(state);
        self.shared.readable.notify_all();
    }

    fn wait_event(&self, timeout: Option<Duration>, consume: bool) -> Result<ReadEvent, TermError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.shared.state.lock().unwrap();
        loop {
            if state.closed {
                return Err(TermError::Closed);
            }
            if let Some(&c) = state.chars.front() {
                if consume {
                    state.chars.pop_front();
                }
                return Ok(ReadEvent::Char(c));
            }
            if let Some((kind, message)) = &state.failed {
                return Err(TermError::Io(io::Error::new(*kind, message.clone())));
            }
            if state.eof {
                return Ok(ReadEvent::Eof);
            }
            state = match deadline {
                None => self.shared.readable.wait(state).unwrap(),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(ReadEvent::Expired);
                    }
                    self.shared
                        .readable
                        .wait_timeout(state, deadline - now)
                        .unwrap()
                        .0
                }
            };
        }
    }
}

fn pump(shared: Arc<Shared>, mut input: Box<dyn Read + Send>, encoding: Encoding) {
    let mut decoder = Decoder::new(encoding);
    let mut buf = [0u8; 4096];
    let mut decoded = Vec::new();
    loop {
        if shared.state.lock().unwrap().closed {
            break;
        }
        match input.read(&mut buf) {
            Ok(0) => {
                decoder.finish(&mut decoded);
                let mut state = shared.state.lock().unwrap();
                state.chars.extend(decoded.drain(..));
                state.eof = true;
                break;
            }
            Ok(n) => {
                decoder.decode(&buf[..n], &mut decoded);
                let mut state = shared.state.lock().unwrap();
                state.chars.extend(decoded.drain(..));
                drop(state);
                shared.readable.notify_all();
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(error = %e, "character source read failed");
                let mut state = shared.state.lock().unwrap();
                state.failed = Some((e.kind(), e.to_string()));
                break;
            }
        }
    }
    shared.readable.notify_all();
}
