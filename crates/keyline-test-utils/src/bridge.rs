//! Recording fake of the signal bridge.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use keyline_term::{Signal, SignalBridge, SignalCallback, SignalToken, TermError};

/// Externally observable disposition of one signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Default,
    Ignore,
    Custom,
}

#[derive(Clone)]
enum State {
    Default,
    Ignore,
    Custom(Arc<SignalCallback>),
}

struct Inner {
    current: HashMap<Signal, State>,
    saved: HashMap<u64, (Signal, State)>,
    next_id: u64,
}

/// In-memory bridge: tracks per-signal dispositions and hands out undo
/// tokens like the native bridge, without touching sigaction.
pub struct RecordingBridge {
    inner: Mutex<Inner>,
}

impl RecordingBridge {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                current: HashMap::new(),
                saved: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Disposition currently installed for `signal`.
    pub fn disposition(&self, signal: Signal) -> Disposition {
        match self.inner.lock().unwrap().current.get(&signal) {
            None | Some(State::Default) => Disposition::Default,
            Some(State::Ignore) => Disposition::Ignore,
            Some(State::Custom(_)) => Disposition::Custom,
        }
    }

    /// Simulate native delivery of `signal` to the installed callback.
    pub fn deliver(&self, signal: Signal) {
        let callback = match self.inner.lock().unwrap().current.get(&signal) {
            Some(State::Custom(callback)) => Some(callback.clone()),
            _ => None,
        };
        if let Some(callback) = callback {
            callback(signal);
        }
    }
}

impl Default for RecordingBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalBridge for RecordingBridge {
    fn register_default(&self, signal: Signal) -> Result<(), TermError> {
        self.inner
            .lock()
            .unwrap()
            .current
            .insert(signal, State::Default);
        Ok(())
    }

    fn register_ignore(&self, signal: Signal) -> Result<(), TermError> {
        self.inner
            .lock()
            .unwrap()
            .current
            .insert(signal, State::Ignore);
        Ok(())
    }

    fn register(
        &self,
        signal: Signal,
        callback: Arc<SignalCallback>,
    ) -> Result<SignalToken, TermError> {
        let mut inner = self.inner.lock().unwrap();
        let prior = inner
            .current
            .get(&signal)
            .cloned()
            .unwrap_or(State::Default);
        inner.current.insert(signal, State::Custom(callback));
        let id = inner.next_id;
        inner.next_id += 1;
        inner.saved.insert(id, (signal, prior));
        Ok(SignalToken::new(signal, id))
    }

    fn unregister(&self, token: SignalToken) -> Result<(), TermError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some((signal, prior)) = inner.saved.remove(&token.id()) {
            inner.current.insert(signal, prior);
        }
        Ok(())
    }

    fn invoke_handler(&self, token: &SignalToken) -> Result<(), TermError> {
        let prior = match self.inner.lock().unwrap().saved.get(&token.id()) {
            Some((_, prior)) => prior.clone(),
            None => {
                return Err(TermError::Signal(format!(
                    "no saved disposition for {}",
                    token.signal()
                )))
            }
        };
        if let State::Custom(callback) = prior {
            callback(token.signal());
        }
        Ok(())
    }
}
