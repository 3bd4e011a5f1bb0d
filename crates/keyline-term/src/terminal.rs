//! The POSIX system terminal.
//!
//! Composes a pty with the non-blocking character source, the buffered
//! writer, native signal routing, terminfo capabilities, and the shutdown
//! registry. Closing restores every signal disposition the terminal
//! installed and releases the pty; cleanup is best-effort and keeps going
//! past individual failures.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use nix::sys::termios::{self, Termios};
use tracing::{debug, warn};

use crate::encoding::Encoding;
use crate::nonblocking::NonBlockingReader;
use crate::pty::{Pty, WinSize};
use crate::shutdown::{self, ShutdownHook};
use crate::signals::{self, Signal, SignalBridge, SignalHandler, SignalToken};
use crate::terminfo::Capabilities;
use crate::writer::TermWriter;
use crate::TermError;

/// Configures and opens a [`PosixTerminal`].
pub struct TerminalBuilder {
    name: String,
    term_type: Option<String>,
    encoding: Encoding,
    native_signals: bool,
    handler: SignalHandler,
    bridge: Option<Arc<dyn SignalBridge>>,
}

impl TerminalBuilder {
    pub fn new() -> Self {
        Self {
            name: "keyline".into(),
            term_type: None,
            encoding: Encoding::Utf8,
            native_signals: false,
            handler: SignalHandler::Default,
            bridge: None,
        }
    }

    /// Human label, used for thread names and logging.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Declared terminal type; defaults to `$TERM`.
    pub fn term_type(mut self, term_type: impl Into<String>) -> Self {
        self.term_type = Some(term_type.into());
        self
    }

    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Whether to install native dispositions for every recognized signal.
    pub fn native_signals(mut self, native_signals: bool) -> Self {
        self.native_signals = native_signals;
        self
    }

    /// Initial handler applied to every recognized signal.
    pub fn handler(mut self, handler: SignalHandler) -> Self {
        self.handler = handler;
        self
    }

    /// Replace the process-wide signal bridge (tests inject fakes here).
    pub fn bridge(mut self, bridge: Arc<dyn SignalBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn build(self, pty: Box<dyn Pty>) -> Result<PosixTerminal, TermError> {
        let term_type = match self.term_type {
            Some(t) => t,
            None => std::env::var("TERM").map_err(|_| {
                TermError::Config("terminal type not given and TERM is unset".into())
            })?,
        };
        let caps = Capabilities::load(&term_type)?;
        let reader = Arc::new(NonBlockingReader::new(
            &self.name,
            pty.slave_input()?,
            self.encoding,
        )?);
        let writer = TermWriter::new(pty.slave_output()?, self.encoding);
        let bridge = self.bridge.unwrap_or_else(signals::native_bridge);

        let handlers = Signal::ALL
            .into_iter()
            .map(|s| (s, self.handler.clone()))
            .collect();
        let shared = Arc::new(TerminalShared {
            name: self.name,
            term_type,
            encoding: self.encoding,
            caps,
            reader,
            writer: Mutex::new(writer),
            pty: Mutex::new(Some(pty)),
            handlers: Mutex::new(handlers),
            tokens: Mutex::new(HashMap::new()),
            bridge,
            hook: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        if self.native_signals {
            match &self.handler {
                SignalHandler::Default => {
                    for signal in Signal::ALL {
                        shared.bridge.register_default(signal)?;
                    }
                }
                SignalHandler::Ignore => {
                    for signal in Signal::ALL {
                        shared.bridge.register_ignore(signal)?;
                    }
                }
                SignalHandler::Custom(_) => {
                    for signal in Signal::ALL {
                        let token = shared.bridge.register(signal, raise_callback(&shared))?;
                        shared.tokens.lock().unwrap().insert(signal, token);
                    }
                }
            }
        }

        let hook_target = Arc::downgrade(&shared);
        let hook = shutdown::add(move || {
            if let Some(shared) = hook_target.upgrade() {
                if let Err(e) = shared.close() {
                    warn!(error = %e, "terminal shutdown task failed");
                }
            }
        });
        *shared.hook.lock().unwrap() = Some(hook);

        Ok(PosixTerminal { shared })
    }
}

impl Default for TerminalBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn raise_callback(shared: &Arc<TerminalShared>) -> Arc<signals::SignalCallback> {
    let weak = Arc::downgrade(shared);
    Arc::new(move |signal| {
        if let Some(shared) = weak.upgrade() {
            shared.raise(signal);
        }
    })
}

/// A terminal over a pty's slave side.
pub struct PosixTerminal {
    shared: Arc<TerminalShared>,
}

struct TerminalShared {
    name: String,
    term_type: String,
    encoding: Encoding,
    caps: Capabilities,
    reader: Arc<NonBlockingReader>,
    writer: Mutex<TermWriter>,
    pty: Mutex<Option<Box<dyn Pty>>>,
    handlers: Mutex<HashMap<Signal, SignalHandler>>,
    tokens: Mutex<HashMap<Signal, SignalToken>>,
    bridge: Arc<dyn SignalBridge>,
    hook: Mutex<Option<ShutdownHook>>,
    closed: AtomicBool,
}

impl PosixTerminal {
    pub fn builder() -> TerminalBuilder {
        TerminalBuilder::new()
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn term_type(&self) -> &str {
        &self.shared.term_type
    }

    pub fn encoding(&self) -> Encoding {
        self.shared.encoding
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.shared.caps
    }

    /// String capability rendered as a bindable key sequence.
    pub fn key_sequence(&self, capability: &str) -> Option<String> {
        self.shared.caps.string(capability)
    }

    /// The non-blocking character source over the slave input.
    pub fn reader(&self) -> Arc<NonBlockingReader> {
        self.shared.reader.clone()
    }

    /// Buffered text writer over the slave output.
    pub fn writer(&self) -> TerminalWriter {
        TerminalWriter {
            shared: self.shared.clone(),
        }
    }

    /// Raw byte stream from the slave side.
    pub fn input(&self) -> Result<Box<dyn Read + Send>, TermError> {
        match self.shared.pty.lock().unwrap().as_ref() {
            Some(pty) => pty.slave_input(),
            None => Err(TermError::Closed),
        }
    }

    /// Raw byte stream onto the slave side.
    pub fn output(&self) -> Result<Box<dyn Write + Send>, TermError> {
        match self.shared.pty.lock().unwrap().as_ref() {
            Some(pty) => pty.slave_output(),
            None => Err(TermError::Closed),
        }
    }

    pub fn size(&self) -> Result<WinSize, TermError> {
        match self.shared.pty.lock().unwrap().as_ref() {
            Some(pty) => pty.size(),
            None => Err(TermError::Closed),
        }
    }

    pub fn resize(&self, size: WinSize) -> Result<(), TermError> {
        match self.shared.pty.lock().unwrap().as_ref() {
            Some(pty) => pty.set_size(size),
            None => Err(TermError::Closed),
        }
    }

    /// Install `handler` for `signal` and synchronize the native
    /// disposition; returns the handler it replaced.
    pub fn handle(
        &self,
        signal: Signal,
        handler: SignalHandler,
    ) -> Result<SignalHandler, TermError> {
        let previous = self
            .shared
            .handlers
            .lock()
            .unwrap()
            .insert(signal, handler.clone())
            .unwrap_or_default();
        match handler {
            SignalHandler::Default => {
                self.shared.bridge.register_default(signal)?;
                self.shared.tokens.lock().unwrap().remove(&signal);
            }
            SignalHandler::Ignore => {
                self.shared.bridge.register_ignore(signal)?;
                self.shared.tokens.lock().unwrap().remove(&signal);
            }
            SignalHandler::Custom(_) => {
                let token = self
                    .shared
                    .bridge
                    .register(signal, raise_callback(&self.shared))?;
                self.shared.tokens.lock().unwrap().insert(signal, token);
            }
        }
        Ok(previous)
    }

    /// Dispatch `signal` through the installed handler.
    pub fn raise(&self, signal: Signal) {
        self.shared.raise(signal);
    }

    /// Apply a raw configuration to the pty, returning a guard that
    /// restores the saved attributes when dropped.
    pub fn enter_raw_mode(&self) -> Result<RawModeGuard, TermError> {
        let saved = {
            let pty = self.shared.pty.lock().unwrap();
            let pty = pty.as_ref().ok_or(TermError::Closed)?;
            let saved = pty.attributes()?;
            let mut raw = saved.clone();
            termios::cfmakeraw(&mut raw);
            pty.set_attributes(&raw)?;
            saved
        };
        Ok(RawModeGuard {
            shared: self.shared.clone(),
            saved,
        })
    }

    /// Tear the terminal down: deregister from the shutdown registry,
    /// restore signal dispositions, close the streams, release the pty.
    pub fn close(&self) -> Result<(), TermError> {
        self.shared.close()
    }
}

impl Drop for PosixTerminal {
    fn drop(&mut self) {
        if let Err(e) = self.shared.close() {
            warn!(error = %e, "terminal close on drop failed");
        }
    }
}

impl TerminalShared {
    fn raise(&self, signal: Signal) {
        let handler = self
            .handlers
            .lock()
            .unwrap()
            .get(&signal)
            .cloned()
            .unwrap_or_default();
        match handler {
            SignalHandler::Ignore => {}
            SignalHandler::Custom(callback) => callback(signal),
            SignalHandler::Default => {
                // Chain to the disposition that was active before this
                // terminal registered, if any was captured.
                let token = self
                    .tokens
                    .lock()
                    .unwrap()
                    .get(&signal)
                    .map(|t| SignalToken::new(t.signal(), t.id()));
                if let Some(token) = token {
                    if let Err(e) = self.bridge.invoke_handler(&token) {
                        warn!(%signal, error = %e, "failed to chain to prior signal disposition");
                    }
                }
            }
        }
    }

    fn close(&self) -> Result<(), TermError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut errors: Vec<TermError> = Vec::new();

        if let Some(hook) = self.hook.lock().unwrap().take() {
            shutdown::remove(hook);
        }
        let tokens: Vec<(Signal, SignalToken)> =
            self.tokens.lock().unwrap().drain().collect();
        for (signal, token) in tokens {
            if let Err(e) = self.bridge.unregister(token) {
                warn!(%signal, error = %e, "failed to restore signal disposition");
                errors.push(e);
            }
        }
        self.reader.close();
        if let Err(e) = self.writer.lock().unwrap().flush() {
            errors.push(e);
        }
        self.pty.lock().unwrap().take();
        debug!(name = %self.name, "terminal closed");

        if errors.is_empty() {
            Ok(())
        } else {
            Err(TermError::CloseIncomplete(errors))
        }
    }
}

/// Cloneable handle onto the terminal's buffered writer.
pub struct TerminalWriter {
    shared: Arc<TerminalShared>,
}

impl TerminalWriter {
    pub fn write_str(&self, s: &str) -> Result<(), TermError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(TermError::Closed);
        }
        self.shared.writer.lock().unwrap().write_str(s)
    }

    pub fn write_char(&self, c: char) -> Result<(), TermError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(TermError::Closed);
        }
        self.shared.writer.lock().unwrap().write_char(c)
    }

    pub fn flush(&self) -> Result<(), TermError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(TermError::Closed);
        }
        self.shared.writer.lock().unwrap().flush()
    }
}

impl Clone for TerminalWriter {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

/// Restores the pty attributes captured at [`PosixTerminal::enter_raw_mode`].
pub struct RawModeGuard {
    shared: Arc<TerminalShared>,
    saved: Termios,
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Ok(pty) = self.shared.pty.lock() {
            if let Some(pty) = pty.as_ref() {
                if let Err(e) = pty.set_attributes(&self.saved) {
                    warn!(error = %e, "failed to restore terminal attributes");
                }
            }
        }
    }
}
