//! POSIX terminal layer for keyline.
//!
//! Wraps a pseudo-terminal behind a uniform view: a non-blocking character
//! source over the slave input, a buffered encoding writer over the slave
//! output, native signal routing through a process-wide bridge, terminfo
//! capability lookup, and deterministic teardown on close or process exit.

pub mod encoding;
pub mod nonblocking;
pub mod pty;
pub mod shutdown;
pub mod signals;
pub mod terminal;
pub mod terminfo;
pub mod writer;

pub use encoding::Encoding;
pub use nonblocking::{NonBlockingReader, ReadEvent};
pub use pty::{Pty, SystemPty, WinSize};
pub use shutdown::ShutdownHook;
pub use signals::{
    native_bridge, Signal, SignalBridge, SignalCallback, SignalHandler, SignalToken,
};
pub use terminal::{PosixTerminal, RawModeGuard, TerminalBuilder, TerminalWriter};
pub use terminfo::Capabilities;
pub use writer::TermWriter;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TermError {
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("stream closed")]
    Closed,

    #[error("invalid terminal configuration: {0}")]
    Config(String),

    #[error("signal bridge failure: {0}")]
    Signal(String),

    #[error("terminal close finished with {} error(s)", .0.len())]
    CloseIncomplete(Vec<TermError>),
}
