//! Terminal abstraction and key-binding dispatch for interactive
//! command-line applications on POSIX systems.
//!
//! The [`keyline_term`] layer presents a uniform view of a controlling
//! terminal: a pty behind the [`Pty`] contract, a non-blocking character
//! source, signal routing through a process-wide bridge, terminfo
//! capability lookup, and orderly teardown. On top of it,
//! [`keyline_keymap`] decodes raw input into named operations through a
//! trie-shaped [`KeyMap`] with prefix/ambiguity resolution.

pub use keyline_keymap::{
    alt, ctrl, esc, Binding, BindingEvent, BindingReader, KeyMap, KeymapError, Lookup,
    KEYMAP_LENGTH,
};
pub use keyline_term::{
    native_bridge, Capabilities, Encoding, NonBlockingReader, PosixTerminal, Pty, RawModeGuard,
    ReadEvent, Signal, SignalBridge, SignalHandler, SignalToken, SystemPty, TermError,
    TerminalBuilder, TerminalWriter, WinSize,
};
