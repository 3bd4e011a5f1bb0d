//! Key maps and binding resolution for keyline.
//!
//! A [`KeyMap`] is a trie from code-point sequences to opaque bound
//! values; the [`BindingReader`] drives a terminal's character source
//! against one, handling prefix ambiguity, Unicode and no-match
//! fall-through, and macro push-back.

pub mod binding;
pub mod keymap;
pub mod reader;

pub use binding::Binding;
pub use keymap::{alt, ctrl, esc, KeyMap, Lookup, KEYMAP_LENGTH};
pub use reader::{BindingEvent, BindingReader};

use keyline_term::TermError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeymapError {
    #[error("empty key sequence")]
    EmptySequence,

    #[error("code point U+{0:04X} is outside the key map range")]
    KeyOutOfRange(u32),

    #[error("terminal failure: {0}")]
    Terminal(#[from] TermError),
}
