//! Interactive key-sequence inspector.
//!
//! Opens a pty-backed terminal, binds the arrow keys out of terminfo plus
//! a few control sequences, and prints every binding the reader resolves.
//! Bytes from stdin are forwarded to the pty, so sequences can be typed
//! or piped:
//!
//! ```text
//! printf '\033[Aq' | keyshow
//! ```

use std::io::{Read, Write};
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use keyline::{ctrl, Binding, BindingReader, Encoding, KeyMap, PosixTerminal, SystemPty};

#[derive(Parser, Debug)]
#[clap(name = "keyshow", about = "Decode key sequences into named bindings")]
struct Args {
    /// Terminal type to resolve against terminfo
    #[clap(short, long, default_value = "xterm-256color")]
    term: String,

    /// Input encoding
    #[clap(short, long, default_value = "UTF-8")]
    encoding: String,

    /// Verbosity level
    #[clap(short, long, default_value = "warn")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(args.log_level)
        .init();

    let encoding: Encoding = args.encoding.parse()?;
    let pty = SystemPty::open().context("allocate pty")?;
    let mut master = pty.master_writer().context("master writer")?;

    let terminal = PosixTerminal::builder()
        .name("keyshow")
        .term_type(&args.term)
        .encoding(encoding)
        .build(Box::new(pty))
        .context("open terminal")?;
    let _raw = terminal.enter_raw_mode().context("raw mode")?;

    let keys = build_keymap(&terminal)?;

    // Forward stdin bytes into the pty; the terminal reads them back out
    // of the slave side.
    thread::spawn(move || {
        let mut stdin = std::io::stdin();
        let mut buf = [0u8; 1024];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if master.write_all(&buf[..n]).is_err() {
                        break;
                    }
                }
            }
        }
    });

    println!("decoding key sequences; 'q' quits, unbound keys echo their binding class");
    let mut reader = BindingReader::new(terminal.reader());
    while let Some(binding) = reader.read_binding(&keys)? {
        let sequence = reader.last_binding().unwrap_or("").to_owned();
        match binding {
            Binding::Reference(name) if name == "quit" => {
                println!("quit");
                break;
            }
            Binding::Reference(name) => println!("{} -> {name}", printable(&sequence)),
            Binding::Macro(expansion) => {
                println!("{} -> macro {}", printable(&sequence), printable(&expansion));
                reader.run_macro(&expansion);
            }
            Binding::Widget(widget) => widget(),
        }
    }

    terminal.close()?;
    Ok(())
}

fn build_keymap(terminal: &PosixTerminal) -> Result<KeyMap<Binding>> {
    let mut keys = KeyMap::new();
    for (capability, name) in [
        ("kcuu1", "up"),
        ("kcud1", "down"),
        ("kcuf1", "right"),
        ("kcub1", "left"),
        ("khome", "home"),
        ("kend", "end"),
    ] {
        if let Some(sequence) = terminal.key_sequence(capability) {
            keys.bind(&sequence, Binding::Reference(name.into()))?;
        }
    }
    keys.bind(&ctrl('D'), Binding::Reference("quit".into()))?;
    keys.bind("q", Binding::Reference("quit".into()))?;
    keys.bind(&ctrl('L'), Binding::widget(|| println!("\x1bc")))?;
    keys.set_nomatch(Some(Binding::Reference("self-insert".into())));
    keys.set_unicode(Some(Binding::Reference("insert-unicode".into())));
    Ok(keys)
}

fn printable(sequence: &str) -> String {
    sequence
        .chars()
        .map(|c| match c {
            '\u{1B}' => "^[".to_string(),
            c if (c as u32) < 0x20 => format!("^{}", (b'@' + c as u8) as char),
            c => c.to_string(),
        })
        .collect()
}
