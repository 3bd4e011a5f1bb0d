//! Terminal lifecycle over a real pty and a recording signal bridge.

use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use keyline_term::{
    Encoding, PosixTerminal, ReadEvent, Signal, SignalHandler, SystemPty, TermError, WinSize,
};
use keyline_test_utils::{init_test_logging, Disposition, RecordingBridge};

fn open_with(
    bridge: Arc<RecordingBridge>,
    native_signals: bool,
    handler: SignalHandler,
) -> PosixTerminal {
    init_test_logging();
    let pty = SystemPty::open().expect("allocate pty");
    PosixTerminal::builder()
        .name("test")
        .term_type("dumb")
        .encoding(Encoding::Utf8)
        .native_signals(native_signals)
        .handler(handler)
        .bridge(bridge)
        .build(Box::new(pty))
        .expect("open terminal")
}

#[test]
fn custom_construction_registers_all_signals_and_close_restores() {
    let bridge = Arc::new(RecordingBridge::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    let terminal = open_with(
        bridge.clone(),
        true,
        SignalHandler::custom(move |signal| log.lock().unwrap().push(signal)),
    );

    for signal in Signal::ALL {
        assert_eq!(bridge.disposition(signal), Disposition::Custom);
    }

    // Native delivery routes through the terminal to the custom handler.
    bridge.deliver(Signal::Int);
    assert_eq!(seen.lock().unwrap().as_slice(), &[Signal::Int]);

    terminal.close().expect("close");
    for signal in Signal::ALL {
        assert_eq!(bridge.disposition(signal), Disposition::Default);
    }

    // Delivery after close reaches nothing.
    bridge.deliver(Signal::Int);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn ignore_construction_installs_ignore_dispositions() {
    let bridge = Arc::new(RecordingBridge::new());
    let terminal = open_with(bridge.clone(), true, SignalHandler::Ignore);
    for signal in Signal::ALL {
        assert_eq!(bridge.disposition(signal), Disposition::Ignore);
    }
    terminal.close().expect("close");
}

#[test]
fn handle_returns_previous_and_syncs_native_disposition() {
    let bridge = Arc::new(RecordingBridge::new());
    let terminal = open_with(bridge.clone(), true, SignalHandler::Ignore);

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let previous = terminal
        .handle(
            Signal::Winch,
            SignalHandler::custom(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .expect("handle");
    assert!(matches!(previous, SignalHandler::Ignore));
    assert_eq!(bridge.disposition(Signal::Winch), Disposition::Custom);

    bridge.deliver(Signal::Winch);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // raise() dispatches through the installed handler as well.
    terminal.raise(Signal::Winch);
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    let previous = terminal
        .handle(Signal::Winch, SignalHandler::Ignore)
        .expect("handle back");
    assert!(matches!(previous, SignalHandler::Custom(_)));
    terminal.raise(Signal::Winch);
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    terminal.close().expect("close");
}

#[test]
fn close_is_idempotent_and_fails_further_io() {
    let bridge = Arc::new(RecordingBridge::new());
    let terminal = open_with(bridge, false, SignalHandler::Default);
    terminal.close().expect("first close");
    terminal.close().expect("second close");
    assert!(matches!(
        terminal.reader().read(None),
        Err(TermError::Closed)
    ));
    assert!(matches!(
        terminal.writer().write_str("x"),
        Err(TermError::Closed)
    ));
    assert!(matches!(terminal.input(), Err(TermError::Closed)));
    assert!(matches!(terminal.size(), Err(TermError::Closed)));
}

#[test]
fn writer_reaches_the_master_side() {
    init_test_logging();
    let pty = SystemPty::open().expect("allocate pty");
    let mut master = pty.master_reader().expect("master reader");
    let terminal = PosixTerminal::builder()
        .term_type("dumb")
        .bridge(Arc::new(RecordingBridge::new()))
        .build(Box::new(pty))
        .expect("open terminal");

    let writer = terminal.writer();
    writer.write_str("ping").expect("write");
    writer.flush().expect("flush");

    let mut buf = [0u8; 4];
    master.read_exact(&mut buf).expect("read master");
    assert_eq!(&buf, b"ping");
    terminal.close().expect("close");
}

#[test]
fn reader_sees_master_input_after_raw_mode() {
    init_test_logging();
    let pty = SystemPty::open().expect("allocate pty");
    let mut master = pty.master_writer().expect("master writer");
    let terminal = PosixTerminal::builder()
        .term_type("dumb")
        .bridge(Arc::new(RecordingBridge::new()))
        .build(Box::new(pty))
        .expect("open terminal");

    let _raw = terminal.enter_raw_mode().expect("raw mode");
    use std::io::Write;
    master.write_all(b"k").expect("write master");

    let reader = terminal.reader();
    assert_eq!(
        reader.read(Some(Duration::from_secs(2))).expect("read"),
        ReadEvent::Char('k')
    );
    terminal.close().expect("close");
}

#[test]
fn resize_round_trips_through_the_pty() {
    let bridge = Arc::new(RecordingBridge::new());
    let terminal = open_with(bridge, false, SignalHandler::Default);
    terminal
        .resize(WinSize { rows: 40, cols: 120 })
        .expect("resize");
    assert_eq!(
        terminal.size().expect("size"),
        WinSize { rows: 40, cols: 120 }
    );
    terminal.close().expect("close");
}
