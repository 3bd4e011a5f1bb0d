//! Native INT delivery through a live terminal.
//!
//! Runs in its own test binary so the process-global INT disposition is
//! not shared with unrelated tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use keyline::{PosixTerminal, Signal, SignalHandler, SystemPty};
use nix::sys::signal::{self as nix_signal, SaFlags, SigAction, SigHandler, SigSet};

#[test]
fn native_int_reaches_the_custom_handler_and_close_restores() {
    // Pre-existing disposition: ignore, so a stray INT can never kill the
    // test run.
    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    unsafe { nix_signal::sigaction(nix_signal::Signal::SIGINT, &ignore) }.expect("baseline");

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let pty = SystemPty::open().expect("allocate pty");
    let terminal = PosixTerminal::builder()
        .name("native")
        .term_type("dumb")
        .native_signals(true)
        .handler(SignalHandler::custom(move |signal| {
            assert_eq!(signal, Signal::Int);
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .build(Box::new(pty))
        .expect("open terminal");

    nix_signal::raise(nix_signal::Signal::SIGINT).expect("raise INT");
    let deadline = Instant::now() + Duration::from_secs(2);
    while hits.load(Ordering::SeqCst) == 0 {
        assert!(Instant::now() < deadline, "INT handler never ran");
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    terminal.close().expect("close");

    // The pre-construction disposition is back.
    let probe = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    let old = unsafe { nix_signal::sigaction(nix_signal::Signal::SIGINT, &probe) }
        .expect("probe sigaction");
    assert!(matches!(old.handler(), SigHandler::SigIgn));
}
