//! Process-wide signal bridge.
//!
//! Maps native POSIX signals onto in-process callbacks. The installed
//! sigaction handler only writes the signal number to a self-pipe; a
//! dispatcher thread drains the pipe and runs the registered callback, so
//! no user code ever executes in signal-delivery context. Registration
//! returns a token capturing the replaced disposition; unregistering is a
//! pure undo. Bridge state outlives any single terminal.

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::os::fd::IntoRawFd;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;

use nix::sys::signal::{self as nix_signal, SaFlags, SigAction, SigHandler, SigSet};
use tracing::warn;

use crate::TermError;

/// Asynchronous events recognized by the terminal layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Int,
    Quit,
    Tstp,
    Cont,
    Winch,
}

impl Signal {
    pub const ALL: [Signal; 5] = [
        Signal::Int,
        Signal::Quit,
        Signal::Tstp,
        Signal::Cont,
        Signal::Winch,
    ];

    /// Stable name used when talking to the operating system.
    pub fn name(self) -> &'static str {
        match self {
            Signal::Int => "INT",
            Signal::Quit => "QUIT",
            Signal::Tstp => "TSTP",
            Signal::Cont => "CONT",
            Signal::Winch => "WINCH",
        }
    }

    pub fn from_name(name: &str) -> Option<Signal> {
        Signal::ALL.into_iter().find(|s| s.name() == name)
    }

    pub(crate) fn to_nix(self) -> nix_signal::Signal {
        match self {
            Signal::Int => nix_signal::Signal::SIGINT,
            Signal::Quit => nix_signal::Signal::SIGQUIT,
            Signal::Tstp => nix_signal::Signal::SIGTSTP,
            Signal::Cont => nix_signal::Signal::SIGCONT,
            Signal::Winch => nix_signal::Signal::SIGWINCH,
        }
    }

    fn from_number(signo: i32) -> Option<Signal> {
        Signal::ALL
            .into_iter()
            .find(|s| s.to_nix() as i32 == signo)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Callback invoked when a registered signal fires.
pub type SignalCallback = dyn Fn(Signal) + Send + Sync;

/// Disposition a terminal associates with a signal.
#[derive(Clone, Default)]
pub enum SignalHandler {
    /// Defer to the disposition that was active before the terminal.
    #[default]
    Default,
    /// Swallow the signal.
    Ignore,
    /// Run the callback.
    Custom(Arc<SignalCallback>),
}

impl SignalHandler {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(Signal) + Send + Sync + 'static,
    {
        SignalHandler::Custom(Arc::new(f))
    }
}

impl fmt::Debug for SignalHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalHandler::Default => f.write_str("Default"),
            SignalHandler::Ignore => f.write_str("Ignore"),
            SignalHandler::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Undo token for one `register` call; captures the replaced disposition.
#[derive(Debug)]
pub struct SignalToken {
    pub(crate) signal: Signal,
    pub(crate) id: u64,
}

impl SignalToken {
    /// Mint a token. Only bridge implementations should call this.
    pub fn new(signal: Signal, id: u64) -> Self {
        Self { signal, id }
    }

    pub fn signal(&self) -> Signal {
        self.signal
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Installation surface for signal dispositions.
///
/// The native implementation is a process-wide singleton from
/// [`native_bridge`]; tests inject their own.
pub trait SignalBridge: Send + Sync {
    /// Restore the OS default disposition.
    fn register_default(&self, signal: Signal) -> Result<(), TermError>;

    /// Install an ignore disposition.
    fn register_ignore(&self, signal: Signal) -> Result<(), TermError>;

    /// Install `callback`, returning a token capturing what it replaced.
    fn register(
        &self,
        signal: Signal,
        callback: Arc<SignalCallback>,
    ) -> Result<SignalToken, TermError>;

    /// Restore the disposition captured in `token`.
    fn unregister(&self, token: SignalToken) -> Result<(), TermError>;

    /// Synchronously run the disposition captured in `token`.
    fn invoke_handler(&self, token: &SignalToken) -> Result<(), TermError>;
}

/// The process-wide native bridge.
pub fn native_bridge() -> Arc<dyn SignalBridge> {
    native_instance().clone()
}

fn native_instance() -> &'static Arc<NativeSignalBridge> {
    static INSTANCE: OnceLock<Arc<NativeSignalBridge>> = OnceLock::new();
    INSTANCE.get_or_init(|| {
        Arc::new(NativeSignalBridge {
            inner: Mutex::new(BridgeInner {
                slots: HashMap::new(),
                saved: HashMap::new(),
                next_id: 1,
                dispatcher_started: false,
            }),
        })
    })
}

struct NativeSignalBridge {
    inner: Mutex<BridgeInner>,
}

struct BridgeInner {
    /// Active callback per signal number while the trampoline is installed.
    slots: HashMap<i32, Arc<SignalCallback>>,
    saved: HashMap<u64, SavedDisposition>,
    next_id: u64,
    dispatcher_started: bool,
}

struct SavedDisposition {
    signal: Signal,
    prior: Prior,
}

#[derive(Clone)]
enum Prior {
    /// The replaced disposition was one of our own callbacks.
    Bridge(Arc<SignalCallback>),
    /// The replaced disposition was whatever the OS had installed.
    Native(SigAction),
}

/// Write end of the self-pipe, read by `trampoline` in handler context.
static PIPE_WRITE_FD: AtomicI32 = AtomicI32::new(-1);

extern "C" fn trampoline(signo: libc::c_int) {
    // Only async-signal-safe work here.
    let fd = PIPE_WRITE_FD.load(Ordering::Relaxed);
    if fd >= 0 {
        let byte = signo as u8;
        unsafe {
            libc::write(fd, &byte as *const u8 as *const libc::c_void, 1);
        }
    }
}

fn trampoline_action() -> SigAction {
    SigAction::new(
        SigHandler::Handler(trampoline),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    )
}

fn install(signal: Signal, action: &SigAction) -> Result<SigAction, TermError> {
    unsafe { nix_signal::sigaction(signal.to_nix(), action) }
        .map_err(|e| TermError::Signal(format!("sigaction for {signal} failed: {e}")))
}

fn ensure_dispatcher(inner: &mut BridgeInner) -> Result<(), TermError> {
    if inner.dispatcher_started {
        return Ok(());
    }
    let (read_end, write_end) = nix::unistd::pipe()
        .map_err(|e| TermError::Signal(format!("signal pipe creation failed: {e}")))?;
    let write_fd = write_end.into_raw_fd();
    unsafe {
        libc::fcntl(write_fd, libc::F_SETFL, libc::O_NONBLOCK);
    }
    // The write end lives for the rest of the process.
    PIPE_WRITE_FD.store(write_fd, Ordering::Relaxed);
    let pipe = std::fs::File::from(read_end);
    thread::Builder::new()
        .name("keyline-signal-dispatch".into())
        .spawn(move || dispatch_loop(pipe))
        .map_err(TermError::Io)?;
    inner.dispatcher_started = true;
    Ok(())
}

fn dispatch_loop(mut pipe: std::fs::File) {
    let mut byte = [0u8; 1];
    loop {
        match pipe.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => {
                let signo = i32::from(byte[0]);
                let callback = native_instance()
                    .inner
                    .lock()
                    .unwrap()
                    .slots
                    .get(&signo)
                    .cloned();
                if let (Some(callback), Some(signal)) = (callback, Signal::from_number(signo)) {
                    callback(signal);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(error = %e, "signal dispatch pipe failed");
                break;
            }
        }
    }
}

impl SignalBridge for NativeSignalBridge {
    fn register_default(&self, signal: Signal) -> Result<(), TermError> {
        let mut inner = self.inner.lock().unwrap();
        let action = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
        install(signal, &action)?;
        inner.slots.remove(&(signal.to_nix() as i32));
        Ok(())
    }

    fn register_ignore(&self, signal: Signal) -> Result<(), TermError> {
        let mut inner = self.inner.lock().unwrap();
        let action = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
        install(signal, &action)?;
        inner.slots.remove(&(signal.to_nix() as i32));
        Ok(())
    }

    fn register(
        &self,
        signal: Signal,
        callback: Arc<SignalCallback>,
    ) -> Result<SignalToken, TermError> {
        let mut inner = self.inner.lock().unwrap();
        ensure_dispatcher(&mut inner)?;
        let old = install(signal, &trampoline_action())?;
        let signo = signal.to_nix() as i32;
        let prior = match inner.slots.get(&signo) {
            Some(previous) => Prior::Bridge(previous.clone()),
            None => Prior::Native(old),
        };
        inner.slots.insert(signo, callback);
        let id = inner.next_id;
        inner.next_id += 1;
        inner.saved.insert(id, SavedDisposition { signal, prior });
        Ok(SignalToken::new(signal, id))
    }

    fn unregister(&self, token: SignalToken) -> Result<(), TermError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(saved) = inner.saved.remove(&token.id) else {
            return Ok(());
        };
        let signo = saved.signal.to_nix() as i32;
        match saved.prior {
            Prior::Bridge(callback) => {
                install(saved.signal, &trampoline_action())?;
                inner.slots.insert(signo, callback);
            }
            Prior::Native(action) => {
                install(saved.signal, &action)?;
                inner.slots.remove(&signo);
            }
        }
        Ok(())
    }

    fn invoke_handler(&self, token: &SignalToken) -> Result<(), TermError> {
        let prior = {
            let inner = self.inner.lock().unwrap();
            match inner.saved.get(&token.id) {
                Some(saved) => saved.prior.clone(),
                None => {
                    return Err(TermError::Signal(format!(
                        "no saved disposition for {}",
                        token.signal
                    )))
                }
            }
        };
        match prior {
            Prior::Bridge(callback) => {
                callback(token.signal);
                Ok(())
            }
            Prior::Native(action) => {
                // Reinstate the saved disposition, deliver synchronously,
                // then put the trampoline back. Terminating or stopping
                // dispositions take effect inside `raise`.
                install(token.signal, &action)?;
                let raised = nix_signal::raise(token.signal.to_nix());
                install(token.signal, &trampoline_action())?;
                raised.map_err(|e| {
                    TermError::Signal(format!("raise {} failed: {e}", token.signal))
                })
            }
        }
    }
}
