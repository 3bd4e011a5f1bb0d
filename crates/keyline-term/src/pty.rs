//! Pseudo-terminal contract and the `openpty(3)`-backed implementation.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, OwnedFd};

use nix::pty::{openpty, Winsize};
use nix::sys::termios::{self, SetArg, Termios};

use crate::TermError;

/// Terminal window dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WinSize {
    pub rows: u16,
    pub cols: u16,
}

/// What the terminal needs from a pseudo-terminal pair.
///
/// The terminal owns the pty for its whole lifetime and releases it on
/// close. Stream handles are independently owned; attribute and
/// window-size access goes through the slave side.
pub trait Pty: Send {
    /// Byte stream read from the slave side.
    fn slave_input(&self) -> Result<Box<dyn Read + Send>, TermError>;

    /// Byte stream written to the slave side.
    fn slave_output(&self) -> Result<Box<dyn Write + Send>, TermError>;

    fn attributes(&self) -> Result<Termios, TermError>;

    fn set_attributes(&self, attributes: &Termios) -> Result<(), TermError>;

    fn size(&self) -> Result<WinSize, TermError>;

    fn set_size(&self, size: WinSize) -> Result<(), TermError>;
}

/// A pty pair allocated through `openpty(3)`.
pub struct SystemPty {
    master: OwnedFd,
    slave: OwnedFd,
}

impl SystemPty {
    pub fn open() -> Result<Self, TermError> {
        let winsize = Winsize {
            ws_row: 24,
            ws_col: 80,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        let pair = openpty(Some(&winsize), None)
            .map_err(|e| TermError::Io(io::Error::from(e)))?;
        Ok(Self {
            master: pair.master,
            slave: pair.slave,
        })
    }

    /// Writer onto the master side; bytes written here show up as input
    /// on the slave streams.
    pub fn master_writer(&self) -> Result<File, TermError> {
        Ok(File::from(self.master.try_clone()?))
    }

    /// Reader off the master side; picks up what the slave output wrote.
    pub fn master_reader(&self) -> Result<File, TermError> {
        Ok(File::from(self.master.try_clone()?))
    }
}

impl Pty for SystemPty {
    fn slave_input(&self) -> Result<Box<dyn Read + Send>, TermError> {
        Ok(Box::new(File::from(self.slave.try_clone()?)))
    }

    fn slave_output(&self) -> Result<Box<dyn Write + Send>, TermError> {
        Ok(Box::new(File::from(self.slave.try_clone()?)))
    }

    fn attributes(&self) -> Result<Termios, TermError> {
        termios::tcgetattr(self.slave.as_fd()).map_err(|e| TermError::Io(io::Error::from(e)))
    }

    fn set_attributes(&self, attributes: &Termios) -> Result<(), TermError> {
        termios::tcsetattr(self.slave.as_fd(), SetArg::TCSANOW, attributes)
            .map_err(|e| TermError::Io(io::Error::from(e)))
    }

    fn size(&self) -> Result<WinSize, TermError> {
        let mut winsize = Winsize {
            ws_row: 0,
            ws_col: 0,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        let rc = unsafe { libc::ioctl(self.slave.as_raw_fd(), libc::TIOCGWINSZ, &mut winsize) };
        if rc < 0 {
            return Err(TermError::Io(io::Error::last_os_error()));
        }
        Ok(WinSize {
            rows: winsize.ws_row,
            cols: winsize.ws_col,
        })
    }

    fn set_size(&self, size: WinSize) -> Result<(), TermError> {
        let winsize = Winsize {
            ws_row: size.rows,
            ws_col: size.cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        let rc = unsafe {
            libc::ioctl(
                self.slave.as_raw_fd(),
                libc::TIOCSWINSZ,
                &winsize as *const _,
            )
        };
        if rc < 0 {
            return Err(TermError::Io(io::Error::last_os_error()));
        }
        Ok(())
    }
}
