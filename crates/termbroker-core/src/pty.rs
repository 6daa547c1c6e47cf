//! Thin wrapper over an OS pseudo-terminal pair.
//!
//! A `PtyDevice` owns the master side of a pty and the pid of the child
//! shell attached to its slave side. It does not know about sessions,
//! history, or clients — it only forks, reads, writes, resizes, and kills.

use std::ffi::CString;
use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nix::libc;
use nix::pty::{openpty, Winsize};
use nix::sys::signal::{kill, Signal};
use nix::sys::termios::{self, LocalFlags, SetArg};
use nix::unistd::{execvp, fork, ForkResult, Pid};

use crate::error::{CoreError, CoreResult};

const READ_CHUNK: usize = 10 * 1024;

nix::ioctl_write_ptr_bad!(set_winsize_ioctl, libc::TIOCSWINSZ, libc::winsize);

/// A forked child shell and the master fd that drives it.
///
/// Cheaply cloneable: the master fd and child pid are shared through `Arc`
/// so the Session can hold one handle for writes/resizes/close while the
/// Background Reader holds another for reads, without a lock on the fd
/// itself (the kernel already serializes concurrent read/write on one fd).
#[derive(Clone)]
pub struct PtyDevice {
    master: Arc<OwnedFd>,
    child_pid: Pid,
    /// Bytes held back from the previous read because they were the start
    /// of a UTF-8 sequence that hadn't finished arriving yet.
    pending: Arc<Mutex<Vec<u8>>>,
}

impl PtyDevice {
    /// Forks a child running the login shell and returns the parent-side handle.
    pub fn start(rows: u16, cols: u16, cwd: Option<&str>) -> CoreResult<Self> {
        let winsize = Winsize {
            ws_row: rows,
            ws_col: cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };

        let pty = openpty(&winsize, None).map_err(|e| CoreError::Pty(format!("openpty: {e}")))?;
        let master = pty.master;
        let slave = pty.slave;

        let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string());
        let cwd_owned = cwd.map(|s| s.to_string());

        // SAFETY: the child only calls async-signal-safe primitives
        // (nix syscalls, execvp) between fork and exec.
        match unsafe { fork() }.map_err(|e| CoreError::Pty(format!("fork: {e}")))? {
            ForkResult::Parent { child } => {
                drop(slave);
                set_nonblocking(master.as_raw_fd())
                    .map_err(|e| CoreError::Pty(format!("set nonblocking: {e}")))?;
                configure_termios(master.as_raw_fd())
                    .map_err(|e| CoreError::Pty(format!("tcsetattr: {e}")))?;

                Ok(PtyDevice {
                    master: Arc::new(master),
                    child_pid: child,
                    pending: Arc::new(Mutex::new(Vec::new())),
                })
            }
            ForkResult::Child => {
                drop(master);
                child_exec(slave, cwd_owned.as_deref(), &shell);
                // child_exec only returns on failure to exec; bail out hard
                // rather than unwind back into the parent's Tokio runtime.
                std::process::exit(127);
            }
        }
    }

    /// Single non-retried write; failures on an unwritable fd are swallowed.
    pub fn write(&self, bytes: &[u8]) {
        let fd = self.master.as_raw_fd();
        let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
        let _ = nix::unistd::write(borrowed, bytes);
    }

    /// Waits up to `timeout` for readable data, reads at most 10 KiB, and
    /// lossily decodes it as UTF-8, carrying any trailing partial sequence
    /// into the next call.
    pub fn read(&self, timeout: Duration) -> String {
        let fd = self.master.as_raw_fd();
        let mut poll_fd = [nix::poll::PollFd::new(
            unsafe { BorrowedFd::borrow_raw(fd) },
            nix::poll::PollFlags::POLLIN,
        )];
        let millis: i32 = timeout.as_millis().try_into().unwrap_or(i32::MAX);
        match nix::poll::poll(&mut poll_fd, millis) {
            Ok(n) if n > 0 => {}
            _ => return String::new(),
        }

        let mut buf = [0u8; READ_CHUNK];
        let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
        let n = match nix::unistd::read(borrowed, &mut buf) {
            Ok(0) => return String::new(),
            Ok(n) => n,
            Err(nix::errno::Errno::EAGAIN) => return String::new(),
            Err(_) => return String::new(),
        };

        let mut pending = self.pending.lock().unwrap();
        pending.extend_from_slice(&buf[..n]);
        let (decoded, rest) = decode_lossy_with_carry(&pending);
        *pending = rest;
        decoded
    }

    /// Issues the OS set-window-size ioctl then delivers `SIGWINCH`.
    pub fn set_winsize(&self, rows: u16, cols: u16) {
        let winsize = libc::winsize {
            ws_row: rows,
            ws_col: cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        unsafe {
            let _ = set_winsize_ioctl(self.master.as_raw_fd(), &winsize);
        }
        let _ = kill(self.child_pid, Signal::SIGWINCH);
    }

    /// Closes the master fd and kills the child. Best-effort: errors are ignored.
    pub fn close(&self) {
        let _ = kill(self.child_pid, Signal::SIGKILL);
        // The fd itself is closed when the last Arc<OwnedFd> handle drops.
    }

    /// True iff sending signal 0 to the child pid succeeds.
    pub fn is_alive(&self) -> bool {
        kill(self.child_pid, None).is_ok()
    }

    pub fn child_pid(&self) -> i32 {
        self.child_pid.as_raw()
    }
}

fn set_nonblocking(fd: RawFd) -> nix::Result<()> {
    use nix::fcntl::{fcntl, FcntlArg, OFlag};
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    let flags = fcntl(borrowed, FcntlArg::F_GETFL)?;
    let mut flags = OFlag::from_bits_truncate(flags);
    flags.insert(OFlag::O_NONBLOCK);
    fcntl(borrowed, FcntlArg::F_SETFL(flags))?;
    Ok(())
}

/// Canonical-mode-with-echo line discipline so interactive shells behave.
fn configure_termios(fd: RawFd) -> nix::Result<()> {
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    let mut term = termios::tcgetattr(borrowed)?;

    term.input_flags |= termios::InputFlags::ICRNL | termios::InputFlags::IXON;
    term.output_flags |= termios::OutputFlags::OPOST | termios::OutputFlags::ONLCR;
    term.control_flags |= termios::ControlFlags::CS8 | termios::ControlFlags::CREAD;
    term.local_flags |= LocalFlags::ISIG
        | LocalFlags::ICANON
        | LocalFlags::ECHO
        | LocalFlags::ECHOE
        | LocalFlags::ECHOK
        | LocalFlags::ECHOCTL
        | LocalFlags::ECHOKE
        | LocalFlags::IEXTEN;

    termios::tcsetattr(borrowed, SetArg::TCSANOW, &term)
}

fn child_exec(slave: OwnedFd, cwd: Option<&str>, shell: &str) {
    use nix::unistd::login_tty;

    if login_tty(slave).is_err() {
        std::process::exit(127);
    }

    if let Some(dir) = cwd {
        let _ = std::env::set_current_dir(Path::new(dir));
    }

    std::env::set_var("TERM", "xterm-256color");
    std::env::set_var("COLORTERM", "truecolor");
    std::env::set_var("LANG", "en_US.UTF-8");
    std::env::set_var("LC_ALL", "en_US.UTF-8");

    let Ok(path) = CString::new(shell) else {
        std::process::exit(127);
    };
    let arg0 = CString::new("-").unwrap_or_else(|_| CString::new(shell).unwrap());
    let _ = execvp(&path, &[arg0]);
    // execvp only returns on error.
}

/// Decodes as much of `buf` as forms valid UTF-8, returning the decoded
/// prefix and any trailing incomplete sequence to carry into the next read.
fn decode_lossy_with_carry(buf: &[u8]) -> (String, Vec<u8>) {
    match std::str::from_utf8(buf) {
        Ok(s) => (s.to_string(), Vec::new()),
        Err(e) => {
            let valid_up_to = e.valid_up_to();
            let (valid, rest) = buf.split_at(valid_up_to);
            let decoded = String::from_utf8_lossy(valid).into_owned();
            match e.error_len() {
                // A genuinely invalid byte (not a truncated sequence): emit
                // replacement characters for it and carry only what's left.
                Some(bad_len) => {
                    let mut owned = decoded;
                    owned.push('\u{FFFD}');
                    let (_, remainder) = rest.split_at(bad_len.min(rest.len()));
                    let (more, carry) = decode_lossy_with_carry(remainder);
                    owned.push_str(&more);
                    (owned, carry)
                }
                // Truncated at the end of the buffer: carry it whole, it may
                // complete on the next read.
                None => (decoded, rest.to_vec()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_carries_truncated_multibyte_sequence() {
        let full = "héllo".as_bytes();
        let split_at = full.len() - 1; // split inside the 2-byte 'é'
        let (decoded, carry) = decode_lossy_with_carry(&full[..split_at]);
        assert_eq!(decoded, "h");
        assert!(!carry.is_empty());

        let mut rejoined = carry;
        rejoined.extend_from_slice(&full[split_at..]);
        let (decoded2, carry2) = decode_lossy_with_carry(&rejoined);
        assert_eq!(decoded2, "éllo");
        assert!(carry2.is_empty());
    }

    #[test]
    fn decode_pure_ascii_has_no_carry() {
        let (decoded, carry) = decode_lossy_with_carry(b"hello\n");
        assert_eq!(decoded, "hello\n");
        assert!(carry.is_empty());
    }
}
