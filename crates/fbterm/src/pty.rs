//! Pseudoterminal plumbing for `exec` (spec.md §4.6.1, §6 "Pseudoterminal",
//! "Virtual-terminal coordination"). `nix` for the POSIX-standard half of
//! this (`posix_openpt`/`grantpt`/`unlockpt`/`fork`/`setsid`/`execvp`),
//! raw `libc::ioctl` for the two Linux tty-specific requests `nix` does
//! not bind a safe wrapper for (`TIOCSCTTY`, `TIOCSWINSZ`).

use derive_more::{Display, Error};
use nix::fcntl::{self, FcntlArg, OFlag};
use nix::pty::{grantpt, posix_openpt, ptsname_r, unlockpt, PtyMaster};
use nix::sys::stat::Mode;
use nix::unistd::{self, ForkResult, Pid};
use std::ffi::CString;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

#[derive(Debug, Display, Error)]
pub enum PtyError {
    #[display("failed to allocate pty: {_0}")]
    Alloc(nix::Error),
    #[display("fork failed: {_0}")]
    Fork(nix::Error),
    #[display("failed to exec child program: {_0}")]
    Exec(nix::Error),
}

impl From<nix::Error> for PtyError {
    fn from(e: nix::Error) -> Self {
        PtyError::Alloc(e)
    }
}

pub struct ExecOutcome {
    pub master: OwnedFd,
    pub child: Pid,
}

/// Open a pty pair, fork, and exec `argv` in the child with the slave as
/// its controlling tty. The parent gets the master fd back, already
/// `O_NONBLOCK` and `FD_CLOEXEC`.
pub fn exec(
    argv: &[String],
    term_name: &str,
    fbdev_env: &str,
    term_pgid_env: bool,
    ws_row: u16,
    ws_col: u16,
) -> Result<ExecOutcome, PtyError> {
    let master: PtyMaster = posix_openpt(OFlag::O_RDWR).map_err(PtyError::Alloc)?;
    grantpt(&master).map_err(PtyError::Alloc)?;
    unlockpt(&master).map_err(PtyError::Alloc)?;
    let slave_name = ptsname_r(&master).map_err(PtyError::Alloc)?;

    // SAFETY: the child side only calls async-signal-safe functions
    // (setsid, open, ioctl, dup2, close, execvp) before exec or _exit.
    match unsafe { unistd::fork() }.map_err(PtyError::Fork)? {
        ForkResult::Child => {
            exec_child(&slave_name, argv, term_name, fbdev_env, term_pgid_env, ws_row, ws_col);
            // exec_child only returns on failure.
            std::process::exit(127);
        }
        ForkResult::Parent { child } => {
            let master_fd: OwnedFd = master.into();
            fcntl::fcntl(master_fd.as_raw_fd(), FcntlArg::F_SETFD(fcntl::FdFlag::FD_CLOEXEC))
                .map_err(PtyError::Alloc)?;
            fcntl::fcntl(master_fd.as_raw_fd(), FcntlArg::F_SETFL(OFlag::O_NONBLOCK)).map_err(PtyError::Alloc)?;
            Ok(ExecOutcome { master: master_fd, child })
        }
    }
}

fn exec_child(
    slave_name: &str,
    argv: &[String],
    term_name: &str,
    fbdev_env: &str,
    term_pgid_env: bool,
    ws_row: u16,
    ws_col: u16,
) {
    let _ = unistd::setsid();

    let slave_fd = match fcntl::open(slave_name, OFlag::O_RDWR, Mode::empty()) {
        Ok(fd) => fd,
        Err(_) => return,
    };

    unsafe {
        libc::ioctl(slave_fd, libc::TIOCSCTTY as _, 0);
        let ws = libc::winsize { ws_row, ws_col, ws_xpixel: 0, ws_ypixel: 0 };
        libc::ioctl(slave_fd, libc::TIOCSWINSZ as _, &ws);
    }

    for stdfd in [0, 1, 2] {
        let _ = unistd::dup2(slave_fd, stdfd);
    }
    if slave_fd > 2 {
        let _ = unistd::close(slave_fd);
    }

    // SAFETY: single-threaded child right after fork, before exec.
    unsafe {
        std::env::set_var("TERM", term_name);
        std::env::set_var("FBDEV", fbdev_env);
        if term_pgid_env {
            std::env::set_var("TERM_PGID", unistd::getpid().to_string());
        }
    }

    let Some((prog, rest)) = argv.split_first() else { return };
    let Ok(prog_c) = CString::new(prog.as_str()) else { return };
    let mut c_argv = vec![prog_c.clone()];
    for a in rest {
        if let Ok(c) = CString::new(a.as_str()) {
            c_argv.push(c);
        }
    }
    let _ = unistd::execvp(&prog_c, &c_argv);
}

/// Issue `TIOCSWINSZ` after a resize so the child receives `SIGWINCH`
/// (spec.md §4.6.5 step 4).
pub fn set_winsize(fd: RawFd, ws_row: u16, ws_col: u16) {
    unsafe {
        let ws = libc::winsize { ws_row, ws_col, ws_xpixel: 0, ws_ypixel: 0 };
        libc::ioctl(fd, libc::TIOCSWINSZ as _, &ws);
    }
}
