//! Self-pipe-style signal delivery (spec.md §9 Design Notes: "replace
//! signal-handler-mutates-state with a wakeup abstraction ... handlers
//! only wake the poll loop; transitions happen in the loop body").
//!
//! `SIGUSR1`/`SIGUSR2`/`SIGCHLD` handlers are necessarily process-global
//! (the kernel has no concept of "this handler belongs to that
//! `Multiplexer`"), so the pending flags are static atomics; exactly one
//! `Multiplexer` drains them per process, same as the original's one
//! `static` per signal.

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};

static VT_RELEASE_PENDING: AtomicBool = AtomicBool::new(false);
static VT_ACQUIRE_PENDING: AtomicBool = AtomicBool::new(false);
static REAP_PENDING: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(sig: libc::c_int) {
    match sig {
        libc::SIGUSR1 => VT_RELEASE_PENDING.store(true, Ordering::SeqCst),
        libc::SIGUSR2 => VT_ACQUIRE_PENDING.store(true, Ordering::SeqCst),
        libc::SIGCHLD => REAP_PENDING.store(true, Ordering::SeqCst),
        _ => {}
    }
}

/// Register handlers for the three signals the scheduler cares about and
/// ignore `SIGPIPE` (spec.md "terminal sends are best-effort").
pub fn install() -> nix::Result<()> {
    let action = SigAction::new(SigHandler::Handler(on_signal), SaFlags::empty(), SigSet::empty());
    // SAFETY: `on_signal` only stores to `AtomicBool`s, which is
    // async-signal-safe.
    unsafe {
        sigaction(Signal::SIGUSR1, &action)?;
        sigaction(Signal::SIGUSR2, &action)?;
        sigaction(Signal::SIGCHLD, &action)?;
        sigaction(Signal::SIGPIPE, &SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty()))?;
    }
    Ok(())
}

/// Snapshot and clear the three pending flags in one pass, so the main
/// loop handles at most one of each per iteration.
#[must_use]
pub fn take_pending() -> Pending {
    Pending {
        vt_release: VT_RELEASE_PENDING.swap(false, Ordering::SeqCst),
        vt_acquire: VT_ACQUIRE_PENDING.swap(false, Ordering::SeqCst),
        reap: REAP_PENDING.swap(false, Ordering::SeqCst),
    }
}

pub struct Pending {
    pub vt_release: bool,
    pub vt_acquire: bool,
    pub reap: bool,
}

/// Linux `vt_mode` layout (`linux/vt.h`); not bound by the `libc` crate.
#[repr(C)]
struct VtMode {
    mode: i8,
    waitv: i8,
    relsig: i16,
    acqsig: i16,
    frsig: i16,
}

const VT_PROCESS: i8 = 1;
const VT_SETMODE: libc::c_ulong = 0x5602;
const VT_RELDISP: libc::c_ulong = 0x5605;

/// Tell the kernel to route vt release/acquire as `SIGUSR1`/`SIGUSR2`
/// instead of switching synchronously (spec.md §6 "`VT_SETMODE`").
pub fn setup_vt_switching(console_fd: RawFd) {
    let vtm = VtMode { mode: VT_PROCESS, waitv: 0, relsig: libc::SIGUSR1 as i16, acqsig: libc::SIGUSR2 as i16, frsig: 0 };
    unsafe {
        libc::ioctl(console_fd, VT_SETMODE, &vtm);
    }
}

/// Acknowledge a vt-release to the kernel (spec.md §6 "`VT_RELDISP`").
pub fn acknowledge_vt_release(console_fd: RawFd) {
    unsafe {
        libc::ioctl(console_fd, VT_RELDISP, 1i32);
    }
}
