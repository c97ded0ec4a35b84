//! C7: the multiplexer/scheduler.
//!
//! Owns the `2 x NTAGS` terminal slots, the shared [`Pad`], the
//! snapshot store and the configuration, and runs the single poll loop
//! that drives all of it (spec.md §4.7). Grounded throughout on
//! `original_source/fbpad.c`'s `cterm`/`switchterm`/`showterm`/
//! `directkey`/`pollterms`/`mainloop`/`signalreceived` — see each
//! method's doc comment for the specific C function it replaces.
//!
//! Split layouts (`SplitMode::Horizontal`/`Vertical`) have no
//! counterpart in that source file at all: it only ever shows one
//! terminal per tag. They're a spec-mandated addition built on top of
//! the same single shared `Pad` the original reconfigures per switch,
//! just reconfigured to a sub-rect of the surface instead of the whole
//! thing.

pub mod addressing;
pub mod keys;
pub mod layout;
pub mod signals;

use derive_more::{Display, Error};
use fbcell::{Color, Style};
use fbconf::{Config, ConfigError};
use fbpad::Pad;
use fbsnap::SnapStore;
use fbsurface::FbSurface;
use fbterm::{Painter, Terminal};
use keys::Command;
use layout::SplitMode;
use nix::poll::{PollFd, PollFlags, PollTimeout};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use std::cell::RefCell;
use std::os::fd::{BorrowedFd, RawFd};
use std::rc::Rc;

const ESC: u8 = 0x1b;
const PASSWORD_MAX: usize = 1024;

#[derive(Debug, Display, Error)]
pub enum MuxError {
    #[display("poll failed: {_0}")]
    Poll(nix::Error),
}

pub struct Multiplexer {
    config: Box<dyn Config>,
    surface: Rc<RefCell<FbSurface>>,
    pad: Rc<RefCell<Pad>>,
    snaps: SnapStore,
    terms: Vec<Terminal>,
    /// Which group (0/1) is primary, per tag.
    tops: Vec<usize>,
    splits: Vec<SplitMode>,
    ntags: usize,
    ctag: usize,
    ltag: usize,
    hidden: bool,
    locked: bool,
    taglock: bool,
    confirm_quit: bool,
    cmdmode: bool,
    exitit: bool,
    passbuf: String,
    fbdev_spec: String,
    #[allow(clippy::type_complexity)]
    reload: Option<Box<dyn FnMut() -> Result<Box<dyn Config>, ConfigError>>>,
}

impl Multiplexer {
    /// Allocate `2 x NTAGS` empty terminals bound to `pad` and start on
    /// tag 0, group 0.
    #[must_use]
    pub fn new(config: Box<dyn Config>, surface: Rc<RefCell<FbSurface>>, pad: Rc<RefCell<Pad>>, fbdev_spec: impl Into<String>) -> Multiplexer {
        let ntags = config.tags().chars().count();
        let painter: Rc<RefCell<dyn Painter>> = pad.clone();
        let cursor_colors = cursor_colors_from(config.as_ref());
        let terms = (0..ntags * 2)
            .map(|_| {
                let mut term = Terminal::new(painter.clone(), config.term_name());
                term.set_cursor_colors(cursor_colors);
                term
            })
            .collect();
        Multiplexer {
            snaps: SnapStore::new(surface.clone()),
            config,
            surface,
            pad,
            terms,
            tops: vec![0; ntags],
            splits: vec![SplitMode::Single; ntags],
            ntags,
            ctag: 0,
            ltag: 0,
            hidden: false,
            locked: false,
            taglock: false,
            confirm_quit: false,
            cmdmode: false,
            exitit: false,
            passbuf: String::new(),
            fbdev_spec: fbdev_spec.into(),
            reload: None,
        }
    }

    /// Install a closure the `Ctrl-E` command runs to rebuild the
    /// config (spec.md §4.7.2 "reload config"). The multiplexer has no
    /// opinion on where a `Config` comes from, so the caller supplies
    /// however it re-reads its own source (a path, an env var, ...).
    #[allow(clippy::type_complexity)]
    pub fn set_reload_hook(&mut self, hook: Box<dyn FnMut() -> Result<Box<dyn Config>, ConfigError>>) {
        self.reload = Some(hook);
    }

    #[must_use]
    pub fn should_exit(&self) -> bool {
        self.exitit
    }

    /// The slot currently receiving keyboard input and occupying the
    /// primary pad region (`cterm()` in the original).
    #[must_use]
    pub fn cterm(&self) -> usize {
        addressing::slot_of(self.ctag, self.tops[self.ctag], self.ntags)
    }

    fn main_term(&self) -> Option<usize> {
        let c = self.cterm();
        self.terms[c].is_running().then_some(c)
    }

    fn next_term(&self) -> usize {
        let cur = self.cterm();
        addressing::next_open(cur, self.terms.len(), |i| self.terms[i].is_running())
    }

    fn tag_is_saved(&self, tag_idx: usize) -> bool {
        tag_is_saved(self.config.tags(), self.config.saved_tags(), tag_idx)
    }

    fn is_saved_tag(&self, slot: usize) -> bool {
        self.tag_is_saved(addressing::tag_of(slot, self.ntags))
    }

    /// Equivalent of the original's `term_load`/`term_redraw` pair at
    /// the top of `mainloop`, plus the one-shot "run this command and
    /// exit when it ends" mode `main()` enters when invoked with
    /// trailing arguments.
    pub fn startup(&mut self, startup_argv: Option<Vec<String>>) {
        let cur = self.cterm();
        self.terms[cur].load(true);
        self.reconfigure_pad_for(cur);
        self.terms[cur].redraw(true);
        if let Some(argv) = startup_argv {
            self.cmdmode = true;
            self.exec_slot_if_empty(cur, &argv, false);
        }
    }

    /// One pass of `pollterms()`: block on stdin plus every open pty up
    /// to 1000ms, dispatch whichever woke up. Returns `Ok(true)` only
    /// when stdin itself is broken (hup/err/nval), mirroring the
    /// original's "give up entirely" signal distinct from `exitit`.
    pub fn poll_once(&mut self, stdin_fd: RawFd) -> Result<bool, MuxError> {
        // SAFETY: `stdin_fd` and every terminal fd outlive this call;
        // `PollFd` only borrows them for the duration of `poll`.
        let stdin_borrowed: BorrowedFd = unsafe { BorrowedFd::borrow_raw(stdin_fd) };
        let mut fds = vec![PollFd::new(stdin_borrowed, PollFlags::POLLIN)];
        let mut slot_for_fd = Vec::new();
        for (i, term) in self.terms.iter().enumerate() {
            if term.is_running() {
                let borrowed: BorrowedFd = unsafe { BorrowedFd::borrow_raw(term.fd()) };
                fds.push(PollFd::new(borrowed, PollFlags::POLLIN));
                slot_for_fd.push(i);
            }
        }

        let n = nix::poll::poll(&mut fds, PollTimeout::from(1000u16)).map_err(MuxError::Poll)?;
        if n < 1 {
            return Ok(false);
        }

        let stdin_events = fds[0].revents().unwrap_or(PollFlags::empty());
        if stdin_events.intersects(PollFlags::POLLHUP | PollFlags::POLLERR | PollFlags::POLLNVAL) {
            return Ok(true);
        }
        if stdin_events.contains(PollFlags::POLLIN) {
            self.on_stdin_readable(stdin_fd);
        }

        for (fd_idx, &slot) in slot_for_fd.iter().enumerate() {
            let events = fds[fd_idx + 1].revents().unwrap_or(PollFlags::empty());
            if events.is_empty() {
                continue;
            }
            self.peep_in(slot);
            if events.contains(PollFlags::POLLIN) {
                self.terms[slot].read();
            } else {
                self.snaps.free(slot);
                self.terms[slot].end();
                if self.cmdmode {
                    self.exitit = true;
                }
            }
            self.peep_out(slot);
        }
        Ok(false)
    }

    /// Drain the self-pipe-style signal flags once per loop iteration
    /// (spec.md §9 Design Notes; `signalreceived`'s three cases).
    pub fn service_signals(&mut self, console_fd: RawFd) {
        let pending = signals::take_pending();
        if pending.vt_release {
            self.on_vt_release(console_fd);
        }
        if pending.vt_acquire {
            self.on_vt_acquire();
        }
        if pending.reap {
            self.reap_children();
        }
    }

    /// `SIGUSR1`: another vt wants the console. Snapshot without
    /// showing anything, then ack the kernel's release request.
    fn on_vt_release(&mut self, console_fd: RawFd) {
        self.hidden = true;
        let cur = self.cterm();
        self.switch_term(cur, cur, false, true, false);
        signals::acknowledge_vt_release(console_fd);
    }

    /// `SIGUSR2`: we own the console again. Reassert the colormap and
    /// restore (or fully redraw) the current terminal.
    fn on_vt_acquire(&mut self) {
        self.hidden = false;
        if let Err(e) = self.surface.borrow_mut().enter() {
            tracing::warn!(%e, "failed to reassert framebuffer mode on vt acquire");
        }
        let cur = self.cterm();
        self.switch_term(cur, cur, true, false, true);
    }

    /// `SIGCHLD`: reap every exited child non-blockingly. Does not
    /// touch `terms[]` itself — a child's pty going away is detected by
    /// `POLLHUP` on its fd in [`Self::poll_once`], same as the original.
    fn reap_children(&mut self) {
        loop {
            match waitpid(Some(Pid::from_raw(-1)), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) | Err(nix::Error::ECHILD) | Err(_) => break,
                Ok(_) => {}
            }
        }
    }

    /// One raw byte off stdin, exactly the logic `directkey()` performs
    /// per invocation: password/confirm-quit interception first, then
    /// `ESC` + command byte, else forward verbatim.
    fn on_stdin_readable(&mut self, stdin_fd: RawFd) {
        let Some(c) = read_one_byte(stdin_fd) else { return };

        if self.config.password().is_some() && self.locked {
            self.handle_password_byte(c);
            return;
        }
        if self.confirm_quit {
            self.confirm_quit = false;
            if c == self.config.quit_confirm_key() {
                self.exitit = true;
            }
            return;
        }
        if c == ESC {
            let next = read_one_byte(stdin_fd);
            self.handle_escape(next);
            return;
        }
        self.forward_to_current(c);
    }

    fn handle_password_byte(&mut self, byte: u8) {
        const CR: u8 = b'\r';
        if byte == CR {
            if password_matches(self.config.password(), &self.passbuf) {
                self.locked = false;
            }
            self.passbuf.clear();
            return;
        }
        if (byte.is_ascii_graphic() || byte == b' ') && self.passbuf.len() < PASSWORD_MAX {
            self.passbuf.push(byte as char);
        }
    }

    fn handle_escape(&mut self, byte: Option<u8>) {
        let Some(c) = byte else {
            self.forward_to_current(ESC);
            return;
        };
        match keys::classify(c, self.config.tags()) {
            Command::Spawn(key) => self.spawn_command(key),
            Command::FlipWithinTag => {
                let partner = addressing::other_in_tag(self.cterm(), self.ntags);
                self.show(partner);
            }
            Command::ShowLastTag => self.show_tag(self.ltag),
            Command::ListTags => self.list_tags(),
            Command::NextOpen => {
                let n = self.next_term();
                if n != self.cterm() {
                    self.show(n);
                }
            }
            Command::Quit => self.confirm_quit = true,
            Command::Screenshot => self.screenshot_current(),
            Command::ForceRedraw => self.redraw_current(true),
            Command::ReloadConfig => self.reload_config(),
            Command::Lock => {
                self.locked = true;
                self.passbuf.clear();
            }
            Command::ToggleTagLock => self.taglock = !self.taglock,
            Command::ScrollBackHalfPage => self.scroll_current(self.half_page()),
            Command::ScrollForwardHalfPage => self.scroll_current(-self.half_page()),
            Command::CycleSplitForward => self.cycle_split(true),
            Command::CycleSplitBackward => self.cycle_split(false),
            Command::ToggleFontSet => self.toggle_font_set(),
            Command::ShowTag(t) => {
                if let Some(idx) = self.config.tags().as_bytes().iter().position(|&b| b == t) {
                    self.show_tag(idx);
                }
            }
            Command::ForwardEscape => {
                self.forward_to_current(ESC);
                self.forward_to_current(c);
            }
        }
    }

    fn half_page(&self) -> isize {
        (self.pad.borrow().character_rows() / 2) as isize
    }

    fn forward_to_current(&mut self, byte: u8) {
        let cur = self.cterm();
        if self.terms[cur].is_running() {
            self.terms[cur].send(&[byte]);
        }
    }

    /// Permanent switch to slot `n` (spec.md §4.7.3 `show`,
    /// `showterm()`). Refuses across tags while `taglock` is set and is
    /// a no-op for the already-current slot or in `cmdmode`.
    pub fn show(&mut self, n: usize) {
        if self.cterm() == n || self.cmdmode {
            return;
        }
        let target_tag = addressing::tag_of(n, self.ntags);
        if self.taglock && self.ctag != target_tag {
            return;
        }
        if self.ctag != target_tag {
            self.ltag = self.ctag;
        }
        let cur = self.cterm();
        self.switch_term(cur, n, !self.hidden, !self.hidden, !self.hidden);
        self.ctag = target_tag;
        self.tops[self.ctag] = addressing::group_of(n, self.ntags);
    }

    /// Show whichever of `tag`'s two slots is currently primary
    /// (`showtag()`).
    pub fn show_tag(&mut self, tag: usize) {
        if tag >= self.ntags {
            return;
        }
        self.show(addressing::slot_of(tag, self.tops[tag], self.ntags));
    }

    /// `switchterm(oidx, nidx, show, save, load)`: snapshot `oidx` if
    /// asked and eligible, save it, load `nidx`, and if `show`, decide
    /// between a cheap snapshot-restore and a full repaint exactly the
    /// way the original's one-line `term_redraw(load && (...))` does.
    fn switch_term(&mut self, oidx: usize, nidx: usize, show: bool, save: bool, load: bool) {
        if save && self.terms[oidx].is_running() && self.is_saved_tag(oidx) {
            self.snaps.snap(oidx);
        }
        self.terms[oidx].save();
        self.terms[nidx].load(show);
        if show {
            let full = load && (!self.terms[nidx].is_running() || !self.is_saved_tag(nidx) || self.snaps.load(nidx).is_err());
            self.reconfigure_pad_for(nidx);
            self.terms[nidx].redraw(full);
        }
    }

    /// Load `termid` into the pad without disturbing what's on screen,
    /// so a background pty can be read and parsed (`peepterm()`).
    fn peep_in(&mut self, termid: usize) {
        if termid != self.cterm() {
            self.switch_term(self.cterm(), termid, false, false, false);
        }
    }

    /// Restore the previously-current terminal after a peep
    /// (`peepback()`).
    fn peep_out(&mut self, termid: usize) {
        if termid != self.cterm() {
            let cur = self.cterm();
            self.switch_term(termid, cur, !self.hidden, false, false);
        }
    }

    /// `execterm()`: spawn only into a slot with nothing already
    /// running in it.
    fn spawn_command(&mut self, key: u8) {
        if self.main_term().is_some() {
            return;
        }
        let Some(argv) = self.config.command_argv(key) else { return };
        let argv = argv.to_vec();
        let send_vt_signals = key == b';';
        let cur = self.cterm();
        self.exec_slot(cur, &argv, send_vt_signals);
    }

    fn exec_slot_if_empty(&mut self, slot: usize, argv: &[String], send_vt_signals: bool) {
        if self.terms[slot].is_running() {
            return;
        }
        self.exec_slot(slot, argv, send_vt_signals);
    }

    fn exec_slot(&mut self, slot: usize, argv: &[String], send_vt_signals: bool) {
        self.reconfigure_pad_for(slot);
        let fbdev_env = self.fbdev_env_for();
        if let Err(e) = self.terms[slot].exec(argv, send_vt_signals, &fbdev_env) {
            tracing::warn!(%e, slot, "failed to spawn terminal");
        }
    }

    fn fbdev_env_for(&self) -> String {
        let pad = self.pad.borrow();
        format!("{}:{}x{}+0+0", self.fbdev_spec, pad.pixel_cols(), pad.pixel_rows())
    }

    fn screenshot_current(&mut self) {
        let cur = self.cterm();
        if let Err(e) = self.terms[cur].screenshot(self.config.screenshot_path()) {
            tracing::warn!(%e, "screenshot failed");
        }
    }

    fn redraw_current(&mut self, all: bool) {
        let cur = self.cterm();
        self.reconfigure_pad_for(cur);
        self.terms[cur].redraw(all);
    }

    fn scroll_current(&mut self, lines: isize) {
        let cur = self.cterm();
        self.terms[cur].scroll(lines);
    }

    fn toggle_font_set(&mut self) {
        self.pad.borrow_mut().toggle_font_set();
        self.redraw_current(true);
    }

    fn reload_config(&mut self) {
        let Some(hook) = self.reload.as_mut() else { return };
        match hook() {
            Ok(new_config) => {
                self.config = new_config;
                let cursor_colors = cursor_colors_from(self.config.as_ref());
                for term in &mut self.terms {
                    term.set_cursor_colors(cursor_colors);
                }
                self.redraw_current(true);
            }
            Err(e) => tracing::warn!(%e, "config reload failed"),
        }
    }

    /// Cycle the current tag's split mode and re-show both halves so
    /// the new layout (and its border, if any) is actually painted.
    fn cycle_split(&mut self, forward: bool) {
        let current = self.splits[self.ctag];
        self.splits[self.ctag] = if forward { current.cycle_forward() } else { current.cycle_backward() };
        self.redraw_split_panes();
    }

    fn redraw_split_panes(&mut self) {
        let primary = self.cterm();
        self.reconfigure_pad_for(primary);
        self.terms[primary].redraw(true);
        if self.splits[self.ctag].is_split() {
            let secondary = addressing::other_in_tag(primary, self.ntags);
            self.reconfigure_pad_for(secondary);
            self.terms[secondary].redraw(true);
        }
    }

    /// Reconfigure the shared pad to whichever rect `slot` occupies
    /// under its tag's current split mode, drawing the border between
    /// panes if split.
    fn reconfigure_pad_for(&mut self, slot: usize) {
        let tag = addressing::tag_of(slot, self.ntags);
        let split = self.splits[tag];
        let (surface_rows, surface_cols) = {
            let s = self.surface.borrow();
            (s.rows(), s.cols())
        };
        let border = self.config.border_width();
        let (glyph_rows, glyph_cols) = self.pad.borrow().glyph_size();
        let (primary, secondary) = layout::compute(split, surface_rows, surface_cols, border, glyph_rows, glyph_cols);
        let rect = if split.is_split() && addressing::group_of(slot, self.ntags) == 1 {
            secondary.unwrap_or(primary)
        } else {
            primary
        };
        let mut pad = self.pad.borrow_mut();
        pad.configure(rect.roff, rect.coff, rect.drows, rect.dcols);
        if split.is_split() {
            let (r, g, b) = self.config.border_color();
            if pad.border(Color::truecolor(r, g, b), border).is_err() {
                tracing::warn!("border too wide for the current split geometry, skipping");
            }
        }
    }

    /// `listtags()`: draw the two-column tag overlay along the pad's
    /// right edge, one row per tag, dim where that half has nothing
    /// open.
    fn list_tags(&mut self) {
        let ccols = self.pad.borrow().character_cols();
        if ccols < 2 {
            return;
        }
        let tags: Vec<u8> = self.config.tags().bytes().collect();
        let mut pad = self.pad.borrow_mut();
        for (i, &tag_byte) in tags.iter().enumerate() {
            let primary_slot = addressing::slot_of(i, self.tops[i], self.ntags);
            let secondary_slot = addressing::slot_of(i, 1 - self.tops[i], self.ntags);
            let row = 1 + i;
            let bg = if i == self.ctag { Color::Indexed(193) } else { Color::Indexed(225) };
            let active_fg = Color::Indexed(8);
            let dim_fg = if tag_is_saved(self.config.tags(), self.config.saved_tags(), i) {
                Color::Indexed(218)
            } else {
                Color::Indexed(150)
            };
            let primary_fg = if self.terms[primary_slot].is_running() { active_fg } else { dim_fg };
            let secondary_fg = if self.terms[secondary_slot].is_running() { active_fg } else { bg };
            pad.put(u32::from(tag_byte), row, ccols - 2, primary_fg, bg, Style::BOLD);
            pad.put(u32::from(tag_byte), row, ccols - 1, secondary_fg, bg, Style::BOLD);
        }
    }
}

fn read_one_byte(fd: RawFd) -> Option<u8> {
    let mut b = [0u8; 1];
    match nix::unistd::read(fd, &mut b) {
        Ok(1) => Some(b[0]),
        _ => None,
    }
}

fn tag_is_saved(tags: &str, saved_tags: &str, tag_idx: usize) -> bool {
    tags.as_bytes().get(tag_idx).is_some_and(|ch| saved_tags.as_bytes().contains(ch))
}

fn password_matches(configured: Option<&str>, attempt: &str) -> bool {
    configured.is_some_and(|p| p == attempt)
}

/// `None` unless both `cursor_fg` and `cursor_bg` are configured, in
/// which case this is the fixed paint color pair every terminal's
/// cursor uses instead of swapping the cell's own colors (spec.md
/// §4.8: "`None` means use the cell's colors swapped").
fn cursor_colors_from(config: &dyn Config) -> Option<(Color, Color)> {
    let (fg_r, fg_g, fg_b) = config.cursor_fg()?;
    let (bg_r, bg_g, bg_b) = config.cursor_bg()?;
    Some((Color::truecolor(fg_r, fg_g, fg_b), Color::truecolor(bg_r, bg_g, bg_b)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_is_saved_checks_membership_by_tag_character() {
        assert!(tag_is_saved("xnlh", "xl", 0));
        assert!(!tag_is_saved("xnlh", "xl", 1));
        assert!(tag_is_saved("xnlh", "xl", 2));
    }

    #[test]
    fn tag_is_saved_out_of_range_is_false() {
        assert!(!tag_is_saved("xn", "xn", 5));
    }

    #[test]
    fn password_matches_requires_a_configured_password() {
        assert!(!password_matches(None, ""));
        assert!(!password_matches(Some("hunter2"), ""));
        assert!(password_matches(Some("hunter2"), "hunter2"));
    }
}
