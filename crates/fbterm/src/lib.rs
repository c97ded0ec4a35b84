//! C6: the terminal engine — VT102/ECMA-48 parser, cell grid, scroll
//! region, saved cursor state, scrollback, pty I/O (spec.md §4.6, the
//! "hard core").

mod action;
mod history;
mod modes;
mod painter;
mod pty;

pub use modes::TermModes;
pub use painter::Painter;

/// Not part of the public contract; exposed only so `benches/parse.rs`
/// can drive the parser directly without a real pty.
#[doc(hidden)]
pub use action::parse_one;

use action::{Action, CsiSeq};
use derive_more::{Display, Error};
use fbcell::{Cell, Color, ColorWord, Grid, Style, DW_CONTINUATION};
use history::History;
use nix::poll::{PollFd, PollFlags, PollTimeout};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::cell::RefCell;
use std::io::Write;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::rc::Rc;
use std::time::Duration;

const SEND_RETRIES: u32 = 4;
const SEND_RETRY_TIMEOUT: Duration = Duration::from_millis(50);
/// Threshold above which the engine defers per-cell blits to lazy
/// per-row repaints on drain (spec.md §4.6.6).
const LAZY_THRESHOLD: usize = 15;

#[derive(Debug, Display, Error)]
pub enum TermError {
    #[display("failed to spawn child process: {_0}")]
    Spawn(pty::PtyError),
    #[display("failed to write screenshot: {_0}")]
    Screenshot(std::io::Error),
}

#[derive(Clone, Copy)]
struct SavedCursor {
    row: usize,
    col: usize,
    fg: Color,
    bg: Color,
    style: Style,
    modes: TermModes,
}

/// One VT102/ECMA-48 session: a cell grid, a scrollback ring, and (once
/// `exec`'d) a pty. `make()` in spec.md terms is just [`Terminal::new`];
/// there is no separate allocate-then-initialize step in safe Rust.
pub struct Terminal {
    painter: Rc<RefCell<dyn Painter>>,
    master: Option<OwnedFd>,
    child: Option<Pid>,
    send_vt_signals: bool,
    term_name: String,

    grid: Grid,
    scroll_top: usize,
    scroll_bot: usize,
    cursor_row: usize,
    cursor_col: usize,
    saved_cursor: Option<SavedCursor>,
    modes: TermModes,
    cur_fg: Color,
    cur_bg: Color,
    cur_style: Style,

    history: History,
    hpos: usize,

    recv: Vec<u8>,
    send_queue: Vec<u8>,
    loaded: bool,
    cursor_colors: Option<(Color, Color)>,
}

impl Terminal {
    /// Allocate an empty terminal sized to `painter`'s current geometry.
    pub fn new(painter: Rc<RefCell<dyn Painter>>, term_name: impl Into<String>) -> Terminal {
        let (rows, cols) = {
            let p = painter.borrow();
            (p.character_rows().max(1), p.character_cols().max(1))
        };
        Terminal {
            painter,
            master: None,
            child: None,
            send_vt_signals: false,
            term_name: term_name.into(),
            grid: Grid::new(rows, cols, blank_cell()),
            scroll_top: 0,
            scroll_bot: rows,
            cursor_row: 0,
            cursor_col: 0,
            saved_cursor: None,
            modes: TermModes::default(),
            cur_fg: Color::Default,
            cur_bg: Color::Default,
            cur_style: Style::empty(),
            history: History::new(cols),
            hpos: 0,
            recv: Vec::new(),
            send_queue: Vec::new(),
            loaded: false,
            cursor_colors: None,
        }
    }

    /// Configures the cursor's paint colors (spec.md §4.8 `cursor_fg`/
    /// `cursor_bg`). `None` keeps the default of swapping the cell's own
    /// colors.
    pub fn set_cursor_colors(&mut self, colors: Option<(Color, Color)>) {
        self.cursor_colors = colors;
    }

    /// The pty master fd, or `0` if unstarted/ended (spec.md's C-ism;
    /// callers that want idiomatic Rust should prefer checking
    /// [`Self::is_running`]).
    #[must_use]
    pub fn fd(&self) -> i32 {
        self.master.as_ref().map_or(0, |m| m.as_raw_fd())
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.master.is_some()
    }

    /// Zero-based `(row, col)` the next printable will land at.
    #[must_use]
    pub fn cursor_position(&self) -> (usize, usize) {
        (self.cursor_row, self.cursor_col)
    }

    /// Open a pty pair, fork, and exec `argv` (spec.md §4.6.1 `exec`).
    /// `fbdev_env` is the `FBDEV=<device>:WxH+X+Y` value the caller (the
    /// multiplexer, which owns the surface) composes from the pad's
    /// pixel geometry.
    pub fn exec(&mut self, argv: &[String], send_vt_signals: bool, fbdev_env: &str) -> Result<(), TermError> {
        let (rows, cols) = {
            let p = self.painter.borrow();
            (p.character_rows(), p.character_cols())
        };
        let outcome = pty::exec(argv, &self.term_name, fbdev_env, send_vt_signals, rows as u16, cols as u16)
            .map_err(TermError::Spawn)?;
        self.master = Some(outcome.master);
        self.child = Some(outcome.child);
        self.send_vt_signals = send_vt_signals;
        self.reset_state(rows, cols);
        Ok(())
    }

    fn reset_state(&mut self, rows: usize, cols: usize) {
        self.grid = Grid::new(rows, cols, blank_cell());
        self.scroll_top = 0;
        self.scroll_bot = rows;
        self.cursor_row = 0;
        self.cursor_col = 0;
        self.saved_cursor = None;
        self.modes = TermModes::default();
        self.cur_fg = Color::Default;
        self.cur_bg = Color::Default;
        self.cur_style = Style::empty();
        self.history = History::new(cols);
        self.hpos = 0;
        self.recv.clear();
        self.send_queue.clear();
    }

    /// Bind this terminal as the scheduler's loaded/active one. The
    /// original design used a thread-local "current terminal" pointer
    /// rebound on every switch (spec.md §9); here each terminal owns its
    /// `recv`/`send_queue` permanently, so there is nothing to migrate —
    /// `load`/`save` only need to track whether this instance is the
    /// one currently receiving scheduler attention.
    pub fn load(&mut self, _visible: bool) {
        self.loaded = true;
    }

    pub fn save(&mut self) {
        self.loaded = false;
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Drain readable pty bytes and parse every complete sequence in
    /// them (spec.md §4.6.1 `read`).
    pub fn read(&mut self) {
        let Some(master) = self.master.as_ref() else { return };
        let fd = master.as_raw_fd();
        let mut buf = [0u8; 4096];
        match nix::unistd::read(fd, &mut buf) {
            Ok(0) => self.end(),
            Ok(n) => {
                self.recv.extend_from_slice(&buf[..n]);
                self.process_buffered();
            }
            Err(nix::Error::EAGAIN) => {}
            Err(_) => self.end(),
        }
    }

    /// Append bytes as if they had just arrived from the child and
    /// parse every complete sequence in them. Unlike [`Self::read`],
    /// this does not touch the pty fd, so it works whether or not a
    /// child is running — the parser is resumable, not "driven" by the
    /// pty, and this is how code other than the scheduler exercises it.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.recv.extend_from_slice(bytes);
        self.process_buffered();
    }

    fn process_buffered(&mut self) {
        let lazy = self.recv.len() > LAZY_THRESHOLD;
        let mut consumed = 0;
        while consumed < self.recv.len() {
            match action::parse_one(&self.recv[consumed..]) {
                Some((n, act)) => {
                    self.apply(act, lazy);
                    consumed += n;
                }
                None => break,
            }
        }
        self.recv.drain(0..consumed);
        if lazy {
            self.lazy_flush();
        }
    }

    /// Enqueue bytes for the pty; best-effort with a bounded retry
    /// window (spec.md §4.6.1 `send`).
    pub fn send(&mut self, bytes: &[u8]) {
        let Some(master) = self.master.as_ref() else { return };
        self.send_queue.extend_from_slice(bytes);
        let fd = master.as_raw_fd();
        for attempt in 0..=SEND_RETRIES {
            match nix::unistd::write(master, &self.send_queue) {
                Ok(n) => {
                    self.send_queue.drain(0..n);
                    if self.send_queue.is_empty() {
                        return;
                    }
                }
                Err(nix::Error::EAGAIN) => {}
                Err(_) => {
                    self.send_queue.clear();
                    return;
                }
            }
            if attempt < SEND_RETRIES && !self.send_queue.is_empty() {
                wait_writable(fd, SEND_RETRY_TIMEOUT);
            }
        }
        if !self.send_queue.is_empty() {
            tracing::warn!(pending = self.send_queue.len(), "dropping pty bytes after bounded retries");
            self.send_queue.clear();
        }
    }

    /// Close the fd and zero the record (spec.md `end`). Idempotent.
    pub fn end(&mut self) {
        self.master = None;
        self.child = None;
        self.loaded = false;
        self.recv.clear();
        self.send_queue.clear();
    }

    /// Write a UTF-8 dump of the visible grid, one row per line,
    /// trailing blanks trimmed (spec.md `screenshot`).
    pub fn screenshot(&self, path: impl AsRef<std::path::Path>) -> Result<(), TermError> {
        let mut out = String::new();
        for r in 0..self.grid.rows() {
            let mut line = String::new();
            for cell in self.grid.row(r) {
                if cell.is_continuation() {
                    continue;
                }
                let cp = cell.leading_codepoint();
                if cp == 0 {
                    line.push(' ');
                } else if let Some(c) = char::from_u32(cp) {
                    line.push(c);
                }
            }
            out.push_str(line.trim_end());
            out.push('\n');
        }
        std::fs::write(path, out).map_err(TermError::Screenshot)
    }

    /// Notify the child of a visibility change, if it opted in.
    pub fn hide(&self) {
        self.signal_child(Signal::SIGUSR1);
    }

    pub fn show(&self) {
        self.signal_child(Signal::SIGUSR2);
    }

    fn signal_child(&self, sig: Signal) {
        if !self.send_vt_signals {
            return;
        }
        if let Some(pid) = self.child {
            let _ = kill(Pid::from_raw(-pid.as_raw()), sig);
        }
    }

    /// Shift the scrollback view; positive moves back in history.
    pub fn scroll(&mut self, lines: isize) {
        let max = self.history.filled() as isize;
        self.hpos = (self.hpos as isize + lines).clamp(0, max) as usize;
        self.redraw_viewport();
    }

    /// Reconfigure for the pad's current geometry and, if `all`, repaint
    /// every row (spec.md §4.6.5).
    pub fn redraw(&mut self, all: bool) {
        let (new_rows, new_cols) = {
            let p = self.painter.borrow();
            (p.character_rows(), p.character_cols())
        };
        if new_rows != self.grid.rows() || new_cols != self.grid.cols() {
            self.resize(new_rows, new_cols);
            if let Some(master) = &self.master {
                pty::set_winsize(master.as_raw_fd(), new_rows as u16, new_cols as u16);
            }
        }
        if all {
            self.grid.mark_all_dirty();
        }
        self.redraw_viewport();
    }

    fn resize(&mut self, new_rows: usize, new_cols: usize) {
        let keep_from = self.cursor_row.saturating_sub(new_rows.saturating_sub(1));
        self.grid = self.grid.resized(new_rows, new_cols, keep_from, blank_cell());
        self.history.resize_cols(new_cols);
        self.cursor_row = self.cursor_row.saturating_sub(keep_from).min(new_rows.saturating_sub(1));
        self.cursor_col = self.cursor_col.min(new_cols.saturating_sub(1));
        self.scroll_top = 0;
        self.scroll_bot = new_rows;
        self.modes.remove(TermModes::WRAP_PENDING);
    }

    /// Repaint every dirty row (or, while scrolled back, the composed
    /// history+live view) through the pad.
    fn redraw_viewport(&mut self) {
        let mut painter = self.painter.borrow_mut();
        let cols = self.grid.cols();
        if self.hpos == 0 {
            for r in self.grid.dirty_rows().collect::<Vec<_>>() {
                paint_row(&mut *painter, r, self.grid.row(r));
            }
        } else {
            for r in 0..self.grid.rows() {
                if r < self.hpos {
                    let back = self.hpos - r;
                    if let Some(hrow) = self.history.row_back(back) {
                        let cells: Vec<Cell> =
                            hrow.iter().take(cols).map(|&cp| Cell { codepoint: cp, attr: ColorWord::blank() }).collect();
                        paint_row(&mut *painter, r, &cells);
                        continue;
                    }
                }
                let live_row = r - self.hpos.min(r);
                paint_row(&mut *painter, r, self.grid.row(live_row));
            }
        }
        if self.hpos == 0 && self.modes.contains(TermModes::CURSOR_VISIBLE) {
            let cell = self.grid.get(self.cursor_row, self.cursor_col);
            let (fg, bg) = self.cursor_colors.unwrap_or((cell.attr.bg(), cell.attr.fg()));
            painter.put(cell.leading_codepoint().max(b' ' as u32), self.cursor_row, self.cursor_col, fg, bg, cell.attr.style());
        }
        self.grid.clear_dirty();
    }

    /// Coalesce blank spans per row into one `fill` call; non-blank runs
    /// go through `put` one cell at a time (spec.md §4.6.6).
    fn lazy_flush(&mut self) {
        self.redraw_viewport();
    }

    // ---- parser action application -------------------------------------

    fn apply(&mut self, action: Action, lazy: bool) {
        match action {
            Action::Print(cp, dw) => self.put_char(cp, dw, lazy),
            Action::Ignore => {}
            Action::Backspace => self.cursor_col = self.cursor_col.saturating_sub(1),
            Action::Tab => {
                // Clip at cols-1 rather than wrap (spec.md's Design Notes
                // resolve this ambiguity against the latest source variant).
                let next = (self.cursor_col / 8 + 1) * 8;
                self.cursor_col = next.min(self.grid.cols() - 1);
            }
            Action::Newline => {
                self.line_feed();
                if self.modes.contains(TermModes::AUTOCR) {
                    self.cursor_col = 0;
                }
            }
            Action::CarriageReturn => self.cursor_col = 0,
            Action::SaveCursor => {
                self.saved_cursor = Some(SavedCursor {
                    row: self.cursor_row,
                    col: self.cursor_col,
                    fg: self.cur_fg,
                    bg: self.cur_bg,
                    style: self.cur_style,
                    modes: self.modes,
                });
            }
            Action::RestoreCursor => {
                if let Some(s) = self.saved_cursor {
                    self.cursor_row = s.row.min(self.grid.rows() - 1);
                    self.cursor_col = s.col.min(self.grid.cols() - 1);
                    self.cur_fg = s.fg;
                    self.cur_bg = s.bg;
                    self.cur_style = s.style;
                    self.modes = s.modes;
                }
            }
            Action::ReverseIndex => {
                if self.cursor_row == self.scroll_top {
                    self.scroll_down(1);
                } else {
                    self.cursor_row = self.cursor_row.saturating_sub(1).max(self.scroll_top);
                }
            }
            Action::Index => self.line_feed(),
            Action::NextLine => {
                self.line_feed();
                self.cursor_col = 0;
            }
            Action::FullReset => {
                let (rows, cols) = (self.grid.rows(), self.grid.cols());
                self.reset_state(rows, cols);
                self.grid.mark_all_dirty();
            }
            Action::IgnoredEscape => {}
            Action::Csi(seq) => self.apply_csi(seq),
        }
    }

    fn put_char(&mut self, cp: u32, double_wide: bool, lazy: bool) {
        if self.modes.contains(TermModes::WRAP_PENDING) {
            self.wrap_line();
        }
        if double_wide && self.cursor_col == self.grid.cols() - 1 && !self.modes.contains(TermModes::WRAP_PENDING) {
            self.grid.set(self.cursor_row, self.cursor_col, Cell::blank(self.attr()));
            self.wrap_line();
        }
        let attr = self.attr();
        if self.modes.contains(TermModes::INSERT) {
            self.insert_blanks(1);
        }
        self.grid.set(self.cursor_row, self.cursor_col, Cell { codepoint: cp, attr });
        if double_wide && self.cursor_col + 1 < self.grid.cols() {
            self.grid.set(self.cursor_row, self.cursor_col + 1, Cell { codepoint: cp | DW_CONTINUATION, attr });
        }
        let advance = if double_wide { 2 } else { 1 };
        if self.cursor_col + advance >= self.grid.cols() {
            self.cursor_col = self.grid.cols() - 1;
            if self.modes.contains(TermModes::AUTOWRAP) {
                self.modes.insert(TermModes::WRAP_PENDING);
            }
        } else {
            self.cursor_col += advance;
        }
        if !lazy {
            self.redraw_viewport();
        }
    }

    fn wrap_line(&mut self) {
        self.modes.remove(TermModes::WRAP_PENDING);
        self.cursor_col = 0;
        self.line_feed();
    }

    fn attr(&self) -> ColorWord {
        let (fg, bg) = if self.cur_style.contains(Style::REVERSE) {
            (self.cur_bg, self.cur_fg)
        } else {
            (self.cur_fg, self.cur_bg)
        };
        ColorWord::new(fg, bg, self.cur_style)
    }

    fn line_feed(&mut self) {
        if self.cursor_row + 1 >= self.scroll_bot {
            self.scroll_up(1);
        } else {
            self.cursor_row += 1;
        }
    }

    fn scroll_up(&mut self, n: usize) {
        for back in 0..n {
            let r = self.scroll_top + back;
            if r < self.scroll_bot {
                let row_cps: Vec<u32> = self.grid.row(r).iter().map(|c| c.leading_codepoint()).collect();
                self.history.push(&row_cps);
            }
        }
        self.grid.scroll_region(self.scroll_top, self.scroll_bot, n as isize, Cell::blank(self.attr()));
        self.hpos = 0;
    }

    fn scroll_down(&mut self, n: usize) {
        self.grid.scroll_region(self.scroll_top, self.scroll_bot, -(n as isize), Cell::blank(self.attr()));
    }

    fn insert_blanks(&mut self, n: usize) {
        let attr = self.attr();
        let cols = self.grid.cols();
        let row = self.grid.row_mut(self.cursor_row);
        let start = self.cursor_col;
        let shift = n.min(cols - start);
        row.copy_within(start..cols - shift, start + shift);
        for c in row.iter_mut().skip(start).take(shift) {
            *c = Cell::blank(attr);
        }
    }

    fn apply_csi(&mut self, seq: CsiSeq) {
        match seq.final_byte {
            b'H' | b'f' => {
                let row = (seq.count(0) - 1).max(0) as usize;
                let col = (seq.count(1) - 1).max(0) as usize;
                self.move_cursor(self.origin_row(row), col);
            }
            b'A' => self.cursor_row = self.cursor_row.saturating_sub(seq.count(0) as usize).max(self.scroll_top),
            b'B' | b'e' => {
                self.cursor_row = (self.cursor_row + seq.count(0) as usize).min(self.scroll_bot - 1);
            }
            b'C' | b'a' => {
                self.cursor_col = (self.cursor_col + seq.count(0) as usize).min(self.grid.cols() - 1);
            }
            b'D' => self.cursor_col = self.cursor_col.saturating_sub(seq.count(0) as usize),
            b'G' | b'`' => {
                let col = (seq.count(0) - 1).max(0) as usize;
                self.cursor_col = col.min(self.grid.cols() - 1);
            }
            b'd' => {
                let row = (seq.count(0) - 1).max(0) as usize;
                self.cursor_row = self.origin_row(row);
            }
            b'J' => self.erase_display(seq.arg(0)),
            b'K' => self.erase_line(seq.arg(0)),
            b'L' => self.insert_lines(seq.count(0) as usize),
            b'M' => self.delete_lines(seq.count(0) as usize),
            b'S' => self.scroll_up(seq.count(0) as usize),
            b'T' => self.scroll_down(seq.count(0) as usize),
            b'P' => self.delete_chars(seq.count(0) as usize),
            b'X' => self.erase_chars(seq.count(0) as usize),
            b'@' => self.insert_blanks(seq.count(0) as usize),
            b'm' => self.apply_sgr(&seq),
            b'r' => self.set_scroll_region(seq.arg(0) as usize, seq.arg(1) as usize),
            b'c' => self.send(b"\x1b[?6c"),
            b'h' => self.set_mode(&seq, true),
            b'l' => self.set_mode(&seq, false),
            b'n' => self.device_status(seq.arg(0)),
            _ => {}
        }
    }

    fn origin_row(&self, row: usize) -> usize {
        if self.modes.contains(TermModes::ORIGIN) {
            (self.scroll_top + row).min(self.scroll_bot - 1)
        } else {
            row.min(self.grid.rows() - 1)
        }
    }

    fn move_cursor(&mut self, row: usize, col: usize) {
        self.modes.remove(TermModes::WRAP_PENDING);
        self.cursor_row = row.clamp(self.scroll_top, self.scroll_bot - 1);
        self.cursor_col = col.min(self.grid.cols() - 1);
    }

    fn erase_display(&mut self, mode: i64) {
        let attr = self.attr();
        match mode {
            0 => {
                self.clear_row_from(self.cursor_row, self.cursor_col);
                for r in self.cursor_row + 1..self.grid.rows() {
                    self.grid.row_mut(r).iter_mut().for_each(|c| *c = Cell::blank(attr));
                }
            }
            1 => {
                for r in 0..self.cursor_row {
                    self.grid.row_mut(r).iter_mut().for_each(|c| *c = Cell::blank(attr));
                }
                self.clear_row_to(self.cursor_row, self.cursor_col);
            }
            _ => {
                // ECMA-48: entire-screen erase does not home the cursor.
                for r in 0..self.grid.rows() {
                    self.grid.row_mut(r).iter_mut().for_each(|c| *c = Cell::blank(attr));
                }
            }
        }
    }

    fn erase_line(&mut self, mode: i64) {
        match mode {
            0 => self.clear_row_from(self.cursor_row, self.cursor_col),
            1 => self.clear_row_to(self.cursor_row, self.cursor_col),
            _ => {
                let attr = self.attr();
                self.grid.row_mut(self.cursor_row).iter_mut().for_each(|c| *c = Cell::blank(attr));
            }
        }
    }

    fn clear_row_from(&mut self, row: usize, from_col: usize) {
        let attr = self.attr();
        self.grid.row_mut(row)[from_col..].iter_mut().for_each(|c| *c = Cell::blank(attr));
    }

    fn clear_row_to(&mut self, row: usize, to_col: usize) {
        let attr = self.attr();
        let end = (to_col + 1).min(self.grid.cols());
        self.grid.row_mut(row)[..end].iter_mut().for_each(|c| *c = Cell::blank(attr));
    }

    fn insert_lines(&mut self, n: usize) {
        if self.cursor_row < self.scroll_top || self.cursor_row >= self.scroll_bot {
            return;
        }
        let attr = self.attr();
        self.grid.scroll_region(self.cursor_row, self.scroll_bot, -(n as isize), Cell::blank(attr));
    }

    fn delete_lines(&mut self, n: usize) {
        if self.cursor_row < self.scroll_top || self.cursor_row >= self.scroll_bot {
            return;
        }
        let attr = self.attr();
        self.grid.scroll_region(self.cursor_row, self.scroll_bot, n as isize, Cell::blank(attr));
    }

    fn delete_chars(&mut self, n: usize) {
        let cols = self.grid.cols();
        let attr = self.attr();
        let row = self.grid.row_mut(self.cursor_row);
        let start = self.cursor_col;
        let n = n.min(cols - start);
        row.copy_within(start + n..cols, start);
        for c in row.iter_mut().skip(cols - n) {
            *c = Cell::blank(attr);
        }
    }

    fn erase_chars(&mut self, n: usize) {
        let attr = self.attr();
        let cols = self.grid.cols();
        let end = (self.cursor_col + n).min(cols);
        self.grid.row_mut(self.cursor_row)[self.cursor_col..end].iter_mut().for_each(|c| *c = Cell::blank(attr));
    }

    fn set_scroll_region(&mut self, top: i64, bot: i64) {
        if top == 0 && bot == 0 {
            self.scroll_top = 0;
            self.scroll_bot = self.grid.rows();
        } else {
            let top = (top.max(1) as usize - 1).min(self.grid.rows() - 1);
            let bot = (bot as usize).clamp(top + 1, self.grid.rows());
            self.scroll_top = top;
            self.scroll_bot = bot;
        }
        self.cursor_row = self.cursor_row.clamp(self.scroll_top, self.scroll_bot - 1);
        self.cursor_col = 0;
    }

    fn set_mode(&mut self, seq: &CsiSeq, enable: bool) {
        for i in 0..seq.params.len().max(1) {
            let arg = seq.arg(i);
            let flag = match (seq.private, arg) {
                (Some(b'?'), 6) => Some(TermModes::ORIGIN),
                (Some(b'?'), 7) => Some(TermModes::AUTOWRAP),
                (Some(b'?'), 25) => Some(TermModes::CURSOR_VISIBLE),
                (None, 4) => Some(TermModes::INSERT),
                (None, 20) => Some(TermModes::AUTOCR),
                _ => None,
            };
            if let Some(flag) = flag {
                self.modes.set(flag, enable);
            }
        }
    }

    fn device_status(&mut self, kind: i64) {
        match kind {
            5 => self.send(b"\x1b[0n"),
            6 => {
                let reply = format!("\x1b[{};{}R", self.cursor_row + 1, self.cursor_col + 1);
                self.send(reply.as_bytes());
            }
            _ => {}
        }
    }

    fn apply_sgr(&mut self, seq: &CsiSeq) {
        if seq.params.is_empty() {
            self.reset_sgr();
            return;
        }
        let mut i = 0;
        while i < seq.params.len() {
            let p = seq.params[i];
            match p {
                0 => self.reset_sgr(),
                1 => {
                    self.cur_style.insert(Style::BOLD);
                    if self.modes.contains(TermModes::COLORS8) {
                        self.cur_fg = self.cur_fg.brighten();
                    }
                }
                3 => self.cur_style.insert(Style::ITALIC),
                7 => self.cur_style.insert(Style::REVERSE),
                22 => self.cur_style.remove(Style::BOLD),
                23 => self.cur_style.remove(Style::ITALIC),
                27 => self.cur_style.remove(Style::REVERSE),
                30..=37 => {
                    self.cur_fg = Color::Indexed((p - 30) as u8);
                    self.modes.insert(TermModes::COLORS8);
                }
                38 => {
                    i = self.apply_extended_color(seq, i, true);
                    continue;
                }
                39 => self.cur_fg = Color::Default,
                40..=47 => self.cur_bg = Color::Indexed((p - 40) as u8),
                48 => {
                    i = self.apply_extended_color(seq, i, false);
                    continue;
                }
                49 => self.cur_bg = Color::Default,
                90..=97 => self.cur_fg = Color::Indexed((p - 90 + 8) as u8),
                100..=107 => self.cur_bg = Color::Indexed((p - 100 + 8) as u8),
                _ => {}
            }
            i += 1;
        }
    }

    /// Consumes `38;5;N` / `38;2;R;G;B` (and the `48;...` background
    /// twin) starting at `params[i]`, returning the next unconsumed
    /// index.
    fn apply_extended_color(&mut self, seq: &CsiSeq, i: usize, foreground: bool) -> usize {
        match seq.params.get(i + 1).copied() {
            Some(5) => {
                let idx = seq.params.get(i + 2).copied().unwrap_or(0) as u8;
                let c = Color::Indexed(idx);
                if foreground {
                    self.cur_fg = c;
                    self.modes.remove(TermModes::COLORS8);
                } else {
                    self.cur_bg = c;
                }
                i + 3
            }
            Some(2) => {
                let r = seq.params.get(i + 2).copied().unwrap_or(0) as u8;
                let g = seq.params.get(i + 3).copied().unwrap_or(0) as u8;
                let b = seq.params.get(i + 4).copied().unwrap_or(0) as u8;
                let c = Color::truecolor(r, g, b);
                if foreground {
                    self.cur_fg = c;
                    self.modes.remove(TermModes::COLORS8);
                } else {
                    self.cur_bg = c;
                }
                i + 5
            }
            _ => i + 1,
        }
    }

    fn reset_sgr(&mut self) {
        self.cur_fg = Color::Default;
        self.cur_bg = Color::Default;
        self.cur_style = Style::empty();
        self.modes.remove(TermModes::COLORS8);
    }
}

fn blank_cell() -> Cell {
    Cell::blank(ColorWord::blank())
}

fn paint_row(painter: &mut dyn Painter, row: usize, cells: &[Cell]) {
    let mut col = 0;
    while col < cells.len() {
        let cell = cells[col];
        if cell.is_continuation() {
            col += 1;
            continue;
        }
        painter.put(cell.leading_codepoint(), row, col, cell.attr.fg(), cell.attr.bg(), cell.attr.style());
        col += 1;
    }
}

fn wait_writable(fd: RawFd, timeout: Duration) {
    let borrowed: BorrowedFd = unsafe { BorrowedFd::borrow_raw(fd) };
    let mut fds = [PollFd::new(borrowed, PollFlags::POLLOUT)];
    let ms: i32 = timeout.as_millis().try_into().unwrap_or(i32::MAX);
    let _ = nix::poll::poll(&mut fds, PollTimeout::from(ms as u16));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakePainter {
        rows: usize,
        cols: usize,
        puts: Vec<(u32, usize, usize)>,
        fills: Vec<(usize, isize, usize, isize)>,
    }

    impl Painter for FakePainter {
        fn put(&mut self, ch: u32, row: usize, col: usize, _fg: Color, _bg: Color, _style: Style) {
            self.puts.push((ch, row, col));
        }
        fn fill(&mut self, row_start: usize, row_end: isize, col_start: usize, col_end: isize, _color: Color) {
            self.fills.push((row_start, row_end, col_start, col_end));
        }
        fn character_rows(&self) -> usize {
            self.rows
        }
        fn character_cols(&self) -> usize {
            self.cols
        }
    }

    fn terminal(rows: usize, cols: usize) -> (Terminal, Rc<RefCell<FakePainter>>) {
        let painter = Rc::new(RefCell::new(FakePainter { rows, cols, ..Default::default() }));
        let term = Terminal::new(painter.clone() as Rc<RefCell<dyn Painter>>, "linux");
        (term, painter)
    }

    fn feed(term: &mut Terminal, bytes: &[u8]) {
        term.feed(bytes);
    }

    #[test]
    fn cursor_addressing_scenario() {
        let (mut term, _p) = terminal(24, 80);
        feed(&mut term, b"\x1b[5;3HX");
        assert_eq!(term.cursor_row, 4);
        assert_eq!(term.cursor_col, 3); // advanced one past the X at col 2 (0-based)
        assert_eq!(term.grid.get(4, 2).leading_codepoint(), b'X' as u32);
    }

    #[test]
    fn sgr_reverse_and_truecolor_scenario() {
        let (mut term, _p) = terminal(24, 80);
        feed(&mut term, b"\x1b[38;2;255;0;0mA\x1b[7mB\x1b[0mC");
        let a = term.grid.get(0, 0).attr;
        assert_eq!(a.fg(), Color::truecolor(255, 0, 0));
        assert_eq!(a.bg(), Color::Default);
        let b = term.grid.get(0, 1).attr;
        assert!(b.style().contains(Style::REVERSE));
        let c = term.grid.get(0, 2).attr;
        assert_eq!(c.fg(), Color::Default);
        assert_eq!(c.bg(), Color::Default);
        assert!(!c.style().contains(Style::REVERSE));
    }

    #[test]
    fn scroll_region_scenario() {
        let (mut term, _p) = terminal(6, 4);
        feed(&mut term, b"\x1b[2;4r");
        assert_eq!(term.scroll_top, 1);
        assert_eq!(term.scroll_bot, 4);
        term.grid.row_mut(1)[0].codepoint = b'A' as u32;
        term.grid.row_mut(2)[0].codepoint = b'B' as u32;
        term.grid.row_mut(3)[0].codepoint = b'C' as u32;
        term.move_cursor(3, 0);
        feed(&mut term, b"\n");
        assert_eq!(term.grid.get(1, 0).leading_codepoint(), b'B' as u32);
        assert_eq!(term.grid.get(2, 0).leading_codepoint(), b'C' as u32);
        assert_eq!(term.grid.get(3, 0).leading_codepoint(), 0);
    }

    #[test]
    fn double_wide_at_last_column_wraps() {
        let (mut term, _p) = terminal(4, 10);
        term.move_cursor(0, 9);
        feed(&mut term, "中".as_bytes());
        assert_eq!(term.grid.get(0, 9).leading_codepoint(), 0);
        assert_eq!(term.grid.get(1, 0).leading_codepoint(), 0x4E2D);
        assert!(term.grid.get(1, 1).is_continuation());
    }

    #[test]
    fn parser_resume_scenario() {
        let (mut term, _p) = terminal(24, 80);
        feed(&mut term, b"\x1b[1");
        assert_eq!(term.cursor_row, 0);
        assert_eq!(term.cursor_col, 0);
        feed(&mut term, b"0H");
        assert_eq!(term.cursor_row, 9);
        assert_eq!(term.cursor_col, 0);
    }

    #[test]
    fn erase_display_does_not_home_cursor() {
        let (mut term, _p) = terminal(5, 5);
        term.move_cursor(3, 2);
        feed(&mut term, b"\x1b[2J");
        assert_eq!(term.cursor_row, 3);
        assert_eq!(term.cursor_col, 2);
        for r in 0..5 {
            for c in 0..5 {
                assert_eq!(term.grid.get(r, c).codepoint, 0);
            }
        }
    }

    #[test]
    fn tab_clips_at_last_column() {
        let (mut term, _p) = terminal(3, 10);
        term.move_cursor(0, 7);
        feed(&mut term, b"\t");
        assert_eq!(term.cursor_col, 9);
    }

    #[test]
    fn reset_scroll_region_via_zero_zero() {
        let (mut term, _p) = terminal(10, 10);
        feed(&mut term, b"\x1b[2;5r");
        feed(&mut term, b"\x1b[0;0r");
        assert_eq!(term.scroll_top, 0);
        assert_eq!(term.scroll_bot, 10);
    }

    #[test]
    fn screenshot_trims_trailing_blanks() {
        let (mut term, _p) = terminal(2, 5);
        feed(&mut term, b"hi");
        let dir = std::env::temp_dir().join(format!("fbterm-test-{}", std::process::id()));
        term.screenshot(&dir).unwrap();
        let contents = std::fs::read_to_string(&dir).unwrap();
        assert_eq!(contents.lines().next().unwrap(), "hi");
        let _ = std::fs::remove_file(&dir);
    }

    #[test]
    fn end_is_idempotent() {
        let (mut term, _p) = terminal(5, 5);
        term.end();
        term.end();
        assert!(!term.is_running());
    }

    #[test]
    fn save_then_load_preserves_pending_recv() {
        let (mut term, _p) = terminal(5, 5);
        term.recv.extend_from_slice(b"\x1b[1");
        term.save();
        term.load(true);
        assert_eq!(term.recv, b"\x1b[1");
    }

    #[test]
    fn dw_continuation_follows_a_leader_with_matching_colors() {
        let (mut term, _p) = terminal(4, 10);
        feed(&mut term, "中".as_bytes());
        let leader = term.grid.get(0, 0);
        let cont = term.grid.get(0, 1);
        assert!(cont.is_continuation());
        assert_eq!(cont.attr, leader.attr);
    }
}
