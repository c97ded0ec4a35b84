//! End-to-end coverage of spec.md §8's "Concrete scenarios," driven
//! entirely through `Terminal`'s public API (`feed`, `cursor_position`,
//! `screenshot`, `scroll`, the `Painter` seam) rather than internal
//! state, since this is an integration test in a separate crate.

use fbcell::{Color, Style};
use fbterm::{Painter, Terminal};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq)]
struct Put {
    ch: u32,
    row: usize,
    col: usize,
    fg: Color,
    bg: Color,
    style: Style,
}

#[derive(Default)]
struct RecordingPainter {
    rows: usize,
    cols: usize,
    puts: Vec<Put>,
}

impl Painter for RecordingPainter {
    fn put(&mut self, ch: u32, row: usize, col: usize, fg: Color, bg: Color, style: Style) {
        self.puts.push(Put { ch, row, col, fg, bg, style });
    }

    fn fill(&mut self, _row_start: usize, _row_end: isize, _col_start: usize, _col_end: isize, _color: Color) {}

    fn character_rows(&self) -> usize {
        self.rows
    }

    fn character_cols(&self) -> usize {
        self.cols
    }
}

fn terminal(rows: usize, cols: usize) -> (Terminal, Rc<RefCell<RecordingPainter>>) {
    let painter = Rc::new(RefCell::new(RecordingPainter { rows, cols, ..Default::default() }));
    let term = Terminal::new(painter.clone() as Rc<RefCell<dyn Painter>>, "linux");
    (term, painter)
}

/// Last recorded `put` at `(row, col)`, if any — later calls overwrite
/// earlier ones, same as painting onto a real framebuffer.
fn last_put_at(painter: &RecordingPainter, row: usize, col: usize) -> Option<Put> {
    painter.puts.iter().rev().find(|p| p.row == row && p.col == col).copied()
}

#[test]
fn cursor_addressing() {
    let (mut term, painter) = terminal(24, 80);
    term.feed(b"\x1b[5;3HX");
    assert_eq!(term.cursor_position(), (4, 3));
    term.redraw(true);
    let put = last_put_at(&painter.borrow(), 4, 2).expect("X should have been painted at row 4, col 2");
    assert_eq!(put.ch, b'X' as u32);
}

#[test]
fn sgr_reverse_and_truecolor() {
    let (mut term, painter) = terminal(24, 80);
    term.feed(b"\x1b[38;2;255;0;0mA\x1b[7mB\x1b[0mC");
    term.redraw(true);
    let p = painter.borrow();

    let a = last_put_at(&p, 0, 0).unwrap();
    assert_eq!(a.fg, Color::truecolor(255, 0, 0));
    assert_eq!(a.bg, Color::Default);

    let b = last_put_at(&p, 0, 1).unwrap();
    assert!(b.style.contains(Style::REVERSE));

    let c = last_put_at(&p, 0, 2).unwrap();
    assert_eq!(c.fg, Color::Default);
    assert_eq!(c.bg, Color::Default);
    assert!(!c.style.contains(Style::REVERSE));
}

#[test]
fn scroll_region_shifts_only_the_region() {
    let (mut term, _painter) = terminal(6, 10);
    // Rows are 1-based in the escape codes; mark every row so a shift is visible.
    term.feed(b"\x1b[1;1Hrow1\x1b[2;1Hrow2\x1b[3;1Hrow3\x1b[4;1Hrow4\x1b[5;1Hrow5\x1b[6;1Hrow6");
    term.feed(b"\x1b[2;4r"); // scroll region rows 2..4 (1-based) => [1,4) 0-based
    term.feed(b"\x1b[4;1H\n"); // position at last row of region, then newline scrolls it
    let dump = render_text(&mut term);
    let lines: Vec<&str> = dump.lines().collect();
    assert_eq!(lines[0].trim_end(), "row1"); // untouched, above region
    assert_eq!(lines[1].trim_end(), "row3"); // region shifted up by one
    assert_eq!(lines[2].trim_end(), "row4");
    assert!(lines[3].trim_end().is_empty()); // bottom of region now blank
    assert_eq!(lines[4].trim_end(), "row5"); // untouched, below region
    assert_eq!(lines[5].trim_end(), "row6");
}

#[test]
fn double_wide_at_last_column_wraps_with_continuation() {
    let (mut term, painter) = terminal(4, 10);
    term.feed(b"\x1b[1;10H"); // cursor to col 9 (0-based), last column
    term.feed("中".as_bytes());
    term.redraw(true);
    let p = painter.borrow();

    // col 9 of row 0 becomes a blank fill-in, not the glyph.
    let skipped = last_put_at(&p, 0, 9).expect("last column should still be repainted as blank");
    assert_eq!(skipped.ch, 0);

    // the glyph lands at col 0 of the next row; col 1 is a continuation
    // cell, which `redraw` never emits a `put` for.
    let leader = last_put_at(&p, 1, 0).expect("double-wide glyph should start the next row");
    assert_eq!(leader.ch, 0x4E2D);
    assert!(last_put_at(&p, 1, 1).is_none(), "continuation cell must not be painted directly");
}

#[test]
fn parser_resumes_across_split_escape_sequences() {
    let (mut term, _painter) = terminal(24, 80);
    term.feed(b"\x1b[1");
    assert_eq!(term.cursor_position(), (0, 0));
    term.feed(b"0H");
    assert_eq!(term.cursor_position(), (9, 0));
}

#[test]
fn end_is_idempotent() {
    let (mut term, _painter) = terminal(24, 80);
    term.end();
    term.end();
    assert!(!term.is_running());
}

fn render_text(term: &mut Terminal) -> String {
    let path = std::env::temp_dir().join(format!("fbterm-scenario-{}.txt", std::process::id()));
    term.screenshot(&path).expect("screenshot should succeed");
    let text = std::fs::read_to_string(&path).expect("screenshot file should be readable");
    let _ = std::fs::remove_file(&path);
    text
}
