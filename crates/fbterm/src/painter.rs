//! The engine's view of C4: a pure data dependency from engine to pad
//! (spec.md §9 Design Notes, "Cyclic coupling"). Defining the seam here
//! rather than depending on `fbpad::Pad` directly lets the parser and
//! grid-mutation logic be tested without a real framebuffer.

use fbcell::{Color, Style};

pub trait Painter {
    fn put(&mut self, ch: u32, row: usize, col: usize, fg: Color, bg: Color, style: Style);
    fn fill(&mut self, row_start: usize, row_end: isize, col_start: usize, col_end: isize, color: Color);
    fn character_rows(&self) -> usize;
    fn character_cols(&self) -> usize;
}

impl Painter for fbpad::Pad {
    fn put(&mut self, ch: u32, row: usize, col: usize, fg: Color, bg: Color, style: Style) {
        fbpad::Pad::put(self, ch, row, col, fg, bg, style)
    }

    fn fill(&mut self, row_start: usize, row_end: isize, col_start: usize, col_end: isize, color: Color) {
        fbpad::Pad::fill(self, row_start, row_end, col_start, col_end, color)
    }

    fn character_rows(&self) -> usize {
        fbpad::Pad::character_rows(self)
    }

    fn character_cols(&self) -> usize {
        fbpad::Pad::character_cols(self)
    }
}
