//! Shared cell-grid data model: packed colors, cell storage, and the
//! grid used by both the rasterizer ([`fbpad`]) and the terminal engine
//! ([`fbterm`]).

mod color;
mod grid;

pub use color::{indexed_to_rgb, Color, ColorWord, Style};
pub use grid::{Cell, Grid, DW_CONTINUATION};
pub use fbdw::{is_double_wide, is_zero_width};
