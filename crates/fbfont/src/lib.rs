//! C2: bitmap font store.
//!
//! Loads either of two on-disk glyph formats (autodetected by magic)
//! and answers `codepoint -> rows x cols 8-bit coverage bitmap` lookups
//! by binary search over a sorted codepoint table (spec.md §4.2).

mod psf2;
mod tinyfont;

use derive_more::{Display, Error};
use std::fs;
use std::path::Path;

#[derive(Debug, Display, Error)]
pub enum FontError {
    #[display("failed to read font file: {_0}")]
    Io(std::io::Error),
    #[display("unrecognized font file format")]
    UnknownFormat,
    #[display("truncated or malformed font file")]
    Truncated,
    #[display("font declares zero glyph dimensions")]
    ZeroGlyphSize,
}

impl From<std::io::Error> for FontError {
    fn from(e: std::io::Error) -> Self {
        FontError::Io(e)
    }
}

/// A loaded bitmap font: glyph dimensions plus a sorted
/// `codepoint -> coverage bitmap` table.
pub struct BitFont {
    rows: usize,
    cols: usize,
    /// Sorted ascending, parallel to `bitmaps` (one `rows*cols` slab per entry).
    codepoints: Vec<i32>,
    bitmaps: Vec<u8>,
}

impl BitFont {
    /// Autodetect format by magic and load.
    pub fn open(path: impl AsRef<Path>) -> Result<BitFont, FontError> {
        let data = fs::read(path)?;
        if data.starts_with(tinyfont::MAGIC) {
            tinyfont::parse(&data)
        } else if data.starts_with(&psf2::MAGIC) {
            psf2::parse(&data)
        } else {
            Err(FontError::UnknownFormat)
        }
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Look up `codepoint`, writing `rows()*cols()` 8-bit coverage
    /// bytes into `out` on a hit. Returns whether the codepoint was
    /// found; `out` is left untouched on a miss so callers can try a
    /// fallback font without clearing their buffer first.
    pub fn lookup(&self, codepoint: i32, out: &mut [u8]) -> bool {
        debug_assert!(out.len() >= self.rows * self.cols);
        match self.codepoints.binary_search(&codepoint) {
            Ok(idx) => {
                let glyph_size = self.rows * self.cols;
                let start = idx * glyph_size;
                out[..glyph_size].copy_from_slice(&self.bitmaps[start..start + glyph_size]);
                true
            }
            Err(_) => false,
        }
    }

    pub(crate) fn from_sorted(rows: usize, cols: usize, codepoints: Vec<i32>, bitmaps: Vec<u8>) -> Self {
        BitFont { rows, cols, codepoints, bitmaps }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_miss_leaves_buffer_untouched() {
        let font = BitFont::from_sorted(1, 1, vec![65], vec![255]);
        let mut out = [9u8; 1];
        assert!(!font.lookup(66, &mut out));
        assert_eq!(out[0], 9);
        assert!(font.lookup(65, &mut out));
        assert_eq!(out[0], 255);
    }
}
