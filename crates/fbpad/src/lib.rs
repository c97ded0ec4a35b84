//! C4: the pad — rasterizes cells through the glyph cache and blits
//! pixel blocks into a shared [`FbSurface`] subregion (spec.md §4.4).

mod cache;

pub use cache::FontVariant;
use cache::{CacheKey, GlyphCache};

use derive_more::{Display, Error};
use fbcell::Color;
use fbfont::{BitFont, FontError};
use fbsurface::FbSurface;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Display, Error)]
pub enum PadError {
    #[display("failed to load font: {_0}")]
    Font(FontError),
    #[display("border width does not fit inside the subregion offset")]
    BorderTooWide,
}

impl From<FontError> for PadError {
    fn from(e: FontError) -> Self {
        PadError::Font(e)
    }
}

struct FontSet {
    regular: BitFont,
    italic: Option<BitFont>,
    bold: Option<BitFont>,
}

/// The rectangular subregion of the surface this pad currently
/// addresses, plus the fonts, cache and bulk-fill scratch buffer used
/// to paint it. One pad exists process-wide; the multiplexer
/// reconfigures it (`configure`) to address different subregions as
/// the layout changes.
pub struct Pad {
    surface: Rc<RefCell<FbSurface>>,
    primary: FontSet,
    alternate: Option<FontSet>,
    active_alternate: bool,
    roff: usize,
    coff: usize,
    drows: usize,
    dcols: usize,
    palette16: [(u8, u8, u8); 16],
    default_fg: (u8, u8, u8),
    default_bg: (u8, u8, u8),
    cache: GlyphCache,
    scratch_row: Vec<u8>,
    last_fill: Option<(u32, usize)>,
}

impl Pad {
    /// Open the primary font triple and bind to `surface`'s current
    /// dimensions as the initial subregion.
    pub fn init(
        surface: Rc<RefCell<FbSurface>>,
        regular: impl AsRef<std::path::Path>,
        italic: Option<impl AsRef<std::path::Path>>,
        bold: Option<impl AsRef<std::path::Path>>,
        palette16: [(u8, u8, u8); 16],
    ) -> Result<Pad, PadError> {
        let primary = FontSet {
            regular: BitFont::open(regular)?,
            italic: italic.map(BitFont::open).transpose()?,
            bold: bold.map(BitFont::open).transpose()?,
        };
        let (drows, dcols, bpp) = {
            let s = surface.borrow();
            (s.rows(), s.cols(), s.bytes_per_pixel())
        };
        let fncols = primary.regular.cols();
        Ok(Pad {
            surface,
            primary,
            alternate: None,
            active_alternate: false,
            roff: 0,
            coff: 0,
            drows,
            dcols,
            palette16,
            default_fg: (255, 255, 255),
            default_bg: (0, 0, 0),
            cache: GlyphCache::new(),
            scratch_row: vec![0u8; fncols.max(1) * 64 * bpp],
            last_fill: None,
        })
    }

    /// Load a second regular/italic/bold triple (spec.md §2 "alternate
    /// font set toggle"). Does not activate it.
    pub fn load_alternate(
        &mut self,
        regular: impl AsRef<std::path::Path>,
        italic: Option<impl AsRef<std::path::Path>>,
        bold: Option<impl AsRef<std::path::Path>>,
    ) -> Result<(), PadError> {
        self.alternate = Some(FontSet {
            regular: BitFont::open(regular)?,
            italic: italic.map(BitFont::open).transpose()?,
            bold: bold.map(BitFont::open).transpose()?,
        });
        Ok(())
    }

    /// Toggle between the primary and alternate font set, invalidating
    /// the cache and forcing a full redraw upstream.
    pub fn toggle_font_set(&mut self) {
        if self.alternate.is_some() {
            self.active_alternate = !self.active_alternate;
            self.cache.invalidate_all();
        }
    }

    fn fonts(&self) -> &FontSet {
        if self.active_alternate {
            self.alternate.as_ref().unwrap_or(&self.primary)
        } else {
            &self.primary
        }
    }

    /// Replace the 16-color base palette and role defaults, invalidating
    /// the cache (spec.md §4.4 "must be fully invalidated when ...
    /// color palette change[s]").
    pub fn set_colors(&mut self, palette16: [(u8, u8, u8); 16], default_fg: (u8, u8, u8), default_bg: (u8, u8, u8)) {
        self.palette16 = palette16;
        self.default_fg = default_fg;
        self.default_bg = default_bg;
        self.cache.invalidate_all();
    }

    pub fn configure(&mut self, roff: usize, coff: usize, drows: usize, dcols: usize) {
        self.roff = roff;
        self.coff = coff;
        self.drows = drows;
        self.dcols = dcols;
        self.cache.invalidate_all();
        self.last_fill = None;
    }

    #[must_use]
    pub fn character_rows(&self) -> usize {
        self.drows / self.fonts().regular.rows().max(1)
    }

    #[must_use]
    pub fn character_cols(&self) -> usize {
        self.dcols / self.fonts().regular.cols().max(1)
    }

    #[must_use]
    pub fn pixel_rows(&self) -> usize {
        self.drows
    }

    #[must_use]
    pub fn pixel_cols(&self) -> usize {
        self.dcols
    }

    /// The active font's glyph size in pixels, needed by callers that
    /// compute split-layout boundaries before `configure`-ing this pad
    /// to a subregion (spec.md §4.7 "Layout per tag" rounds split points
    /// to a whole glyph row/column).
    #[must_use]
    pub fn glyph_size(&self) -> (usize, usize) {
        (self.fonts().regular.rows(), self.fonts().regular.cols())
    }

    /// Draw one character cell. `row`/`col` are cell coordinates
    /// relative to the pad's subregion.
    pub fn put(&mut self, ch: u32, row: usize, col: usize, fg: Color, bg: Color, style: fbcell::Style) {
        let bg_rgb = bg.resolve_rgb(&self.palette16, self.default_bg);
        let blank = is_unprintable_or_whitespace(ch);
        let variant = if style.contains(fbcell::Style::BOLD) {
            FontVariant::Bold
        } else if style.contains(fbcell::Style::ITALIC) {
            FontVariant::Italic
        } else {
            FontVariant::Regular
        };

        let fnrows = self.fonts().regular.rows();
        let fncols = self.fonts().regular.cols();
        let bpp = self.surface.borrow().bytes_per_pixel();
        let pixel_row0 = self.roff + row * fnrows;
        let pixel_col0 = self.coff + col * fncols;

        if blank {
            let packed = self.surface.borrow().pack(bg_rgb.0, bg_rgb.1, bg_rgb.2);
            self.fill_pixel_rect(pixel_row0, fnrows, pixel_col0, fncols * bpp, packed);
            return;
        }

        let key = CacheKey { codepoint: ch, fg, bg, variant };
        if let Some(block) = self.cache.lookup(&key) {
            self.blit(pixel_row0, pixel_col0, fnrows, fncols * bpp, block);
            return;
        }

        let block = self.rasterize(ch, fg, bg, variant);
        self.blit(pixel_row0, pixel_col0, fnrows, fncols * bpp, &block);
        self.cache.insert(key, block);
    }

    fn rasterize(&self, ch: u32, fg: Color, bg: Color, variant: FontVariant) -> Vec<u8> {
        let fonts = self.fonts();
        let fnrows = fonts.regular.rows();
        let fncols = fonts.regular.cols();
        let mut coverage = vec![0u8; fnrows * fncols];

        let variant_font = match variant {
            FontVariant::Bold => fonts.bold.as_ref(),
            FontVariant::Italic => fonts.italic.as_ref(),
            FontVariant::Regular => None,
        };

        let hit = match variant_font {
            Some(f) => f.lookup(ch as i32, &mut coverage) || fonts.regular.lookup(ch as i32, &mut coverage),
            None => fonts.regular.lookup(ch as i32, &mut coverage),
        };
        if !hit {
            // Leave coverage at zero, which renders as solid bg (the
            // final-fallback "blank fill" when no font has the glyph).
            tracing::debug!(codepoint = ch, "glyph miss, falling back to blank");
        }

        let fg_rgb = fg.resolve_rgb(&self.palette16, self.default_fg);
        let bg_rgb = bg.resolve_rgb(&self.palette16, self.default_bg);
        let bpp = self.surface.borrow().bytes_per_pixel();
        let mode = self.surface.borrow().mode();

        let mut block = vec![0u8; fnrows * fncols * bpp];
        for (i, &cov) in coverage.iter().enumerate() {
            let r = mix(fg_rgb.0, bg_rgb.0, cov);
            let g = mix(fg_rgb.1, bg_rgb.1, cov);
            let b = mix(fg_rgb.2, bg_rgb.2, cov);
            let packed = mode.pack(r, g, b);
            mode.write_pixel(&mut block[i * bpp..(i + 1) * bpp], packed);
        }
        block
    }

    fn blit(&self, pixel_row0: usize, pixel_col0: usize, rows: usize, row_bytes: usize, block: &[u8]) {
        let bpp = self.surface.borrow().bytes_per_pixel();
        let mut surface = self.surface.borrow_mut();
        for r in 0..rows {
            if pixel_row0 + r >= surface.rows() {
                break;
            }
            let dst_row = surface.row_ptr(pixel_row0 + r);
            let byte_col = pixel_col0 * bpp;
            if byte_col >= dst_row.len() {
                continue;
            }
            let len = row_bytes.min(dst_row.len() - byte_col);
            dst_row[byte_col..byte_col + len].copy_from_slice(&block[r * row_bytes..r * row_bytes + len]);
        }
    }

    fn fill_pixel_rect(&mut self, pixel_row0: usize, rows: usize, pixel_col0: usize, row_bytes: usize, packed: u32) {
        if self.scratch_row.len() < row_bytes {
            self.scratch_row.resize(row_bytes, 0);
        }
        if self.last_fill != Some((packed, row_bytes)) {
            let mode = self.surface.borrow().mode();
            let bpp = mode.bytes_per_pixel as usize;
            for chunk in self.scratch_row[..row_bytes].chunks_mut(bpp) {
                mode.write_pixel(chunk, packed);
            }
            self.last_fill = Some((packed, row_bytes));
        }
        let mut surface = self.surface.borrow_mut();
        let bpp = surface.bytes_per_pixel();
        for r in 0..rows {
            if pixel_row0 + r >= surface.rows() {
                break;
            }
            let dst_row = surface.row_ptr(pixel_row0 + r);
            let byte_col = pixel_col0 * bpp;
            if byte_col >= dst_row.len() {
                continue;
            }
            let len = row_bytes.min(dst_row.len() - byte_col);
            dst_row[byte_col..byte_col + len].copy_from_slice(&self.scratch_row[..len]);
        }
    }

    /// Paint `[row_start, row_end) x [col_start, col_end)` solid `color`.
    /// `-1` for either end means "to the edge of the subregion".
    pub fn fill(&mut self, row_start: usize, row_end: isize, col_start: usize, col_end: isize, color: Color) {
        let crows = self.character_rows();
        let ccols = self.character_cols();
        let row_end = if row_end < 0 { crows } else { (row_end as usize).min(crows) };
        let col_end = if col_end < 0 { ccols } else { (col_end as usize).min(ccols) };
        if row_start >= row_end || col_start >= col_end {
            return;
        }
        let rgb = color.resolve_rgb(&self.palette16, self.default_bg);
        let packed = self.surface.borrow().pack(rgb.0, rgb.1, rgb.2);
        let bpp = self.surface.borrow().bytes_per_pixel();
        let fnrows = self.fonts().regular.rows();
        let fncols = self.fonts().regular.cols();
        let pixel_row0 = self.roff + row_start * fnrows;
        let pixel_rows = (row_end - row_start) * fnrows;
        let pixel_col0 = self.coff + col_start * fncols;
        let row_bytes = (col_end - col_start) * fncols * bpp;
        self.fill_pixel_rect(pixel_row0, pixel_rows, pixel_col0, row_bytes, packed);
    }

    /// Paint a `width`-pixel frame around the subregion.
    pub fn border(&mut self, color: Color, width: usize) -> Result<(), PadError> {
        if width > self.roff || width > self.coff {
            return Err(PadError::BorderTooWide);
        }
        let rgb = color.resolve_rgb(&self.palette16, self.default_bg);
        let packed = self.surface.borrow().pack(rgb.0, rgb.1, rgb.2);
        let bpp = self.surface.borrow().bytes_per_pixel();
        let outer_row0 = self.roff - width;
        let outer_col0 = self.coff - width;
        let outer_cols = (self.dcols + 2 * width) * bpp;

        // top strip
        self.fill_pixel_rect(outer_row0, width, outer_col0, outer_cols, packed);
        // bottom strip
        self.fill_pixel_rect(self.roff + self.drows, width, outer_col0, outer_cols, packed);
        // left/right strips, for the rows in between
        for r in 0..self.drows {
            self.fill_pixel_rect(self.roff + r, 1, outer_col0, width * bpp, packed);
            self.fill_pixel_rect(self.roff + r, 1, self.coff + self.dcols, width * bpp, packed);
        }
        Ok(())
    }
}

fn is_unprintable_or_whitespace(ch: u32) -> bool {
    ch == 0 || ch == b' ' as u32 || ch < 0x20
}

fn mix(fg: u8, bg: u8, coverage: u8) -> u8 {
    let out = bg as i32 + (((fg as i32 - bg as i32) * coverage as i32) >> 8);
    out.clamp(0, 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mix_full_coverage_is_foreground() {
        assert_eq!(mix(200, 10, 255), 199);
        assert_eq!(mix(200, 10, 0), 10);
    }

    #[test]
    fn unprintable_detection() {
        assert!(is_unprintable_or_whitespace(0));
        assert!(is_unprintable_or_whitespace(b' ' as u32));
        assert!(is_unprintable_or_whitespace(0x07));
        assert!(!is_unprintable_or_whitespace(b'A' as u32));
    }
}
