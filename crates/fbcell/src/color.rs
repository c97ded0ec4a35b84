//! Cell color model: palette indices, the 256-color cube/ramp, and
//! 12-bit truecolor, all packed into a single machine word per cell.

use bitflags::bitflags;

bitflags! {
    /// Font-variant bits carried per cell alongside its colors.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct Style: u8 {
        const BOLD    = 0b0000_0001;
        const ITALIC  = 0b0000_0010;
        const REVERSE = 0b0000_0100;
    }
}

/// A foreground or background color as the terminal engine manipulates
/// it. Converts losslessly to and from the packed [`ColorWord`] half
/// used for on-grid storage and glyph cache keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Color {
    /// "Use whatever the terminal's current default is for this role."
    /// Cleared cells always carry this so the invariant in spec.md §3
    /// ("if codepoint == 0, fg/bg equal the terminal's defaults") holds
    /// even across a later default-color change via `OSC` (skipped) or
    /// reset.
    Default,
    /// 0-15 named, 16-231 6x6x6 cube, 232-255 grayscale ramp.
    Indexed(u8),
    /// 4 bits per channel, as resolved by spec.md §9's open question.
    TrueColor { r: u8, g: u8, b: u8 },
}

impl Default for Color {
    fn default() -> Self {
        Color::Default
    }
}

impl Color {
    /// Brighten a `0..=7` index to its `8..=15` bold counterpart. Any
    /// other color is unaffected, matching SGR 1's documented behavior
    /// (spec.md §4.6.4).
    #[must_use]
    pub fn brighten(self) -> Self {
        match self {
            Color::Indexed(i) if i < 8 => Color::Indexed(i + 8),
            other => other,
        }
    }

    /// Quantize to 4 bits per channel and store as truecolor, as SGR
    /// `38;2;R;G;B` / `48;2;R;G;B` do.
    #[must_use]
    pub fn truecolor(r: u8, g: u8, b: u8) -> Self {
        Color::TrueColor {
            r: r >> 4,
            g: g >> 4,
            b: b >> 4,
        }
    }

    /// Resolve the 24-bit RGB this color paints, given a 16-entry base
    /// palette and the default fg/bg pair, for the pad to rasterize.
    #[must_use]
    pub fn resolve_rgb(self, palette16: &[(u8, u8, u8); 16], default: (u8, u8, u8)) -> (u8, u8, u8) {
        match self {
            Color::Default => default,
            Color::Indexed(i) => indexed_to_rgb(i, palette16),
            Color::TrueColor { r, g, b } => (r << 4 | r, g << 4 | g, b << 4 | b),
        }
    }
}

/// Resolve a 0-255 palette index to 24-bit RGB: 0-15 from the
/// configured 16-color table, 16-231 the 6x6x6 color cube, 232-255 a
/// 24-step grayscale ramp. This is the standard xterm-256color mapping.
#[must_use]
pub fn indexed_to_rgb(index: u8, palette16: &[(u8, u8, u8); 16]) -> (u8, u8, u8) {
    match index {
        0..=15 => palette16[index as usize],
        16..=231 => {
            let i = index as u32 - 16;
            let r = i / 36;
            let g = (i / 6) % 6;
            let b = i % 6;
            (cube_step(r), cube_step(g), cube_step(b))
        }
        232..=255 => {
            let level = (index as u32 - 232) * 10 + 8;
            (level as u8, level as u8, level as u8)
        }
    }
}

fn cube_step(level: u32) -> u8 {
    if level == 0 { 0 } else { (55 + level * 40) as u8 }
}

/// Packed on-grid representation of one cell's fg+bg+style, 32 bits:
/// `[ 3 bits style | 13 bits bg | 13 bits fg | pad(3) ]`. Bit 12 of each
/// 13-bit half marks "use the role default"; bit 11 marks truecolor vs
/// indexed, mirroring the layout described informally in spec.md §3
/// ("packed color/style word").
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ColorWord(u32);

const DEFAULT_BIT: u32 = 1 << 12;
const TRUECOLOR_BIT: u32 = 1 << 11;
const HALF_MASK: u32 = (1 << 13) - 1;

impl ColorWord {
    #[must_use]
    pub fn new(fg: Color, bg: Color, style: Style) -> Self {
        let fg_bits = encode_half(fg);
        let bg_bits = encode_half(bg);
        ColorWord(fg_bits | (bg_bits << 13) | ((style.bits() as u32) << 26))
    }

    #[must_use]
    pub fn fg(self) -> Color {
        decode_half(self.0 & HALF_MASK)
    }

    #[must_use]
    pub fn bg(self) -> Color {
        decode_half((self.0 >> 13) & HALF_MASK)
    }

    #[must_use]
    pub fn style(self) -> Style {
        Style::from_bits_truncate(((self.0 >> 26) & 0b111) as u8)
    }

    #[must_use]
    pub fn with_fg(self, fg: Color) -> Self {
        ColorWord::new(fg, self.bg(), self.style())
    }

    #[must_use]
    pub fn with_bg(self, bg: Color) -> Self {
        ColorWord::new(self.fg(), bg, self.style())
    }

    #[must_use]
    pub fn with_style(self, style: Style) -> Self {
        ColorWord::new(self.fg(), self.bg(), style)
    }

    /// The word cleared cells carry: default fg/bg, no style. See the
    /// codepoint-0 invariant in spec.md §3/§8.
    #[must_use]
    pub fn blank() -> Self {
        ColorWord::new(Color::Default, Color::Default, Style::empty())
    }

    #[must_use]
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl core::fmt::Debug for ColorWord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ColorWord")
            .field("fg", &self.fg())
            .field("bg", &self.bg())
            .field("style", &self.style())
            .finish()
    }
}

fn encode_half(c: Color) -> u32 {
    match c {
        Color::Default => DEFAULT_BIT,
        Color::Indexed(i) => i as u32,
        Color::TrueColor { r, g, b } => {
            TRUECOLOR_BIT | ((r as u32 & 0xF) << 8) | ((g as u32 & 0xF) << 4) | (b as u32 & 0xF)
        }
    }
}

fn decode_half(bits: u32) -> Color {
    if bits & DEFAULT_BIT != 0 {
        Color::Default
    } else if bits & TRUECOLOR_BIT != 0 {
        Color::TrueColor {
            r: ((bits >> 8) & 0xF) as u8,
            g: ((bits >> 4) & 0xF) as u8,
            b: (bits & 0xF) as u8,
        }
    } else {
        Color::Indexed((bits & 0xFF) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn round_trips_default() {
        let w = ColorWord::new(Color::Default, Color::Default, Style::empty());
        assert_eq!(w.fg(), Color::Default);
        assert_eq!(w.bg(), Color::Default);
    }

    #[test]
    fn round_trips_indexed() {
        let w = ColorWord::new(Color::Indexed(200), Color::Indexed(1), Style::BOLD);
        assert_eq!(w.fg(), Color::Indexed(200));
        assert_eq!(w.bg(), Color::Indexed(1));
        assert_eq!(w.style(), Style::BOLD);
    }

    #[test]
    fn round_trips_truecolor_quantized() {
        let fg = Color::truecolor(255, 0, 16);
        let w = ColorWord::new(fg, Color::Default, Style::empty());
        assert_eq!(w.fg(), Color::TrueColor { r: 0xF, g: 0x0, b: 0x1 });
    }

    #[test]
    fn brighten_only_affects_low_eight() {
        assert_eq!(Color::Indexed(3).brighten(), Color::Indexed(11));
        assert_eq!(Color::Indexed(11).brighten(), Color::Indexed(11));
        assert_eq!(Color::Default.brighten(), Color::Default);
    }

    #[test]
    fn cube_corners() {
        let pal = [(0, 0, 0); 16];
        assert_eq!(indexed_to_rgb(16, &pal), (0, 0, 0));
        assert_eq!(indexed_to_rgb(231, &pal), (255, 255, 255));
        assert_eq!(indexed_to_rgb(232, &pal), (8, 8, 8));
        assert_eq!(indexed_to_rgb(255, &pal), (238, 238, 238));
    }
}
