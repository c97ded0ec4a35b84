//! Per-tag split layout (spec.md §4.7 "Layout per tag").

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum SplitMode {
    #[default]
    Single,
    Horizontal,
    Vertical,
}

impl SplitMode {
    #[must_use]
    pub fn cycle_forward(self) -> Self {
        match self {
            SplitMode::Single => SplitMode::Horizontal,
            SplitMode::Horizontal => SplitMode::Vertical,
            SplitMode::Vertical => SplitMode::Single,
        }
    }

    #[must_use]
    pub fn cycle_backward(self) -> Self {
        match self {
            SplitMode::Single => SplitMode::Vertical,
            SplitMode::Vertical => SplitMode::Horizontal,
            SplitMode::Horizontal => SplitMode::Single,
        }
    }

    #[must_use]
    pub fn is_split(self) -> bool {
        self != SplitMode::Single
    }
}

/// A pixel subregion, in the shape `Pad::configure` expects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub roff: usize,
    pub coff: usize,
    pub drows: usize,
    pub dcols: usize,
}

/// Compute the primary half's rect and, for a split, the secondary
/// half's rect. `glyph_rows`/`glyph_cols` round the split point down to
/// a whole glyph row/column so neither half clips a cell.
#[must_use]
pub fn compute(
    split: SplitMode,
    surface_rows: usize,
    surface_cols: usize,
    border: usize,
    glyph_rows: usize,
    glyph_cols: usize,
) -> (Rect, Option<Rect>) {
    match split {
        SplitMode::Single => (
            Rect { roff: 0, coff: 0, drows: surface_rows, dcols: surface_cols },
            None,
        ),
        SplitMode::Horizontal => {
            let step = glyph_rows.max(1);
            let top_drows = (surface_rows / 2) / step * step;
            let bot_roff = top_drows + border;
            let bot_drows = surface_rows.saturating_sub(bot_roff);
            let inset_cols = surface_cols.saturating_sub(2 * border);
            let top = Rect { roff: 0, coff: border, drows: top_drows, dcols: inset_cols };
            let bot = Rect { roff: bot_roff, coff: border, drows: bot_drows, dcols: inset_cols };
            (top, Some(bot))
        }
        SplitMode::Vertical => {
            let step = glyph_cols.max(1);
            let left_dcols = (surface_cols / 2) / step * step;
            let right_coff = left_dcols + border;
            let right_dcols = surface_cols.saturating_sub(right_coff);
            let inset_rows = surface_rows.saturating_sub(2 * border);
            let left = Rect { roff: border, coff: 0, drows: inset_rows, dcols: left_dcols };
            let right = Rect { roff: border, coff: right_coff, drows: inset_rows, dcols: right_dcols };
            (left, Some(right))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_covers_the_whole_surface() {
        let (primary, secondary) = compute(SplitMode::Single, 480, 640, 2, 16, 8);
        assert_eq!(primary, Rect { roff: 0, coff: 0, drows: 480, dcols: 640 });
        assert!(secondary.is_none());
    }

    #[test]
    fn horizontal_split_rounds_to_whole_glyph_rows_and_insets_sides() {
        let (top, bot) = compute(SplitMode::Horizontal, 481, 640, 2, 16, 8);
        let bot = bot.unwrap();
        assert_eq!(top.drows % 16, 0);
        assert_eq!(top.coff, 2);
        assert_eq!(bot.coff, 2);
        assert_eq!(top.roff + top.drows + 2, bot.roff);
        assert_eq!(bot.roff + bot.drows, 481);
    }

    #[test]
    fn vertical_split_rounds_to_whole_glyph_cols() {
        let (left, right) = compute(SplitMode::Vertical, 480, 641, 2, 16, 8);
        let right = right.unwrap();
        assert_eq!(left.dcols % 8, 0);
        assert_eq!(left.roff, 2);
        assert_eq!(right.roff, 2);
    }

    #[test]
    fn cycle_forward_then_backward_is_identity() {
        for m in [SplitMode::Single, SplitMode::Horizontal, SplitMode::Vertical] {
            assert_eq!(m.cycle_forward().cycle_backward(), m);
        }
    }
}
