//! Double-width / zero-width classification for terminal codepoints.
//!
//! Pure, table-driven predicates: no terminal, no pty, no rendering
//! concerns. The ranges are the same shape as the Unicode East Asian
//! Width property (`W`/`F` => double-wide) and the combining-class data
//! (`Mn`/`Me` => zero-width) that other terminal emulators bake in.

/// Inclusive codepoint ranges, sorted ascending and non-overlapping.
type Range = (u32, u32);

/// CJK ideographs, kana, hangul, fullwidth forms, emoji presentation.
const DOUBLE_WIDE: &[Range] = &[
    (0x1100, 0x115F),   // Hangul Jamo
    (0x2329, 0x232A),   // angle brackets
    (0x2E80, 0x303E),   // CJK radicals, kangxi, CJK symbols & punctuation
    (0x3041, 0x33FF),   // hiragana .. CJK compatibility
    (0x3400, 0x4DBF),   // CJK extension A
    (0x4E00, 0x9FFF),   // CJK unified ideographs
    (0xA000, 0xA4CF),   // Yi syllables and radicals
    (0xAC00, 0xD7A3),   // Hangul syllables
    (0xF900, 0xFAFF),   // CJK compatibility ideographs
    (0xFE30, 0xFE4F),   // CJK compatibility forms
    (0xFF00, 0xFF60),   // fullwidth forms
    (0xFFE0, 0xFFE6),   // fullwidth signs
    (0x16FE0, 0x16FE4),
    (0x17000, 0x187F7), // Tangut
    (0x18800, 0x18CD5),
    (0x18D00, 0x18D08),
    (0x1AFF0, 0x1AFFF),
    (0x1B000, 0x1B2FB), // kana extensions
    (0x1F004, 0x1F004),
    (0x1F0CF, 0x1F0CF),
    (0x1F18E, 0x1F18E),
    (0x1F191, 0x1F19A),
    (0x1F200, 0x1F320), // enclosed ideographic supplement
    (0x1F32D, 0x1F335),
    (0x1F337, 0x1F37C),
    (0x1F37E, 0x1F393),
    (0x1F3A0, 0x1F3CA),
    (0x1F3CF, 0x1F3D3),
    (0x1F3E0, 0x1F3F0),
    (0x1F3F4, 0x1F3F4),
    (0x1F3F8, 0x1F43E),
    (0x1F440, 0x1F440),
    (0x1F442, 0x1F4FC),
    (0x1F4FF, 0x1F53D),
    (0x1F54B, 0x1F54E),
    (0x1F550, 0x1F567),
    (0x1F57A, 0x1F57A),
    (0x1F595, 0x1F596),
    (0x1F5A4, 0x1F5A4),
    (0x1F5FB, 0x1F64F), // emoji presentation, faces
    (0x1F680, 0x1F6C5),
    (0x1F6CC, 0x1F6CC),
    (0x1F6D0, 0x1F6D2),
    (0x1F6D5, 0x1F6D7),
    (0x1F6DD, 0x1F6DF),
    (0x1F6EB, 0x1F6EC),
    (0x1F6F4, 0x1F6FC),
    (0x1F7E0, 0x1F7EB),
    (0x1F7F0, 0x1F7F0),
    (0x1F90C, 0x1F93A),
    (0x1F93C, 0x1F945),
    (0x1F947, 0x1F9FF),
    (0x1FA70, 0x1FAFF),
    (0x20000, 0x3FFFD), // CJK extension B..supplement
];

/// Combining marks, variation selectors, zero-width joiners/space.
const ZERO_WIDTH: &[Range] = &[
    (0x0000, 0x001F), // C0 controls: not printable width, handled by caller
    (0x007F, 0x009F), // DEL and C1 controls
    (0x0300, 0x036F), // combining diacritical marks
    (0x0483, 0x0489),
    (0x0591, 0x05BD),
    (0x05BF, 0x05BF),
    (0x05C1, 0x05C2),
    (0x05C4, 0x05C5),
    (0x05C7, 0x05C7),
    (0x0610, 0x061A),
    (0x064B, 0x065F),
    (0x0670, 0x0670),
    (0x06D6, 0x06DC),
    (0x06DF, 0x06E4),
    (0x06E7, 0x06E8),
    (0x06EA, 0x06ED),
    (0x0711, 0x0711),
    (0x0730, 0x074A),
    (0x07A6, 0x07B0),
    (0x07EB, 0x07F3),
    (0x0816, 0x0819),
    (0x081B, 0x0823),
    (0x0825, 0x0827),
    (0x0829, 0x082D),
    (0x0859, 0x085B),
    (0x08E3, 0x0902),
    (0x093A, 0x093A),
    (0x093C, 0x093C),
    (0x0941, 0x0948),
    (0x094D, 0x094D),
    (0x0951, 0x0957),
    (0x0962, 0x0963),
    (0x200B, 0x200F), // zero width space, ZWJ/ZWNJ, direction marks
    (0x202A, 0x202E),
    (0x2060, 0x2064),
    (0x2066, 0x206F),
    (0xFE00, 0xFE0F), // variation selectors
    (0xFE20, 0xFE2F), // combining half marks
    (0xFEFF, 0xFEFF), // byte order mark
    (0x1D167, 0x1D169),
    (0x1D173, 0x1D182),
    (0x1D185, 0x1D18B),
    (0x1D1AA, 0x1D1AD),
    (0xE0100, 0xE01EF), // variation selectors supplement
];

fn in_ranges(table: &[Range], cp: u32) -> bool {
    table
        .binary_search_by(|&(lo, hi)| {
            if cp < lo {
                core::cmp::Ordering::Greater
            } else if cp > hi {
                core::cmp::Ordering::Less
            } else {
                core::cmp::Ordering::Equal
            }
        })
        .is_ok()
}

/// Returns true if `cp` occupies two terminal cells.
#[must_use]
pub fn is_double_wide(cp: u32) -> bool {
    in_ranges(DOUBLE_WIDE, cp)
}

/// Returns true if `cp` occupies zero terminal cells (combining marks,
/// joiners, BOM). C0/C1 control codes are reported zero-width here too;
/// callers that need to distinguish "control, handled elsewhere" from
/// "printable combining mark" should special-case codepoints `< 0x20`
/// themselves, as the VT102 ground-state dispatcher already does.
#[must_use]
pub fn is_zero_width(cp: u32) -> bool {
    in_ranges(ZERO_WIDTH, cp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_is_narrow() {
        for cp in 0x20..0x7F {
            assert!(!is_double_wide(cp), "{cp:#x} should not be double-wide");
            assert!(!is_zero_width(cp), "{cp:#x} should not be zero-width");
        }
    }

    #[test]
    fn cjk_ideograph_is_double_wide() {
        assert!(is_double_wide(0x4E2D)); // 中
        assert!(is_double_wide(0x65E5)); // 日
    }

    #[test]
    fn hangul_syllable_is_double_wide() {
        assert!(is_double_wide(0xAC00));
    }

    #[test]
    fn combining_mark_is_zero_width() {
        assert!(is_zero_width(0x0301)); // combining acute accent
        assert!(is_zero_width(0x200D)); // ZWJ
    }

    #[test]
    fn ranges_sorted_and_disjoint() {
        for table in [DOUBLE_WIDE, ZERO_WIDTH] {
            for w in table.windows(2) {
                assert!(w[0].1 < w[1].0, "ranges must be sorted and disjoint");
            }
        }
    }

    #[test]
    fn emoji_presentation_is_double_wide() {
        assert!(is_double_wide(0x1F600));
    }
}
