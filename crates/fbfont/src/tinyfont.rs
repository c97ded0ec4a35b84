//! The "tinyfont" format: an 8-byte signature, a fixed header, a sorted
//! codepoint table, then `n x rows x cols` 8-bit coverage bytes.

use crate::{BitFont, FontError};

pub const MAGIC: &[u8; 8] = b"tinyfont";

const HEADER_LEN: usize = 8 + 4 + 4 + 4 + 4; // magic + version + n + rows + cols

pub fn parse(data: &[u8]) -> Result<BitFont, FontError> {
    if data.len() < HEADER_LEN {
        return Err(FontError::Truncated);
    }
    let version = read_u32(data, 8);
    if version != 0 {
        return Err(FontError::UnknownFormat);
    }
    let n = read_u32(data, 12) as usize;
    let rows = read_u32(data, 16) as usize;
    let cols = read_u32(data, 20) as usize;
    if rows == 0 || cols == 0 {
        return Err(FontError::ZeroGlyphSize);
    }

    let cp_table_start = HEADER_LEN;
    let cp_table_len = n * 4;
    let bitmap_start = cp_table_start + cp_table_len;
    let bitmap_len = n * rows * cols;
    if data.len() < bitmap_start + bitmap_len {
        return Err(FontError::Truncated);
    }

    let codepoints: Vec<i32> = (0..n)
        .map(|i| read_i32(data, cp_table_start + i * 4))
        .collect();
    let bitmaps = data[bitmap_start..bitmap_start + bitmap_len].to_vec();

    Ok(BitFont::from_sorted(rows, cols, codepoints, bitmaps))
}

fn read_u32(data: &[u8], off: usize) -> u32 {
    u32::from_le_bytes(data[off..off + 4].try_into().unwrap())
}

fn read_i32(data: &[u8], off: usize) -> i32 {
    i32::from_le_bytes(data[off..off + 4].try_into().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&0u32.to_le_bytes()); // version
        buf.extend_from_slice(&2u32.to_le_bytes()); // n
        buf.extend_from_slice(&2u32.to_le_bytes()); // rows
        buf.extend_from_slice(&1u32.to_le_bytes()); // cols
        buf.extend_from_slice(&65i32.to_le_bytes());
        buf.extend_from_slice(&97i32.to_le_bytes());
        buf.extend_from_slice(&[10, 20]); // 'A' glyph, 2x1
        buf.extend_from_slice(&[30, 40]); // 'a' glyph
        buf
    }

    #[test]
    fn parses_header_and_glyphs() {
        let font = parse(&sample()).unwrap();
        assert_eq!(font.rows(), 2);
        assert_eq!(font.cols(), 1);
        let mut out = [0u8; 2];
        assert!(font.lookup(65, &mut out));
        assert_eq!(out, [10, 20]);
        assert!(font.lookup(97, &mut out));
        assert_eq!(out, [30, 40]);
    }

    #[test]
    fn rejects_bad_version() {
        let mut data = sample();
        data[8] = 1;
        assert!(matches!(parse(&data), Err(FontError::UnknownFormat)));
    }

    #[test]
    fn rejects_truncated_file() {
        let data = sample();
        assert!(matches!(parse(&data[..10]), Err(FontError::Truncated)));
    }
}
