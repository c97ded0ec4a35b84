//! PSF2 console font format: packed 1-bit glyphs, optional Unicode
//! translation table.

use crate::{BitFont, FontError};

pub const MAGIC: [u8; 4] = [0x72, 0xB5, 0x4A, 0x86];

const HAS_UNICODE_TABLE: u32 = 0x01;
const SEQ_SEPARATOR: u8 = 0xFE;
const ENTRY_TERMINATOR: u8 = 0xFF;

struct Header {
    header_size: u32,
    flags: u32,
    num_glyphs: u32,
    bytes_per_glyph: u32,
    height: u32,
    width: u32,
}

fn read_u32(data: &[u8], off: usize) -> Option<u32> {
    Some(u32::from_le_bytes(data.get(off..off + 4)?.try_into().ok()?))
}

fn parse_header(data: &[u8]) -> Result<Header, FontError> {
    if data.len() < 32 {
        return Err(FontError::Truncated);
    }
    // bytes 0..4 are the magic, already matched by the caller.
    let _version = read_u32(data, 4).ok_or(FontError::Truncated)?;
    let header_size = read_u32(data, 8).ok_or(FontError::Truncated)?;
    let flags = read_u32(data, 12).ok_or(FontError::Truncated)?;
    let num_glyphs = read_u32(data, 16).ok_or(FontError::Truncated)?;
    let bytes_per_glyph = read_u32(data, 20).ok_or(FontError::Truncated)?;
    let height = read_u32(data, 24).ok_or(FontError::Truncated)?;
    let width = read_u32(data, 28).ok_or(FontError::Truncated)?;
    if height == 0 || width == 0 {
        return Err(FontError::ZeroGlyphSize);
    }
    Ok(Header { header_size, flags, num_glyphs, bytes_per_glyph, height, width })
}

pub fn parse(data: &[u8]) -> Result<BitFont, FontError> {
    let hdr = parse_header(data)?;
    let rows = hdr.height as usize;
    let cols = hdr.width as usize;
    let row_bytes = cols.div_ceil(8);

    let glyph_table_start = hdr.header_size as usize;
    let glyph_table_len = hdr.num_glyphs as usize * hdr.bytes_per_glyph as usize;
    let glyph_table_end = glyph_table_start
        .checked_add(glyph_table_len)
        .ok_or(FontError::Truncated)?;
    if data.len() < glyph_table_end {
        return Err(FontError::Truncated);
    }

    let mut bitmaps = vec![0u8; hdr.num_glyphs as usize * rows * cols];
    for glyph_idx in 0..hdr.num_glyphs as usize {
        let src = &data[glyph_table_start + glyph_idx * hdr.bytes_per_glyph as usize..];
        let dst = &mut bitmaps[glyph_idx * rows * cols..(glyph_idx + 1) * rows * cols];
        unpack_1bit_glyph(src, rows, cols, row_bytes, dst);
    }

    let mut pairs: Vec<(i32, u32)> = if hdr.flags & HAS_UNICODE_TABLE != 0 {
        parse_unicode_table(&data[glyph_table_end..], hdr.num_glyphs)?
    } else {
        (0..hdr.num_glyphs).map(|i| (i as i32, i)).collect()
    };
    pairs.sort_by_key(|&(cp, _)| cp);

    let codepoints = pairs.iter().map(|&(cp, _)| cp).collect();
    let ordered_bitmaps = pairs
        .iter()
        .flat_map(|&(_, glyph)| {
            let g = glyph as usize;
            bitmaps[g * rows * cols..(g + 1) * rows * cols].to_vec()
        })
        .collect();

    Ok(BitFont::from_sorted(rows, cols, codepoints, ordered_bitmaps))
}

fn unpack_1bit_glyph(src: &[u8], rows: usize, cols: usize, row_bytes: usize, dst: &mut [u8]) {
    for r in 0..rows {
        let row_src = &src[r * row_bytes..(r + 1) * row_bytes];
        for c in 0..cols {
            let byte = row_src[c / 8];
            let bit = 7 - (c % 8);
            dst[r * cols + c] = if byte & (1 << bit) != 0 { 255 } else { 0 };
        }
    }
}

/// Each glyph contributes a run of UTF-8 codepoint sequences, entries
/// separated by `0xFE` (we only need the first codepoint of a sequence
/// to address a glyph; ligature sequences are not used here) and
/// terminated by `0xFF`.
fn parse_unicode_table(data: &[u8], num_glyphs: u32) -> Result<Vec<(i32, u32)>, FontError> {
    let mut pairs = Vec::new();
    let mut pos = 0usize;
    for glyph in 0..num_glyphs {
        let mut first_in_entry = true;
        loop {
            if pos >= data.len() {
                return Err(FontError::Truncated);
            }
            if data[pos] == ENTRY_TERMINATOR {
                pos += 1;
                break;
            }
            if data[pos] == SEQ_SEPARATOR {
                pos += 1;
                first_in_entry = false;
                continue;
            }
            let (cp, len) = decode_utf8(&data[pos..]).ok_or(FontError::Truncated)?;
            pos += len;
            if first_in_entry {
                pairs.push((cp, glyph));
                first_in_entry = false;
            }
        }
    }
    Ok(pairs)
}

fn decode_utf8(bytes: &[u8]) -> Option<(i32, usize)> {
    let b0 = *bytes.first()?;
    let len = if b0 < 0x80 {
        1
    } else if b0 & 0xE0 == 0xC0 {
        2
    } else if b0 & 0xF0 == 0xE0 {
        3
    } else if b0 & 0xF8 == 0xF0 {
        4
    } else {
        return None;
    };
    let s = std::str::from_utf8(bytes.get(..len)?).ok()?;
    s.chars().next().map(|c| (c as i32, len))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_no_table() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC);
        buf.extend_from_slice(&0u32.to_le_bytes()); // version
        buf.extend_from_slice(&32u32.to_le_bytes()); // header size
        buf.extend_from_slice(&0u32.to_le_bytes()); // flags
        buf.extend_from_slice(&2u32.to_le_bytes()); // num glyphs
        buf.extend_from_slice(&2u32.to_le_bytes()); // bytes per glyph (2 rows x 1 byte)
        buf.extend_from_slice(&2u32.to_le_bytes()); // height
        buf.extend_from_slice(&4u32.to_le_bytes()); // width (<=8 so row_bytes=1)
        buf.extend_from_slice(&[0b1010_0000, 0b0101_0000]); // glyph 0
        buf.extend_from_slice(&[0b1111_0000, 0b0000_0000]); // glyph 1
        buf
    }

    #[test]
    fn identity_mapping_without_unicode_table() {
        let font = parse(&sample_no_table()).unwrap();
        assert_eq!(font.rows(), 2);
        assert_eq!(font.cols(), 4);
        let mut out = [0u8; 8];
        assert!(font.lookup(0, &mut out));
        assert_eq!(out, [255, 0, 255, 0, 0, 255, 0, 255]);
    }

    #[test]
    fn with_unicode_table() {
        let mut buf = sample_no_table();
        buf[12] = 1; // HAS_UNICODE_TABLE
        // glyph 0 -> 'A' (0x41), glyph 1 -> 'B' (0x42)
        buf.push(b'A');
        buf.push(ENTRY_TERMINATOR);
        buf.push(b'B');
        buf.push(ENTRY_TERMINATOR);
        let font = parse(&buf).unwrap();
        let mut out = [0u8; 8];
        assert!(font.lookup(b'A' as i32, &mut out));
        assert_eq!(out, [255, 0, 255, 0, 0, 255, 0, 255]);
        assert!(!font.lookup(0, &mut out));
        assert!(font.lookup(b'B' as i32, &mut out));
        assert_eq!(out, [255, 255, 255, 255, 0, 0, 0, 0]);
    }
}
