//! Set-associative glyph cache: `(codepoint, fg, bg, variant) -> blitted
//! pixel block`, 128 slots x 16 ways, slot = `codepoint & 127` (spec.md
//! §4.4 "Glyph cache").

use fbcell::Color;

const SLOTS: usize = 128;
const WAYS: usize = 16;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub codepoint: u32,
    pub fg: Color,
    pub bg: Color,
    pub variant: FontVariant,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum FontVariant {
    Regular,
    Italic,
    Bold,
}

struct Way {
    key: Option<CacheKey>,
    pixels: Vec<u8>,
}

impl Default for Way {
    fn default() -> Self {
        Way { key: None, pixels: Vec::new() }
    }
}

/// Owns the set-associative glyph cache. Invalidated wholesale whenever
/// the pad's fonts, geometry, or palette change.
pub struct GlyphCache {
    slots: Vec<[Way; WAYS]>,
    next_way: Vec<u8>,
}

impl GlyphCache {
    pub fn new() -> Self {
        GlyphCache {
            slots: (0..SLOTS).map(|_| std::array::from_fn(|_| Way::default())).collect(),
            next_way: vec![0; SLOTS],
        }
    }

    fn slot_of(codepoint: u32) -> usize {
        (codepoint & (SLOTS as u32 - 1)) as usize
    }

    pub fn lookup(&self, key: &CacheKey) -> Option<&[u8]> {
        let slot = &self.slots[Self::slot_of(key.codepoint)];
        slot.iter().find(|w| w.key.as_ref() == Some(key)).map(|w| w.pixels.as_slice())
    }

    /// Insert `pixels` for `key`, evicting whatever the round-robin way
    /// pointer for this slot currently holds.
    pub fn insert(&mut self, key: CacheKey, pixels: Vec<u8>) {
        let slot_idx = Self::slot_of(key.codepoint);
        let way = self.next_way[slot_idx] as usize % WAYS;
        self.slots[slot_idx][way] = Way { key: Some(key), pixels };
        self.next_way[slot_idx] = ((way + 1) % WAYS) as u8;
    }

    pub fn invalidate_all(&mut self) {
        for slot in &mut self.slots {
            for way in slot.iter_mut() {
                way.key = None;
                way.pixels.clear();
            }
        }
        self.next_way.iter_mut().for_each(|w| *w = 0);
    }
}

impl Default for GlyphCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fbcell::Style;

    fn key(cp: u32) -> CacheKey {
        CacheKey { codepoint: cp, fg: Color::Default, bg: Color::Default, variant: FontVariant::Regular }
    }

    #[test]
    fn miss_then_hit() {
        let mut cache = GlyphCache::new();
        assert!(cache.lookup(&key(65)).is_none());
        cache.insert(key(65), vec![1, 2, 3]);
        assert_eq!(cache.lookup(&key(65)), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn distinct_style_is_a_distinct_key() {
        let mut cache = GlyphCache::new();
        let bold_key = CacheKey { variant: FontVariant::Bold, ..key(65) };
        cache.insert(key(65), vec![1]);
        assert!(cache.lookup(&bold_key).is_none());
        let _ = Style::BOLD;
    }

    #[test]
    fn round_robin_eviction_wraps_after_ways() {
        let mut cache = GlyphCache::new();
        // All these codepoints collide in slot 0.
        for i in 0..(WAYS as u32 + 1) {
            cache.insert(key(i * SLOTS as u32), vec![i as u8]);
        }
        // The first inserted key was evicted once the (WAYS+1)th landed.
        assert!(cache.lookup(&key(0)).is_none());
        assert_eq!(cache.lookup(&key(WAYS as u32 * SLOTS as u32)), Some(&[WAYS as u8][..]));
    }

    #[test]
    fn invalidate_all_clears_every_entry() {
        let mut cache = GlyphCache::new();
        cache.insert(key(65), vec![9]);
        cache.invalidate_all();
        assert!(cache.lookup(&key(65)).is_none());
    }
}
