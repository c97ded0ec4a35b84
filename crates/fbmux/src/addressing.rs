//! Terminal-slot addressing over the `2 x NTAGS` array (spec.md §4.7
//! "Addressing"). Pure index arithmetic, kept free of `Multiplexer`
//! state so it can be tested on its own.

/// Which tag a slot belongs to.
#[must_use]
pub fn tag_of(slot: usize, ntags: usize) -> usize {
    slot % ntags
}

/// Which half of that tag's pair a slot is: `0` (top/primary group) or
/// `1` (bottom/secondary group), mirroring the original's `n / NTAGS`.
#[must_use]
pub fn group_of(slot: usize, ntags: usize) -> usize {
    slot / ntags
}

#[must_use]
pub fn top_half(slot: usize, ntags: usize) -> bool {
    group_of(slot, ntags) == 0
}

#[must_use]
pub fn slot_of(tag: usize, group: usize, ntags: usize) -> usize {
    group * ntags + tag
}

/// The other slot sharing `slot`'s tag.
#[must_use]
pub fn other_in_tag(slot: usize, ntags: usize) -> usize {
    slot_of(tag_of(slot, ntags), 1 - group_of(slot, ntags), ntags)
}

/// Linear search forward from `slot + 1`, wrapping, for the first slot
/// for which `is_open` returns true. Returns `slot` itself if none
/// other is open.
pub fn next_open(slot: usize, nterms: usize, mut is_open: impl FnMut(usize) -> bool) -> usize {
    let mut n = (slot + 1) % nterms;
    while n != slot {
        if is_open(n) {
            break;
        }
        n = (n + 1) % nterms;
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_and_group_round_trip() {
        let ntags = 8;
        for slot in 0..ntags * 2 {
            let t = tag_of(slot, ntags);
            let g = group_of(slot, ntags);
            assert_eq!(slot_of(t, g, ntags), slot);
        }
    }

    #[test]
    fn other_in_tag_swaps_group_only() {
        let ntags = 8;
        assert_eq!(other_in_tag(3, ntags), 11);
        assert_eq!(other_in_tag(11, ntags), 3);
    }

    #[test]
    fn next_open_skips_closed_slots() {
        let open = [false, false, true, false];
        let n = next_open(0, 4, |i| open[i]);
        assert_eq!(n, 2);
    }

    #[test]
    fn next_open_returns_self_when_nothing_else_open() {
        let open = [true, false, false, false];
        let n = next_open(0, 4, |i| open[i]);
        assert_eq!(n, 0);
    }
}
