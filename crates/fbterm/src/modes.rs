//! Terminal mode flags (spec.md §3 "Mode flags").

use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct TermModes: u16 {
        const CURSOR_VISIBLE = 1 << 0;
        const AUTOWRAP       = 1 << 1;
        const ORIGIN         = 1 << 2;
        /// Newline (LF/VT/FF) also performs a carriage return.
        const AUTOCR         = 1 << 3;
        const INSERT         = 1 << 4;
        /// Cursor sits at the last column; the next printable wraps first.
        const WRAP_PENDING   = 1 << 5;
        /// Last SGR foreground set was a 0-7 (not bright, not indexed 256,
        /// not truecolor) so bold can brighten it to 8-15.
        const COLORS8        = 1 << 6;
    }
}

impl Default for TermModes {
    fn default() -> Self {
        TermModes::CURSOR_VISIBLE | TermModes::AUTOWRAP
    }
}
