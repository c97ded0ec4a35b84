//! `ESC` + command-key dispatch (spec.md §4.7.2).

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Spawn(u8),
    FlipWithinTag,
    ShowLastTag,
    ListTags,
    NextOpen,
    Quit,
    Screenshot,
    ForceRedraw,
    ReloadConfig,
    Lock,
    ToggleTagLock,
    ScrollBackHalfPage,
    ScrollForwardHalfPage,
    CycleSplitForward,
    CycleSplitBackward,
    ToggleFontSet,
    ShowTag(u8),
    ForwardEscape,
}

const fn ctrl(c: u8) -> u8 {
    c - 96
}

/// Classify the byte following an `ESC` while a tag string is in scope
/// (tag characters are user-configurable, so they're checked last and
/// take priority over nothing else — they never collide with the fixed
/// command bytes below because `conf_tags` is validated at load time).
#[must_use]
pub fn classify(byte: u8, tags: &str) -> Command {
    match byte {
        b'c' => Command::Spawn(b'c'),
        b';' => Command::Spawn(b';'),
        b'm' => Command::Spawn(b'm'),
        b'e' => Command::Spawn(b'e'),
        b'j' | b'k' => Command::FlipWithinTag,
        b'o' => Command::ShowLastTag,
        b'p' => Command::ListTags,
        b'\t' => Command::NextOpen,
        b's' => Command::Screenshot,
        b'y' => Command::ForceRedraw,
        b'f' => Command::ToggleFontSet,
        b',' => Command::ScrollBackHalfPage,
        b'.' => Command::ScrollForwardHalfPage,
        b'=' => Command::CycleSplitForward,
        b'-' => Command::CycleSplitBackward,
        c if c == ctrl(b'q') => Command::Quit,
        c if c == ctrl(b'l') => Command::Lock,
        c if c == ctrl(b'o') => Command::ToggleTagLock,
        c if c == ctrl(b'e') => Command::ReloadConfig,
        c if tags.as_bytes().contains(&c) => Command::ShowTag(c),
        _ => Command::ForwardEscape,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_character_wins_when_not_a_fixed_command() {
        assert_eq!(classify(b'x', "xnlh"), Command::ShowTag(b'x'));
    }

    #[test]
    fn fixed_commands_take_priority_over_tag_membership() {
        // 'c' is never a configured tag in practice, but if it were this
        // still resolves to the shell-spawn command.
        assert_eq!(classify(b'c', "cnlh"), Command::Spawn(b'c'));
    }

    #[test]
    fn ctrl_q_is_quit() {
        assert_eq!(classify(ctrl(b'q'), "xnlh"), Command::Quit);
    }

    #[test]
    fn unknown_byte_forwards_escape_plus_itself() {
        assert_eq!(classify(b'Z', "xnlh"), Command::ForwardEscape);
    }
}
