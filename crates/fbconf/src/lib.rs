//! C8: configuration surface.
//!
//! spec.md §4.8 treats the on-disk format as out of scope ("the engine
//! only consumes the accessor API") and only names the fields the
//! accessor must expose. `Config` is that opaque accessor trait;
//! [`TomlConfig`] is the one concrete, reloadable implementation this
//! crate ships so the rest of the workspace has something real to load
//! and Ctrl-E (reload config, spec.md §4.7.2) has something to reload.

mod toml_config;

pub use toml_config::TomlConfig;

use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("failed to read config file: {_0}")]
    Io(std::io::Error),
    #[display("failed to parse config file: {_0}")]
    Parse(toml::de::Error),
}

/// 24-bit RGB.
pub type Rgb = (u8, u8, u8);

/// Opaque accessor surface every component that needs configuration
/// consumes. Never exposes how the values were sourced.
pub trait Config {
    /// Tag characters, in display order (spec.md §3 "`NTAGS` is the
    /// count of tag characters ... bounded ≤ 32").
    fn tags(&self) -> &str;
    /// Subset of `tags()` whose terminals get pixel snapshots on hide.
    fn saved_tags(&self) -> &str;
    fn default_fg(&self) -> Rgb;
    fn default_bg(&self) -> Rgb;
    /// Base of the 256-color palette's first 16 entries.
    fn palette16(&self) -> &[Rgb; 16];
    /// `None` means "use the cell's colors swapped" (spec.md §4.8).
    fn cursor_fg(&self) -> Option<Rgb>;
    fn cursor_bg(&self) -> Option<Rgb>;
    fn border_color(&self) -> Rgb;
    fn border_width(&self) -> usize;
    /// Value exported as `TERM` to spawned children.
    fn term_name(&self) -> &str;
    fn screenshot_path(&self) -> &str;
    fn font_regular(&self) -> &str;
    fn font_italic(&self) -> Option<&str>;
    fn font_bold(&self) -> Option<&str>;
    /// Second font triple (spec.md §2 "alternate font set toggle").
    fn alt_font_regular(&self) -> Option<&str>;
    fn alt_font_italic(&self) -> Option<&str>;
    fn alt_font_bold(&self) -> Option<&str>;
    /// `None` disables the lock command entirely.
    fn password(&self) -> Option<&str>;
    fn quit_confirm_key(&self) -> u8;
    fn bold_brightens(&self) -> bool;
    /// `command key -> argv` for spawn commands (e.g. `c -> ["sh"]`).
    fn command_argv(&self, key: u8) -> Option<&[String]>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub;
    impl Config for Stub {
        fn tags(&self) -> &str {
            "xn"
        }
        fn saved_tags(&self) -> &str {
            ""
        }
        fn default_fg(&self) -> Rgb {
            (0, 0, 0)
        }
        fn default_bg(&self) -> Rgb {
            (255, 255, 255)
        }
        fn palette16(&self) -> &[Rgb; 16] {
            &[(0, 0, 0); 16]
        }
        fn cursor_fg(&self) -> Option<Rgb> {
            None
        }
        fn cursor_bg(&self) -> Option<Rgb> {
            None
        }
        fn border_color(&self) -> Rgb {
            (128, 128, 128)
        }
        fn border_width(&self) -> usize {
            1
        }
        fn term_name(&self) -> &str {
            "linux"
        }
        fn screenshot_path(&self) -> &str {
            "/tmp/scr"
        }
        fn font_regular(&self) -> &str {
            "/font.tf"
        }
        fn font_italic(&self) -> Option<&str> {
            None
        }
        fn font_bold(&self) -> Option<&str> {
            None
        }
        fn alt_font_regular(&self) -> Option<&str> {
            None
        }
        fn alt_font_italic(&self) -> Option<&str> {
            None
        }
        fn alt_font_bold(&self) -> Option<&str> {
            None
        }
        fn password(&self) -> Option<&str> {
            None
        }
        fn quit_confirm_key(&self) -> u8 {
            b'y'
        }
        fn bold_brightens(&self) -> bool {
            true
        }
        fn command_argv(&self, _key: u8) -> Option<&[String]> {
            None
        }
    }

    #[test]
    fn trait_object_is_usable_behind_a_reference() {
        let stub = Stub;
        let cfg: &dyn Config = &stub;
        assert_eq!(cfg.tags(), "xn");
        assert!(cfg.password().is_none());
    }
}
