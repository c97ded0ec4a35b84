use crate::{Config, ConfigError, Rgb};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The on-disk shape. Colors are `[r, g, b]` triples; `command_argv`
/// keys are single-character strings so the format stays human-typable.
#[derive(Debug, Clone, Deserialize)]
struct Raw {
    #[serde(default = "default_tags")]
    tags: String,
    #[serde(default)]
    saved_tags: String,
    #[serde(default = "default_fg")]
    default_fg: [u8; 3],
    #[serde(default = "default_bg")]
    default_bg: [u8; 3],
    #[serde(default = "default_palette16")]
    palette16: Vec<[u8; 3]>,
    #[serde(default)]
    cursor_fg: Option<[u8; 3]>,
    #[serde(default)]
    cursor_bg: Option<[u8; 3]>,
    #[serde(default = "default_border_color")]
    border_color: [u8; 3],
    #[serde(default = "default_border_width")]
    border_width: usize,
    #[serde(default = "default_term_name")]
    term_name: String,
    #[serde(default = "default_screenshot_path")]
    screenshot_path: String,
    font_regular: String,
    #[serde(default)]
    font_italic: Option<String>,
    #[serde(default)]
    font_bold: Option<String>,
    #[serde(default)]
    alt_font_regular: Option<String>,
    #[serde(default)]
    alt_font_italic: Option<String>,
    #[serde(default)]
    alt_font_bold: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default = "default_quit_confirm_key")]
    quit_confirm_key: String,
    #[serde(default = "default_bold_brightens")]
    bold_brightens: bool,
    #[serde(default = "default_command_argv")]
    command_argv: HashMap<String, Vec<String>>,
}

fn default_tags() -> String {
    "xnlhtr01".into()
}
fn default_fg() -> [u8; 3] {
    [0x00, 0x00, 0x00]
}
fn default_bg() -> [u8; 3] {
    [0xff, 0xff, 0xff]
}
fn default_border_color() -> [u8; 3] {
    [0x55, 0x55, 0x55]
}
fn default_border_width() -> usize {
    1
}
fn default_term_name() -> String {
    "linux".into()
}
fn default_screenshot_path() -> String {
    "/tmp/scr".into()
}
fn default_quit_confirm_key() -> String {
    "y".into()
}
fn default_bold_brightens() -> bool {
    true
}
fn default_command_argv() -> HashMap<String, Vec<String>> {
    let mut m = HashMap::new();
    m.insert("c".into(), vec!["sh".into()]);
    m.insert(";".into(), vec!["sh".into()]);
    m.insert("e".into(), vec!["vi".into()]);
    m.insert("m".into(), vec!["mailx".into(), "-f".into(), "+inbox".into()]);
    m
}

/// The xterm-256color base 16, matching the original's `COLOR0..COLORF`.
fn default_palette16() -> Vec<[u8; 3]> {
    vec![
        [0x00, 0x00, 0x00],
        [0xaa, 0x00, 0x00],
        [0x00, 0xaa, 0x00],
        [0xaa, 0x55, 0x00],
        [0x00, 0x00, 0xaa],
        [0xaa, 0x00, 0xaa],
        [0x00, 0xaa, 0xaa],
        [0xaa, 0xaa, 0xaa],
        [0x55, 0x55, 0x55],
        [0xff, 0x55, 0x55],
        [0x55, 0xff, 0x55],
        [0xff, 0xff, 0x55],
        [0x55, 0x55, 0xff],
        [0xff, 0x55, 0xff],
        [0x55, 0xff, 0xff],
        [0xff, 0xff, 0xff],
    ]
}

pub struct TomlConfig {
    raw: Raw,
    path: PathBuf,
    command_argv: HashMap<u8, Vec<String>>,
    palette16: [Rgb; 16],
}

impl TomlConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<TomlConfig, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let text = std::fs::read_to_string(&path).map_err(ConfigError::Io)?;
        let raw: Raw = toml::from_str(&text).map_err(ConfigError::Parse)?;
        Ok(Self::from_raw(raw, path))
    }

    /// Re-read the same path (Ctrl-E, spec.md §4.7.2 "reload config").
    pub fn reload(&mut self) -> Result<(), ConfigError> {
        let text = std::fs::read_to_string(&self.path).map_err(ConfigError::Io)?;
        let raw: Raw = toml::from_str(&text).map_err(ConfigError::Parse)?;
        let reloaded = Self::from_raw(raw, self.path.clone());
        *self = reloaded;
        Ok(())
    }

    fn from_raw(raw: Raw, path: PathBuf) -> TomlConfig {
        let command_argv = raw
            .command_argv
            .iter()
            .filter_map(|(k, v)| match k.as_bytes().first() {
                Some(&b) => Some((b, v.clone())),
                None => {
                    tracing::warn!("command_argv has an empty key, ignoring its binding");
                    None
                }
            })
            .collect();
        if raw.quit_confirm_key.as_bytes().first().is_none() {
            tracing::warn!("quit_confirm_key is empty, falling back to 'y'");
        }
        let mut palette16 = [(0u8, 0u8, 0u8); 16];
        for (i, slot) in palette16.iter_mut().enumerate() {
            if let Some(&[r, g, b]) = raw.palette16.get(i) {
                *slot = (r, g, b);
            } else {
                let d = default_palette16()[i];
                *slot = (d[0], d[1], d[2]);
            }
        }
        TomlConfig { raw, path, command_argv, palette16 }
    }
}

impl Config for TomlConfig {
    fn tags(&self) -> &str {
        &self.raw.tags
    }

    fn saved_tags(&self) -> &str {
        &self.raw.saved_tags
    }

    fn default_fg(&self) -> Rgb {
        let [r, g, b] = self.raw.default_fg;
        (r, g, b)
    }

    fn default_bg(&self) -> Rgb {
        let [r, g, b] = self.raw.default_bg;
        (r, g, b)
    }

    fn palette16(&self) -> &[Rgb; 16] {
        &self.palette16
    }

    fn cursor_fg(&self) -> Option<Rgb> {
        self.raw.cursor_fg.map(|[r, g, b]| (r, g, b))
    }

    fn cursor_bg(&self) -> Option<Rgb> {
        self.raw.cursor_bg.map(|[r, g, b]| (r, g, b))
    }

    fn border_color(&self) -> Rgb {
        let [r, g, b] = self.raw.border_color;
        (r, g, b)
    }

    fn border_width(&self) -> usize {
        self.raw.border_width
    }

    fn term_name(&self) -> &str {
        &self.raw.term_name
    }

    fn screenshot_path(&self) -> &str {
        &self.raw.screenshot_path
    }

    fn font_regular(&self) -> &str {
        &self.raw.font_regular
    }

    fn font_italic(&self) -> Option<&str> {
        self.raw.font_italic.as_deref()
    }

    fn font_bold(&self) -> Option<&str> {
        self.raw.font_bold.as_deref()
    }

    fn alt_font_regular(&self) -> Option<&str> {
        self.raw.alt_font_regular.as_deref()
    }

    fn alt_font_italic(&self) -> Option<&str> {
        self.raw.alt_font_italic.as_deref()
    }

    fn alt_font_bold(&self) -> Option<&str> {
        self.raw.alt_font_bold.as_deref()
    }

    fn password(&self) -> Option<&str> {
        self.raw.password.as_deref()
    }

    fn quit_confirm_key(&self) -> u8 {
        self.raw.quit_confirm_key.as_bytes().first().copied().unwrap_or(b'y')
    }

    fn bold_brightens(&self) -> bool {
        self.raw.bold_brightens
    }

    fn command_argv(&self, key: u8) -> Option<&[String]> {
        self.command_argv.get(&key).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_optional_fields_fall_back_to_defaults() {
        let raw: Raw = toml::from_str(r#"font_regular = "/font.tf""#).unwrap();
        let cfg = TomlConfig::from_raw(raw, PathBuf::from("/dev/null"));
        assert_eq!(cfg.tags(), "xnlhtr01");
        assert_eq!(cfg.border_width(), 1);
        assert!(cfg.bold_brightens());
        assert_eq!(cfg.command_argv(b'c'), Some(&["sh".to_string()][..]));
        assert_eq!(cfg.palette16()[1], (0xaa, 0x00, 0x00));
    }

    #[test]
    fn explicit_fields_override_defaults() {
        let toml_src = r#"
            font_regular = "/font.tf"
            tags = "ab"
            border_width = 3
            default_fg = [1, 2, 3]
        "#;
        let raw: Raw = toml::from_str(toml_src).unwrap();
        let cfg = TomlConfig::from_raw(raw, PathBuf::from("/dev/null"));
        assert_eq!(cfg.tags(), "ab");
        assert_eq!(cfg.border_width(), 3);
        assert_eq!(cfg.default_fg(), (1, 2, 3));
    }
}
