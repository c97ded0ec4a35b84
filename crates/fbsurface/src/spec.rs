//! Parsing of the `path:WxH+X+Y` device spec used both for `$FBDEV` and
//! the `fbpadrs --fbdev` flag (spec.md §6).

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceSpec {
    pub path: String,
    pub subregion: Option<Subregion>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Subregion {
    pub width: u32,
    pub height: u32,
    pub x: i32,
    pub y: i32,
}

impl DeviceSpec {
    /// Parse `/dev/fb0` or `/dev/fb0:800x600+0+0` (or with `-` signs).
    #[must_use]
    pub fn parse(s: &str) -> DeviceSpec {
        let Some(colon) = s.rfind(':').filter(|&i| looks_like_geometry(&s[i + 1..])) else {
            return DeviceSpec {
                path: s.to_string(),
                subregion: None,
            };
        };
        let (path, geom) = (s[..colon].to_string(), &s[colon + 1..]);
        DeviceSpec {
            path,
            subregion: parse_geometry(geom),
        }
    }
}

fn looks_like_geometry(s: &str) -> bool {
    s.contains('x') && (s.contains('+') || s.contains('-') || s.chars().all(|c| c.is_ascii_digit() || c == 'x'))
}

fn parse_geometry(s: &str) -> Option<Subregion> {
    let (dims, rest) = s.split_once(['+', '-']).map_or((s, ""), |(d, _)| {
        let idx = d.len();
        (d, &s[idx..])
    });
    let (w, h) = dims.split_once('x')?;
    let width: u32 = w.parse().ok()?;
    let height: u32 = h.parse().ok()?;
    if rest.is_empty() {
        return Some(Subregion { width, height, x: 0, y: 0 });
    }
    let (x, y) = parse_signed_pair(rest)?;
    Some(Subregion { width, height, x, y })
}

fn parse_signed_pair(s: &str) -> Option<(i32, i32)> {
    let mut chars = s.char_indices().filter(|&(_, c)| c == '+' || c == '-');
    let (first_idx, _) = chars.next()?;
    let (second_idx, _) = chars.next()?;
    let x: i32 = s[first_idx..second_idx].parse().ok()?;
    let y: i32 = s[second_idx..].parse().ok()?;
    Some((x, y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn plain_path_has_no_subregion() {
        let d = DeviceSpec::parse("/dev/fb0");
        assert_eq!(d.path, "/dev/fb0");
        assert!(d.subregion.is_none());
    }

    #[test]
    fn parses_geometry_with_offsets() {
        let d = DeviceSpec::parse("/dev/fb0:800x600+10-20");
        assert_eq!(d.path, "/dev/fb0");
        assert_eq!(
            d.subregion,
            Some(Subregion { width: 800, height: 600, x: 10, y: -20 })
        );
    }

    #[test]
    fn parses_geometry_without_offsets() {
        let d = DeviceSpec::parse("/dev/fb0:1024x768");
        assert_eq!(
            d.subregion,
            Some(Subregion { width: 1024, height: 768, x: 0, y: 0 })
        );
    }
}
