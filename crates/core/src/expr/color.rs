use std::fmt;

/// Straight RGBA color with 0-255 channels and 0-1 alpha.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Rgba {
    pub const TRANSPARENT: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    /// Parses `#rgb`, `#rrggbb`, `#rrggbbaa`, `rgb(r, g, b)` and
    /// `rgba(r, g, b, a)`.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if let Some(hex) = input.strip_prefix('#') {
            return parse_hex(hex);
        }
        let (body, has_alpha) = if let Some(rest) = input.strip_prefix("rgba(") {
            (rest.strip_suffix(')')?, true)
        } else if let Some(rest) = input.strip_prefix("rgb(") {
            (rest.strip_suffix(')')?, false)
        } else {
            return None;
        };

        let parts: Vec<f64> = body
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .ok()?;
        match (parts.as_slice(), has_alpha) {
            ([r, g, b], false) => Some(Self::clamped(*r, *g, *b, 1.0)),
            ([r, g, b, a], true) => Some(Self::clamped(*r, *g, *b, *a)),
            _ => None,
        }
    }

    pub fn lerp(self, other: Self, t: f64) -> Self {
        let mix = |a: f64, b: f64| a + (b - a) * t;
        Self {
            r: mix(self.r, other.r),
            g: mix(self.g, other.g),
            b: mix(self.b, other.b),
            a: mix(self.a, other.a),
        }
    }

    fn clamped(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self {
            r: r.clamp(0.0, 255.0),
            g: g.clamp(0.0, 255.0),
            b: b.clamp(0.0, 255.0),
            a: a.clamp(0.0, 1.0),
        }
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let alpha = (self.a * 1000.0).round() / 1000.0;
        write!(
            f,
            "rgba({}, {}, {}, {})",
            self.r.round(),
            self.g.round(),
            self.b.round(),
            alpha
        )
    }
}

fn parse_hex(hex: &str) -> Option<Rgba> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(f64::from);
    match hex.len() {
        3 => {
            let expand = |i: usize| channel(&hex[i..i + 1].repeat(2));
            Some(Rgba {
                r: expand(0)?,
                g: expand(1)?,
                b: expand(2)?,
                a: 1.0,
            })
        }
        6 | 8 => Some(Rgba {
            r: channel(&hex[0..2])?,
            g: channel(&hex[2..4])?,
            b: channel(&hex[4..6])?,
            a: if hex.len() == 8 {
                channel(&hex[6..8])? / 255.0
            } else {
                1.0
            },
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_notations() {
        assert_eq!(
            Rgba::parse("#f00"),
            Some(Rgba {
                r: 255.0,
                g: 0.0,
                b: 0.0,
                a: 1.0
            })
        );
        assert_eq!(Rgba::parse("#00ff0080").map(|c| c.g), Some(255.0));
        assert_eq!(Rgba::parse("rgb(1, 2, 3)").map(|c| c.b), Some(3.0));
        assert_eq!(Rgba::parse("rgba(1, 2, 3, 0.5)").map(|c| c.a), Some(0.5));
        assert_eq!(Rgba::parse("tomato"), None);
        assert_eq!(Rgba::parse("#12345"), None);
    }

    #[test]
    fn formats_as_rgba() {
        let mid = Rgba::parse("#000000")
            .unwrap()
            .lerp(Rgba::parse("#ffffff").unwrap(), 0.5);
        assert_eq!(mid.to_string(), "rgba(128, 128, 128, 1)");
    }
}
