// src/identity.rs - Per-session color identity
use std::fmt;

use egui::Color32;
use serde::{Deserialize, Serialize};

/// Opaque peer token that doubles as the peer's display color.
///
/// Identities are random and never negotiated, so two peers can collide.
/// A colliding peer is indistinguishable from ourselves and its messages
/// are dropped as our own echo.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerIdentity(String);

impl PeerIdentity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses `#rgb` or `#rrggbb`. Anything else has no drawable color.
    pub fn color(&self) -> Option<Color32> {
        let hex = self.0.strip_prefix('#')?;
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }

        match hex.len() {
            6 => {
                let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
                let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
                let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
                Some(Color32::from_rgb(r, g, b))
            }
            3 => {
                let mut channels = [0u8; 3];
                for (channel, digit) in channels.iter_mut().zip(hex.chars()) {
                    let value = digit.to_digit(16)? as u8;
                    *channel = value * 17;
                }
                Some(Color32::from_rgb(channels[0], channels[1], channels[2]))
            }
            _ => None,
        }
    }

    pub fn color_with_alpha(&self, alpha: u8) -> Option<Color32> {
        let color = self.color()?;
        Some(Color32::from_rgba_unmultiplied(
            color.r(),
            color.g(),
            color.b(),
            alpha,
        ))
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerIdentity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PeerIdentity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

pub struct IdentityAssigner;

impl IdentityAssigner {
    /// Draws a uniformly random 24-bit color. Call once per process.
    pub fn assign() -> PeerIdentity {
        Self::from_bits(rand::random::<u32>() & 0x00ff_ffff)
    }

    pub fn from_bits(bits: u32) -> PeerIdentity {
        PeerIdentity(format!("#{:06x}", bits & 0x00ff_ffff))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_rrggbb(value: &str) -> bool {
        value.len() == 7
            && value.starts_with('#')
            && value[1..]
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }

    #[test]
    fn assign_always_returns_six_hex_digits() {
        for _ in 0..1000 {
            let identity = IdentityAssigner::assign();
            assert!(is_rrggbb(identity.as_str()), "bad identity {identity}");
            assert!(identity.color().is_some());
        }
    }

    #[test]
    fn small_values_are_zero_padded() {
        assert_eq!(IdentityAssigner::from_bits(0).as_str(), "#000000");
        assert_eq!(IdentityAssigner::from_bits(0xabc).as_str(), "#000abc");
        assert_eq!(IdentityAssigner::from_bits(0x1ff_ffff).as_str(), "#ffffff");
    }

    #[test]
    fn parses_long_and_short_colors() {
        assert_eq!(
            PeerIdentity::new("#aabbcc").color(),
            Some(Color32::from_rgb(0xaa, 0xbb, 0xcc))
        );
        assert_eq!(
            PeerIdentity::new("#abc").color(),
            Some(Color32::from_rgb(0xaa, 0xbb, 0xcc))
        );
        assert_eq!(PeerIdentity::new("aabbcc").color(), None);
        assert_eq!(PeerIdentity::new("#abcde").color(), None);
        assert_eq!(PeerIdentity::new("#gg0000").color(), None);
        assert_eq!(PeerIdentity::new("#é0000").color(), None);
    }

    #[test]
    fn alpha_is_applied_unmultiplied() {
        let color = PeerIdentity::new("#ff0000").color_with_alpha(0xda).unwrap();
        assert_eq!(color, Color32::from_rgba_unmultiplied(0xff, 0, 0, 0xda));
    }

    #[test]
    fn serializes_as_plain_string() {
        let identity = PeerIdentity::new("#123456");
        assert_eq!(serde_json::to_string(&identity).unwrap(), "\"#123456\"");
    }
}
