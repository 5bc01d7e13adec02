//! Badge text and colour
//!
//! A badge is at most four visible characters plus a background colour. The
//! text is a pure function of the last known price (or the error marker); the
//! sink that draws it is a write-only port.

use std::fmt;

/// Literal shown when no valid price is known
pub const ERROR_TEXT: &str = "Err";

/// Maximum number of visible characters in a badge
pub const MAX_BADGE_CHARS: usize = 4;

/// What the badge should represent
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BadgeValue {
    /// A known price
    Price(f64),
    /// The error marker: the last attempt did not produce a price
    Error,
}

/// Background colour of a badge as RGB
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadgeColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl BadgeColor {
    /// Dark grey used for a valid price
    pub const NEUTRAL: BadgeColor = BadgeColor { r: 0x22, g: 0x22, b: 0x22 };
    /// Red used for the error badge
    pub const ERROR: BadgeColor = BadgeColor { r: 0xFF, g: 0x00, b: 0x00 };
}

impl fmt::Display for BadgeColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// A rendered badge: the text and whether it represents an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Badge {
    pub text: String,
    pub is_error: bool,
}

impl Badge {
    pub fn from_value(value: BadgeValue) -> Self {
        Self {
            text: format_badge(value),
            is_error: !matches!(value, BadgeValue::Price(p) if p.is_finite()),
        }
    }

    pub fn color(&self) -> BadgeColor {
        if self.is_error {
            BadgeColor::ERROR
        } else {
            BadgeColor::NEUTRAL
        }
    }
}

/// Formats a price for the badge
///
/// * error marker (or a non-finite price) -> `"Err"`
/// * `price >= 100` -> no decimals
/// * `10 <= price < 100` -> one decimal
/// * `price < 10` -> two decimals
///
/// Exact halfway values round away from zero (`150.5` -> `"151"`,
/// `23.25` -> `"23.3"`). The result is cut to four characters without
/// re-rounding, so `99.96` becomes `"100."`.
pub fn format_badge(value: BadgeValue) -> String {
    let price = match value {
        BadgeValue::Price(p) if p.is_finite() => p,
        _ => return ERROR_TEXT.to_string(),
    };

    let decimals = if price >= 100.0 {
        0
    } else if price >= 10.0 {
        1
    } else {
        2
    };

    fixed_point(price, decimals)
        .chars()
        .take(MAX_BADGE_CHARS)
        .collect()
}

/// Fixed-point text with `decimals` digits, rounding exact ties away from zero
///
/// `format!` already rounds the exact binary value correctly; it only differs
/// on exact ties, where it picks the even digit.
fn fixed_point(price: f64, decimals: i32) -> String {
    if !is_exact_tie(price, decimals) {
        return format!("{:.*}", decimals as usize, price);
    }
    let scale = 10f64.powi(decimals);
    format!("{:.*}", decimals as usize, (price * scale).round() / scale)
}

/// Whether `price` lies exactly halfway between two `decimals`-digit values
///
/// A binary float ends in a trailing decimal 5 at position `decimals + 1`
/// exactly when `price * 2^(decimals + 1)` is an odd integer. Scaling by a
/// power of two is exact.
fn is_exact_tie(price: f64, decimals: i32) -> bool {
    let scaled = (price * 2f64.powi(decimals + 1)).abs();
    scaled.fract() == 0.0 && scaled % 2.0 == 1.0
}

/// Write-only destination for badge updates
pub trait BadgeSink: Send + Sync {
    fn set_badge(&self, text: &str, color: BadgeColor);
}

/// Formats `value` and pushes it to `sink`, returning what was rendered
pub fn render_badge(sink: &dyn BadgeSink, value: BadgeValue) -> Badge {
    let badge = Badge::from_value(value);
    sink.set_badge(&badge.text, badge.color());
    badge
}
