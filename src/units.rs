//! Length normalization. Every measurement in the document tree is stored in
//! twips (1/20 pt); this module is the only place that knows the other units.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub const TWIPS_PER_INCH: f64 = 1440.0;
pub const TWIPS_PER_POINT: f64 = 20.0;
pub const POINTS_PER_INCH: f64 = 72.0;
pub const POINTS_PER_PICA: f64 = 12.0;
pub const EMUS_PER_INCH: f64 = 914_400.0;
pub const EMUS_PER_TWIP: f64 = 635.0;
pub const MM_PER_INCH: f64 = 25.4;
pub const CM_PER_INCH: f64 = 2.54;

/// ST_UniversalMeasure: `-?[0-9]+(\.[0-9]+)?(mm|cm|in|pt|pc|pi)`.
static UNIVERSAL_MEASURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(-?[0-9]+(?:\.[0-9]+)?)(mm|cm|in|pt|pc|pi)$").expect("valid measure regex")
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Twip,
    Emu,
    Point,
    Inch,
    Centimeter,
    Millimeter,
    Pica,
}

impl Unit {
    pub const ALL: [Unit; 7] = [
        Unit::Twip,
        Unit::Emu,
        Unit::Point,
        Unit::Inch,
        Unit::Centimeter,
        Unit::Millimeter,
        Unit::Pica,
    ];
}

/// Output units offered to callers holding pre-validated geometry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetUnit {
    Twips,
    Emus,
    Points,
    Inches,
    Centimeters,
    Millimeters,
}

impl TargetUnit {
    fn unit(self) -> Unit {
        match self {
            TargetUnit::Twips => Unit::Twip,
            TargetUnit::Emus => Unit::Emu,
            TargetUnit::Points => Unit::Point,
            TargetUnit::Inches => Unit::Inch,
            TargetUnit::Centimeters => Unit::Centimeter,
            TargetUnit::Millimeters => Unit::Millimeter,
        }
    }
}

pub fn to_twips(value: f64, unit: Unit) -> f64 {
    match unit {
        Unit::Twip => value,
        Unit::Emu => value / EMUS_PER_TWIP,
        Unit::Point => value * TWIPS_PER_POINT,
        Unit::Inch => value * TWIPS_PER_INCH,
        Unit::Centimeter => value * TWIPS_PER_INCH / CM_PER_INCH,
        Unit::Millimeter => value * TWIPS_PER_INCH / MM_PER_INCH,
        Unit::Pica => value * POINTS_PER_PICA * TWIPS_PER_POINT,
    }
}

pub fn from_twips(twips: f64, unit: Unit) -> f64 {
    match unit {
        Unit::Twip => twips,
        Unit::Emu => twips * EMUS_PER_TWIP,
        Unit::Point => twips / TWIPS_PER_POINT,
        Unit::Inch => twips / TWIPS_PER_INCH,
        Unit::Centimeter => twips * CM_PER_INCH / TWIPS_PER_INCH,
        Unit::Millimeter => twips * MM_PER_INCH / TWIPS_PER_INCH,
        Unit::Pica => twips / TWIPS_PER_POINT / POINTS_PER_PICA,
    }
}

/// Converts an already-validated `(value, unit)` pair, e.g. page geometry.
pub fn convert(value: f64, unit: Unit, target: TargetUnit) -> f64 {
    from_twips(to_twips(value, unit), target.unit())
}

pub fn half_points_to_twips(half_points: f64) -> f64 {
    half_points * TWIPS_PER_POINT / 2.0
}

/// Parses an attribute literal into twips.
///
/// A universal measure (`"2.5cm"`) carries its own unit; a bare number is read
/// in `source`. Anything unparseable yields `0.0`.
pub fn parse_measure(literal: &str, source: Unit) -> f64 {
    let literal = literal.trim();
    if let Some(caps) = UNIVERSAL_MEASURE.captures(literal) {
        let value = caps[1].parse::<f64>().unwrap_or(0.0);
        return universal_to_twips(value, &caps[2]);
    }
    literal
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| to_twips(v, source))
        .unwrap_or(0.0)
}

/// Parses a universal measure straight into `target`. Bare numbers are
/// returned unchanged (already in the caller's base unit).
pub fn parse_universal(literal: &str, target: TargetUnit) -> f64 {
    let literal = literal.trim();
    let Some(caps) = UNIVERSAL_MEASURE.captures(literal) else {
        return literal.parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0);
    };
    let value = caps[1].parse::<f64>().unwrap_or(0.0);
    let token = &caps[2];
    match target {
        TargetUnit::Twips => universal_to_twips(value, token),
        TargetUnit::Emus => universal_to_emus(value, token),
        TargetUnit::Points => universal_to_points(value, token),
        TargetUnit::Inches => universal_to_inches(value, token),
        TargetUnit::Centimeters => universal_to_centimeters(value, token),
        TargetUnit::Millimeters => universal_to_millimeters(value, token),
    }
}

// The token has already matched UNIVERSAL_MEASURE, so the fallback arms below
// only serve callers that skip that check. They stay total and return zero.

fn universal_to_twips(value: f64, token: &str) -> f64 {
    match token {
        "in" => value * TWIPS_PER_INCH,
        "pt" => value * TWIPS_PER_POINT,
        "pc" | "pi" => value * POINTS_PER_PICA * TWIPS_PER_POINT,
        "mm" => value * TWIPS_PER_INCH / MM_PER_INCH,
        "cm" => value * TWIPS_PER_INCH / CM_PER_INCH,
        _ => 0.0,
    }
}

fn universal_to_emus(value: f64, token: &str) -> f64 {
    match token {
        "in" => value * EMUS_PER_INCH,
        "pt" => value * EMUS_PER_INCH / POINTS_PER_INCH,
        "pc" | "pi" => value * POINTS_PER_PICA * EMUS_PER_INCH / POINTS_PER_INCH,
        "mm" => value * EMUS_PER_INCH / MM_PER_INCH,
        "cm" => value * EMUS_PER_INCH / CM_PER_INCH,
        _ => 0.0,
    }
}

fn universal_to_points(value: f64, token: &str) -> f64 {
    match token {
        "in" => value * POINTS_PER_INCH,
        "pt" => value,
        "pc" | "pi" => value * POINTS_PER_PICA,
        "mm" => value * POINTS_PER_INCH / MM_PER_INCH,
        "cm" => value * POINTS_PER_INCH / CM_PER_INCH,
        _ => 0.0,
    }
}

fn universal_to_inches(value: f64, token: &str) -> f64 {
    match token {
        "in" => value,
        "pt" => value / POINTS_PER_INCH,
        "pc" | "pi" => value * POINTS_PER_PICA / POINTS_PER_INCH,
        "mm" => value / MM_PER_INCH,
        "cm" => value / CM_PER_INCH,
        _ => 0.0,
    }
}

fn universal_to_centimeters(value: f64, token: &str) -> f64 {
    match token {
        "in" => value * CM_PER_INCH,
        "pt" => value / POINTS_PER_INCH * CM_PER_INCH,
        "pc" | "pi" => value * POINTS_PER_PICA / POINTS_PER_INCH * CM_PER_INCH,
        "mm" => value / 10.0,
        "cm" => value,
        _ => 0.0,
    }
}

fn universal_to_millimeters(value: f64, token: &str) -> f64 {
    match token {
        "in" => value * MM_PER_INCH,
        "pt" => value / POINTS_PER_INCH * MM_PER_INCH,
        "pc" | "pi" => value * POINTS_PER_PICA / POINTS_PER_INCH * MM_PER_INCH,
        "mm" => value,
        "cm" => value * 10.0,
        _ => 0.0,
    }
}
