//! NMEA-0183 checksum, field and coordinate helpers.

/// XOR of every byte in `body` (the text between `$`/`!` and `*`).
pub fn checksum(body: &str) -> u8 {
    body.bytes().fold(0, |acc, b| acc ^ b)
}

/// True when `line` carries a `*hh` checksum that matches its body.
///
/// Hex digits are accepted in either case. Trailing whitespace and line
/// terminators are ignored; anything else after the two digits is not.
pub fn validate_checksum(line: &str) -> bool {
    let line = line.trim_end();
    let Some(rest) = line.strip_prefix('$').or_else(|| line.strip_prefix('!')) else {
        return false;
    };
    let Some((body, digits)) = rest.split_once('*') else {
        return false;
    };
    if digits.len() != 2 {
        return false;
    }
    match u8::from_str_radix(digits, 16) {
        Ok(expected) => checksum(body) == expected,
        Err(_) => false,
    }
}

/// Append `*hh\r\n` to a body. Used by simulators and tests.
pub fn with_checksum(start: char, body: &str) -> String {
    format!("{}{}*{:02X}\r\n", start, body, checksum(body))
}

/// The n-th comma separated field (1-based; 0 is the address).
///
/// Empty between consecutive commas, and empty when out of range.
pub fn field(sentence: &str, n: usize) -> &str {
    let body = sentence.trim_end().split('*').next().unwrap_or("");
    body.split(',').nth(n).unwrap_or("")
}

/// Parse a numeric field, treating empty text as absent.
pub fn number(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoordinateAxis {
    Latitude,
    Longitude,
}

impl CoordinateAxis {
    fn limit(self) -> f64 {
        match self {
            CoordinateAxis::Latitude => 90.0,
            CoordinateAxis::Longitude => 180.0,
        }
    }
}

/// `DDDMM.MMMM` to decimal degrees. Returns 0 when the result is out of
/// range for the axis.
pub fn dms_to_decimal_degrees(coordinate: f64, axis: CoordinateAxis) -> f64 {
    checked_decimal_degrees(coordinate, axis).unwrap_or(0.0)
}

fn checked_decimal_degrees(coordinate: f64, axis: CoordinateAxis) -> Option<f64> {
    if !coordinate.is_finite() {
        return None;
    }
    let degrees = (coordinate / 100.0).trunc();
    let minutes = coordinate - degrees * 100.0;
    let decimal = degrees + minutes / 60.0;
    (decimal.abs() <= axis.limit()).then_some(decimal)
}

/// Coordinate field plus hemisphere letter to signed decimal degrees.
pub fn parse_coordinate(value: &str, hemisphere: &str, axis: CoordinateAxis) -> Option<f64> {
    let decimal = checked_decimal_degrees(number(value)?, axis)?;
    match hemisphere.trim() {
        "S" | "W" => Some(-decimal),
        _ => Some(decimal),
    }
}
