//! JVM size literal parsing
//!
//! Converts literals such as `2g`, `512M` or `1073741824` into byte counts
//! using the binary multipliers the JVM applies to `-Xmx`/`-Xms` values.

use thiserror::Error;

const KIB: f64 = 1024.0;
const MIB: f64 = KIB * 1024.0;
const GIB: f64 = MIB * 1024.0;

/// Errors produced while parsing a size literal
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SizeFormatError {
    /// The literal is not `<number>[unit]`
    #[error("invalid size format: {0:?}")]
    InvalidSizeFormat(String),

    /// The literal ends in a unit letter other than k, m or g
    #[error("unknown size unit {unit:?} in {literal:?}")]
    UnknownUnit { literal: String, unit: char },
}

/// Parse a JVM size literal into bytes.
///
/// Accepts a decimal number optionally followed by one case-insensitive unit
/// letter (`k`, `m`, `g`). A bare number is already a byte count.
pub fn parse_size(literal: &str) -> Result<f64, SizeFormatError> {
    let invalid = || SizeFormatError::InvalidSizeFormat(literal.to_string());

    let (number, unit) = match literal.char_indices().last() {
        None => return Err(invalid()),
        Some((idx, c)) if c.is_ascii_alphabetic() => (&literal[..idx], Some(c)),
        Some(_) => (literal, None),
    };

    if !is_decimal(number) {
        return Err(invalid());
    }
    let value: f64 = number.parse().map_err(|_| invalid())?;

    let multiplier = match unit.map(|u| u.to_ascii_lowercase()) {
        None => 1.0,
        Some('k') => KIB,
        Some('m') => MIB,
        Some('g') => GIB,
        Some(other) => {
            return Err(SizeFormatError::UnknownUnit {
                literal: literal.to_string(),
                unit: other,
            })
        }
    };

    Ok(value * multiplier)
}

/// `digits` or `digits.digits`
fn is_decimal(s: &str) -> bool {
    let mut parts = s.splitn(2, '.');
    let whole = parts.next().unwrap_or_default();
    let all_digits = |p: &str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());

    match parts.next() {
        Some(fraction) => all_digits(whole) && all_digits(fraction),
        None => all_digits(whole),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size_units() {
        assert_eq!(parse_size("1024").unwrap(), 1024.0);
        assert_eq!(parse_size("256k").unwrap(), 256.0 * 1024.0);
        assert_eq!(parse_size("256K").unwrap(), 256.0 * 1024.0);
        assert_eq!(parse_size("512m").unwrap(), 512.0 * MIB);
        assert_eq!(parse_size("1024M").unwrap(), GIB);
        assert_eq!(parse_size("2g").unwrap(), 2.0 * GIB);
        assert_eq!(parse_size("2G").unwrap(), 2.0 * GIB);
    }

    #[test]
    fn test_parse_size_fractional() {
        assert_eq!(parse_size("1.5g").unwrap(), 1.5 * GIB);
        assert_eq!(parse_size("0.5m").unwrap(), 0.5 * MIB);
    }

    #[test]
    fn test_parse_size_unknown_unit() {
        let err = parse_size("4t").unwrap_err();
        assert_eq!(
            err,
            SizeFormatError::UnknownUnit {
                literal: "4t".to_string(),
                unit: 't'
            }
        );
    }

    #[test]
    fn test_parse_size_invalid_format() {
        for literal in ["", "g", "2gb", "-1g", "1.g", ".5g", "12 m", "o256k", "0x10"] {
            assert!(
                matches!(
                    parse_size(literal),
                    Err(SizeFormatError::InvalidSizeFormat(_))
                ),
                "{literal:?} should be rejected as malformed"
            );
        }
    }
}
