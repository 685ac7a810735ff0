//! Duration string parsing.
//!
//! Accepts a sequence of decimal numbers, each with an optional fraction and a
//! mandatory unit suffix: "30s", "5m", "1.5h", "2h45m", "300ms". Valid units
//! are "ns", "us" (or "µs"), "ms", "s", "m" and "h". A bare "0" is zero.

use std::time::Duration;

use crate::error::{Result, SessionError};

const NANOS_PER_UNIT: [(&str, u128); 8] = [
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("μs", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60 * 1_000_000_000),
    ("h", 3_600 * 1_000_000_000),
];

/// Parse a duration string such as "30s" or "1h15m".
pub fn parse_duration(text: &str) -> Result<Duration> {
    let invalid = || SessionError::invalid(format!("invalid duration \"{}\"", text));

    let mut rest = text.trim();
    if let Some(stripped) = rest.strip_prefix('+') {
        rest = stripped;
    } else if rest.starts_with('-') {
        return Err(SessionError::invalid(format!(
            "duration \"{}\" must not be negative",
            text
        )));
    }

    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let int_len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let int_part = &rest[..int_len];
        rest = &rest[int_len..];

        let mut frac_part = "";
        if let Some(after_dot) = rest.strip_prefix('.') {
            let frac_len = after_dot
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(after_dot.len());
            frac_part = &after_dot[..frac_len];
            rest = &after_dot[frac_len..];
        }
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];
        if unit.is_empty() {
            return Err(SessionError::invalid(format!(
                "missing unit in duration \"{}\"",
                text
            )));
        }
        let scale = NANOS_PER_UNIT
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, nanos)| *nanos)
            .ok_or_else(|| {
                SessionError::invalid(format!("unknown unit \"{}\" in duration \"{}\"", unit, text))
            })?;

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| invalid())?
        };
        let mut nanos = whole.checked_mul(scale).ok_or_else(invalid)?;

        // Fraction digits beyond nanosecond resolution contribute nothing.
        let mut divisor: u128 = 1;
        let mut frac_value: u128 = 0;
        for digit in frac_part.chars().take(18) {
            frac_value = frac_value * 10 + u128::from(digit.to_digit(10).unwrap_or(0));
            divisor *= 10;
        }
        nanos = nanos
            .checked_add(frac_value * scale / divisor)
            .ok_or_else(invalid)?;

        total = total.checked_add(nanos).ok_or_else(invalid)?;
    }

    let secs = u64::try_from(total / 1_000_000_000).map_err(|_| invalid())?;
    Ok(Duration::new(secs, (total % 1_000_000_000) as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_units() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("300ms").unwrap(), Duration::from_millis(300));
        assert_eq!(parse_duration("15us").unwrap(), Duration::from_micros(15));
        assert_eq!(parse_duration("15µs").unwrap(), Duration::from_micros(15));
        assert_eq!(parse_duration("42ns").unwrap(), Duration::from_nanos(42));
    }

    #[test]
    fn test_parse_compound_and_fractional() {
        assert_eq!(
            parse_duration("2h45m").unwrap(),
            Duration::from_secs(2 * 3600 + 45 * 60)
        );
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration(".5s").unwrap(), Duration::from_millis(500));
        assert_eq!(
            parse_duration("1m30.25s").unwrap(),
            Duration::from_millis(90_250)
        );
    }

    #[test]
    fn test_parse_zero() {
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("0s").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "s", "10", "ten seconds", "5x", "1.s.", "-1s", "."] {
            let err = parse_duration(bad).unwrap_err();
            assert!(
                matches!(err, SessionError::InvalidArgument(_)),
                "{:?} should be rejected",
                bad
            );
        }
    }
}
