//! Duration strings such as `"1s"`, `"2m30s"` or `"500ms"`.

use chrono::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid duration '{input}': {reason}")]
pub struct DurationError {
    pub input: String,
    pub reason: &'static str,
}

fn to_duration(ms: f64) -> Option<Duration> {
    let ms = ms.round();
    if !(0.0..=Duration::MAX.num_milliseconds() as f64).contains(&ms) {
        return None;
    }
    Duration::try_milliseconds(ms as i64)
}

/// Parse a duration string.
///
/// Units are `ms`, `s`, `m`, `h`, `d` and `w`; components may be chained
/// (`"1h30m"`). A bare number is read as seconds and may be fractional.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let error = |reason| DurationError {
        input: input.to_string(),
        reason,
    };
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(error("empty"));
    }

    if let Ok(seconds) = trimmed.parse::<f64>() {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(error("must be a non-negative number"));
        }
        return to_duration(seconds * 1000.0).ok_or_else(|| error("out of range"));
    }

    let mut total = Duration::zero();
    let mut rest = trimmed;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if digits == 0 {
            return Err(error("expected a number"));
        }
        let value: f64 = rest[..digits].parse().map_err(|_| error("bad number"))?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit_ms = match &rest[..unit_len] {
            "ms" => 1.0,
            "s" => 1_000.0,
            "m" => 60_000.0,
            "h" => 3_600_000.0,
            "d" => 86_400_000.0,
            "w" => 604_800_000.0,
            "" => return Err(error("missing unit")),
            _ => return Err(error("unknown unit")),
        };
        rest = &rest[unit_len..];
        total = to_duration(value * unit_ms)
            .and_then(|component| total.checked_add(&component))
            .ok_or_else(|| error("out of range"))?;
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_units() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::milliseconds(500));
        assert_eq!(parse_duration("1s").unwrap(), Duration::seconds(1));
        assert_eq!(parse_duration("1h").unwrap(), Duration::hours(1));
        assert_eq!(parse_duration("1d").unwrap(), Duration::days(1));
        assert_eq!(parse_duration("1w").unwrap(), Duration::weeks(1));
    }

    #[test]
    fn test_chained_components_and_bare_numbers() {
        assert_eq!(parse_duration("2m30s").unwrap(), Duration::seconds(150));
        assert_eq!(parse_duration("10").unwrap(), Duration::seconds(10));
        assert_eq!(parse_duration("0.5").unwrap(), Duration::milliseconds(500));
        assert_eq!(parse_duration(" 1.5s ").unwrap(), Duration::milliseconds(1500));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("5y").is_err());
        assert!(parse_duration("-3").is_err());
        assert_eq!(parse_duration("1x").unwrap_err().reason, "unknown unit");
    }

    #[test]
    fn test_rejects_values_chrono_cannot_hold() {
        assert_eq!(parse_duration("1e30").unwrap_err().reason, "out of range");
        assert_eq!(
            parse_duration("99999999999999999999w").unwrap_err().reason,
            "out of range"
        );
        assert_eq!(
            parse_duration("10000000000w10000000000w").unwrap_err().reason,
            "out of range"
        );
        assert_eq!(parse_duration("1000w").unwrap(), Duration::weeks(1000));
    }
}
