//! Human-readable durations such as `60s`, `5m`, or `1m30s`.
//!
//! Health-check policies in configuration files are written this way and
//! rendered into the template as whole seconds.

use std::time::Duration;

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::tag,
    character::complete::digit1,
    combinator::{all_consuming, map_res},
    multi::many1,
};

use crate::error::{Result, StackError};

fn unit(input: &str) -> IResult<&str, u64> {
    alt((
        nom::combinator::value(1, tag("ms")),
        nom::combinator::value(1_000, tag("s")),
        nom::combinator::value(60_000, tag("m")),
        nom::combinator::value(3_600_000, tag("h")),
    ))
    .parse(input)
}

fn component(input: &str) -> IResult<&str, u64> {
    let (input, amount) = map_res(digit1, str::parse::<u64>).parse(input)?;
    let (input, millis) = unit(input)?;
    Ok((input, amount.saturating_mul(millis)))
}

/// Parses a duration like `60s` or `1m30s`.
///
/// # Errors
///
/// Returns an error if the text is empty, has no unit, or uses an unknown
/// unit.
pub fn parse_duration(text: &str) -> Result<Duration> {
    let trimmed = text.trim();
    let (_, parts) = all_consuming(many1(component))
        .parse(trimmed)
        .map_err(|e| StackError::config(format!("invalid duration \"{text}\": {e}")))?;
    let millis = parts.into_iter().fold(0u64, u64::saturating_add);
    Ok(Duration::from_millis(millis))
}

/// Formats a duration the way [`parse_duration`] reads it.
///
/// Sub-millisecond durations fall back to nanoseconds, which only appear in
/// error messages.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    if duration.subsec_nanos() == 0 {
        format!("{}s", duration.as_secs())
    } else if duration.subsec_nanos() % 1_000_000 == 0 {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{}ns", duration.as_nanos())
    }
}

/// Returns the duration as whole seconds.
///
/// # Errors
///
/// Returns an error if the duration has a sub-second component.
pub fn whole_seconds(duration: Duration) -> Result<u64> {
    if duration.subsec_nanos() != 0 {
        return Err(StackError::config(format!(
            "duration {} is not a whole number of seconds",
            format_duration(duration)
        )));
    }
    Ok(duration.as_secs())
}

/// Serde adapter for `Duration` fields written as `60s`-style strings.
pub mod serde_text {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serializes a duration as text.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*duration))
    }

    /// Deserializes a duration from text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid duration.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_seconds_and_minutes() {
        assert_eq!(parse_duration("60s").expect("parse"), Duration::from_secs(60));
        assert_eq!(parse_duration("5m").expect("parse"), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").expect("parse"), Duration::from_secs(3600));
    }

    #[test]
    fn parses_compound_durations() {
        assert_eq!(
            parse_duration("1m30s").expect("parse"),
            Duration::from_secs(90)
        );
        assert_eq!(
            parse_duration("1s500ms").expect("parse"),
            Duration::from_millis(1500)
        );
    }

    #[test]
    fn rejects_missing_unit_and_garbage() {
        assert!(parse_duration("60").is_err());
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10d").is_err());
        assert!(parse_duration("s").is_err());
    }

    #[test]
    fn whole_seconds_rejects_fractions() {
        assert_eq!(whole_seconds(Duration::from_secs(5)).expect("whole"), 5);
        assert!(whole_seconds(Duration::from_millis(1500)).is_err());
    }

    #[test]
    fn sub_millisecond_remainder_is_not_rounded_away() {
        let d = Duration::new(1, 500);
        assert_eq!(format_duration(d), "1000000500ns");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
        let err = whole_seconds(d).unwrap_err();
        assert!(err.to_string().contains("1000000500ns"), "got: {err}");
    }

    #[test]
    fn format_matches_parse() {
        let d = Duration::from_secs(60);
        assert_eq!(format_duration(d), "60s");
        assert_eq!(parse_duration(&format_duration(d)).expect("parse"), d);
    }
}
