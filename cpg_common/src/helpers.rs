use std::time::Duration;

use thiserror::Error;

/// Parse a boolean flag from a string value, or return the given default value otherwise.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// Split a comma-separated list, trimming whitespace and dropping empty entries.
pub fn parse_list(value: &str) -> Vec<String> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect()
}

#[derive(Debug, Clone, Error)]
#[error("'{0}' is not a valid number of seconds")]
pub struct ParseSecondsError(pub String);

/// Parse a whole number of seconds. Zero is rejected, since every interval in the system must be positive.
pub fn parse_seconds(value: &str) -> Result<Duration, ParseSecondsError> {
    match value.trim().parse::<u64>() {
        Ok(0) | Err(_) => Err(ParseSecondsError(value.to_string())),
        Ok(secs) => Ok(Duration::from_secs(secs)),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn boolean_flags() {
        assert!(parse_boolean_flag(Some("1".into()), false));
        assert!(parse_boolean_flag(Some(" TRUE ".into()), false));
        assert!(!parse_boolean_flag(Some("off".into()), true));
        assert!(parse_boolean_flag(Some("maybe".into()), true));
        assert!(!parse_boolean_flag(None, false));
    }

    #[test]
    fn lists() {
        assert_eq!(parse_list("a, b,,c "), vec!["a", "b", "c"]);
        assert!(parse_list(" , ").is_empty());
    }

    #[test]
    fn seconds() {
        assert_eq!(parse_seconds("15").unwrap(), Duration::from_secs(15));
        assert!(parse_seconds("0").is_err());
        assert!(parse_seconds("-3").is_err());
        assert!(parse_seconds("fast").is_err());
    }
}
