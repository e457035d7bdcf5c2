use std::time::Duration;

/// Parse a boolean value from a raw string, accepting common env-style forms.
///
/// Accepted truthy values (case-insensitive): `"1"`, `"true"`, `"yes"`, `"on"`.
/// Accepted falsy values: `"0"`, `"false"`, `"no"`, `"off"`.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Reads `name` and parses it with `parse`. `None` when the variable is unset
/// or blank; `Some(Err(raw))` hands back the value that failed to parse.
fn parse_var<T>(name: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<Result<T, String>> {
    let raw = std::env::var(name).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(parse(trimmed).ok_or(raw))
}

/// Reads a boolean variable; see [`parse_bool`] for accepted forms.
pub fn parse_bool_var(name: &str) -> Option<Result<bool, String>> {
    parse_var(name, parse_bool)
}

/// Reads a non-negative integer variable.
pub fn parse_usize_var(name: &str) -> Option<Result<usize, String>> {
    parse_var(name, |raw| raw.parse().ok())
}

/// Durations use humantime syntax (`250ms`, `1s`, `2m 30s`).
pub fn parse_duration_var(name: &str) -> Option<Result<Duration, String>> {
    parse_var(name, |raw| humantime::parse_duration(raw).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_env_forms() {
        for raw in ["1", "TRUE", "yes", " on "] {
            assert_eq!(parse_bool(raw), Some(true), "{raw}");
        }
        for raw in ["0", "False", "no", "off"] {
            assert_eq!(parse_bool(raw), Some(false), "{raw}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }
}
