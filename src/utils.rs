//! Small shared helpers.

use std::fmt::Display;
use std::str::FromStr;

/// Reads an environment variable and parses it, falling back to `default`
/// when the variable is unset or malformed. Malformed values are reported
/// rather than silently dropped.
pub fn parse_env<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
{
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, raw, %default, "invalid value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_on_missing_or_malformed() {
        assert_eq!(parse_env("FLOWCORD_TEST_UNSET_VAR", 7_u64), 7);

        // Env mutation is process-global; keep the variable name unique to
        // this test.
        unsafe { std::env::set_var("FLOWCORD_TEST_PARSE_ENV", "42") };
        assert_eq!(parse_env("FLOWCORD_TEST_PARSE_ENV", 0_u64), 42);

        unsafe { std::env::set_var("FLOWCORD_TEST_PARSE_ENV", "nope") };
        assert_eq!(parse_env("FLOWCORD_TEST_PARSE_ENV", 3_u64), 3);
        unsafe { std::env::remove_var("FLOWCORD_TEST_PARSE_ENV") };
    }
}
