//! `Cache-Control` header helpers.

use std::time::Duration;

/// Read the `max-age` directive of a `Cache-Control` value.
///
/// Returns `None` when the directive is absent or its value is not a
/// non-negative integer. Quoted values (`max-age="60"`) are accepted.
pub fn parse_max_age(header: &str) -> Option<Duration> {
    header
        .split(',')
        .filter_map(|directive| directive.trim().split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("max-age"))
        .and_then(|(_, value)| value.trim().trim_matches('"').parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Format a public `Cache-Control` value for the given max age.
pub fn format_max_age(max_age: Duration) -> String {
    format!("public, max-age={}", max_age.as_secs())
}
