//! Environment indirection for configuration strings
//!
//! Any configuration value shaped `_NAME_` stands for the value of the
//! environment variable `NAME`. An unset variable resolves to the empty string.

/// Returns the variable name inside a `_NAME_` placeholder
pub fn placeholder_name(token: &str) -> Option<&str> {
    if token.len() >= 2 && token.starts_with('_') && token.ends_with('_') {
        Some(&token[1..token.len() - 1])
    } else {
        None
    }
}

/// Resolve `val` against the process environment
pub fn actual_value(val: &str) -> String {
    actual_value_with(val, |name| std::env::var(name).ok())
}

/// Resolve `val` with a caller-supplied lookup
pub fn actual_value_with<F>(val: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    match placeholder_name(val) {
        Some(name) => lookup(name).unwrap_or_default(),
        None => val.to_string(),
    }
}
