//! Entry-symbol extraction
//!
//! A best-effort text scan for languages whose file or launcher name must
//! match a symbol declared in the source (e.g. Java's public class). This is
//! not a parser: comments and string literals are not understood, and the
//! first match wins.

use crate::config::EntryConfig;

/// Longest entry name accepted from source text
const MAX_ENTRY_LEN: usize = 128;

/// Extract the entry name from `source`, or return the configured fallback
///
/// The captured name must be a plain identifier (ASCII letters, digits,
/// underscores) so it can be used as a file name; anything else falls back.
pub fn extract_entry(config: &EntryConfig, source: &str) -> Result<String, regex::Error> {
    let found = config
        .regex()?
        .captures(source)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|name| is_identifier(name));

    Ok(found.unwrap_or(&config.fallback).to_owned())
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_ENTRY_LEN
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
