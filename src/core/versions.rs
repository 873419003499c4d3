//! Version token handling (`v001`, `V12`, `v0042`).
//!
//! Tokens compare by their numeric value, independent of the prefix case
//! and of zero-padding width. Formatting always emits a lowercase `v`.

use lazy_static::lazy_static;
use regex::Regex;
use std::cmp::Ordering;

lazy_static! {
    static ref VERSION_RE: Regex = Regex::new(r"^[vV](\d+)$").unwrap();
    static ref VERSION_FORMAT_RE: Regex = Regex::new(r"^[vV]\d{1,4}$").unwrap();
}

/// Stateless version-token operations.
pub struct VersionManager;

impl VersionManager {
    /// Padding used when none is given
    pub const DEFAULT_PADDING: usize = 3;

    /// Parse a token into its integer value.
    ///
    /// Returns `None` for anything that is not `v`/`V` followed by digits.
    pub fn parse(token: &str) -> Option<u32> {
        VERSION_RE
            .captures(token.trim())
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
    }

    /// Format a number as a token: `format(9, 3) == "v009"`.
    pub fn format(n: u32, padding: usize) -> String {
        format!("v{:0width$}", n, width = padding)
    }

    /// Number of digits in a token body, or `None` if unparsable.
    pub fn padding_of(token: &str) -> Option<usize> {
        VERSION_RE
            .captures(token.trim())
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().len())
    }

    /// Stable numeric sort. Unparsable tokens go last in input order.
    pub fn sort<S: AsRef<str>>(tokens: &[S]) -> Vec<String> {
        let mut out: Vec<String> = tokens.iter().map(|t| t.as_ref().to_string()).collect();
        out.sort_by_key(|t| Self::parse(t).map_or(u64::MAX, u64::from));
        out
    }

    pub fn latest<S: AsRef<str>>(tokens: &[S]) -> Option<String> {
        Self::sort(tokens).pop()
    }

    pub fn earliest<S: AsRef<str>>(tokens: &[S]) -> Option<String> {
        Self::sort(tokens).into_iter().next()
    }

    /// Next version. An unparsable token restarts at version 1.
    pub fn increment(token: &str, padding: usize) -> String {
        match Self::parse(token) {
            Some(n) => Self::format(n.saturating_add(1), padding),
            None => Self::format(1, padding),
        }
    }

    /// Previous version, or `None` at v001 (there is nothing below it).
    pub fn decrement(token: &str, padding: usize) -> Option<String> {
        match Self::parse(token) {
            Some(n) if n > 1 => Some(Self::format(n - 1, padding)),
            _ => None,
        }
    }

    /// Numeric comparison; unparsable tokens count as 0.
    pub fn compare(a: &str, b: &str) -> Ordering {
        let na = Self::parse(a).unwrap_or(0);
        let nb = Self::parse(b).unwrap_or(0);
        na.cmp(&nb)
    }

    /// Inclusive range of tokens. Reversed bounds are swapped and
    /// unparsable bounds count as 1.
    pub fn version_range(start: &str, end: &str, padding: usize) -> Vec<String> {
        let mut lo = Self::parse(start).unwrap_or(1);
        let mut hi = Self::parse(end).unwrap_or(1);
        if lo > hi {
            std::mem::swap(&mut lo, &mut hi);
        }
        (lo..=hi).map(|n| Self::format(n, padding)).collect()
    }

    /// Loose format check used by validators (`v1`..`v9999`).
    pub fn is_valid_format(token: &str) -> bool {
        VERSION_FORMAT_RE.is_match(token)
    }
}
