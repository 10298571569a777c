//! Identifier (EAI code) extraction from free-text names.

use iisrecon_report_schema::{Delimiter, IdentifierMatch};
use regex::Regex;
use std::sync::LazyLock;

/// `1234-Portal`, `12345_Orders`.
static LEADING_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^([0-9]{4,5})([-_])(.+)$").unwrap());

/// `Portal-1234`, `Orders_12345`.
static TRAILING_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^(.+)([-_])([0-9]{4,5})$").unwrap());

/// Extract a leading or trailing 4-5 digit code from `name`.
///
/// The leading form is tried first. Names with no code yield an unmatched
/// result whose remainder is the original name.
pub fn extract(name: &str) -> IdentifierMatch {
    if let Some(caps) = LEADING_CODE.captures(name) {
        if let Some(delimiter) = delimiter_of(&caps[2]) {
            return IdentifierMatch::found(&caps[1], delimiter, &caps[3]);
        }
    }

    if let Some(caps) = TRAILING_CODE.captures(name) {
        if let Some(delimiter) = delimiter_of(&caps[2]) {
            return IdentifierMatch::found(&caps[3], delimiter, &caps[1]);
        }
    }

    IdentifierMatch::not_found(name)
}

fn delimiter_of(s: &str) -> Option<Delimiter> {
    s.chars().next().and_then(Delimiter::from_char)
}
