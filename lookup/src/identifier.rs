//! Identifier normalization
//!
//! Identifiers are numeric strings of at most four digits. Values under 100
//! are zero-padded to three digits so that `"7"` and `"007"` name the same
//! record.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum number of digits kept from the input
pub const MAX_DIGITS: usize = 4;

/// Errors returned by [`normalize`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// Input contained something other than ASCII digits
    #[error("identifier `{0}` is not numeric")]
    NotNumeric(String),

    /// Input was blank where an identifier is required
    #[error("identifier is empty")]
    Empty,
}

/// A normalized record identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// The normalized text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Normalize raw input into an identifier
///
/// Blank input means "no identifier" and yields `Ok(None)`. Leading zeros
/// are stripped, then digits past the fourth are dropped.
///
/// # Errors
///
/// Returns [`IdentifierError::NotNumeric`] if the trimmed input contains
/// anything but ASCII digits.
///
/// # Example
///
/// ```
/// use record_lookup::identifier::normalize;
///
/// assert_eq!(normalize("7").unwrap().unwrap().as_str(), "007");
/// assert_eq!(normalize("99999").unwrap().unwrap().as_str(), "9999");
/// assert!(normalize("  ").unwrap().is_none());
/// ```
pub fn normalize(raw: &str) -> Result<Option<Identifier>, IdentifierError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(IdentifierError::NotNumeric(trimmed.to_string()));
    }

    let significant = match trimmed.trim_start_matches('0') {
        "" => "0",
        rest => rest,
    };
    let digits = &significant[..significant.len().min(MAX_DIGITS)];
    let value: u16 = digits
        .parse()
        .map_err(|_| IdentifierError::NotNumeric(trimmed.to_string()))?;

    let text = if value < 100 {
        format!("{value:03}")
    } else {
        value.to_string()
    };

    Ok(Some(Identifier(text)))
}

impl std::str::FromStr for Identifier {
    type Err = IdentifierError;

    /// Like [`normalize`], but blank input is an error
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        normalize(s)?.ok_or(IdentifierError::Empty)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code can use unwrap

    use super::*;

    fn normalized(raw: &str) -> String {
        normalize(raw).unwrap().unwrap().as_str().to_string()
    }

    #[test]
    fn test_small_values_are_padded() {
        assert_eq!(normalized("7"), "007");
        assert_eq!(normalized("42"), "042");
        assert_eq!(normalized("0"), "000");
    }

    #[test]
    fn test_long_values_are_truncated() {
        assert_eq!(normalized("99999"), "9999");
        assert_eq!(normalized("123456"), "1234");
    }

    #[test]
    fn test_leading_zeros_collapse() {
        assert_eq!(normalized("0150"), "150");
        assert_eq!(normalized("0007"), "007");
        assert_eq!(normalized("0000"), "000");
    }

    #[test]
    fn test_leading_zeros_do_not_count_toward_length() {
        assert_eq!(normalized("00007"), "007");
        assert_eq!(normalized("000001234"), "1234");
        assert_eq!(normalized("0012345"), "1234");
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        assert_eq!(normalized("  25 \n"), "025");
    }

    #[test]
    fn test_blank_is_no_identifier() {
        assert_eq!(normalize(""), Ok(None));
        assert_eq!(normalize("   "), Ok(None));
    }

    #[test]
    fn test_non_numeric_is_rejected() {
        assert_eq!(
            normalize("abc"),
            Err(IdentifierError::NotNumeric("abc".to_string()))
        );
        assert!(normalize("12a").is_err());
        assert!(normalize("-5").is_err());
    }

    #[test]
    fn test_from_str_requires_a_value() {
        assert_eq!("8".parse::<Identifier>().unwrap().as_str(), "008");
        assert_eq!("".parse::<Identifier>(), Err(IdentifierError::Empty));
    }
}
