use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// OCC option symbology caps an option root at six characters.
pub const MAX_ROOT_LEN: usize = 6;

/// Underlying root as the quote server keys it: upper-case letters and digits,
/// no share-class punctuation (`BRK.B` lists as `BRKB`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Root(String);

impl Root {
    /// Normalize a user-typed root. Share-class separators (`.`, `/`, `-`,
    /// spaces) are dropped before validation.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let root: String = input
            .trim()
            .chars()
            .filter(|ch| !matches!(ch, '.' | '/' | '-' | ' '))
            .map(|ch| ch.to_ascii_uppercase())
            .collect();

        match root.chars().next() {
            None => return Err(ValidationError::EmptyRoot),
            Some(first) if !first.is_ascii_alphabetic() => {
                return Err(ValidationError::RootInvalidStart { ch: first })
            }
            Some(_) => {}
        }
        let invalid = root
            .chars()
            .enumerate()
            .find(|(_, ch)| !ch.is_ascii_alphanumeric());
        if let Some((index, ch)) = invalid {
            return Err(ValidationError::RootInvalidChar { ch, index });
        }
        if root.len() > MAX_ROOT_LEN {
            return Err(ValidationError::RootTooLong {
                len: root.len(),
                max: MAX_ROOT_LEN,
            });
        }

        Ok(Self(root))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Root {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Root {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Root> for String {
    fn from(value: Root) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share_class_separators_are_dropped() {
        for input in [" brk.b ", "BRK/B", "brk-b", "BRK B"] {
            assert_eq!(Root::parse(input).expect("root").as_str(), "BRKB");
        }
    }

    #[test]
    fn weekly_and_adjusted_roots_keep_their_digits() {
        assert_eq!(Root::parse("spxw").expect("root").as_str(), "SPXW");
        assert_eq!(Root::parse("AAPL1").expect("root").as_str(), "AAPL1");
    }

    #[test]
    fn roots_longer_than_the_occ_limit_are_rejected() {
        assert!(matches!(
            Root::parse("ABCDEFG"),
            Err(ValidationError::RootTooLong { len: 7, max: 6 })
        ));
    }

    #[test]
    fn malformed_roots_are_rejected() {
        assert!(matches!(Root::parse("  "), Err(ValidationError::EmptyRoot)));
        assert!(matches!(
            Root::parse("1AAPL"),
            Err(ValidationError::RootInvalidStart { ch: '1' })
        ));
        assert!(matches!(
            Root::parse("AAPL$"),
            Err(ValidationError::RootInvalidChar { ch: '$', index: 4 })
        ));
    }
}
