//! Chat channel identifier.
//!
//! Channel ids are minted by the persistence layer (they are opaque strings
//! such as database object ids), so [`ChannelId`] wraps a `String` rather
//! than generating values itself.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a chat channel, used as the key of the membership index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// Wraps an existing channel id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parses an optional raw id, treating empty or whitespace-only input
    /// as "no channel".
    #[must_use]
    pub fn parse_optional(raw: Option<&str>) -> Option<Self> {
        raw.map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Self::new)
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ChannelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_optional_rejects_blank() {
        assert_eq!(ChannelId::parse_optional(None), None);
        assert_eq!(ChannelId::parse_optional(Some("")), None);
        assert_eq!(ChannelId::parse_optional(Some("   ")), None);
    }

    #[test]
    fn parse_optional_trims() {
        assert_eq!(
            ChannelId::parse_optional(Some(" c1 ")),
            Some(ChannelId::from("c1"))
        );
    }
}
