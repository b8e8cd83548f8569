use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{DEV_IDENTITY_SUFFIXES, ONION_HOSTNAME_LEN, ONION_TLD};
use crate::error::IdentityError;

/// A peer's onion service hostname.
///
/// This is the stable identity of a chat partner and the key of its storage
/// bucket. Constructing one never fails, so any string coming over the event
/// bridge can be routed; use [`PeerIdentity::validate`] (or
/// [`PeerIdentity::parse`]) before dialing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerIdentity(String);

impl PeerIdentity {
    /// Wrap a hostname verbatim.
    pub fn new(hostname: impl Into<String>) -> Self {
        Self(hostname.into())
    }

    /// Normalize user input (trim, lowercase, drop `.onion`) and validate it.
    pub fn parse(input: &str) -> Result<Self, IdentityError> {
        let trimmed = input.trim().to_ascii_lowercase();
        let host = trimmed.strip_suffix(ONION_TLD).unwrap_or(&trimmed);
        let identity = Self(host.to_string());
        identity.validate()?;
        Ok(identity)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log lines.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }

    /// Whether this is a development loopback identity.
    pub fn is_dev(&self) -> bool {
        DEV_IDENTITY_SUFFIXES
            .iter()
            .any(|suffix| self.0.ends_with(suffix))
    }

    /// Check the hostname is 56 base32 characters (`a-z`, `2-7`), with an
    /// optional development suffix.
    pub fn validate(&self) -> Result<(), IdentityError> {
        if self.0.is_empty() {
            return Err(IdentityError::Empty);
        }

        let body = DEV_IDENTITY_SUFFIXES
            .iter()
            .find_map(|suffix| self.0.strip_suffix(suffix))
            .unwrap_or(&self.0);

        if let Some(bad) = body
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || ('2'..='7').contains(c)))
        {
            return Err(IdentityError::InvalidCharacter(bad));
        }

        if body.len() != ONION_HOSTNAME_LEN {
            return Err(IdentityError::InvalidLength {
                expected: ONION_HOSTNAME_LEN,
                actual: body.len(),
            });
        }

        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerIdentity {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PeerIdentity {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for PeerIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_host() -> String {
        "a2b3c4d5".repeat(7)
    }

    #[test]
    fn test_valid_hostname() {
        let id = PeerIdentity::new(valid_host());
        assert!(id.is_valid());
        assert!(!id.is_dev());
    }

    #[test]
    fn test_parse_strips_tld_and_case() {
        let input = format!("  {}.ONION ", valid_host().to_uppercase());
        let id = PeerIdentity::parse(&input).unwrap();
        assert_eq!(id.as_str(), valid_host());
    }

    #[test]
    fn test_dev_suffix_accepted() {
        let id = PeerIdentity::new(format!("{}-dev-server", valid_host()));
        assert!(id.is_valid());
        assert!(id.is_dev());
    }

    #[test]
    fn test_wrong_length_rejected() {
        let err = PeerIdentity::new("abc").validate().unwrap_err();
        assert_eq!(
            err,
            IdentityError::InvalidLength {
                expected: ONION_HOSTNAME_LEN,
                actual: 3
            }
        );
    }

    #[test]
    fn test_bad_alphabet_rejected() {
        // '1' and '8' are not part of the base32 alphabet
        let host = format!("{}1", &valid_host()[..55]);
        assert_eq!(
            PeerIdentity::new(host).validate(),
            Err(IdentityError::InvalidCharacter('1'))
        );
        assert_eq!(PeerIdentity::new("").validate(), Err(IdentityError::Empty));
    }

    #[test]
    fn test_short() {
        let id = PeerIdentity::new(valid_host());
        assert_eq!(id.short(), "a2b3c4d5");
        assert_eq!(PeerIdentity::new("abc").short(), "abc");
    }

    #[test]
    fn test_serde_transparent() {
        let id = PeerIdentity::new("peer");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"peer\"");
    }
}
