use crate::error::{constants, ProtocolError, Result};
use rand::Rng;
use std::fmt;
use std::str::FromStr;

/// Characters used for generated identities.
const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Length of a generated identity.
pub const GENERATED_ID_LEN: usize = 8;

/// Upper bound for user-supplied identities.
pub const MAX_ID_LEN: usize = 64;

/// Opaque identity a node announces during the handshake.
///
/// Not guaranteed to be globally unique; with 36^8 possible generated values
/// collisions are treated as negligible.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    /// Generate a random 8 character lowercase alphanumeric identity.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let id = (0..GENERATED_ID_LEN)
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
            .collect();
        Self(id)
    }

    /// Build an identity from user input, checking it can travel as one text token.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(ProtocolError::InvalidIdentity(
                constants::ERR_IDENTITY_EMPTY.into(),
            ));
        }
        if id.len() > MAX_ID_LEN {
            return Err(ProtocolError::InvalidIdentity(
                constants::ERR_IDENTITY_TOO_LONG.into(),
            ));
        }
        if !id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(ProtocolError::InvalidIdentity(
                constants::ERR_IDENTITY_CHARSET.into(),
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NodeId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}
