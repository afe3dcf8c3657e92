use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A learned or transmittable remote code.
///
/// The text form is lowercase hex, two digits per byte, no separators.
/// Parsing accepts either case; the byte form round-trips exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code(Vec<u8>);

#[derive(Debug, Error)]
#[error("{0}")]
pub struct DecodeError(#[from] hex::FromHexError);

impl Code {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Code {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl FromStr for Code {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(hex::decode(s)?))
    }
}
