//! Room codes: short opaque identifiers shared out of band.
//!
//! Codes are generated client-side with no uniqueness check; collisions are
//! the relay's problem. Joiners may type any non-empty text.

use std::fmt;
use std::str::FromStr;

use rand::Rng;

use crate::error::SessionError;

pub const ROOM_CODE_LEN: usize = 6;
pub const ROOM_CODE_ALPHABET: &[u8] = b"1234567890ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz@#$%&!?";

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RoomCode(String);

impl RoomCode {
    /// Generate a fresh code from the thread-local RNG.
    #[must_use]
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::rng())
    }

    /// Generate a code from `rng`; each character is drawn independently.
    pub fn generate_with<R: Rng>(rng: &mut R) -> Self {
        let code = (0..ROOM_CODE_LEN)
            .map(|_| {
                let idx = rng.random_range(0..ROOM_CODE_ALPHABET.len());
                ROOM_CODE_ALPHABET[idx] as char
            })
            .collect();
        Self(code)
    }

    /// Accept a user-entered code as-is.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::EmptyJoinTarget`] for empty or whitespace-only input.
    pub fn parse(input: &str) -> Result<Self, SessionError> {
        if input.trim().is_empty() {
            return Err(SessionError::EmptyJoinTarget);
        }
        Ok(Self(input.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RoomCode {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for RoomCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[path = "room_code_test.rs"]
mod tests;
