//! Nonce classification for incoming bridge events
//!
//! Each chain carries its own strictly increasing nonce sequence. An event is
//! only accepted when its nonce is exactly one past the last accepted nonce
//! (or 0 for the very first event of a chain).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Verdict of [`validate_nonce`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonceValidation {
    /// Nonce continues the sequence
    Success,
    /// Sequence has a gap (forward or backward)
    MissedNonce,
    /// Nonce was already accepted for this chain
    DuplicatedNonce,
}

impl NonceValidation {
    pub fn as_str(&self) -> &'static str {
        match self {
            NonceValidation::Success => "success",
            NonceValidation::MissedNonce => "missed_nonce",
            NonceValidation::DuplicatedNonce => "duplicated_nonce",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, NonceValidation::Success)
    }
}

impl fmt::Display for NonceValidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classify `current_nonce` against the last accepted nonce of its chain.
///
/// The duplicate check runs first: with `duplicate_check` set, any nonce at or
/// below `last_nonce` is a duplicate, whatever the ordering rule would say.
pub fn validate_nonce(
    last_nonce: Option<u64>,
    current_nonce: u64,
    duplicate_check: bool,
) -> NonceValidation {
    match last_nonce {
        Some(last) if duplicate_check && current_nonce <= last => NonceValidation::DuplicatedNonce,
        None if current_nonce == 0 => NonceValidation::Success,
        None => NonceValidation::MissedNonce,
        Some(last) if last.checked_add(1) == Some(current_nonce) => NonceValidation::Success,
        Some(_) => NonceValidation::MissedNonce,
    }
}
