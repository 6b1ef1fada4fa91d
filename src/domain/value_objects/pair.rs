//! Canonical user pair.
//!
//! A two-user identity normalized so that `(a, b)` and `(b, a)` resolve to the
//! same key. Private chats and pending friend requests are unique per pair.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::shared::error::AppError;

/// Two distinct user ids stored as `(low, high)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CanonicalPair {
    low: i64,
    high: i64,
}

impl CanonicalPair {
    /// Normalize two user ids. Fails when both ids are the same user.
    pub fn new(a: i64, b: i64) -> Result<Self, AppError> {
        if a == b {
            return Err(AppError::Validation(
                "A pair requires two distinct users".into(),
            ));
        }
        Ok(Self {
            low: a.min(b),
            high: a.max(b),
        })
    }

    pub fn low(&self) -> i64 {
        self.low
    }

    pub fn high(&self) -> i64 {
        self.high
    }

    pub fn contains(&self, user_id: i64) -> bool {
        self.low == user_id || self.high == user_id
    }

    /// The member of the pair that is not `user_id`.
    pub fn other(&self, user_id: i64) -> Option<i64> {
        if user_id == self.low {
            Some(self.high)
        } else if user_id == self.high {
            Some(self.low)
        } else {
            None
        }
    }

    pub fn members(&self) -> [i64; 2] {
        [self.low, self.high]
    }
}

impl fmt::Display for CanonicalPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.low, self.high)
    }
}
