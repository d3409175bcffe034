use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one simulation attempt.
///
/// Allocated by the scheduler from a monotonically increasing counter and never reused during its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunNumber(u64);

impl RunNumber {
    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for RunNumber {
    fn from(n: u64) -> Self {
        Self(n)
    }
}

impl From<RunNumber> for u64 {
    fn from(n: RunNumber) -> Self {
        n.0
    }
}

impl fmt::Display for RunNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
