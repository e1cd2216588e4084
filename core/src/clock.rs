//! Engine clock — the single source of "now".
//!
//! Every operation reads the clock exactly once and threads that instant
//! through all of its window computations.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineClock {
    #[default]
    System,
    Fixed(DateTime<Utc>),
}

impl EngineClock {
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Self::System => Utc::now(),
            Self::Fixed(at) => *at,
        }
    }

    /// Move a fixed clock forward. A system clock is left untouched.
    pub fn advance(&mut self, by: chrono::Duration) {
        if let Self::Fixed(at) = self {
            *at += by;
        }
    }
}
