//! Per-credential rotation state machine.
//!
//! ```text
//! Idle -> RotatingAuthoritative -> PropagatingSecondary -> Done
//!                 |                          \-> PartiallyPropagated
//!                 \-> Failed
//! ```

use serde::Serialize;
use std::fmt;

use crate::error::{Result, RotationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationState {
    Idle,
    RotatingAuthoritative,
    PropagatingSecondary,
    /// Every configured store holds the new value.
    Done,
    /// The authoritative store rotated; at least one secondary did not confirm.
    PartiallyPropagated,
    /// The authoritative rotation failed; nothing changed and a retry is safe.
    Failed,
}

impl RotationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::PartiallyPropagated | Self::Failed)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        use RotationState::*;
        matches!(
            (self, next),
            (Idle, RotatingAuthoritative)
                | (RotatingAuthoritative, PropagatingSecondary)
                | (RotatingAuthoritative, Failed)
                | (PropagatingSecondary, Done)
                | (PropagatingSecondary, PartiallyPropagated)
        )
    }

    pub fn transition(self, next: Self) -> Result<Self> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(RotationError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for RotationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::RotatingAuthoritative => "rotating-authoritative",
            Self::PropagatingSecondary => "propagating-secondary",
            Self::Done => "done",
            Self::PartiallyPropagated => "partially-propagated",
            Self::Failed => "failed",
        })
    }
}
