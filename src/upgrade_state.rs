//! Upgrade State Machine
//!
//! Tracks where an upgrade run is in its protocol and rejects out-of-order
//! transitions, so a commit can never happen without a step having run.
//!
//! # Stage Flow
//!
//! ```text
//! Idle
//!   ↓
//! ResolvingPosition ──────────────→ Done
//!   ↓                   ↓
//! RunningStep        Committing (version hop without steps)
//!   ↓                   ↓
//! Committing ──→ RunningStep | Done
//!
//! (Any non-terminal stage can transition to Failed)
//! ```

use strum::{Display, EnumIter};
use thiserror::Error;

/// Stages of a single upgrade run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum UpgradeStage {
    #[strum(serialize = "Idle")]
    Idle,
    #[strum(serialize = "Resolving position")]
    ResolvingPosition,
    #[strum(serialize = "Running step")]
    RunningStep,
    #[strum(serialize = "Committing")]
    Committing,
    #[strum(serialize = "Upgrade complete")]
    Done,
    #[strum(serialize = "Upgrade failed")]
    Failed,
}

impl UpgradeStage {
    /// Returns true if this is a terminal state (Done or Failed)
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if `next` is a legal successor of this stage.
    pub const fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (_, Self::Failed)
                | (Self::Idle, Self::ResolvingPosition)
                | (Self::ResolvingPosition, Self::RunningStep)
                | (Self::ResolvingPosition, Self::Committing)
                | (Self::ResolvingPosition, Self::Done)
                | (Self::RunningStep, Self::Committing)
                | (Self::Committing, Self::RunningStep)
                | (Self::Committing, Self::Done)
        )
    }
}

/// Errors that can occur during state transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpgradeTransitionError {
    #[error("Cannot transition from terminal state {from}")]
    FromTerminalState { from: UpgradeStage },

    #[error("Cannot transition from {from} to {to}")]
    InvalidTransition { from: UpgradeStage, to: UpgradeStage },
}

/// Progress of one upgrade run.
#[derive(Debug, Clone)]
pub struct UpgradeContext {
    current: UpgradeStage,
    failed_at: Option<UpgradeStage>,
    steps_committed: usize,
}

impl Default for UpgradeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl UpgradeContext {
    pub fn new() -> Self {
        Self {
            current: UpgradeStage::Idle,
            failed_at: None,
            steps_committed: 0,
        }
    }

    #[inline]
    pub fn current_stage(&self) -> UpgradeStage {
        self.current
    }

    /// Stage at which the run failed, if it did
    #[inline]
    pub fn failed_at(&self) -> Option<UpgradeStage> {
        self.failed_at
    }

    /// Number of steps committed to the tracker in this run
    #[inline]
    pub fn steps_committed(&self) -> usize {
        self.steps_committed
    }

    pub fn transition_to(
        &mut self,
        target: UpgradeStage,
    ) -> Result<UpgradeStage, UpgradeTransitionError> {
        if self.current.is_terminal() {
            return Err(UpgradeTransitionError::FromTerminalState { from: self.current });
        }
        if !self.current.can_transition_to(target) {
            return Err(UpgradeTransitionError::InvalidTransition {
                from: self.current,
                to: target,
            });
        }

        if target == UpgradeStage::Failed {
            self.failed_at = Some(self.current);
        }
        self.current = target;
        Ok(target)
    }

    /// Record a finished commit. Only valid while committing.
    pub fn record_commit(&mut self) -> Result<(), UpgradeTransitionError> {
        if self.current != UpgradeStage::Committing {
            return Err(UpgradeTransitionError::InvalidTransition {
                from: self.current,
                to: UpgradeStage::Committing,
            });
        }
        self.steps_committed += 1;
        Ok(())
    }

    /// Mark the run as failed.
    pub fn fail(&mut self) -> Result<(), UpgradeTransitionError> {
        self.transition_to(UpgradeStage::Failed).map(|_| ())
    }

    /// Reset to Idle for a new run.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl From<UpgradeTransitionError> for crate::error::UpgradeError {
    fn from(err: UpgradeTransitionError) -> Self {
        crate::error::UpgradeError::transition(err.to_string())
    }
}
