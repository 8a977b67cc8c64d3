use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Lifecycle of a single settlement step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepState {
    /// Not yet submitted.
    Pending,
    /// Accepted by the network's pre-validation.
    Submitted,
    /// Waiting for the network to validate the transaction.
    AwaitingFinality,
    /// Validated and applied. Final.
    Committed,
    /// Refused locally, by pre-validation, or validated as failed. Final.
    Rejected,
    /// Finality could not be established; may or may not have committed. Final.
    Unknown,
}

impl StepState {
    /// Whether this is a final (terminal) state.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Committed | Self::Rejected | Self::Unknown)
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Submitted => write!(f, "Submitted"),
            Self::AwaitingFinality => write!(f, "AwaitingFinality"),
            Self::Committed => write!(f, "Committed"),
            Self::Rejected => write!(f, "Rejected"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Events that drive a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent {
    /// The operation could not be built, or submission was refused.
    SubmissionFailed,
    /// The network accepted the submission.
    SubmissionAccepted,
    /// The orchestrator started waiting for finality.
    AwaitStarted,
    /// The network validated the transaction as successful.
    Validated,
    /// The network validated the transaction as failed.
    ValidatedFailed,
    /// The wait timed out or the connection dropped.
    Indeterminate,
}

/// Step transitions:
/// - Pending → Rejected (SubmissionFailed)
/// - Pending → Submitted (SubmissionAccepted)
/// - Submitted → AwaitingFinality (AwaitStarted)
/// - AwaitingFinality → Committed (Validated)
/// - AwaitingFinality → Rejected (ValidatedFailed)
/// - AwaitingFinality → Unknown (Indeterminate)
pub struct StepStateMachine;

impl StepStateMachine {
    pub fn transition(current: StepState, event: StepEvent) -> Result<StepState, CoreError> {
        let new_state = match (current, event) {
            (StepState::Pending, StepEvent::SubmissionFailed) => StepState::Rejected,
            (StepState::Pending, StepEvent::SubmissionAccepted) => StepState::Submitted,
            (StepState::Submitted, StepEvent::AwaitStarted) => StepState::AwaitingFinality,
            (StepState::AwaitingFinality, StepEvent::Validated) => StepState::Committed,
            (StepState::AwaitingFinality, StepEvent::ValidatedFailed) => StepState::Rejected,
            (StepState::AwaitingFinality, StepEvent::Indeterminate) => StepState::Unknown,
            _ => {
                let target = match event {
                    StepEvent::SubmissionFailed | StepEvent::ValidatedFailed => StepState::Rejected,
                    StepEvent::SubmissionAccepted => StepState::Submitted,
                    StepEvent::AwaitStarted => StepState::AwaitingFinality,
                    StepEvent::Validated => StepState::Committed,
                    StepEvent::Indeterminate => StepState::Unknown,
                };
                return Err(CoreError::InvalidStepTransition {
                    from: current,
                    to: target,
                });
            }
        };

        tracing::trace!(from = %current, to = %new_state, event = ?event, "step transition");
        Ok(new_state)
    }
}

/// Lifecycle of a whole settlement plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanState {
    NotStarted,
    Running,
    /// Every step committed. Final.
    Completed,
    /// A step failed, was indeterminate, or the plan was cancelled. Final.
    Aborted,
}

impl PlanState {
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}

impl fmt::Display for PlanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "NotStarted"),
            Self::Running => write!(f, "Running"),
            Self::Completed => write!(f, "Completed"),
            Self::Aborted => write!(f, "Aborted"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanEvent {
    Started,
    AllStepsCommitted,
    Aborted,
}

/// Plan transitions:
/// - NotStarted → Running (Started)
/// - NotStarted → Aborted (Aborted), e.g. cancelled before the first step
/// - Running → Completed (AllStepsCommitted)
/// - Running → Aborted (Aborted)
pub struct PlanStateMachine;

impl PlanStateMachine {
    pub fn transition(current: PlanState, event: PlanEvent) -> Result<PlanState, CoreError> {
        let new_state = match (current, event) {
            (PlanState::NotStarted, PlanEvent::Started) => PlanState::Running,
            (PlanState::NotStarted, PlanEvent::Aborted) => PlanState::Aborted,
            (PlanState::Running, PlanEvent::AllStepsCommitted) => PlanState::Completed,
            (PlanState::Running, PlanEvent::Aborted) => PlanState::Aborted,
            _ => {
                let target = match event {
                    PlanEvent::Started => PlanState::Running,
                    PlanEvent::AllStepsCommitted => PlanState::Completed,
                    PlanEvent::Aborted => PlanState::Aborted,
                };
                return Err(CoreError::InvalidPlanTransition {
                    from: current,
                    to: target,
                });
            }
        };

        tracing::debug!(from = %current, to = %new_state, event = ?event, "plan transition");
        Ok(new_state)
    }
}
