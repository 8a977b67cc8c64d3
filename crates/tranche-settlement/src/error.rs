use tranche_core::{Address, CoreError};

/// Errors that stop a plan before, or outside of, step execution.
///
/// Step failures are not errors: they are recorded in the report.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("plan has no steps")]
    EmptyPlan,

    #[error("step {step} ({label}) references unknown role {role:?}")]
    UnknownRole {
        step: usize,
        label: String,
        role: String,
    },

    #[error("step {step} ({label}) cannot depend on step {depends_on}")]
    InvalidDependency {
        step: usize,
        label: String,
        depends_on: usize,
    },

    #[error("invalid scenario: {0}")]
    InvalidScenario(String),

    #[error("duplicate step label {0:?}")]
    DuplicateLabel(String),

    #[error("signer {0} appears in more than one concurrent plan")]
    SharedSigner(Address),

    #[error("state machine violation: {0}")]
    InvalidState(#[from] CoreError),
}
