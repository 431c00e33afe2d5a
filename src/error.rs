//! Error taxonomy for planning operations.
//!
//! | Variant | Cause | Retry |
//! |---------|-------|-------|
//! | `Validation` | Missing or malformed input | No |
//! | `ConstraintViolation` | A hard planning rule would be broken | No |
//! | `InsufficientServices` / `InsufficientCapacity` | Structurally infeasible generation | No |
//! | `GenerationInProgress` | Another generation holds the scope | Later |
//! | `ConcurrencyConflict` | Version collision on a single mutation | Yes |
//! | `NotFound` | Unknown entity id | No |
//! | `AlreadyArchived` / `AlreadySuperseded` | Schedule lineage rules | No |

use thiserror::Error;

use crate::config::ConfigError;
use crate::constraints::ViolationKind;

/// Result alias used across the crate.
pub type PlanningResult<T> = Result<T, PlanningError>;

/// Errors raised by the scheduler, the constraint engine and the planner.
#[derive(Debug, Error)]
pub enum PlanningError {
    /// Input missing or malformed.
    #[error("validation error: {0}")]
    Validation(String),

    /// A hard constraint would be broken by the operation.
    #[error("constraint violation ({kind}): {detail}")]
    ConstraintViolation { kind: ViolationKind, detail: String },

    /// The scope has no service to schedule on.
    #[error("no service assigned to {scope}")]
    InsufficientServices { scope: String },

    /// Demanded seat-days exceed what the service pool offers.
    #[error("insufficient capacity for {scope}: {demanded_days} seat-days demanded, {available_days} available")]
    InsufficientCapacity {
        scope: String,
        demanded_days: i64,
        available_days: i64,
    },

    /// A generation for the same scope is already running.
    #[error("generation already in progress for {scope}")]
    GenerationInProgress { scope: String },

    /// The entity changed between read and write.
    #[error("concurrent modification of {entity} '{id}'")]
    ConcurrencyConflict { entity: &'static str, id: String },

    /// No entity with this id.
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// The schedule is archived and cannot change.
    #[error("schedule '{id}' is already archived")]
    AlreadyArchived { id: String },

    /// The schedule already has a successor version.
    #[error("schedule '{id}' already superseded by '{successor_id}'")]
    AlreadySuperseded { id: String, successor_id: String },

    /// Settings could not be loaded or are invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PlanningError {
    pub(crate) fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }

    /// Constraint kind for `ConstraintViolation` errors.
    pub fn violation_kind(&self) -> Option<ViolationKind> {
        match self {
            Self::ConstraintViolation { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
