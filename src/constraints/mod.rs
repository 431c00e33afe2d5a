//! Planning rules.
//!
//! Hard rules (`NoOverlap`, `MinBreak`, `CapacityBound`) block generation
//! steps and edits. Soft rules (`OrderMonotonic`, `DurationBound`) surface as
//! warnings. The same [`ConstraintEngine`] is used by the scheduler's
//! self-check, by the validator and by rotation edits, so a rotation that
//! passes one passes all three.

mod engine;
mod violation;

pub use engine::{ConstraintEngine, Overload};
pub use violation::{CheckOutcome, Severity, Violation, ViolationKind};
