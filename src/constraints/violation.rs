//! Constraint violations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The rule a violation breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViolationKind {
    /// Two rotations of the same student share a day.
    NoOverlap,
    /// Fewer idle days than required between two rotations of a student.
    MinBreak,
    /// More students on a service than it has seats on some day.
    CapacityBound,
    /// `order` disagrees with chronological order, or is not 1..k.
    OrderMonotonic,
    /// Rotation length differs from the service's configured duration.
    DurationBound,
}

impl ViolationKind {
    /// Default severity of the rule.
    ///
    /// Ordering and duration are soft: manual edits may break them
    /// temporarily.
    pub fn severity(self) -> Severity {
        match self {
            Self::NoOverlap | Self::MinBreak | Self::CapacityBound => Severity::Error,
            Self::OrderMonotonic | Self::DurationBound => Severity::Warning,
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoOverlap => "NoOverlap",
            Self::MinBreak => "MinBreak",
            Self::CapacityBound => "CapacityBound",
            Self::OrderMonotonic => "OrderMonotonic",
            Self::DurationBound => "DurationBound",
        };
        f.write_str(name)
    }
}

/// Blocking vs. informative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Surfaced, never blocks.
    Warning,
    /// Blocks generation steps and edits.
    Error,
}

/// A broken rule with its context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub severity: Severity,
    /// Student or service the violation is about.
    pub entity_id: String,
    /// Rotations involved.
    pub rotation_ids: Vec<String>,
    /// Human-readable description.
    pub message: String,
}

impl Violation {
    /// Creates a violation with the kind's default severity.
    pub fn new(kind: ViolationKind, entity_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            entity_id: entity_id.into(),
            rotation_ids: Vec::new(),
            message: message.into(),
        }
    }

    /// Records an involved rotation.
    pub fn with_rotation(mut self, rotation_id: impl Into<String>) -> Self {
        self.rotation_ids.push(rotation_id.into());
        self
    }

    /// Whether the violation blocks.
    #[inline]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Result of checking one candidate rotation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub violations: Vec<Violation>,
}

impl CheckOutcome {
    /// Whether no error-class violation was found.
    pub fn is_ok(&self) -> bool {
        !self.violations.iter().any(Violation::is_error)
    }

    /// First error-class violation, if any.
    pub fn first_error(&self) -> Option<&Violation> {
        self.violations.iter().find(|v| v.is_error())
    }

    /// Error-class violations.
    pub fn errors(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| v.is_error())
    }

    /// Warning-class violations.
    pub fn warnings(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| !v.is_error())
    }

    pub(crate) fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    pub(crate) fn extend(&mut self, violations: impl IntoIterator<Item = Violation>) {
        self.violations.extend(violations);
    }
}
