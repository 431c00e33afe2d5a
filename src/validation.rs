//! Input and planning validation.
//!
//! Two levels:
//! - [`validate_scope`] checks the structural integrity of a scheduling
//!   scope before generation (duplicate ids, zero capacity or duration,
//!   students from another promotion). All problems are collected.
//! - [`validate_planning`] audits a stored planning: every pairwise and
//!   capacity rule, order and duration warnings, and coverage gaps
//!   (services nobody visits, students missing services).

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::config::PlanningSettings;
use crate::constraints::{ConstraintEngine, Violation};
use crate::models::{Planning, Rotation, Service, Student};
use crate::scheduler::SchedulingScope;

/// Validation result.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// A validation error.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Error category.
    pub kind: ValidationErrorKind,
    /// Human-readable description.
    pub message: String,
}

/// Categories of validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Two entities share the same ID.
    DuplicateId,
    /// A service offers no place.
    ZeroCapacity,
    /// A service has a zero-day internship length.
    ZeroDuration,
    /// A student belongs to another promotion.
    ForeignStudent,
}

impl ValidationError {
    fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Validates the input of a scheduling run.
///
/// Checks:
/// 1. No duplicate student IDs
/// 2. No duplicate service IDs
/// 3. Every service has at least one place and one day
/// 4. Every student belongs to the scope's promotion
///
/// An empty pool or an empty student list is not reported here.
///
/// # Returns
/// `Ok(())` if all checks pass, `Err(errors)` with all detected issues.
pub fn validate_scope(scope: &SchedulingScope) -> ValidationResult {
    let mut errors = Vec::new();

    let mut service_ids = HashSet::new();
    for s in &scope.services {
        if !service_ids.insert(s.id.as_str()) {
            errors.push(ValidationError::new(
                ValidationErrorKind::DuplicateId,
                format!("Duplicate service ID: {}", s.id),
            ));
        }
        if s.places_disponibles == 0 {
            errors.push(ValidationError::new(
                ValidationErrorKind::ZeroCapacity,
                format!("Service '{}' has no available place", s.id),
            ));
        }
        if s.duree_stage_jours == 0 {
            errors.push(ValidationError::new(
                ValidationErrorKind::ZeroDuration,
                format!("Service '{}' has a zero-day internship length", s.id),
            ));
        }
    }

    let mut student_ids = HashSet::new();
    for st in &scope.students {
        if !student_ids.insert(st.id.as_str()) {
            errors.push(ValidationError::new(
                ValidationErrorKind::DuplicateId,
                format!("Duplicate student ID: {}", st.id),
            ));
        }
        if st.promotion_id != scope.promotion_id {
            errors.push(ValidationError::new(
                ValidationErrorKind::ForeignStudent,
                format!(
                    "Student '{}' belongs to promotion '{}', not '{}'",
                    st.id, st.promotion_id, scope.promotion_id
                ),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Coverage problem found while auditing a planning. Never blocking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoverageWarning {
    /// A service of the pool hosts nobody.
    UnusedService { service_id: String },
    /// An active student did not visit every service of the pool.
    MissingServices {
        student_id: String,
        service_ids: Vec<String>,
    },
    /// A rotation references a service missing from the catalog.
    UnknownService {
        rotation_id: String,
        service_id: String,
    },
}

impl CoverageWarning {
    /// Human-readable description.
    pub fn message(&self) -> String {
        match self {
            Self::UnusedService { service_id } => {
                format!("Service '{service_id}' has no assignment")
            }
            Self::MissingServices {
                student_id,
                service_ids,
            } => format!(
                "Student '{student_id}' is missing {} service(s): {}",
                service_ids.len(),
                service_ids.join(", ")
            ),
            Self::UnknownService {
                rotation_id,
                service_id,
            } => format!("Rotation '{rotation_id}' references unknown service '{service_id}'"),
        }
    }
}

/// Audit of a stored planning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub planning_id: String,
    /// Hard rule violations.
    pub erreurs: Vec<Violation>,
    /// Soft rule violations.
    pub warnings: Vec<Violation>,
    /// Coverage gaps.
    pub coverage: Vec<CoverageWarning>,
}

impl ValidationReport {
    /// Whether no hard rule is broken.
    pub fn is_valid(&self) -> bool {
        self.erreurs.is_empty()
    }
}

/// What an audit runs against.
#[derive(Debug, Clone, Copy)]
pub struct AuditContext<'a> {
    /// Service pool of the planning's scope.
    pub services: &'a [Service],
    /// Every known service, used to look up rotations' services.
    pub catalog: &'a [Service],
    /// Active students expected in the planning.
    pub students: &'a [Student],
    /// Rotations to leave out (only referenced by archived schedules).
    pub retired: &'a HashSet<String>,
}

/// Re-runs every rule over a planning.
///
/// Rotations listed in `ctx.retired` are ignored. Student and service
/// groups are visited in id order so the report is stable.
pub fn validate_planning(
    planning: &Planning,
    ctx: AuditContext<'_>,
    settings: &PlanningSettings,
) -> ValidationReport {
    let engine = ConstraintEngine::new(settings);
    let mut erreurs = Vec::new();
    let mut warnings = Vec::new();
    let mut coverage = Vec::new();

    let live: Vec<&Rotation> = planning
        .rotations
        .iter()
        .filter(|r| !ctx.retired.contains(&r.id))
        .collect();

    let mut by_student: BTreeMap<&str, Vec<&Rotation>> = BTreeMap::new();
    let mut by_service: BTreeMap<&str, Vec<&Rotation>> = BTreeMap::new();
    for &r in &live {
        by_student.entry(r.student_id.as_str()).or_default().push(r);
        by_service.entry(r.service_id.as_str()).or_default().push(r);
    }

    for rotations in by_student.values() {
        for (i, a) in rotations.iter().enumerate() {
            for b in &rotations[i + 1..] {
                if let Some(v) = engine.check_pair(a, b) {
                    erreurs.push(v);
                }
            }
        }
        if let Some(v) = engine.check_sequence(rotations) {
            warnings.push(v);
        }
    }

    for (service_id, hosted) in &by_service {
        match ctx.catalog.iter().find(|s| s.id == *service_id) {
            Some(service) => {
                erreurs.extend(engine.check_capacity(service, hosted));
                warnings.extend(hosted.iter().filter_map(|r| engine.check_duration(r, service)));
            }
            None => coverage.extend(hosted.iter().map(|r| CoverageWarning::UnknownService {
                rotation_id: r.id.clone(),
                service_id: r.service_id.clone(),
            })),
        }
    }

    for service in ctx.services {
        if !by_service.contains_key(service.id.as_str()) {
            coverage.push(CoverageWarning::UnusedService {
                service_id: service.id.clone(),
            });
        }
    }

    for student in ctx.students.iter().filter(|s| s.is_active) {
        let visited: HashSet<&str> = by_student
            .get(student.id.as_str())
            .map(|rs| rs.iter().map(|r| r.service_id.as_str()).collect())
            .unwrap_or_default();
        let missing: Vec<String> = ctx
            .services
            .iter()
            .filter(|s| !visited.contains(s.id.as_str()))
            .map(|s| s.id.clone())
            .collect();
        if !missing.is_empty() {
            coverage.push(CoverageWarning::MissingServices {
                student_id: student.id.clone(),
                service_ids: missing,
            });
        }
    }

    ValidationReport {
        planning_id: planning.id.clone(),
        erreurs,
        warnings,
        coverage,
    }
}
