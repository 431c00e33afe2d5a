//! Rule evaluation for rotations.
//!
//! # Rules
//!
//! | Rule | Scope | Severity |
//! |------|-------|----------|
//! | NoOverlap | student | error |
//! | MinBreak | student | error |
//! | CapacityBound | service | error |
//! | OrderMonotonic | student | warning |
//! | DurationBound | rotation | warning |
//!
//! # Capacity
//! Occupancy is computed with a sweep over start/end events: each rotation
//! adds one student on `date_debut` and removes it the day after `date_fin`.
//! Complexity O(n log n) per service.

use chrono::NaiveDate;

use super::{CheckOutcome, Violation, ViolationKind};
use crate::config::PlanningSettings;
use crate::models::{Rotation, Service};

/// A period during which a service hosts more students than allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overload {
    pub service_id: String,
    /// First overloaded day.
    pub start: NaiveDate,
    /// Last overloaded day.
    pub end: NaiveDate,
    /// Highest occupancy reached in the period.
    pub peak: u32,
    /// Seats available.
    pub capacity: u32,
}

/// Checks rotations against the planning rules.
///
/// Built from the settings of the current operation; never caches them
/// across operations.
#[derive(Debug, Clone)]
pub struct ConstraintEngine {
    settings: PlanningSettings,
    break_days: i64,
}

impl ConstraintEngine {
    /// Creates an engine for the given settings.
    pub fn new(settings: &PlanningSettings) -> Self {
        Self {
            settings: settings.clone(),
            break_days: settings.break_days(),
        }
    }

    /// Seats usable on a service.
    pub fn capacity_of(&self, service: &Service) -> u32 {
        self.settings.effective_capacity(service.places_disponibles)
    }

    /// Checks a candidate rotation before it is stored.
    ///
    /// `student_rotations` and `service_rotations` are the rotations already
    /// stored; any entry with the candidate's id is ignored, so an edited
    /// rotation can be passed alongside its previous state.
    pub fn check(
        &self,
        candidate: &Rotation,
        student_rotations: &[Rotation],
        service: &Service,
        service_rotations: &[Rotation],
    ) -> CheckOutcome {
        let mut outcome = CheckOutcome::default();

        let siblings: Vec<&Rotation> = student_rotations
            .iter()
            .filter(|r| r.id != candidate.id && r.student_id == candidate.student_id)
            .collect();

        for other in &siblings {
            if let Some(v) = self.check_pair(candidate, other) {
                outcome.push(v);
            }
        }

        if let Some(v) = self.check_order(candidate, &siblings) {
            outcome.push(v);
        }

        if let Some(v) = self.check_duration(candidate, service) {
            outcome.push(v);
        }

        let mut hosted: Vec<&Rotation> = service_rotations
            .iter()
            .filter(|r| r.id != candidate.id && r.service_id == service.id)
            .collect();
        hosted.push(candidate);
        let overloads = self
            .overloads(service, &hosted)
            .into_iter()
            .filter(|o| o.start <= candidate.date_fin && candidate.date_debut <= o.end);
        outcome.extend(overloads.map(|o| {
            capacity_violation(service, &o).with_rotation(candidate.id.clone())
        }));

        outcome
    }

    /// NoOverlap and MinBreak between two rotations of the same student.
    pub fn check_pair(&self, a: &Rotation, b: &Rotation) -> Option<Violation> {
        match a.gap_days(b) {
            None => Some(
                Violation::new(
                    ViolationKind::NoOverlap,
                    a.student_id.clone(),
                    format!(
                        "Rotations {} ({}..{}) and {} ({}..{}) of student {} overlap",
                        a.order, a.date_debut, a.date_fin, b.order, b.date_debut, b.date_fin, a.student_id
                    ),
                )
                .with_rotation(a.id.clone())
                .with_rotation(b.id.clone()),
            ),
            Some(gap) if gap < self.break_days => Some(
                Violation::new(
                    ViolationKind::MinBreak,
                    a.student_id.clone(),
                    format!(
                        "Only {gap} break day(s) between rotations {} and {} of student {} ({} required)",
                        a.order, b.order, a.student_id, self.break_days
                    ),
                )
                .with_rotation(a.id.clone())
                .with_rotation(b.id.clone()),
            ),
            Some(_) => None,
        }
    }

    /// OrderMonotonic of a candidate against the student's other rotations.
    pub fn check_order(&self, candidate: &Rotation, siblings: &[&Rotation]) -> Option<Violation> {
        let conflict = siblings.iter().find(|other| {
            let earlier = candidate.date_debut < other.date_debut;
            let later = candidate.date_debut > other.date_debut;
            candidate.order == other.order
                || (earlier && candidate.order > other.order)
                || (later && candidate.order < other.order)
        })?;

        Some(
            Violation::new(
                ViolationKind::OrderMonotonic,
                candidate.student_id.clone(),
                format!(
                    "Order {} starting {} conflicts with order {} starting {} for student {}",
                    candidate.order,
                    candidate.date_debut,
                    conflict.order,
                    conflict.date_debut,
                    candidate.student_id
                ),
            )
            .with_rotation(candidate.id.clone())
            .with_rotation(conflict.id.clone()),
        )
    }

    /// OrderMonotonic over a student's whole sequence: strictly increasing
    /// with start date and gapless from 1.
    pub fn check_sequence(&self, student_rotations: &[&Rotation]) -> Option<Violation> {
        let mut by_date: Vec<&Rotation> = student_rotations.to_vec();
        by_date.sort_by_key(|r| (r.date_debut, r.order));

        let expected = 1..=by_date.len() as u32;
        if by_date.iter().map(|r| r.order).eq(expected) {
            return None;
        }

        let student_id = by_date
            .first()
            .map(|r| r.student_id.clone())
            .unwrap_or_default();
        let orders: Vec<String> = by_date.iter().map(|r| r.order.to_string()).collect();
        let mut violation = Violation::new(
            ViolationKind::OrderMonotonic,
            student_id.clone(),
            format!(
                "Rotation orders of student {student_id} in date order are [{}], expected 1..{}",
                orders.join(", "),
                by_date.len()
            ),
        );
        for r in by_date {
            violation = violation.with_rotation(r.id.clone());
        }
        Some(violation)
    }

    /// DurationBound of a rotation against its service.
    pub fn check_duration(&self, rotation: &Rotation, service: &Service) -> Option<Violation> {
        let span = rotation.span_days();
        if span == service.duration_days() {
            return None;
        }
        Some(
            Violation::new(
                ViolationKind::DurationBound,
                rotation.student_id.clone(),
                format!(
                    "Rotation {} in '{}' lasts {span} day(s), service duration is {}",
                    rotation.order, service.name, service.duree_stage_jours
                ),
            )
            .with_rotation(rotation.id.clone()),
        )
    }

    /// CapacityBound violations for all rotations hosted by a service.
    pub fn check_capacity(&self, service: &Service, hosted: &[&Rotation]) -> Vec<Violation> {
        self.overloads(service, hosted)
            .iter()
            .map(|o| {
                let mut v = capacity_violation(service, o);
                for r in hosted.iter().filter(|r| r.date_debut <= o.end && o.start <= r.date_fin) {
                    v = v.with_rotation(r.id.clone());
                }
                v
            })
            .collect()
    }

    /// Periods during which `hosted` exceeds the service's capacity.
    pub fn overloads(&self, service: &Service, hosted: &[&Rotation]) -> Vec<Overload> {
        let capacity = self.capacity_of(service);

        // (day, delta); removals sort before additions on the same day.
        let mut events: Vec<(NaiveDate, i32)> = Vec::with_capacity(hosted.len() * 2);
        for r in hosted {
            events.push((r.date_debut, 1));
            // a rotation ending on the last representable day never leaves
            if let Some(after) = r.date_fin.succ_opt() {
                events.push((after, -1));
            }
        }
        events.sort();

        let mut overloads = Vec::new();
        let mut current: Option<Overload> = None;
        let mut occupancy: i64 = 0;
        let mut i = 0;

        while i < events.len() {
            let day = events[i].0;
            while i < events.len() && events[i].0 == day {
                occupancy += i64::from(events[i].1);
                i += 1;
            }
            let count = occupancy.max(0) as u32;

            if count > capacity {
                match current.as_mut() {
                    Some(o) => o.peak = o.peak.max(count),
                    None => {
                        current = Some(Overload {
                            service_id: service.id.clone(),
                            start: day,
                            end: day,
                            peak: count,
                            capacity,
                        })
                    }
                }
            } else if let Some(mut o) = current.take() {
                o.end = day.pred_opt().unwrap_or(day);
                overloads.push(o);
            }
        }
        if let Some(mut o) = current {
            o.end = NaiveDate::MAX;
            overloads.push(o);
        }

        overloads
    }
}

fn capacity_violation(service: &Service, overload: &Overload) -> Violation {
    Violation::new(
        ViolationKind::CapacityBound,
        service.id.clone(),
        format!(
            "Service '{}' exceeds capacity from {} to {}: {} students for {} places",
            service.name, overload.start, overload.end, overload.peak, overload.capacity
        ),
    )
}
