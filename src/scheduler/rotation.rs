//! Round-robin rotation scheduler.
//!
//! # Algorithm
//!
//! 1. Sort services by ascending effective capacity (stable), students by
//!    creation time (stable).
//! 2. Model each service as a lane of fixed slots: slot `k` starts at
//!    `anchor + k * (duration + break)` and lasts `duration` days.
//! 3. In each pass, every unfinished student books one slot: among the
//!    services it has not used and whose duration fits its remaining budget,
//!    the earliest slot at or after its next free day that still has a seat.
//!    Ties on start go to the slot with more free seats, then to the later
//!    lane.
//! 4. Stop after a pass that books nothing.
//!
//! A student with no fitting service is finished. If it finished before
//! covering every service of the pool it is reported as under-scheduled.
//!
//! # Complexity
//! At most `students * services + 1` passes; each booking scans the lanes
//! once, so O(S^2 * V^2) slot lookups in the worst case.
//!
//! # Guarantees
//! Slots on a lane never overlap, and a student's next slot starts at least
//! `duration + break` days after the previous start. Generated rotations are
//! therefore free of overlap, break and capacity violations by construction.

use std::cmp::Reverse;

use chrono::{Duration, NaiveDate};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::PlanningSettings;
use crate::error::{PlanningError, PlanningResult};
use crate::models::{Rotation, Service, Student};
use crate::validation::validate_scope;

/// Input for one scheduling run: a promotion year with its students and
/// service pool.
#[derive(Debug, Clone)]
pub struct SchedulingScope {
    pub promotion_id: String,
    pub promotion_year_id: String,
    pub year_level: u32,
    /// Day slot 0 of every lane starts on.
    pub start_date: NaiveDate,
    /// Candidate students. Inactive ones are skipped.
    pub students: Vec<Student>,
    /// Service pool.
    pub services: Vec<Service>,
}

impl SchedulingScope {
    /// Creates an empty scope.
    pub fn new(
        promotion_id: impl Into<String>,
        promotion_year_id: impl Into<String>,
        year_level: u32,
        start_date: NaiveDate,
    ) -> Self {
        Self {
            promotion_id: promotion_id.into(),
            promotion_year_id: promotion_year_id.into(),
            year_level,
            start_date,
            students: Vec::new(),
            services: Vec::new(),
        }
    }

    /// Sets the students.
    pub fn with_students(mut self, students: Vec<Student>) -> Self {
        self.students = students;
        self
    }

    /// Sets the service pool.
    pub fn with_services(mut self, services: Vec<Service>) -> Self {
        self.services = services;
        self
    }

    /// Label used in errors and logs.
    pub fn label(&self) -> String {
        format!(
            "promotion {} year {} ({})",
            self.promotion_id, self.year_level, self.promotion_year_id
        )
    }
}

/// One booked slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedRotation {
    pub student_id: String,
    pub service_id: String,
    pub order: u32,
    pub date_debut: NaiveDate,
    pub date_fin: NaiveDate,
}

impl PlannedRotation {
    /// Converts into a rotation with a fresh id.
    pub fn to_rotation(&self) -> Rotation {
        Rotation::new(
            self.student_id.clone(),
            self.service_id.clone(),
            self.date_debut,
            self.date_fin,
            self.order,
        )
    }
}

/// Result of scheduling one scope.
#[derive(Debug, Clone)]
pub struct ScopePlan {
    pub promotion_id: String,
    pub promotion_year_id: String,
    pub year_level: u32,
    pub start_date: NaiveDate,
    /// Bookings, by student then order.
    pub assignments: Vec<PlannedRotation>,
    /// Students that ran out of budget before covering the pool.
    pub under_scheduled: Vec<String>,
    /// Passes run, including the final empty one.
    pub passes: usize,
}

impl ScopePlan {
    /// Bookings of one student, by order.
    pub fn for_student(&self, student_id: &str) -> Vec<&PlannedRotation> {
        self.assignments
            .iter()
            .filter(|a| a.student_id == student_id)
            .collect()
    }

    /// Number of bookings.
    pub fn assignment_count(&self) -> usize {
        self.assignments.len()
    }
}

/// A free seat on a lane.
#[derive(Debug, Clone, Copy)]
struct Slot {
    index: usize,
    start: NaiveDate,
    free: u32,
}

/// One service's slot grid.
#[derive(Debug)]
struct Lane<'a> {
    service: &'a Service,
    duration: i64,
    stride: i64,
    capacity: u32,
    occupancy: Vec<u32>,
}

impl<'a> Lane<'a> {
    fn new(service: &'a Service, capacity: u32, break_days: i64) -> Self {
        let duration = service.duration_days();
        Self {
            service,
            duration,
            stride: duration + break_days,
            capacity,
            occupancy: Vec::new(),
        }
    }

    fn slot_start(&self, anchor: NaiveDate, index: usize) -> Option<NaiveDate> {
        let offset = self.stride.checked_mul(i64::try_from(index).ok()?)?;
        shift(anchor, offset)
    }

    /// Earliest slot starting on or after `from` with a free seat.
    ///
    /// `None` when that slot lies outside the calendar.
    fn first_free(&self, anchor: NaiveDate, from: NaiveDate) -> Option<Slot> {
        let offset = from.signed_duration_since(anchor).num_days();
        let mut index = if offset <= 0 {
            0
        } else {
            ((offset + self.stride - 1) / self.stride) as usize
        };
        loop {
            let used = self.occupancy.get(index).copied().unwrap_or(0);
            if used < self.capacity {
                return Some(Slot {
                    index,
                    start: self.slot_start(anchor, index)?,
                    free: self.capacity - used,
                });
            }
            index += 1;
        }
    }

    fn book(&mut self, index: usize) {
        if self.occupancy.len() <= index {
            self.occupancy.resize(index + 1, 0);
        }
        self.occupancy[index] += 1;
    }
}

/// `date` moved by `days`, or `None` past the calendar's range.
fn shift(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    Duration::try_days(days).and_then(|d| date.checked_add_signed(d))
}

fn out_of_calendar(scope: &SchedulingScope) -> PlanningError {
    PlanningError::validation(format!("rotation dates of {} fall outside the calendar", scope.label()))
}

/// Per-student progress through the passes.
#[derive(Debug)]
struct Cursor {
    next_free: NaiveDate,
    budget_left: i64,
    used: Vec<bool>,
    booked: u32,
    done: bool,
}

/// Allocates students to services over time.
///
/// # Example
///
/// ```
/// use chrono::NaiveDate;
/// use u_rotation::config::PlanningSettings;
/// use u_rotation::models::{Service, Student};
/// use u_rotation::scheduler::{RotationScheduler, SchedulingScope};
///
/// let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
/// let scope = SchedulingScope::new("P1", "Y1", 1, start)
///     .with_students(vec![Student::new("E1", "Martin", "Lea", "P1")])
///     .with_services(vec![Service::new("S1", "Cardiologie").with_duration_days(14)]);
///
/// let scheduler = RotationScheduler::new(&PlanningSettings::default());
/// let plan = scheduler.plan(&scope).unwrap();
/// assert_eq!(plan.assignment_count(), 1);
/// assert_eq!(plan.assignments[0].date_fin, NaiveDate::from_ymd_opt(2025, 1, 14).unwrap());
/// ```
#[derive(Debug, Clone)]
pub struct RotationScheduler {
    settings: PlanningSettings,
    budget_days: i64,
    break_days: i64,
}

impl RotationScheduler {
    /// Creates a scheduler for the given settings.
    pub fn new(settings: &PlanningSettings) -> Self {
        Self {
            settings: settings.clone(),
            budget_days: settings.budget_days(),
            break_days: settings.break_days(),
        }
    }

    /// Seats usable on a service.
    pub fn capacity_of(&self, service: &Service) -> u32 {
        self.settings.effective_capacity(service.places_disponibles)
    }

    /// Schedules one scope.
    ///
    /// # Errors
    /// - `InsufficientServices` when the pool is empty.
    /// - `Validation` when the scope is malformed or has no active student.
    /// - `InsufficientCapacity` when demanded seat-days exceed the pool.
    pub fn plan(&self, scope: &SchedulingScope) -> PlanningResult<ScopePlan> {
        if scope.services.is_empty() {
            return Err(PlanningError::InsufficientServices {
                scope: scope.label(),
            });
        }
        if let Err(errors) = validate_scope(scope) {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(PlanningError::validation(messages.join("; ")));
        }
        if self.settings.max_concurrent_students == 0 {
            return Err(PlanningError::validation(
                "max_concurrent_students must be at least 1",
            ));
        }

        let mut students: Vec<&Student> = scope.students.iter().filter(|s| s.is_active).collect();
        if students.is_empty() {
            return Err(PlanningError::validation(format!(
                "no active student in {}",
                scope.label()
            )));
        }
        students.sort_by_key(|s| s.created_at);

        self.check_capacity(scope, students.len())?;

        let mut lanes: Vec<Lane<'_>> = scope
            .services
            .iter()
            .map(|s| Lane::new(s, self.capacity_of(s), self.break_days))
            .collect();
        lanes.sort_by_key(|l| l.capacity);

        let anchor = scope.start_date;
        let mut cursors: Vec<Cursor> = students
            .iter()
            .map(|_| Cursor {
                next_free: anchor,
                budget_left: self.budget_days,
                used: vec![false; lanes.len()],
                booked: 0,
                done: false,
            })
            .collect();

        let mut booked: Vec<(usize, PlannedRotation)> = Vec::new();
        let mut passes = 0;

        loop {
            passes += 1;
            let mut assigned = 0usize;

            for (student_idx, cursor) in cursors.iter_mut().enumerate() {
                if cursor.done {
                    continue;
                }

                let candidates: Option<Vec<(usize, Slot)>> = lanes
                    .iter()
                    .enumerate()
                    .filter(|(i, lane)| !cursor.used[*i] && lane.duration <= cursor.budget_left)
                    .map(|(i, lane)| lane.first_free(anchor, cursor.next_free).map(|slot| (i, slot)))
                    .collect();
                let best = candidates
                    .ok_or_else(|| out_of_calendar(scope))?
                    .into_iter()
                    .max_by_key(|(i, slot)| (Reverse(slot.start), slot.free, *i));

                let Some((lane_idx, slot)) = best else {
                    cursor.done = true;
                    continue;
                };

                let lane = &mut lanes[lane_idx];
                let next_free = shift(slot.start, lane.stride).ok_or_else(|| out_of_calendar(scope))?;
                let date_fin = shift(slot.start, lane.duration - 1).ok_or_else(|| out_of_calendar(scope))?;
                lane.book(slot.index);

                cursor.used[lane_idx] = true;
                cursor.booked += 1;
                cursor.budget_left -= lane.duration;
                cursor.next_free = next_free;

                booked.push((
                    student_idx,
                    PlannedRotation {
                        student_id: students[student_idx].id.clone(),
                        service_id: lane.service.id.clone(),
                        order: cursor.booked,
                        date_debut: slot.start,
                        date_fin,
                    },
                ));
                assigned += 1;
            }

            debug!(scope = %scope.promotion_year_id, pass = passes, assigned, "rotation pass");
            if assigned == 0 {
                break;
            }
        }

        booked.sort_by_key(|(student_idx, r)| (*student_idx, r.order));

        let under_scheduled: Vec<String> = cursors
            .iter()
            .zip(&students)
            .filter(|(c, _)| c.used.iter().any(|u| !u))
            .map(|(_, s)| s.id.clone())
            .collect();
        if !under_scheduled.is_empty() {
            warn!(
                scope = %scope.promotion_year_id,
                count = under_scheduled.len(),
                "students ran out of duration budget before covering every service"
            );
        }

        Ok(ScopePlan {
            promotion_id: scope.promotion_id.clone(),
            promotion_year_id: scope.promotion_year_id.clone(),
            year_level: scope.year_level,
            start_date: scope.start_date,
            assignments: booked.into_iter().map(|(_, r)| r).collect(),
            under_scheduled,
            passes,
        })
    }

    /// Schedules independent scopes in parallel.
    ///
    /// Results keep the order of `scopes`. On failure the error of the first
    /// failing scope, in that order, is returned.
    pub fn plan_all(&self, scopes: &[SchedulingScope]) -> PlanningResult<Vec<ScopePlan>> {
        let results: Vec<PlanningResult<ScopePlan>> =
            scopes.par_iter().map(|scope| self.plan(scope)).collect();
        results.into_iter().collect()
    }

    /// Fails when the pool cannot host the demanded seat-days.
    ///
    /// Demand per student is the smaller of its budget and the time needed to
    /// cover every service.
    fn check_capacity(&self, scope: &SchedulingScope, active_students: usize) -> PlanningResult<()> {
        let full_cover: i64 = scope.services.iter().map(Service::duration_days).sum();
        let demanded = active_students as i64 * full_cover.min(self.budget_days);
        let available: i64 = scope
            .services
            .iter()
            .map(|s| i64::from(self.capacity_of(s)) * self.budget_days)
            .sum();

        if demanded > available {
            return Err(PlanningError::InsufficientCapacity {
                scope: scope.label(),
                demanded_days: demanded,
                available_days: available,
            });
        }
        Ok(())
    }
}
