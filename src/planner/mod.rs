//! Planning service facade.
//!
//! [`Planner`] is the entry point for every planning operation: generation,
//! queries, validation, efficiency analysis, rotation edits, and schedule
//! versioning. It owns no domain state of its own; everything lives in the
//! [`PlanningStore`], and settings are read afresh at the start of each
//! operation.
//!
//! # Operations
//!
//! | Operation | Method |
//! |-----------|--------|
//! | Generate plannings | [`Planner::generate`] |
//! | Active plannings of a promotion | [`Planner::get_planning`] |
//! | One planning | [`Planner::get_planning_by_id`] |
//! | A student's rotations | [`Planner::get_student_rotations`] |
//! | Audit a planning | [`Planner::validate_planning`] |
//! | Efficiency indicators | [`Planner::analyze_efficiency`] |
//! | Edit a rotation | [`Planner::update_rotation`] |
//! | Archive / version a schedule | [`Planner::archive_schedule`], [`Planner::create_schedule_version`] |
//! | Track a rotation's progress | [`Planner::update_service_status`] |
//! | Student progress | [`Planner::schedule_progress`] |
//! | Schedule overview of a planning | [`Planner::planning_summary`] |
//! | A student's schedule history | [`Planner::schedule_history`] |
//! | Settings | [`Planner::planning_settings`], [`Planner::update_planning_settings`] |

mod guard;
mod mutation;

use std::collections::HashSet;
use std::path::Path;

use chrono::{Months, NaiveDate};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{PlanningSettings, SettingsUpdate};
use crate::error::{PlanningError, PlanningResult};
use crate::models::{
    Planning, Promotion, PromotionYear, Rotation, ScheduleSummary, Service, Speciality, Student,
    StudentSchedule,
};
use crate::scheduler::{
    BalanceMetric, CoefficientOfVariation, EfficiencyReport, RotationScheduler, SchedulingScope,
};
use crate::store::{GenerationBatch, PlanningStore};
use crate::validation::{validate_planning, AuditContext, ValidationReport};

use guard::{InFlight, KeyedLocks};

/// Generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub promotion_id: String,
    /// Anchor date; defaults to the settings' academic year start.
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    /// Every year of the promotion instead of the active one.
    #[serde(default)]
    pub all_years: bool,
}

impl GenerateRequest {
    /// Generates the active year of a promotion.
    pub fn new(promotion_id: impl Into<String>) -> Self {
        Self {
            promotion_id: promotion_id.into(),
            start_date: None,
            all_years: false,
        }
    }

    /// Sets the anchor date.
    pub fn with_start_date(mut self, date: NaiveDate) -> Self {
        self.start_date = Some(date);
        self
    }

    /// Generates every year.
    pub fn all_years(mut self) -> Self {
        self.all_years = true;
        self
    }
}

/// What a generation produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutcome {
    /// New plannings, by ascending year level.
    pub plannings: Vec<Planning>,
    /// Distinct services used across plannings.
    pub number_of_services: usize,
    /// Distinct students scheduled across plannings.
    pub number_of_students: usize,
    /// Students that could not cover their pool within the duration budget.
    pub under_scheduled: Vec<String>,
    /// Levels skipped for lack of services (multi-year only).
    pub skipped_levels: Vec<u32>,
}

/// Planning service over a store.
///
/// # Example
///
/// ```
/// use u_rotation::models::{Promotion, Service, Student};
/// use u_rotation::planner::{GenerateRequest, Planner};
/// use u_rotation::store::MemoryStore;
///
/// let planner = Planner::new(MemoryStore::new());
/// planner.add_service(Service::new("S1", "Cardiologie").with_duration_days(14)).unwrap();
/// let years = planner.create_promotion(Promotion::new("P1", "Promo 2025", 2025)).unwrap();
/// planner.assign_year_services(&years[0].id, &["S1".to_string()]).unwrap();
/// planner.add_student(Student::new("E1", "Martin", "Léa", "P1")).unwrap();
///
/// let outcome = planner.generate(&GenerateRequest::new("P1")).unwrap();
/// assert_eq!(outcome.plannings.len(), 1);
/// assert_eq!(outcome.number_of_students, 1);
/// ```
pub struct Planner<S: PlanningStore> {
    store: S,
    in_flight: InFlight,
    student_locks: KeyedLocks,
    service_locks: KeyedLocks,
    years_lock: Mutex<()>,
    balance: Box<dyn BalanceMetric>,
}

impl<S: PlanningStore> Planner<S> {
    /// Creates a planner over a store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            in_flight: InFlight::default(),
            student_locks: KeyedLocks::default(),
            service_locks: KeyedLocks::default(),
            years_lock: Mutex::new(()),
            balance: Box::new(CoefficientOfVariation),
        }
    }

    /// Creates a planner and seeds the store's settings from a TOML file.
    pub fn with_settings_file(store: S, path: impl AsRef<Path>) -> PlanningResult<Self> {
        let settings = PlanningSettings::load(path)?;
        store.save_settings(&settings)?;
        Ok(Self::new(store))
    }

    /// Replaces the balance metric used by [`Planner::analyze_efficiency`].
    pub fn with_balance_metric(mut self, metric: impl BalanceMetric + 'static) -> Self {
        self.balance = Box::new(metric);
        self
    }

    /// Underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    // ==================== Generation ====================

    /// Generates plannings for the active year, or every year, of a promotion.
    ///
    /// Nothing is stored unless every scope succeeds. The previous active
    /// planning of each generated year is archived, not deleted.
    ///
    /// # Errors
    /// - `NotFound` for an unknown promotion or a pool service missing from
    ///   the catalog.
    /// - `Validation` when no year is active, no student is, or the settings
    ///   are inactive.
    /// - `InsufficientServices` when the pool is empty (every pool, in
    ///   multi-year mode).
    /// - `InsufficientCapacity` when the pool cannot host the demand.
    /// - `GenerationInProgress` when a targeted year is already being generated.
    pub fn generate(&self, request: &GenerateRequest) -> PlanningResult<GenerationOutcome> {
        let promotion = self.store.promotion(&request.promotion_id)?;
        let years = self.ensure_years(&promotion)?;

        let targets: Vec<PromotionYear> = if request.all_years {
            years
        } else {
            let active = years
                .into_iter()
                .find(|y| y.is_active)
                .ok_or_else(|| {
                    PlanningError::validation(format!(
                        "promotion '{}' has no active year",
                        promotion.id
                    ))
                })?;
            vec![active]
        };

        let ids: Vec<String> = targets.iter().map(|y| y.id.clone()).collect();
        let _guard = self
            .in_flight
            .try_begin(&ids)
            .map_err(|scope| PlanningError::GenerationInProgress { scope })?;

        let settings = self.store.settings()?;
        if !settings.is_active {
            return Err(PlanningError::validation("planning settings are inactive"));
        }
        let start = request.start_date.unwrap_or(settings.academic_year_start);
        info!(
            event = "generation_started",
            promotion = %promotion.id,
            years = targets.len(),
            all_years = request.all_years,
            %start
        );

        let students: Vec<Student> = self
            .store
            .students(&promotion.id)?
            .into_iter()
            .filter(|s| s.is_active)
            .collect();
        let catalog = self.store.services()?;

        let mut scopes = Vec::with_capacity(targets.len());
        let mut skipped_levels = Vec::new();
        for year in &targets {
            let pool = resolve_pool(&promotion, year, &catalog)?;
            if pool.is_empty() {
                if request.all_years {
                    warn!(promotion = %promotion.id, level = year.level, "no service for year, skipped");
                    skipped_levels.push(year.level);
                    continue;
                }
                return Err(PlanningError::InsufficientServices {
                    scope: format!("promotion {} year {}", promotion.id, year.level),
                });
            }
            let year_start = year_start_date(year, start, request.all_years)?;
            scopes.push(
                SchedulingScope::new(&promotion.id, &year.id, year.level, year_start)
                    .with_students(students.clone())
                    .with_services(pool),
            );
        }
        if scopes.is_empty() {
            return Err(PlanningError::InsufficientServices {
                scope: format!("promotion {}", promotion.id),
            });
        }

        let plans = RotationScheduler::new(&settings).plan_all(&scopes)?;

        let mut batch = GenerationBatch::default();
        let mut under_scheduled = Vec::new();
        let no_retired = HashSet::new();

        for (scope, plan) in scopes.iter().zip(plans) {
            let planning = Planning::new(&scope.promotion_id, &scope.promotion_year_id, scope.year_level, scope.start_date)
                .with_rotations(plan.assignments.iter().map(|a| a.to_rotation()).collect());

            let report = validate_planning(
                &planning,
                AuditContext {
                    services: &scope.services,
                    catalog: &scope.services,
                    students: &[],
                    retired: &no_retired,
                },
                &settings,
            );
            if let Some(v) = report.erreurs.first() {
                return Err(PlanningError::ConstraintViolation {
                    kind: v.kind,
                    detail: v.message.clone(),
                });
            }

            let mut seen = HashSet::new();
            for a in &plan.assignments {
                if seen.insert(a.student_id.as_str()) {
                    if let Some(schedule) =
                        StudentSchedule::from_planning(&planning, &a.student_id, &scope.services)
                    {
                        batch.schedules.push(schedule);
                    }
                }
            }

            under_scheduled.extend(plan.under_scheduled);
            batch.plannings.push(planning);
        }

        let services_used: HashSet<String> = batch
            .plannings
            .iter()
            .flat_map(|p| p.rotations.iter().map(|r| r.service_id.clone()))
            .collect();
        let students_used: HashSet<String> = batch
            .plannings
            .iter()
            .flat_map(|p| p.rotations.iter().map(|r| r.student_id.clone()))
            .collect();
        under_scheduled.sort();
        under_scheduled.dedup();

        let plannings = batch.plannings.clone();
        let rotations: usize = plannings.iter().map(Planning::rotation_count).sum();
        self.store.commit_generation(batch)?;

        info!(
            event = "generation_committed",
            promotion = %promotion.id,
            plannings = plannings.len(),
            rotations,
            under_scheduled = under_scheduled.len()
        );

        Ok(GenerationOutcome {
            plannings,
            number_of_services: services_used.len(),
            number_of_students: students_used.len(),
            under_scheduled,
            skipped_levels,
        })
    }

    // ==================== Queries ====================

    /// Active plannings of a promotion, by ascending year level.
    pub fn get_planning(&self, promotion_id: &str) -> PlanningResult<Vec<Planning>> {
        self.store.promotion(promotion_id)?;
        let plannings = self.store.active_plannings(promotion_id)?;
        if plannings.is_empty() {
            return Err(PlanningError::not_found("planning", promotion_id));
        }
        Ok(plannings)
    }

    /// One planning, archived or not.
    pub fn get_planning_by_id(&self, planning_id: &str) -> PlanningResult<Planning> {
        self.store.planning(planning_id)
    }

    /// A student's rotations across the active plannings, by start date.
    pub fn get_student_rotations(&self, student_id: &str) -> PlanningResult<Vec<Rotation>> {
        let student = self.store.student(student_id)?;
        let mut out: Vec<Rotation> = self
            .store
            .active_plannings(&student.promotion_id)?
            .into_iter()
            .flat_map(|p| p.rotations)
            .filter(|r| r.student_id == student_id)
            .collect();
        out.sort_by_key(|r| (r.date_debut, r.order));
        Ok(out)
    }

    /// One overview line per schedule of a planning, archived ones included.
    ///
    /// Lines are ordered by student name, then version. Schedules whose
    /// student no longer exists are left out.
    pub fn planning_summary(&self, planning_id: &str) -> PlanningResult<Vec<ScheduleSummary>> {
        self.store.planning(planning_id)?;
        let mut lines = Vec::new();
        for schedule in self.store.schedules_for_planning(planning_id)? {
            match self.store.student(&schedule.student_id) {
                Ok(student) => lines.push(schedule.summary(student.full_name())),
                Err(PlanningError::NotFound { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        lines.sort_by(|a, b| {
            a.student_name
                .cmp(&b.student_name)
                .then_with(|| a.student_id.cmp(&b.student_id))
                .then(a.version.cmp(&b.version))
        });
        Ok(lines)
    }

    /// Every schedule of a student, archived ones included, oldest first.
    pub fn schedule_history(&self, student_id: &str) -> PlanningResult<Vec<StudentSchedule>> {
        self.store.student(student_id)?;
        self.store.schedules_for_student(student_id)
    }

    /// Audits a stored planning against the current settings.
    pub fn validate_planning(&self, planning_id: &str) -> PlanningResult<ValidationReport> {
        let planning = self.store.planning(planning_id)?;
        let promotion = self.store.promotion(&planning.promotion_id)?;
        let settings = self.store.settings()?;
        let catalog = self.store.services()?;
        let pool = match self.store.promotion_year(&planning.promotion_year_id) {
            Ok(year) => resolve_pool(&promotion, &year, &catalog)?,
            Err(PlanningError::NotFound { .. }) => Vec::new(),
            Err(e) => return Err(e),
        };
        let students: Vec<Student> = self
            .store
            .students(&planning.promotion_id)?
            .into_iter()
            .filter(|s| s.is_active)
            .collect();
        let retired = self.retired_rotations(&planning)?;

        let report = validate_planning(
            &planning,
            AuditContext {
                services: &pool,
                catalog: &catalog,
                students: &students,
                retired: &retired,
            },
            &settings,
        );
        info!(
            event = "planning_validated",
            planning = %planning.id,
            erreurs = report.erreurs.len(),
            warnings = report.warnings.len()
        );
        Ok(report)
    }

    /// Efficiency indicators over a promotion's active plannings.
    pub fn analyze_efficiency(&self, promotion_id: &str) -> PlanningResult<EfficiencyReport> {
        let plannings = self.get_planning(promotion_id)?;
        let settings = self.store.settings()?;
        let catalog = self.store.services()?;

        let mut live: Vec<Rotation> = Vec::new();
        for planning in &plannings {
            let retired = self.retired_rotations(planning)?;
            live.extend(
                planning
                    .rotations
                    .iter()
                    .filter(|r| !retired.contains(&r.id))
                    .cloned(),
            );
        }

        let used: HashSet<&str> = live.iter().map(|r| r.service_id.as_str()).collect();
        let mut pool_ids: HashSet<String> = HashSet::new();
        let promotion = self.store.promotion(promotion_id)?;
        for year in self.store.promotion_years(promotion_id)? {
            if plannings.iter().any(|p| p.promotion_year_id == year.id) {
                for s in resolve_pool(&promotion, &year, &catalog)? {
                    pool_ids.insert(s.id);
                }
            }
        }
        let services: Vec<Service> = catalog
            .into_iter()
            .filter(|s| used.contains(s.id.as_str()) || pool_ids.contains(&s.id))
            .collect();

        let refs: Vec<&Rotation> = live.iter().collect();
        Ok(EfficiencyReport::calculate_with(
            &refs,
            &services,
            &settings,
            self.balance.as_ref(),
        ))
    }

    // ==================== Settings ====================

    /// Current settings.
    pub fn planning_settings(&self) -> PlanningResult<PlanningSettings> {
        self.store.settings()
    }

    /// Applies a partial settings update. Takes effect on the next operation.
    pub fn update_planning_settings(&self, update: &SettingsUpdate) -> PlanningResult<PlanningSettings> {
        let current = self.store.settings()?;
        let next = current
            .apply(update)
            .map_err(|e| PlanningError::validation(e.to_string()))?;
        self.store.save_settings(&next)?;
        info!(
            event = "settings_updated",
            months = next.total_duration_months,
            max_concurrent = next.max_concurrent_students,
            break_days = next.break_days_between_rotations
        );
        Ok(next)
    }

    // ==================== Catalog ====================

    /// Stores a speciality.
    pub fn add_speciality(&self, speciality: Speciality) -> PlanningResult<()> {
        if speciality.duration_years == 0 {
            return Err(PlanningError::validation(format!(
                "speciality '{}' must last at least one year",
                speciality.id
            )));
        }
        self.store.save_speciality(speciality)
    }

    /// Stores a service.
    pub fn add_service(&self, service: Service) -> PlanningResult<()> {
        if service.places_disponibles == 0 || service.duree_stage_jours == 0 {
            return Err(PlanningError::validation(format!(
                "service '{}' needs at least one place and one day",
                service.id
            )));
        }
        self.store.save_service(service)
    }

    /// Stores a promotion and creates its years.
    ///
    /// The number of years follows the speciality's duration; level 1 is
    /// active.
    pub fn create_promotion(&self, promotion: Promotion) -> PlanningResult<Vec<PromotionYear>> {
        let speciality = match &promotion.speciality_id {
            Some(id) => Some(self.store.speciality(id)?),
            None => None,
        };
        let years = promotion.build_years(speciality.as_ref());
        self.store.save_promotion(promotion)?;
        for year in &years {
            self.store.save_promotion_year(year.clone())?;
        }
        Ok(years)
    }

    /// Stores a student of an existing promotion.
    pub fn add_student(&self, student: Student) -> PlanningResult<()> {
        self.store.promotion(&student.promotion_id)?;
        self.store.save_student(student)
    }

    /// Makes one year the active year of its promotion.
    pub fn activate_year(&self, year_id: &str) -> PlanningResult<PromotionYear> {
        let target = self.store.promotion_year(year_id)?;
        let mut activated = target.clone();
        for mut year in self.store.promotion_years(&target.promotion_id)? {
            let active = year.id == target.id;
            if year.is_active != active {
                year.is_active = active;
                if active {
                    activated = year.clone();
                }
                self.store.save_promotion_year(year)?;
            }
        }
        info!(event = "year_activated", promotion = %target.promotion_id, level = target.level);
        Ok(activated)
    }

    /// Replaces a year's service pool.
    pub fn assign_year_services(&self, year_id: &str, service_ids: &[String]) -> PlanningResult<PromotionYear> {
        let mut year = self.store.promotion_year(year_id)?;
        for id in service_ids {
            self.store.service(id)?;
        }
        year.service_ids = service_ids.to_vec();
        self.store.save_promotion_year(year.clone())?;
        Ok(year)
    }

    /// Sets the date a year's rotations start from.
    pub fn set_year_start_date(&self, year_id: &str, date: NaiveDate) -> PlanningResult<PromotionYear> {
        let year = self.store.promotion_year(year_id)?.with_start_date(date);
        self.store.save_promotion_year(year.clone())?;
        Ok(year)
    }

    // ==================== Helpers ====================

    /// Years of a promotion, created on first use.
    fn ensure_years(&self, promotion: &Promotion) -> PlanningResult<Vec<PromotionYear>> {
        let _held = self.years_lock.lock();
        let years = self.store.promotion_years(&promotion.id)?;
        if !years.is_empty() {
            return Ok(years);
        }
        let speciality = match &promotion.speciality_id {
            Some(id) => Some(self.store.speciality(id)?),
            None => None,
        };
        let years = promotion.build_years(speciality.as_ref());
        for year in &years {
            self.store.save_promotion_year(year.clone())?;
        }
        Ok(years)
    }

    /// Rotations of a planning referenced only by archived schedules.
    pub(crate) fn retired_rotations(&self, planning: &Planning) -> PlanningResult<HashSet<String>> {
        let schedules = self.store.schedules_for_planning(&planning.id)?;
        let mut archived: HashSet<String> = HashSet::new();
        let mut active: HashSet<String> = HashSet::new();
        for schedule in &schedules {
            let target = if schedule.archived { &mut archived } else { &mut active };
            target.extend(schedule.details.iter().map(|d| d.rotation_id.clone()));
        }
        Ok(archived.difference(&active).cloned().collect())
    }
}

/// Services a year draws from: its own pool, else the promotion's.
fn resolve_pool(promotion: &Promotion, year: &PromotionYear, catalog: &[Service]) -> PlanningResult<Vec<Service>> {
    let ids = if year.service_ids.is_empty() {
        &promotion.legacy_service_ids
    } else {
        &year.service_ids
    };

    let mut seen = HashSet::new();
    let mut pool = Vec::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(id.as_str()) {
            continue;
        }
        let service = catalog
            .iter()
            .find(|s| &s.id == id)
            .ok_or_else(|| PlanningError::not_found("service", id.clone()))?;
        pool.push(service.clone());
    }
    Ok(pool)
}

/// Anchor of a year: its own start date, else the request's, shifted by
/// one calendar year per level in multi-year mode.
fn year_start_date(year: &PromotionYear, start: NaiveDate, shift_by_level: bool) -> PlanningResult<NaiveDate> {
    if let Some(own) = year.start_date {
        return Ok(own);
    }
    if !shift_by_level || year.level <= 1 {
        return Ok(start);
    }
    start
        .checked_add_months(Months::new(12 * (year.level - 1)))
        .ok_or_else(|| PlanningError::validation(format!("start date out of range for level {}", year.level)))
}

#[cfg(test)]
mod tests;
