//! Persistence boundary.
//!
//! The planner talks to storage only through [`PlanningStore`]. Every
//! method is one atomic step: multi-entity writes (a generation commit, a
//! rotation edit with its schedule refresh, a schedule version insert) either
//! fully apply or leave storage untouched.
//!
//! [`MemoryStore`] is the in-process implementation used by tests and
//! embedded deployments.

mod memory;

pub use memory::MemoryStore;

use crate::config::PlanningSettings;
use crate::error::PlanningResult;
use crate::models::{
    Planning, Promotion, PromotionYear, Rotation, Service, Speciality, Student, StudentSchedule,
};

/// Everything one generation writes.
#[derive(Debug, Clone, Default)]
pub struct GenerationBatch {
    /// New plannings, one per scope.
    pub plannings: Vec<Planning>,
    /// Materialized schedules for the new plannings, version 1 and unlinked.
    pub schedules: Vec<StudentSchedule>,
}

/// Storage for the planning domain.
///
/// # Thread Safety
/// Implementations must be `Send + Sync`; the planner shares one store
/// across threads.
pub trait PlanningStore: Send + Sync {
    // ==================== Settings ====================

    /// Current settings record.
    fn settings(&self) -> PlanningResult<PlanningSettings>;

    /// Replaces the settings record.
    fn save_settings(&self, settings: &PlanningSettings) -> PlanningResult<()>;

    // ==================== Catalog ====================

    fn speciality(&self, id: &str) -> PlanningResult<Speciality>;

    fn save_speciality(&self, speciality: Speciality) -> PlanningResult<()>;

    fn service(&self, id: &str) -> PlanningResult<Service>;

    /// All services, by id.
    fn services(&self) -> PlanningResult<Vec<Service>>;

    fn save_service(&self, service: Service) -> PlanningResult<()>;

    fn promotion(&self, id: &str) -> PlanningResult<Promotion>;

    fn save_promotion(&self, promotion: Promotion) -> PlanningResult<()>;

    /// Years of a promotion, by ascending level.
    fn promotion_years(&self, promotion_id: &str) -> PlanningResult<Vec<PromotionYear>>;

    fn promotion_year(&self, id: &str) -> PlanningResult<PromotionYear>;

    fn save_promotion_year(&self, year: PromotionYear) -> PlanningResult<()>;

    fn student(&self, id: &str) -> PlanningResult<Student>;

    /// Students of a promotion, active or not, by creation time.
    fn students(&self, promotion_id: &str) -> PlanningResult<Vec<Student>>;

    fn save_student(&self, student: Student) -> PlanningResult<()>;

    // ==================== Plannings ====================

    fn planning(&self, id: &str) -> PlanningResult<Planning>;

    /// Non-archived plannings of a promotion, by ascending year level.
    fn active_plannings(&self, promotion_id: &str) -> PlanningResult<Vec<Planning>>;

    /// Stores a generation.
    ///
    /// For each new planning, the previous active planning of the same
    /// promotion year is archived and pointed at its replacement, and that
    /// planning's active schedules are archived. Each new schedule is linked
    /// after the tip of its student's lineage for the same year
    /// (`version = tip.version + 1`).
    fn commit_generation(&self, batch: GenerationBatch) -> PlanningResult<()>;

    // ==================== Rotations ====================

    fn rotation(&self, id: &str) -> PlanningResult<Rotation>;

    /// Replaces a rotation if its stored version is still `expected_version`.
    ///
    /// The stored copy gets `version = expected_version + 1`. Active schedule
    /// details referencing the rotation are refreshed in the same step.
    ///
    /// # Errors
    /// - `ConcurrencyConflict` when the stored version differs.
    /// - `Validation` when the owning planning is archived.
    fn commit_rotation(&self, rotation: Rotation, expected_version: u64) -> PlanningResult<Rotation>;

    // ==================== Schedules ====================

    fn schedule(&self, id: &str) -> PlanningResult<StudentSchedule>;

    fn schedules_for_planning(&self, planning_id: &str) -> PlanningResult<Vec<StudentSchedule>>;

    /// All schedules of a student, oldest first.
    fn schedules_for_student(&self, student_id: &str) -> PlanningResult<Vec<StudentSchedule>>;

    /// Id of the schedule that succeeded `id`, if any.
    fn successor_of(&self, id: &str) -> PlanningResult<Option<String>>;

    /// Read-modify-write of one schedule under the store's lock.
    ///
    /// Nothing is written when `apply` fails.
    fn update_schedule(
        &self,
        id: &str,
        apply: &mut dyn FnMut(&mut StudentSchedule) -> PlanningResult<()>,
    ) -> PlanningResult<StudentSchedule>;

    /// Inserts a new version after its `predecessor_id`.
    ///
    /// # Errors
    /// - `NotFound` when the predecessor is unknown.
    /// - `AlreadySuperseded` when the predecessor already has a successor.
    fn insert_schedule_version(&self, schedule: StudentSchedule) -> PlanningResult<()>;
}
