//! In-memory store.
//!
//! All data lives in one `parking_lot::RwLock`, so each trait method is
//! atomic with respect to every other.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;

use super::{GenerationBatch, PlanningStore};
use crate::config::PlanningSettings;
use crate::error::{PlanningError, PlanningResult};
use crate::models::{
    Planning, Promotion, PromotionYear, Rotation, Service, Speciality, Student, StudentSchedule,
};

/// In-memory store.
///
/// Cloning shares the underlying data.
///
/// # Example
/// ```
/// use u_rotation::models::Service;
/// use u_rotation::store::{MemoryStore, PlanningStore};
///
/// let store = MemoryStore::new();
/// store.save_service(Service::new("S1", "Cardiologie")).unwrap();
/// assert_eq!(store.services().unwrap().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<RwLock<StoreData>>,
}

#[derive(Debug, Default)]
struct StoreData {
    settings: PlanningSettings,
    specialities: HashMap<String, Speciality>,
    services: HashMap<String, Service>,
    promotions: HashMap<String, Promotion>,
    years: HashMap<String, PromotionYear>,
    students: HashMap<String, Student>,
    plannings: HashMap<String, Planning>,
    /// Rotation id -> planning id.
    rotation_index: HashMap<String, String>,
    schedules: HashMap<String, StudentSchedule>,
    /// Predecessor schedule id -> successor schedule id.
    successors: HashMap<String, String>,
}

impl MemoryStore {
    /// Creates an empty store with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store with the given settings.
    pub fn with_settings(settings: PlanningSettings) -> Self {
        let store = Self::default();
        store.data.write().settings = settings;
        store
    }

    /// Number of stored plannings, archived included.
    pub fn planning_count(&self) -> usize {
        self.data.read().plannings.len()
    }
}

fn missing(entity: &'static str, id: &str) -> PlanningError {
    PlanningError::not_found(entity, id)
}

impl PlanningStore for MemoryStore {
    fn settings(&self) -> PlanningResult<PlanningSettings> {
        Ok(self.data.read().settings.clone())
    }

    fn save_settings(&self, settings: &PlanningSettings) -> PlanningResult<()> {
        self.data.write().settings = settings.clone();
        Ok(())
    }

    fn speciality(&self, id: &str) -> PlanningResult<Speciality> {
        self.data
            .read()
            .specialities
            .get(id)
            .cloned()
            .ok_or_else(|| missing("speciality", id))
    }

    fn save_speciality(&self, speciality: Speciality) -> PlanningResult<()> {
        self.data
            .write()
            .specialities
            .insert(speciality.id.clone(), speciality);
        Ok(())
    }

    fn service(&self, id: &str) -> PlanningResult<Service> {
        self.data
            .read()
            .services
            .get(id)
            .cloned()
            .ok_or_else(|| missing("service", id))
    }

    fn services(&self) -> PlanningResult<Vec<Service>> {
        let mut out: Vec<Service> = self.data.read().services.values().cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    fn save_service(&self, service: Service) -> PlanningResult<()> {
        self.data.write().services.insert(service.id.clone(), service);
        Ok(())
    }

    fn promotion(&self, id: &str) -> PlanningResult<Promotion> {
        self.data
            .read()
            .promotions
            .get(id)
            .cloned()
            .ok_or_else(|| missing("promotion", id))
    }

    fn save_promotion(&self, promotion: Promotion) -> PlanningResult<()> {
        self.data
            .write()
            .promotions
            .insert(promotion.id.clone(), promotion);
        Ok(())
    }

    fn promotion_years(&self, promotion_id: &str) -> PlanningResult<Vec<PromotionYear>> {
        let mut out: Vec<PromotionYear> = self
            .data
            .read()
            .years
            .values()
            .filter(|y| y.promotion_id == promotion_id)
            .cloned()
            .collect();
        out.sort_by_key(|y| y.level);
        Ok(out)
    }

    fn promotion_year(&self, id: &str) -> PlanningResult<PromotionYear> {
        self.data
            .read()
            .years
            .get(id)
            .cloned()
            .ok_or_else(|| missing("promotion year", id))
    }

    fn save_promotion_year(&self, year: PromotionYear) -> PlanningResult<()> {
        self.data.write().years.insert(year.id.clone(), year);
        Ok(())
    }

    fn student(&self, id: &str) -> PlanningResult<Student> {
        self.data
            .read()
            .students
            .get(id)
            .cloned()
            .ok_or_else(|| missing("student", id))
    }

    fn students(&self, promotion_id: &str) -> PlanningResult<Vec<Student>> {
        let mut out: Vec<Student> = self
            .data
            .read()
            .students
            .values()
            .filter(|s| s.promotion_id == promotion_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    fn save_student(&self, student: Student) -> PlanningResult<()> {
        self.data.write().students.insert(student.id.clone(), student);
        Ok(())
    }

    fn planning(&self, id: &str) -> PlanningResult<Planning> {
        self.data
            .read()
            .plannings
            .get(id)
            .cloned()
            .ok_or_else(|| missing("planning", id))
    }

    fn active_plannings(&self, promotion_id: &str) -> PlanningResult<Vec<Planning>> {
        let mut out: Vec<Planning> = self
            .data
            .read()
            .plannings
            .values()
            .filter(|p| p.promotion_id == promotion_id && !p.archived)
            .cloned()
            .collect();
        out.sort_by_key(|p| p.year_level);
        Ok(out)
    }

    fn commit_generation(&self, batch: GenerationBatch) -> PlanningResult<()> {
        let mut guard = self.data.write();
        let data = &mut *guard;
        let now = Utc::now();

        let year_of_new: HashMap<&str, &str> = batch
            .plannings
            .iter()
            .map(|p| (p.id.as_str(), p.promotion_year_id.as_str()))
            .collect();
        if let Some(orphan) = batch
            .schedules
            .iter()
            .find(|s| !year_of_new.contains_key(s.planning_id.as_str()))
        {
            return Err(missing("planning", &orphan.planning_id));
        }

        let mut replaced: HashSet<String> = HashSet::new();
        for planning in &batch.plannings {
            for old in data
                .plannings
                .values_mut()
                .filter(|p| !p.archived && p.promotion_year_id == planning.promotion_year_id)
            {
                old.archived = true;
                old.superseded_by = Some(planning.id.clone());
                replaced.insert(old.id.clone());
            }
        }

        for schedule in data
            .schedules
            .values_mut()
            .filter(|s| !s.archived && replaced.contains(&s.planning_id))
        {
            schedule.archive(now);
        }

        for schedule in &batch.schedules {
            let year_id = year_of_new
                .get(schedule.planning_id.as_str())
                .copied()
                .unwrap_or_default();

            let tip = data
                .schedules
                .values()
                .filter(|s| {
                    s.student_id == schedule.student_id
                        && !data.successors.contains_key(&s.id)
                        && data
                            .plannings
                            .get(&s.planning_id)
                            .is_some_and(|p| p.promotion_year_id == year_id)
                })
                .max_by_key(|s| (s.version, s.created_at))
                .cloned();

            let linked = match tip {
                Some(tip) => {
                    data.successors.insert(tip.id.clone(), schedule.id.clone());
                    schedule.clone().succeeding(&tip)
                }
                None => schedule.clone(),
            };
            data.schedules.insert(linked.id.clone(), linked);
        }

        for planning in batch.plannings {
            for r in &planning.rotations {
                data.rotation_index.insert(r.id.clone(), planning.id.clone());
            }
            data.plannings.insert(planning.id.clone(), planning);
        }

        Ok(())
    }

    fn rotation(&self, id: &str) -> PlanningResult<Rotation> {
        let data = self.data.read();
        data.rotation_index
            .get(id)
            .and_then(|pid| data.plannings.get(pid))
            .and_then(|p| p.rotation(id))
            .cloned()
            .ok_or_else(|| missing("rotation", id))
    }

    fn commit_rotation(&self, rotation: Rotation, expected_version: u64) -> PlanningResult<Rotation> {
        let mut guard = self.data.write();
        let data = &mut *guard;

        let planning = data
            .rotation_index
            .get(&rotation.id)
            .and_then(|pid| data.plannings.get_mut(pid))
            .ok_or_else(|| missing("rotation", &rotation.id))?;
        if planning.archived {
            return Err(PlanningError::validation(format!(
                "planning '{}' is archived",
                planning.id
            )));
        }
        let stored = planning
            .rotations
            .iter_mut()
            .find(|r| r.id == rotation.id)
            .ok_or_else(|| missing("rotation", &rotation.id))?;

        if stored.version != expected_version {
            return Err(PlanningError::ConcurrencyConflict {
                entity: "rotation",
                id: rotation.id.clone(),
            });
        }

        let next = Rotation {
            version: expected_version + 1,
            planning_id: stored.planning_id.clone(),
            promotion_year_id: stored.promotion_year_id.clone(),
            ..rotation
        };
        *stored = next.clone();
        planning.refresh_counts();

        let service_name = data
            .services
            .get(&next.service_id)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| next.service_id.clone());

        for schedule in data.schedules.values_mut().filter(|s| !s.archived) {
            let mut touched = false;
            for detail in schedule.details.iter_mut().filter(|d| d.rotation_id == next.id) {
                detail.sync_with(&next, &service_name);
                touched = true;
            }
            if touched {
                schedule.refresh_window();
            }
        }

        Ok(next)
    }

    fn schedule(&self, id: &str) -> PlanningResult<StudentSchedule> {
        self.data
            .read()
            .schedules
            .get(id)
            .cloned()
            .ok_or_else(|| missing("schedule", id))
    }

    fn schedules_for_planning(&self, planning_id: &str) -> PlanningResult<Vec<StudentSchedule>> {
        let mut out: Vec<StudentSchedule> = self
            .data
            .read()
            .schedules
            .values()
            .filter(|s| s.planning_id == planning_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.student_id.cmp(&b.student_id).then(a.version.cmp(&b.version)));
        Ok(out)
    }

    fn schedules_for_student(&self, student_id: &str) -> PlanningResult<Vec<StudentSchedule>> {
        let mut out: Vec<StudentSchedule> = self
            .data
            .read()
            .schedules
            .values()
            .filter(|s| s.student_id == student_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.version.cmp(&b.version)));
        Ok(out)
    }

    fn successor_of(&self, id: &str) -> PlanningResult<Option<String>> {
        Ok(self.data.read().successors.get(id).cloned())
    }

    fn update_schedule(
        &self,
        id: &str,
        apply: &mut dyn FnMut(&mut StudentSchedule) -> PlanningResult<()>,
    ) -> PlanningResult<StudentSchedule> {
        let mut data = self.data.write();
        let mut draft = data
            .schedules
            .get(id)
            .cloned()
            .ok_or_else(|| missing("schedule", id))?;
        apply(&mut draft)?;
        data.schedules.insert(draft.id.clone(), draft.clone());
        Ok(draft)
    }

    fn insert_schedule_version(&self, schedule: StudentSchedule) -> PlanningResult<()> {
        let mut data = self.data.write();
        let predecessor_id = schedule
            .predecessor_id
            .clone()
            .ok_or_else(|| PlanningError::validation("schedule version has no predecessor"))?;

        if !data.schedules.contains_key(&predecessor_id) {
            return Err(missing("schedule", &predecessor_id));
        }
        if let Some(successor_id) = data.successors.get(&predecessor_id) {
            return Err(PlanningError::AlreadySuperseded {
                id: predecessor_id,
                successor_id: successor_id.clone(),
            });
        }

        data.successors.insert(predecessor_id, schedule.id.clone());
        data.schedules.insert(schedule.id.clone(), schedule);
        Ok(())
    }
}
