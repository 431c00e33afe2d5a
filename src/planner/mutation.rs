//! Rotation edits and schedule versioning.

use chrono::Utc;
use tracing::info;

use super::Planner;
use crate::constraints::ConstraintEngine;
use crate::error::{PlanningError, PlanningResult};
use crate::models::{Rotation, RotationPatch, ScheduleProgress, StatusUpdate, StudentSchedule};
use crate::store::PlanningStore;

impl<S: PlanningStore> Planner<S> {
    /// Edits a rotation.
    ///
    /// Edits of the same student are serialized, and so are edits landing on
    /// the same service of a planning. The candidate is checked
    /// against the student's other rotations and the service's rotations in
    /// the same planning; a hard violation rejects the edit and storage is
    /// left untouched. Soft violations are stored on the rotation as
    /// warnings.
    ///
    /// # Errors
    /// - `Validation` for an empty patch, reversed dates, order 0, or a
    ///   rotation of an archived planning.
    /// - `ConstraintViolation` with the first hard rule broken.
    /// - `ConcurrencyConflict` when the rotation changed meanwhile.
    pub fn update_rotation(&self, rotation_id: &str, patch: &RotationPatch) -> PlanningResult<Rotation> {
        if patch.is_empty() {
            return Err(PlanningError::validation("rotation patch changes nothing"));
        }

        let student_id = self.store.rotation(rotation_id)?.student_id;
        let lock = self.student_locks.lock_for(&student_id);
        let _held = lock.lock();

        let current = self.store.rotation(rotation_id)?;
        let mut candidate = current.patched(patch);
        if candidate.date_fin < candidate.date_debut {
            return Err(PlanningError::validation(format!(
                "rotation ends ({}) before it starts ({})",
                candidate.date_fin, candidate.date_debut
            )));
        }
        if candidate.order == 0 {
            return Err(PlanningError::validation("rotation order starts at 1"));
        }

        // student lock first, then seats; held through the commit
        let seats = self
            .service_locks
            .lock_for(&format!("{}/{}", current.planning_id, candidate.service_id));
        let _seats_held = seats.lock();

        let planning = self.store.planning(&current.planning_id)?;
        if planning.archived {
            return Err(PlanningError::validation(format!(
                "planning '{}' is archived",
                planning.id
            )));
        }
        let service = self.store.service(&candidate.service_id)?;
        let settings = self.store.settings()?;
        let retired = self.retired_rotations(&planning)?;

        let live = planning.rotations.iter().filter(|r| !retired.contains(&r.id));
        let student_rotations: Vec<Rotation> = live
            .clone()
            .filter(|r| r.student_id == candidate.student_id)
            .cloned()
            .collect();
        let service_rotations: Vec<Rotation> = live
            .filter(|r| r.service_id == candidate.service_id)
            .cloned()
            .collect();

        let outcome = ConstraintEngine::new(&settings).check(
            &candidate,
            &student_rotations,
            &service,
            &service_rotations,
        );
        if let Some(violation) = outcome.first_error() {
            info!(
                event = "rotation_rejected",
                rotation = %rotation_id,
                kind = %violation.kind,
                reason = %violation.message
            );
            return Err(PlanningError::ConstraintViolation {
                kind: violation.kind,
                detail: violation.message.clone(),
            });
        }

        candidate.warnings = outcome.warnings().map(|v| v.message.clone()).collect();
        let saved = self.store.commit_rotation(candidate, current.version)?;
        info!(
            event = "rotation_updated",
            rotation = %saved.id,
            student = %saved.student_id,
            version = saved.version,
            warnings = saved.warnings.len()
        );
        Ok(saved)
    }

    /// Archives a schedule.
    ///
    /// # Errors
    /// `AlreadyArchived` when it is already archived.
    pub fn archive_schedule(&self, schedule_id: &str) -> PlanningResult<StudentSchedule> {
        let now = Utc::now();
        let archived = self.store.update_schedule(schedule_id, &mut |schedule: &mut StudentSchedule| {
            if schedule.archived {
                return Err(PlanningError::AlreadyArchived {
                    id: schedule.id.clone(),
                });
            }
            schedule.archive(now);
            Ok(())
        })?;
        info!(event = "schedule_archived", schedule = %archived.id, student = %archived.student_id);
        Ok(archived)
    }

    /// Copies a schedule into its next version.
    ///
    /// The source is never modified. A schedule has at most one successor.
    ///
    /// # Errors
    /// `AlreadySuperseded` when a successor already exists.
    pub fn create_schedule_version(&self, schedule_id: &str) -> PlanningResult<StudentSchedule> {
        let source = self.store.schedule(schedule_id)?;
        if let Some(successor_id) = self.store.successor_of(schedule_id)? {
            return Err(PlanningError::AlreadySuperseded {
                id: source.id,
                successor_id,
            });
        }

        let next = source.next_version();
        self.store.insert_schedule_version(next.clone())?;
        info!(
            event = "schedule_versioned",
            schedule = %next.id,
            predecessor = %source.id,
            version = next.version
        );
        Ok(next)
    }

    /// Updates the status of one rotation of a schedule.
    ///
    /// Actual start and end dates are stamped with today's date on the first
    /// move to `en_cours` and `termine`. The schedule closes once every
    /// rotation is `termine`.
    ///
    /// # Errors
    /// - `AlreadyArchived` for an archived schedule.
    /// - `NotFound` for an unknown schedule or detail.
    pub fn update_service_status(
        &self,
        schedule_id: &str,
        detail_id: &str,
        update: &StatusUpdate,
    ) -> PlanningResult<StudentSchedule> {
        let today = Utc::now().date_naive();
        self.store.update_schedule(schedule_id, &mut |schedule: &mut StudentSchedule| {
            if schedule.archived {
                return Err(PlanningError::AlreadyArchived {
                    id: schedule.id.clone(),
                });
            }
            let detail = schedule
                .detail_mut(detail_id)
                .ok_or_else(|| PlanningError::not_found("schedule detail", detail_id))?;
            detail.apply_status(update, today);
            schedule.refresh_progress();
            Ok(())
        })
    }

    /// Progress of a student through the latest active schedule.
    pub fn schedule_progress(&self, student_id: &str) -> PlanningResult<ScheduleProgress> {
        self.store.student(student_id)?;
        let schedule = self
            .store
            .schedules_for_student(student_id)?
            .into_iter()
            .filter(|s| !s.archived)
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.version.cmp(&b.version)))
            .ok_or_else(|| PlanningError::not_found("schedule", student_id))?;
        Ok(schedule.progress(Utc::now().date_naive()))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{d, scenario_planner};
    use super::*;
    use crate::constraints::ViolationKind;
    use crate::models::{DetailStatus, ScheduleStatus};
    use crate::planner::GenerateRequest;
    use crate::store::MemoryStore;

    fn generated() -> Planner<MemoryStore> {
        let planner = scenario_planner();
        planner.generate(&GenerateRequest::new("P1").with_start_date(d(1, 1))).unwrap();
        planner
    }

    fn first_rotation(planner: &Planner<MemoryStore>, student: &str) -> Rotation {
        planner.get_student_rotations(student).unwrap().remove(0)
    }

    fn active_schedule(planner: &Planner<MemoryStore>, student: &str) -> StudentSchedule {
        planner
            .store()
            .schedules_for_student(student)
            .unwrap()
            .into_iter()
            .find(|s| !s.archived)
            .unwrap()
    }

    #[test]
    fn test_overlapping_edit_rejected() {
        let planner = generated();
        let rotations = planner.get_student_rotations("A").unwrap();
        let (first, second) = (&rotations[0], &rotations[1]);

        // move the second rotation onto the first one
        let shift = chrono::Duration::days(3);
        let patch = RotationPatch::dates(first.date_debut + shift, first.date_fin + shift);
        let err = planner.update_rotation(&second.id, &patch).unwrap_err();
        assert_eq!(err.violation_kind(), Some(ViolationKind::NoOverlap));

        let stored = planner.store().rotation(&second.id).unwrap();
        assert_eq!(&stored, second);
    }

    #[test]
    fn test_break_edit_rejected() {
        let planner = generated();
        let rotations = planner.get_student_rotations("A").unwrap();
        let second = &rotations[1];
        // one idle day only
        let start = rotations[0].date_fin + chrono::Duration::days(2);
        let patch = RotationPatch::dates(start, start + chrono::Duration::days(13));
        let err = planner.update_rotation(&second.id, &patch).unwrap_err();
        assert_eq!(err.violation_kind(), Some(ViolationKind::MinBreak));
    }

    #[test]
    fn test_capacity_edit_rejected() {
        let planner = generated();
        // svc2 has a single seat, held by A from Jan 17 to Jan 30
        let b_svc2 = planner
            .get_student_rotations("B")
            .unwrap()
            .into_iter()
            .find(|r| r.service_id == "svc2")
            .unwrap();
        let err = planner
            .update_rotation(&b_svc2.id, &RotationPatch::dates(d(1, 20), d(2, 2)))
            .unwrap_err();
        assert_eq!(err.violation_kind(), Some(ViolationKind::CapacityBound));
        assert_eq!(planner.store().rotation(&b_svc2.id).unwrap(), b_svc2);
    }

    #[test]
    fn test_concurrent_edits_cannot_overfill_service() {
        use std::sync::{Arc, Barrier};
        use std::thread;

        for _ in 0..50 {
            let planner = Arc::new(generated());
            let ids: Vec<String> = ["A", "B"]
                .iter()
                .map(|student| {
                    planner
                        .get_student_rotations(student)
                        .unwrap()
                        .into_iter()
                        .find(|r| r.service_id == "svc2")
                        .unwrap()
                        .id
                })
                .collect();

            let barrier = Arc::new(Barrier::new(ids.len()));
            let handles: Vec<_> = ids
                .into_iter()
                .map(|id| {
                    let planner = Arc::clone(&planner);
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        planner.update_rotation(&id, &RotationPatch::dates(d(3, 1), d(3, 14)))
                    })
                })
                .collect();
            let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

            // svc2 has a single seat
            assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
            let err = results.into_iter().find_map(Result::err).unwrap();
            assert_eq!(err.violation_kind(), Some(ViolationKind::CapacityBound));

            let planning = planner.get_planning("P1").unwrap().remove(0);
            assert!(planner.validate_planning(&planning.id).unwrap().is_valid());
        }
    }

    #[test]
    fn test_valid_edit_bumps_version_and_refreshes_schedule() {
        let planner = generated();
        let last = planner.get_student_rotations("A").unwrap().pop().unwrap();
        let start = last.date_debut + chrono::Duration::days(30);
        let patch = RotationPatch::dates(start, start + chrono::Duration::days(13));

        let saved = planner.update_rotation(&last.id, &patch).unwrap();
        assert_eq!(saved.version, last.version + 1);
        assert!(saved.warnings.is_empty());

        let schedule = active_schedule(&planner, "A");
        let detail = schedule.details.iter().find(|d| d.rotation_id == last.id).unwrap();
        assert_eq!(detail.date_debut, start);
        assert_eq!(schedule.date_fin_planning, start + chrono::Duration::days(13));
    }

    #[test]
    fn test_soft_violations_stored_as_warnings() {
        let planner = generated();
        let last = planner.get_student_rotations("A").unwrap().pop().unwrap();
        let start = last.date_debut + chrono::Duration::days(30);
        // shorter than the service duration
        let patch = RotationPatch::dates(start, start + chrono::Duration::days(6));
        let saved = planner.update_rotation(&last.id, &patch).unwrap();
        assert_eq!(saved.warnings.len(), 1);
        assert_eq!(planner.store().rotation(&last.id).unwrap().warnings, saved.warnings);
    }

    #[test]
    fn test_invalid_patches() {
        let planner = generated();
        let r = first_rotation(&planner, "A");
        assert!(matches!(
            planner.update_rotation(&r.id, &RotationPatch::default()),
            Err(PlanningError::Validation(_))
        ));
        assert!(matches!(
            planner.update_rotation(&r.id, &RotationPatch::dates(d(2, 10), d(2, 1))),
            Err(PlanningError::Validation(_))
        ));
        assert!(matches!(
            planner.update_rotation("missing", &RotationPatch::default().with_order(2)),
            Err(PlanningError::NotFound { .. })
        ));
        assert!(matches!(
            planner.update_rotation(&r.id, &RotationPatch::default().with_service("nope")),
            Err(PlanningError::NotFound { .. })
        ));
    }

    #[test]
    fn test_archived_planning_is_read_only() {
        let planner = generated();
        let old = first_rotation(&planner, "A");
        planner.generate(&GenerateRequest::new("P1").with_start_date(d(1, 1))).unwrap();

        let err = planner
            .update_rotation(&old.id, &RotationPatch::default().with_order(5))
            .unwrap_err();
        assert!(matches!(err, PlanningError::Validation(_)));
    }

    #[test]
    fn test_archive_then_version_round_trip() {
        let planner = generated();
        let schedule = active_schedule(&planner, "A");

        let archived = planner.archive_schedule(&schedule.id).unwrap();
        assert!(archived.archived);
        assert!(archived.archived_at.is_some());
        assert!(matches!(
            planner.archive_schedule(&schedule.id),
            Err(PlanningError::AlreadyArchived { .. })
        ));

        let next = planner.create_schedule_version(&schedule.id).unwrap();
        assert_ne!(next.id, schedule.id);
        assert_eq!(next.version, schedule.version + 1);
        assert_eq!(next.predecessor_id.as_deref(), Some(schedule.id.as_str()));
        assert!(!next.archived);
        assert!(next.same_content(&archived));

        // predecessor untouched
        assert_eq!(planner.store().schedule(&schedule.id).unwrap(), archived);

        let err = planner.create_schedule_version(&schedule.id).unwrap_err();
        assert!(matches!(err, PlanningError::AlreadySuperseded { .. }));
    }

    #[test]
    fn test_archived_schedule_rotations_leave_capacity() {
        let planner = generated();
        let b_svc2 = planner
            .get_student_rotations("B")
            .unwrap()
            .into_iter()
            .find(|r| r.service_id == "svc2")
            .unwrap();
        let patch = RotationPatch::dates(d(1, 20), d(2, 2));
        assert!(planner.update_rotation(&b_svc2.id, &patch).is_err());

        // A's seat on svc2 is released once A's schedule is archived
        let schedule = active_schedule(&planner, "A");
        planner.archive_schedule(&schedule.id).unwrap();
        let saved = planner.update_rotation(&b_svc2.id, &patch).unwrap();
        assert_eq!(saved.date_debut, d(1, 20));

        let report = planner.validate_planning(&saved.planning_id).unwrap();
        assert!(report.is_valid());
    }

    #[test]
    fn test_service_status_progression() {
        let planner = generated();
        let schedule = active_schedule(&planner, "A");
        let first = schedule.details[0].id.clone();
        let second = schedule.details[1].id.clone();

        let updated = planner
            .update_service_status(
                &schedule.id,
                &first,
                &StatusUpdate {
                    statut: DetailStatus::EnCours,
                    notes: Some("arrivée".into()),
                },
            )
            .unwrap();
        let detail = updated.detail(&first).unwrap();
        assert!(detail.date_debut_reelle.is_some());
        assert_eq!(detail.notes.as_deref(), Some("arrivée"));

        for id in [&first, &second] {
            planner
                .update_service_status(
                    &schedule.id,
                    id,
                    &StatusUpdate {
                        statut: DetailStatus::Termine,
                        notes: None,
                    },
                )
                .unwrap();
        }
        let done = planner.store().schedule(&schedule.id).unwrap();
        assert_eq!(done.nb_services_completes, 2);
        assert_eq!(done.statut, ScheduleStatus::Termine);
        assert!(done.details[0].date_fin_reelle.is_some());

        let progress = planner.schedule_progress("A").unwrap();
        assert_eq!(progress.progression_globale, 100.0);
        assert_eq!(progress.services_completes.len(), 2);
    }

    #[test]
    fn test_service_status_errors() {
        let planner = generated();
        let schedule = active_schedule(&planner, "A");
        let update = StatusUpdate {
            statut: DetailStatus::EnCours,
            notes: None,
        };
        assert!(matches!(
            planner.update_service_status(&schedule.id, "missing", &update),
            Err(PlanningError::NotFound { .. })
        ));

        planner.archive_schedule(&schedule.id).unwrap();
        let detail = schedule.details[0].id.clone();
        assert!(matches!(
            planner.update_service_status(&schedule.id, &detail, &update),
            Err(PlanningError::AlreadyArchived { .. })
        ));
        assert!(matches!(
            planner.schedule_progress("A"),
            Err(PlanningError::NotFound { .. })
        ));
    }

    #[test]
    fn test_progress_of_untouched_schedule() {
        let planner = generated();
        let progress = planner.schedule_progress("B").unwrap();
        assert_eq!(progress.student_id, "B");
        assert_eq!(progress.progression_globale, 0.0);
        assert!(progress.services_completes.is_empty());
        assert_eq!(progress.services_planifies.len(), 2);
    }

    #[test]
    fn test_concurrent_edits_of_one_student() {
        use std::sync::Arc;
        use std::thread;

        let planner = Arc::new(generated());
        let last = planner.get_student_rotations("A").unwrap().pop().unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let planner = Arc::clone(&planner);
                let id = last.id.clone();
                let start = last.date_debut + chrono::Duration::days(30 + 20 * i);
                thread::spawn(move || {
                    planner.update_rotation(&id, &RotationPatch::dates(start, start + chrono::Duration::days(13)))
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(planner.store().rotation(&last.id).unwrap().version, last.version + 4);
    }
}
