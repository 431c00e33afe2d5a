use std::collections::BTreeSet;

use chrono::{NaiveDate, TimeZone, Utc};

use super::*;
use crate::config::SettingsUpdate;
use crate::scheduler::MaxMinSpread;
use crate::store::MemoryStore;

pub(super) fn d(m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, m, day).unwrap()
}

fn student(id: &str, promotion: &str, seq: i64) -> Student {
    Student::new(id, "Nom", id, promotion).created_at(Utc.timestamp_opt(1_700_000_000 + seq, 0).unwrap())
}

fn catalog(planner: &Planner<MemoryStore>) {
    planner
        .add_service(Service::new("svc1", "Cardiologie").with_places(2).with_duration_days(14))
        .unwrap();
    planner
        .add_service(Service::new("svc2", "Pédiatrie").with_places(1).with_duration_days(14))
        .unwrap();
}

/// Two services, three students, pool on year 1 only.
pub(super) fn scenario_planner() -> Planner<MemoryStore> {
    let planner = Planner::new(MemoryStore::new());
    catalog(&planner);
    let years = planner.create_promotion(Promotion::new("P1", "Promo 2025", 2025)).unwrap();
    planner
        .assign_year_services(&years[0].id, &["svc1".to_string(), "svc2".to_string()])
        .unwrap();
    for (seq, id) in ["A", "B", "C"].into_iter().enumerate() {
        planner.add_student(student(id, "P1", seq as i64)).unwrap();
    }
    planner
}

fn mapping(planning: &Planning) -> BTreeSet<(String, String, u32)> {
    planning
        .rotations
        .iter()
        .map(|r| (r.student_id.clone(), r.service_id.clone(), r.order))
        .collect()
}

fn year(planner: &Planner<MemoryStore>, level: u32) -> PromotionYear {
    planner
        .store()
        .promotion_years("P1")
        .unwrap()
        .into_iter()
        .find(|y| y.level == level)
        .unwrap()
}

#[test]
fn test_generate_scenario() {
    let planner = scenario_planner();
    let outcome = planner.generate(&GenerateRequest::new("P1").with_start_date(d(1, 1))).unwrap();

    assert_eq!(outcome.plannings.len(), 1);
    assert_eq!(outcome.number_of_services, 2);
    assert_eq!(outcome.number_of_students, 3);
    assert!(outcome.under_scheduled.is_empty());
    assert!(outcome.skipped_levels.is_empty());
    assert_eq!(outcome.plannings[0].rotation_count(), 6);

    let a = planner.get_student_rotations("A").unwrap();
    assert_eq!(a.len(), 2);
    assert_eq!((a[0].service_id.as_str(), a[0].date_debut, a[0].date_fin), ("svc1", d(1, 1), d(1, 14)));
    assert_eq!((a[1].service_id.as_str(), a[1].date_debut), ("svc2", d(1, 17)));

    let b = planner.get_student_rotations("B").unwrap();
    assert_eq!(b[1].date_debut, d(2, 2));
    let c = planner.get_student_rotations("C").unwrap();
    assert_eq!(c[0].service_id, "svc2");

    let schedules = planner
        .store()
        .schedules_for_planning(&outcome.plannings[0].id)
        .unwrap();
    assert_eq!(schedules.len(), 3);
    assert!(schedules.iter().all(|s| s.version == 1 && s.nb_services_total == 2));
}

#[test]
fn test_generate_defaults_to_settings_start() {
    let settings = PlanningSettings::default().with_academic_year_start(d(9, 1));
    let planner = Planner::new(MemoryStore::with_settings(settings));
    catalog(&planner);
    let years = planner.create_promotion(Promotion::new("P1", "Promo", 2025)).unwrap();
    planner.assign_year_services(&years[0].id, &["svc1".to_string()]).unwrap();
    planner.add_student(student("A", "P1", 1)).unwrap();

    let outcome = planner.generate(&GenerateRequest::new("P1")).unwrap();
    assert_eq!(outcome.plannings[0].start_date, d(9, 1));
    assert_eq!(outcome.plannings[0].rotations[0].date_debut, d(9, 1));
}

#[test]
fn test_concurrent_generation_rejected() {
    let planner = scenario_planner();
    let year = year(&planner, 1);

    let held = planner.in_flight.try_begin(&[year.id.clone()]).unwrap();
    let err = planner.generate(&GenerateRequest::new("P1")).unwrap_err();
    assert!(matches!(err, PlanningError::GenerationInProgress { .. }));
    assert_eq!(planner.store().planning_count(), 0);

    drop(held);
    assert!(planner.generate(&GenerateRequest::new("P1")).is_ok());
}

#[test]
fn test_parallel_generations_commit_once_each() {
    use std::sync::Arc;
    use std::thread;

    let planner = Arc::new(scenario_planner());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let planner = Arc::clone(&planner);
            thread::spawn(move || planner.generate(&GenerateRequest::new("P1").with_start_date(d(1, 1))))
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let committed = results.iter().filter(|r| r.is_ok()).count();
    assert!(committed >= 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, PlanningError::GenerationInProgress { .. })));
    assert_eq!(planner.store().planning_count(), committed);
    assert_eq!(planner.get_planning("P1").unwrap().len(), 1);
}

#[test]
fn test_empty_pool_stores_nothing() {
    let planner = Planner::new(MemoryStore::new());
    catalog(&planner);
    planner.create_promotion(Promotion::new("P2", "Promo", 2025)).unwrap();
    planner.add_student(student("A", "P2", 1)).unwrap();

    let err = planner.generate(&GenerateRequest::new("P2")).unwrap_err();
    assert!(matches!(err, PlanningError::InsufficientServices { .. }));
    assert_eq!(planner.store().planning_count(), 0);
}

#[test]
fn test_insufficient_capacity_stores_nothing() {
    let planner = Planner::new(MemoryStore::new());
    planner
        .add_service(Service::new("long", "Chirurgie").with_places(1).with_duration_days(200))
        .unwrap();
    let years = planner.create_promotion(Promotion::new("P1", "Promo", 2025)).unwrap();
    planner.assign_year_services(&years[0].id, &["long".to_string()]).unwrap();
    for seq in 0..5 {
        planner.add_student(student(&format!("E{seq}"), "P1", seq)).unwrap();
    }

    let err = planner.generate(&GenerateRequest::new("P1")).unwrap_err();
    assert!(matches!(err, PlanningError::InsufficientCapacity { .. }));
    assert_eq!(planner.store().planning_count(), 0);
}

#[test]
fn test_unknown_promotion() {
    let planner = scenario_planner();
    assert!(matches!(
        planner.generate(&GenerateRequest::new("nope")),
        Err(PlanningError::NotFound { .. })
    ));
}

#[test]
fn test_inactive_students_left_out() {
    let planner = scenario_planner();
    planner.add_student(student("Z", "P1", 9).inactive()).unwrap();
    let outcome = planner.generate(&GenerateRequest::new("P1")).unwrap();
    assert_eq!(outcome.number_of_students, 3);
    assert!(planner.get_student_rotations("Z").unwrap().is_empty());
}

#[test]
fn test_regeneration_is_idempotent() {
    let planner = scenario_planner();
    let request = GenerateRequest::new("P1").with_start_date(d(1, 1));
    let first = planner.generate(&request).unwrap().plannings.remove(0);
    let old_schedule = planner.store().schedules_for_student("A").unwrap().remove(0);

    let second = planner.generate(&request).unwrap().plannings.remove(0);
    assert_ne!(first.id, second.id);
    assert_eq!(mapping(&first), mapping(&second));

    let archived = planner.get_planning_by_id(&first.id).unwrap();
    assert!(archived.archived);
    assert_eq!(archived.superseded_by.as_deref(), Some(second.id.as_str()));

    let active = planner.get_planning("P1").unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, second.id);

    let schedules = planner.store().schedules_for_student("A").unwrap();
    assert_eq!(schedules.len(), 2);
    let old = schedules.iter().find(|s| s.id == old_schedule.id).unwrap();
    let new = schedules.iter().find(|s| s.id != old_schedule.id).unwrap();
    assert!(old.archived);
    assert_eq!(new.version, 2);
    assert_eq!(new.predecessor_id.as_deref(), Some(old_schedule.id.as_str()));
    assert_eq!(planner.store().successor_of(&old.id).unwrap().as_deref(), Some(new.id.as_str()));
}

#[test]
fn test_all_years_skips_empty_pools() {
    let planner = Planner::new(MemoryStore::new());
    catalog(&planner);
    let years = planner.create_promotion(Promotion::new("P1", "Promo", 2025)).unwrap();
    assert_eq!(years.len(), 3);
    planner.assign_year_services(&years[0].id, &["svc1".to_string()]).unwrap();
    planner.assign_year_services(&years[1].id, &["svc2".to_string()]).unwrap();
    planner.add_student(student("A", "P1", 1)).unwrap();

    let outcome = planner
        .generate(&GenerateRequest::new("P1").with_start_date(d(1, 1)).all_years())
        .unwrap();
    assert_eq!(outcome.plannings.len(), 2);
    assert_eq!(outcome.skipped_levels, vec![3]);
    assert_eq!(outcome.plannings[0].year_level, 1);
    assert_eq!(outcome.plannings[1].year_level, 2);
    assert_eq!(
        outcome.plannings[1].start_date,
        NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
    );
    assert_eq!(outcome.number_of_services, 2);

    let rotations = planner.get_student_rotations("A").unwrap();
    assert_eq!(rotations.len(), 2);
    assert_eq!(rotations[1].service_id, "svc2");
}

#[test]
fn test_all_years_without_any_pool() {
    let planner = Planner::new(MemoryStore::new());
    catalog(&planner);
    planner.create_promotion(Promotion::new("P1", "Promo", 2025)).unwrap();
    planner.add_student(student("A", "P1", 1)).unwrap();

    let err = planner.generate(&GenerateRequest::new("P1").all_years()).unwrap_err();
    assert!(matches!(err, PlanningError::InsufficientServices { .. }));
}

#[test]
fn test_year_start_date_wins() {
    let planner = scenario_planner();
    let year = year(&planner, 1);
    planner.set_year_start_date(&year.id, d(3, 3)).unwrap();

    let outcome = planner.generate(&GenerateRequest::new("P1").with_start_date(d(1, 1))).unwrap();
    assert_eq!(outcome.plannings[0].start_date, d(3, 3));
}

#[test]
fn test_legacy_pool_fallback() {
    let planner = Planner::new(MemoryStore::new());
    catalog(&planner);
    planner
        .create_promotion(Promotion::new("P1", "Promo", 2025).with_legacy_service("svc2"))
        .unwrap();
    planner.add_student(student("A", "P1", 1)).unwrap();

    let outcome = planner.generate(&GenerateRequest::new("P1")).unwrap();
    let rotations = &outcome.plannings[0].rotations;
    assert_eq!(rotations.len(), 1);
    assert_eq!(rotations[0].service_id, "svc2");
}

#[test]
fn test_years_created_on_first_generation() {
    let planner = Planner::new(MemoryStore::new());
    catalog(&planner);
    let promotion = Promotion::new("P1", "Promo", 2025).with_legacy_service("svc1");
    planner.store().save_promotion(promotion).unwrap();
    planner.add_student(student("A", "P1", 1)).unwrap();

    planner.generate(&GenerateRequest::new("P1")).unwrap();
    let years = planner.store().promotion_years("P1").unwrap();
    assert_eq!(years.len(), 3);
    assert!(years[0].is_active);
}

#[test]
fn test_speciality_sets_year_count() {
    let planner = Planner::new(MemoryStore::new());
    planner
        .add_speciality(Speciality::new("SP", "Médecine").with_duration_years(5))
        .unwrap();
    let years = planner
        .create_promotion(Promotion::new("P1", "Promo", 2025).with_speciality("SP"))
        .unwrap();
    assert_eq!(years.len(), 5);
    assert_eq!(years[4].calendar_year, 2029);

    assert!(matches!(
        planner.add_speciality(Speciality::new("SP0", "X").with_duration_years(0)),
        Err(PlanningError::Validation(_))
    ));
}

#[test]
fn test_activate_year() {
    let planner = scenario_planner();
    let second = year(&planner, 2);
    planner.assign_year_services(&second.id, &["svc2".to_string()]).unwrap();

    let activated = planner.activate_year(&second.id).unwrap();
    assert!(activated.is_active);
    assert!(!year(&planner, 1).is_active);

    let outcome = planner.generate(&GenerateRequest::new("P1")).unwrap();
    assert_eq!(outcome.plannings[0].year_level, 2);
    assert_eq!(outcome.number_of_services, 1);
}

#[test]
fn test_catalog_validation() {
    let planner = scenario_planner();
    assert!(matches!(
        planner.add_service(Service::new("z", "Zero").with_places(0)),
        Err(PlanningError::Validation(_))
    ));
    assert!(matches!(
        planner.add_student(student("X", "nope", 1)),
        Err(PlanningError::NotFound { .. })
    ));
    let year = year(&planner, 1);
    assert!(matches!(
        planner.assign_year_services(&year.id, &["ghost".to_string()]),
        Err(PlanningError::NotFound { .. })
    ));
}

#[test]
fn test_get_planning_before_generation() {
    let planner = scenario_planner();
    assert!(matches!(planner.get_planning("P1"), Err(PlanningError::NotFound { .. })));
    assert!(matches!(planner.get_planning("nope"), Err(PlanningError::NotFound { .. })));
    assert!(matches!(
        planner.get_student_rotations("nope"),
        Err(PlanningError::NotFound { .. })
    ));
}

#[test]
fn test_settings_update_applies_to_next_generation() {
    let planner = scenario_planner();
    let settings = planner
        .update_planning_settings(&SettingsUpdate {
            max_concurrent_students: Some(1),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(settings.max_concurrent_students, 1);
    assert_eq!(planner.planning_settings().unwrap(), settings);

    let outcome = planner.generate(&GenerateRequest::new("P1").with_start_date(d(1, 1))).unwrap();
    let report = planner.validate_planning(&outcome.plannings[0].id).unwrap();
    assert!(report.is_valid());

    let efficiency = planner.analyze_efficiency("P1").unwrap();
    assert!(efficiency.services.iter().all(|s| s.capacity == 1));
}

#[test]
fn test_settings_update_rejects_invalid_values() {
    let planner = scenario_planner();
    let before = planner.planning_settings().unwrap();
    let err = planner
        .update_planning_settings(&SettingsUpdate {
            total_duration_months: Some(0),
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(err, PlanningError::Validation(_)));
    assert_eq!(planner.planning_settings().unwrap(), before);
}

#[test]
fn test_settings_file() {
    let path = std::env::temp_dir().join(format!("u-rotation-{}.toml", uuid::Uuid::new_v4()));
    std::fs::write(&path, "total_duration_months = 3\nbreak_days_between_rotations = 5\n").unwrap();

    let planner = Planner::with_settings_file(MemoryStore::new(), &path).unwrap();
    let settings = planner.planning_settings().unwrap();
    assert_eq!(settings.total_duration_months, 3);
    assert_eq!(settings.break_days_between_rotations, 5);
    std::fs::remove_file(&path).unwrap();

    let missing = Planner::with_settings_file(MemoryStore::new(), &path);
    assert!(matches!(missing, Err(PlanningError::Config(_))));
}

#[test]
fn test_validate_generated_planning() {
    let planner = scenario_planner();
    let outcome = planner.generate(&GenerateRequest::new("P1")).unwrap();
    let report = planner.validate_planning(&outcome.plannings[0].id).unwrap();
    assert!(report.is_valid());
    assert!(report.warnings.is_empty());
    assert!(report.coverage.is_empty());

    assert!(matches!(
        planner.validate_planning("nope"),
        Err(PlanningError::NotFound { .. })
    ));
}

#[test]
fn test_validate_reports_new_student_coverage() {
    let planner = scenario_planner();
    let outcome = planner.generate(&GenerateRequest::new("P1")).unwrap();
    planner.add_student(student("D", "P1", 9)).unwrap();

    let report = planner.validate_planning(&outcome.plannings[0].id).unwrap();
    assert!(report.is_valid());
    assert_eq!(report.coverage.len(), 1);
    assert!(matches!(
        &report.coverage[0],
        crate::validation::CoverageWarning::MissingServices { student_id, .. } if student_id == "D"
    ));
}

#[test]
fn test_analyze_efficiency() {
    let planner = scenario_planner();
    planner.generate(&GenerateRequest::new("P1").with_start_date(d(1, 1))).unwrap();

    let report = planner.analyze_efficiency("P1").unwrap();
    assert_eq!(report.nb_rotations, 6);
    assert_eq!(report.services.len(), 2);
    assert_eq!(report.students.len(), 3);
    assert_eq!(report.date_debut, Some(d(1, 1)));
    assert_eq!(report.balance_metric, "CV");
    assert!(report.balance_score >= 0.0);

    let planner = planner.with_balance_metric(MaxMinSpread);
    let report = planner.analyze_efficiency("P1").unwrap();
    assert_eq!(report.balance_metric, "MaxMin");
}

#[test]
fn test_year_start_date_helper() {
    let p = Promotion::new("P1", "Promo", 2025);
    let years = p.build_years(None);
    assert_eq!(year_start_date(&years[0], d(9, 1), true).unwrap(), d(9, 1));
    assert_eq!(
        year_start_date(&years[2], d(9, 1), true).unwrap(),
        NaiveDate::from_ymd_opt(2027, 9, 1).unwrap()
    );
    assert_eq!(year_start_date(&years[2], d(9, 1), false).unwrap(), d(9, 1));
}

#[test]
fn test_inactive_settings_block_generation() {
    let planner = scenario_planner();
    planner
        .update_planning_settings(&SettingsUpdate {
            is_active: Some(false),
            ..Default::default()
        })
        .unwrap();
    let err = planner.generate(&GenerateRequest::new("P1")).unwrap_err();
    assert!(matches!(err, PlanningError::Validation(_)));
    assert_eq!(planner.store().planning_count(), 0);

    planner
        .update_planning_settings(&SettingsUpdate {
            is_active: Some(true),
            ..Default::default()
        })
        .unwrap();
    assert!(planner.generate(&GenerateRequest::new("P1")).is_ok());
}

#[test]
fn test_oversized_break_rejected_before_generation() {
    let planner = scenario_planner();
    let err = planner
        .update_planning_settings(&SettingsUpdate {
            break_days_between_rotations: Some(u32::MAX),
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(err, PlanningError::Validation(_)));
    assert_eq!(planner.planning_settings().unwrap().break_days_between_rotations, 2);

    let outcome = planner.generate(&GenerateRequest::new("P1").with_start_date(d(1, 1))).unwrap();
    assert_eq!(outcome.plannings[0].rotation_count(), 6);
}

#[test]
fn test_planning_summary() {
    let planner = scenario_planner();
    let outcome = planner.generate(&GenerateRequest::new("P1").with_start_date(d(1, 1))).unwrap();
    let planning_id = outcome.plannings[0].id.clone();

    let schedule = planner
        .store()
        .schedules_for_student("A")
        .unwrap()
        .remove(0);
    planner
        .update_service_status(
            &schedule.id,
            &schedule.details[0].id,
            &crate::models::StatusUpdate {
                statut: crate::models::DetailStatus::Termine,
                notes: None,
            },
        )
        .unwrap();

    let lines = planner.planning_summary(&planning_id).unwrap();
    let names: Vec<&str> = lines.iter().map(|l| l.student_name.as_str()).collect();
    assert_eq!(names, vec!["A Nom", "B Nom", "C Nom"]);
    assert_eq!(lines[0].nb_services_completes, 1);
    assert_eq!(lines[0].progression, 50.0);
    assert_eq!(lines[1].progression, 0.0);
    assert!(lines.iter().all(|l| l.planning_id == planning_id && l.nb_services_total == 2));

    planner.generate(&GenerateRequest::new("P1").with_start_date(d(1, 1))).unwrap();
    assert!(planner
        .planning_summary(&planning_id)
        .unwrap()
        .iter()
        .all(|l| l.archived));

    assert!(matches!(
        planner.planning_summary("nope"),
        Err(PlanningError::NotFound { .. })
    ));
}

#[test]
fn test_schedule_history() {
    let planner = scenario_planner();
    let request = GenerateRequest::new("P1").with_start_date(d(1, 1));
    planner.generate(&request).unwrap();
    assert_eq!(planner.schedule_history("A").unwrap().len(), 1);

    planner.generate(&request).unwrap();
    let history = planner.schedule_history("A").unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].version, 1);
    assert!(history[0].archived);
    assert_eq!(history[1].version, 2);
    assert!(!history[1].archived);
    assert_eq!(history[1].predecessor_id.as_deref(), Some(history[0].id.as_str()));

    assert!(matches!(
        planner.schedule_history("nope"),
        Err(PlanningError::NotFound { .. })
    ));
}
