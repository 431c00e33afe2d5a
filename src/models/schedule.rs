//! Student schedule model.
//!
//! A student schedule is the per-student view of a planning: one detail row
//! per rotation plus progress tracking. Schedules are never overwritten.
//! A change produces a new version whose `predecessor_id` points at the
//! schedule it was copied from, so the chain
//! `v1 <- v2 <- v3` is the student's history.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::rotation::span_days;
use super::{Planning, Rotation, Service};

/// Overall schedule status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    #[default]
    EnCours,
    Termine,
    Suspendu,
    Annule,
}

/// Status of one rotation within a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailStatus {
    #[default]
    Planifie,
    EnCours,
    Termine,
    Annule,
}

/// One rotation as seen from a student's schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleDetail {
    /// Unique detail identifier.
    pub id: String,
    /// Source rotation.
    pub rotation_id: String,
    /// Service of the rotation.
    pub service_id: String,
    /// Service display name at materialization time.
    pub service_name: String,
    /// Position in the student's sequence.
    pub order: u32,
    pub date_debut: NaiveDate,
    pub date_fin: NaiveDate,
    /// Inclusive length in days.
    pub duree_jours: i64,
    pub statut: DetailStatus,
    /// Day the rotation actually started.
    pub date_debut_reelle: Option<NaiveDate>,
    /// Day the rotation actually ended.
    pub date_fin_reelle: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// A student's materialized schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentSchedule {
    /// Unique schedule identifier.
    pub id: String,
    pub student_id: String,
    pub planning_id: String,
    /// Version number, 1 for the first schedule of a lineage.
    pub version: u32,
    /// Schedule this one was copied from.
    pub predecessor_id: Option<String>,
    /// Archived schedules are history: excluded from validation and capacity.
    pub archived: bool,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub date_debut_planning: NaiveDate,
    pub date_fin_planning: NaiveDate,
    pub nb_services_total: usize,
    pub nb_services_completes: usize,
    /// Calendar days from first start to last end, inclusive.
    pub duree_totale_jours: i64,
    pub statut: ScheduleStatus,
    /// Detail rows, by order.
    pub details: Vec<ScheduleDetail>,
}

/// Status and notes change for one detail row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub statut: DetailStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Progress of a student through the active schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleProgress {
    pub student_id: String,
    pub schedule_id: String,
    pub services_completes: Vec<String>,
    pub services_en_cours: Vec<String>,
    pub services_planifies: Vec<String>,
    /// Completed share in percent, one decimal.
    pub progression_globale: f64,
    /// First planned service starting on or after the reference day.
    pub prochain_service: Option<String>,
    pub date_prochain_service: Option<NaiveDate>,
}

/// One line of a planning's schedule overview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSummary {
    pub schedule_id: String,
    pub student_id: String,
    /// "Prénom Nom".
    pub student_name: String,
    pub planning_id: String,
    pub version: u32,
    pub archived: bool,
    pub date_debut_planning: NaiveDate,
    pub date_fin_planning: NaiveDate,
    pub nb_services_total: usize,
    pub nb_services_completes: usize,
    pub duree_totale_jours: i64,
    pub statut: ScheduleStatus,
    /// Completed share in percent, one decimal.
    pub progression: f64,
}

impl ScheduleDetail {
    /// Builds a detail row from a rotation.
    pub fn from_rotation(rotation: &Rotation, service_name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            rotation_id: rotation.id.clone(),
            service_id: rotation.service_id.clone(),
            service_name: service_name.into(),
            order: rotation.order,
            date_debut: rotation.date_debut,
            date_fin: rotation.date_fin,
            duree_jours: rotation.span_days(),
            statut: DetailStatus::Planifie,
            date_debut_reelle: None,
            date_fin_reelle: None,
            notes: None,
        }
    }

    /// Re-syncs the planned fields from an edited rotation.
    pub fn sync_with(&mut self, rotation: &Rotation, service_name: &str) {
        self.service_id = rotation.service_id.clone();
        self.service_name = service_name.to_string();
        self.order = rotation.order;
        self.date_debut = rotation.date_debut;
        self.date_fin = rotation.date_fin;
        self.duree_jours = rotation.span_days();
    }

    /// Applies a status change, stamping actual dates on first transition.
    pub fn apply_status(&mut self, update: &StatusUpdate, today: NaiveDate) {
        self.statut = update.statut;
        if let Some(ref notes) = update.notes {
            self.notes = Some(notes.clone());
        }
        match update.statut {
            DetailStatus::EnCours if self.date_debut_reelle.is_none() => {
                self.date_debut_reelle = Some(today);
            }
            DetailStatus::Termine if self.date_fin_reelle.is_none() => {
                self.date_fin_reelle = Some(today);
            }
            _ => {}
        }
    }
}

impl StudentSchedule {
    /// Materializes a student's schedule from a planning.
    ///
    /// Returns `None` when the student has no rotation in the planning.
    pub fn from_planning(
        planning: &Planning,
        student_id: &str,
        services: &[Service],
    ) -> Option<Self> {
        let rotations = planning.rotations_for_student(student_id);
        let start = rotations.iter().map(|r| r.date_debut).min()?;
        let end = rotations.iter().map(|r| r.date_fin).max()?;

        let details: Vec<ScheduleDetail> = rotations
            .iter()
            .map(|r| {
                let name = services
                    .iter()
                    .find(|s| s.id == r.service_id)
                    .map(|s| s.name.as_str())
                    .unwrap_or(r.service_id.as_str());
                ScheduleDetail::from_rotation(r, name)
            })
            .collect();

        Some(Self {
            id: uuid::Uuid::new_v4().to_string(),
            student_id: student_id.to_string(),
            planning_id: planning.id.clone(),
            version: 1,
            predecessor_id: None,
            archived: false,
            archived_at: None,
            created_at: Utc::now(),
            date_debut_planning: start,
            date_fin_planning: end,
            nb_services_total: details.len(),
            nb_services_completes: 0,
            duree_totale_jours: span_days(start, end),
            statut: ScheduleStatus::EnCours,
            details,
        })
    }

    /// Links this schedule after `predecessor` in a lineage.
    pub fn succeeding(mut self, predecessor: &StudentSchedule) -> Self {
        self.version = predecessor.version + 1;
        self.predecessor_id = Some(predecessor.id.clone());
        self
    }

    /// Copies this schedule into a new version with fresh ids.
    ///
    /// The copy is active regardless of the source's archive state.
    pub fn next_version(&self) -> Self {
        let details = self
            .details
            .iter()
            .map(|d| ScheduleDetail {
                id: uuid::Uuid::new_v4().to_string(),
                ..d.clone()
            })
            .collect();

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            version: self.version + 1,
            predecessor_id: Some(self.id.clone()),
            archived: false,
            archived_at: None,
            created_at: Utc::now(),
            details,
            ..self.clone()
        }
    }

    /// Marks the schedule archived.
    pub fn archive(&mut self, at: DateTime<Utc>) {
        self.archived = true;
        self.archived_at = Some(at);
    }

    /// Finds a detail row.
    pub fn detail(&self, detail_id: &str) -> Option<&ScheduleDetail> {
        self.details.iter().find(|d| d.id == detail_id)
    }

    /// Finds a detail row mutably.
    pub fn detail_mut(&mut self, detail_id: &str) -> Option<&mut ScheduleDetail> {
        self.details.iter_mut().find(|d| d.id == detail_id)
    }

    /// Recomputes completion and closes the schedule when every row is done.
    pub fn refresh_progress(&mut self) {
        self.nb_services_completes = self
            .details
            .iter()
            .filter(|d| d.statut == DetailStatus::Termine)
            .count();
        if self.nb_services_total > 0 && self.nb_services_completes == self.nb_services_total {
            self.statut = ScheduleStatus::Termine;
        }
    }

    /// Recomputes the planning window from the detail rows.
    pub fn refresh_window(&mut self) {
        if let (Some(start), Some(end)) = (
            self.details.iter().map(|d| d.date_debut).min(),
            self.details.iter().map(|d| d.date_fin).max(),
        ) {
            self.date_debut_planning = start;
            self.date_fin_planning = end;
            self.duree_totale_jours = span_days(start, end);
        }
        self.details.sort_by_key(|d| (d.order, d.date_debut));
    }

    /// Whether the rotation content (services, dates, order) matches `other`.
    pub fn same_content(&self, other: &StudentSchedule) -> bool {
        self.details.len() == other.details.len()
            && self.details.iter().zip(&other.details).all(|(a, b)| {
                a.rotation_id == b.rotation_id
                    && a.service_id == b.service_id
                    && a.order == b.order
                    && a.date_debut == b.date_debut
                    && a.date_fin == b.date_fin
                    && a.statut == b.statut
            })
    }

    /// Completed services in percent, one decimal.
    pub fn completion_percent(&self) -> f64 {
        percent(self.nb_services_completes, self.nb_services_total)
    }

    /// Overview line for this schedule.
    pub fn summary(&self, student_name: impl Into<String>) -> ScheduleSummary {
        ScheduleSummary {
            schedule_id: self.id.clone(),
            student_id: self.student_id.clone(),
            student_name: student_name.into(),
            planning_id: self.planning_id.clone(),
            version: self.version,
            archived: self.archived,
            date_debut_planning: self.date_debut_planning,
            date_fin_planning: self.date_fin_planning,
            nb_services_total: self.nb_services_total,
            nb_services_completes: self.nb_services_completes,
            duree_totale_jours: self.duree_totale_jours,
            statut: self.statut,
            progression: self.completion_percent(),
        }
    }

    /// Progress summary relative to `today`.
    pub fn progress(&self, today: NaiveDate) -> ScheduleProgress {
        let mut completes = Vec::new();
        let mut en_cours = Vec::new();
        let mut planifies = Vec::new();
        let mut next: Option<&ScheduleDetail> = None;

        for detail in &self.details {
            match detail.statut {
                DetailStatus::Termine => completes.push(detail.service_name.clone()),
                DetailStatus::EnCours => en_cours.push(detail.service_name.clone()),
                DetailStatus::Planifie => {
                    planifies.push(detail.service_name.clone());
                    if next.is_none() && detail.date_debut >= today {
                        next = Some(detail);
                    }
                }
                DetailStatus::Annule => {}
            }
        }

        let nb_completes = completes.len();
        ScheduleProgress {
            student_id: self.student_id.clone(),
            schedule_id: self.id.clone(),
            services_completes: completes,
            services_en_cours: en_cours,
            services_planifies: planifies,
            progression_globale: percent(nb_completes, self.nb_services_total),
            prochain_service: next.map(|d| d.service_name.clone()),
            date_prochain_service: next.map(|d| d.date_debut),
        }
    }
}

/// `part / total` in percent, rounded to one decimal; 0 for an empty total.
fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = part as f64 / total as f64 * 100.0;
    (pct * 10.0).round() / 10.0
}
