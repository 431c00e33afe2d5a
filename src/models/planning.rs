//! Planning model.
//!
//! A planning is the set of rotations produced by one generation for one
//! promotion year. Regenerating a scope archives the previous planning and
//! points it at its replacement instead of deleting it.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::Rotation;

/// Rotations generated for one promotion year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Planning {
    /// Unique planning identifier.
    pub id: String,
    /// Promotion the planning belongs to.
    pub promotion_id: String,
    /// Promotion year (scope) the planning covers.
    pub promotion_year_id: String,
    /// Level of that year.
    pub year_level: u32,
    /// Generation timestamp.
    pub created_at: DateTime<Utc>,
    /// Anchor date the generation started from.
    pub start_date: NaiveDate,
    /// Rotations ordered by student, then order.
    pub rotations: Vec<Rotation>,
    /// Distinct services used.
    pub number_of_services: usize,
    /// Distinct students scheduled.
    pub number_of_students: usize,
    /// Whether a newer planning replaced this one.
    pub archived: bool,
    /// Replacement planning, if any.
    pub superseded_by: Option<String>,
}

impl Planning {
    /// Creates an empty planning with a fresh id.
    pub fn new(
        promotion_id: impl Into<String>,
        promotion_year_id: impl Into<String>,
        year_level: u32,
        start_date: NaiveDate,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            promotion_id: promotion_id.into(),
            promotion_year_id: promotion_year_id.into(),
            year_level,
            created_at: Utc::now(),
            start_date,
            rotations: Vec::new(),
            number_of_services: 0,
            number_of_students: 0,
            archived: false,
            superseded_by: None,
        }
    }

    /// Sets the rotations, re-parenting them and refreshing counts.
    pub fn with_rotations(mut self, rotations: Vec<Rotation>) -> Self {
        self.rotations = rotations
            .into_iter()
            .map(|r| r.in_planning(self.id.clone(), self.promotion_year_id.clone()))
            .collect();
        self.refresh_counts();
        self
    }

    /// Recomputes the denormalized counts.
    pub fn refresh_counts(&mut self) {
        let services: HashSet<&str> = self.rotations.iter().map(|r| r.service_id.as_str()).collect();
        let students: HashSet<&str> = self.rotations.iter().map(|r| r.student_id.as_str()).collect();
        self.number_of_services = services.len();
        self.number_of_students = students.len();
    }

    /// Rotations of one student, by order.
    pub fn rotations_for_student(&self, student_id: &str) -> Vec<&Rotation> {
        let mut out: Vec<&Rotation> = self
            .rotations
            .iter()
            .filter(|r| r.student_id == student_id)
            .collect();
        out.sort_by_key(|r| (r.order, r.date_debut));
        out
    }

    /// Rotations hosted by one service.
    pub fn rotations_for_service(&self, service_id: &str) -> Vec<&Rotation> {
        self.rotations
            .iter()
            .filter(|r| r.service_id == service_id)
            .collect()
    }

    /// Finds a rotation by id.
    pub fn rotation(&self, rotation_id: &str) -> Option<&Rotation> {
        self.rotations.iter().find(|r| r.id == rotation_id)
    }

    /// Earliest start and latest end across all rotations.
    pub fn window(&self) -> Option<(NaiveDate, NaiveDate)> {
        let start = self.rotations.iter().map(|r| r.date_debut).min()?;
        let end = self.rotations.iter().map(|r| r.date_fin).max()?;
        Some((start, end))
    }

    /// Number of rotations.
    pub fn rotation_count(&self) -> usize {
        self.rotations.len()
    }
}
