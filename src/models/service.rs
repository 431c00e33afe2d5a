//! Service (hospital ward / internship site) model.
//!
//! A service hosts interns in fixed-length rotations. `places_disponibles`
//! bounds how many students it can host on the same day; the global
//! `max_concurrent_students` setting may lower that bound further.

use serde::{Deserialize, Serialize};

/// A service students rotate through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    /// Unique service identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Seats available at any one time (≥ 1).
    pub places_disponibles: u32,
    /// Length of one rotation in days (≥ 1).
    pub duree_stage_jours: u32,
    /// Owning speciality.
    pub speciality_id: Option<String>,
}

impl Service {
    /// Creates a service with one seat and a one-day rotation.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            places_disponibles: 1,
            duree_stage_jours: 1,
            speciality_id: None,
        }
    }

    /// Sets the seat count.
    pub fn with_places(mut self, places: u32) -> Self {
        self.places_disponibles = places;
        self
    }

    /// Sets the rotation length in days.
    pub fn with_duration_days(mut self, days: u32) -> Self {
        self.duree_stage_jours = days;
        self
    }

    /// Sets the owning speciality.
    pub fn with_speciality(mut self, speciality_id: impl Into<String>) -> Self {
        self.speciality_id = Some(speciality_id.into());
        self
    }

    /// Rotation length as a signed day count.
    #[inline]
    pub fn duration_days(&self) -> i64 {
        i64::from(self.duree_stage_jours)
    }
}
