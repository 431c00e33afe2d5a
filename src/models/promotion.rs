//! Promotion and promotion-year models.
//!
//! A promotion is a cohort of students entering in the same calendar year.
//! It is split into one [`PromotionYear`] per academic year of its speciality;
//! each year carries its own service pool and exactly one year is active at
//! a time.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::speciality::DEFAULT_DURATION_YEARS;
use super::Speciality;

/// A cohort of students.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Promotion {
    /// Unique promotion identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Entry calendar year (e.g. 2024).
    pub year: i32,
    /// Speciality, if any. Determines the number of promotion years.
    pub speciality_id: Option<String>,
    /// Promotion-level service pool, used when a year has no pool of its own.
    pub legacy_service_ids: Vec<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// One academic year within a promotion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionYear {
    /// Unique identifier.
    pub id: String,
    /// Parent promotion.
    pub promotion_id: String,
    /// Year level, 1-based.
    pub level: u32,
    /// Calendar year label.
    pub calendar_year: i32,
    /// Display name ("1ère année", "2ème année", ...).
    pub name: String,
    /// Academic start date, if fixed.
    pub start_date: Option<NaiveDate>,
    /// Whether this is the promotion's current year.
    pub is_active: bool,
    /// Services eligible for scheduling in this year.
    pub service_ids: Vec<String>,
}

impl Promotion {
    /// Creates a promotion without speciality.
    pub fn new(id: impl Into<String>, name: impl Into<String>, year: i32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            year,
            speciality_id: None,
            legacy_service_ids: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Sets the speciality.
    pub fn with_speciality(mut self, speciality_id: impl Into<String>) -> Self {
        self.speciality_id = Some(speciality_id.into());
        self
    }

    /// Adds a service to the promotion-level pool.
    pub fn with_legacy_service(mut self, service_id: impl Into<String>) -> Self {
        self.legacy_service_ids.push(service_id.into());
        self
    }

    /// Builds the promotion years implied by the speciality duration.
    ///
    /// Level 1 is active; calendar years follow the entry year.
    pub fn build_years(&self, speciality: Option<&Speciality>) -> Vec<PromotionYear> {
        let duration = speciality
            .map(|s| s.duration_years)
            .unwrap_or(DEFAULT_DURATION_YEARS)
            .max(1);

        (1..=duration)
            .map(|level| PromotionYear {
                id: uuid::Uuid::new_v4().to_string(),
                promotion_id: self.id.clone(),
                level,
                calendar_year: self.year + level as i32 - 1,
                name: PromotionYear::display_name(level),
                start_date: None,
                is_active: level == 1,
                service_ids: Vec::new(),
            })
            .collect()
    }
}

impl PromotionYear {
    /// French ordinal label for a year level.
    pub fn display_name(level: u32) -> String {
        if level == 1 {
            "1ère année".to_string()
        } else {
            format!("{level}ème année")
        }
    }

    /// Sets the academic start date.
    pub fn with_start_date(mut self, date: NaiveDate) -> Self {
        self.start_date = Some(date);
        self
    }

    /// Adds a service to this year's pool.
    pub fn with_service(mut self, service_id: impl Into<String>) -> Self {
        self.service_ids.push(service_id.into());
        self
    }
}
