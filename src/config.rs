//! Planning settings.
//!
//! One logical settings record per deployment. The store holds the current
//! value; every generation and validation reads it afresh, so an update takes
//! effect on the next run.
//!
//! Settings can be seeded from TOML:
//!
//! ```
//! use u_rotation::config::PlanningSettings;
//!
//! let settings = PlanningSettings::from_toml_str(r#"
//!     academic_year_start = "2025-09-01"
//!     total_duration_months = 6
//!     max_concurrent_students = 3
//!     break_days_between_rotations = 2
//! "#).unwrap();
//!
//! assert_eq!(settings.budget_days(), 180);
//! assert_eq!(settings.effective_capacity(5), 3);
//! ```

use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Days counted per month of duration budget.
pub const DAYS_PER_MONTH: i64 = 30;

/// Upper bound on `total_duration_months` (ten years).
pub const MAX_DURATION_MONTHS: u32 = 120;

/// Upper bound on `break_days_between_rotations`.
pub const MAX_BREAK_DAYS: u32 = 365;

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Process-wide planning settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanningSettings {
    /// Default anchor date for a new academic year.
    #[serde(default = "default_start")]
    pub academic_year_start: NaiveDate,
    /// Cap on a student's cumulative rotation days, in months of 30 days.
    #[serde(default = "default_duration_months")]
    pub total_duration_months: u32,
    /// Ceiling on students per service at any one time.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_students: u32,
    /// Mandatory idle days between two rotations of the same student.
    #[serde(default = "default_break_days")]
    pub break_days_between_rotations: u32,
    /// Generation is refused while the settings are inactive.
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or_default()
}

fn default_duration_months() -> u32 {
    6
}

fn default_max_concurrent() -> u32 {
    2
}

fn default_break_days() -> u32 {
    2
}

fn default_active() -> bool {
    true
}

impl Default for PlanningSettings {
    fn default() -> Self {
        Self {
            academic_year_start: default_start(),
            total_duration_months: default_duration_months(),
            max_concurrent_students: default_max_concurrent(),
            break_days_between_rotations: default_break_days(),
            is_active: default_active(),
        }
    }
}

impl PlanningSettings {
    /// Loads and validates settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parses and validates settings from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(s)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Sets the duration cap in months.
    pub fn with_duration_months(mut self, months: u32) -> Self {
        self.total_duration_months = months;
        self
    }

    /// Sets the per-service concurrency ceiling.
    pub fn with_max_concurrent(mut self, max: u32) -> Self {
        self.max_concurrent_students = max;
        self
    }

    /// Sets the break days between rotations.
    pub fn with_break_days(mut self, days: u32) -> Self {
        self.break_days_between_rotations = days;
        self
    }

    /// Sets the academic year start.
    pub fn with_academic_year_start(mut self, date: NaiveDate) -> Self {
        self.academic_year_start = date;
        self
    }

    /// Cumulative rotation days allowed per student.
    pub fn budget_days(&self) -> i64 {
        i64::from(self.total_duration_months) * DAYS_PER_MONTH
    }

    /// Break days as a signed day count.
    #[inline]
    pub fn break_days(&self) -> i64 {
        i64::from(self.break_days_between_rotations)
    }

    /// Seats usable on a service: its own places, capped by the global ceiling.
    pub fn effective_capacity(&self, places_disponibles: u32) -> u32 {
        places_disponibles.min(self.max_concurrent_students)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.total_duration_months == 0 {
            return Err(ConfigError::Invalid(
                "total_duration_months must be at least 1".into(),
            ));
        }
        if self.total_duration_months > MAX_DURATION_MONTHS {
            return Err(ConfigError::Invalid(format!(
                "total_duration_months must not exceed {MAX_DURATION_MONTHS}"
            )));
        }
        if self.break_days_between_rotations > MAX_BREAK_DAYS {
            return Err(ConfigError::Invalid(format!(
                "break_days_between_rotations must not exceed {MAX_BREAK_DAYS}"
            )));
        }
        if self.max_concurrent_students == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_students must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Applies a partial update, returning the validated result.
    ///
    /// `self` is left untouched when validation fails.
    pub fn apply(&self, update: &SettingsUpdate) -> Result<Self, ConfigError> {
        let mut next = self.clone();
        if let Some(start) = update.academic_year_start {
            next.academic_year_start = start;
        }
        if let Some(months) = update.total_duration_months {
            next.total_duration_months = months;
        }
        if let Some(max) = update.max_concurrent_students {
            next.max_concurrent_students = max;
        }
        if let Some(days) = update.break_days_between_rotations {
            next.break_days_between_rotations = days;
        }
        if let Some(active) = update.is_active {
            next.is_active = active;
        }
        next.validate()?;
        Ok(next)
    }
}

/// Partial settings update. `None` fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default)]
    pub academic_year_start: Option<NaiveDate>,
    #[serde(default)]
    pub total_duration_months: Option<u32>,
    #[serde(default)]
    pub max_concurrent_students: Option<u32>,
    #[serde(default)]
    pub break_days_between_rotations: Option<u32>,
    #[serde(default)]
    pub is_active: Option<bool>,
}
