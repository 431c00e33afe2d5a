//! Speciality model.
//!
//! A speciality (e.g. pharmacy, dentistry) groups services and promotions and
//! fixes how many academic years a promotion lasts.

use serde::{Deserialize, Serialize};

/// Years a promotion lasts when it has no speciality.
pub const DEFAULT_DURATION_YEARS: u32 = 3;

/// An academic speciality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Speciality {
    /// Unique speciality identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Number of academic years (typically 3, 4 or 5).
    pub duration_years: u32,
}

impl Speciality {
    /// Creates a speciality lasting [`DEFAULT_DURATION_YEARS`].
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            duration_years: DEFAULT_DURATION_YEARS,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the duration in years.
    pub fn with_duration_years(mut self, years: u32) -> Self {
        self.duration_years = years;
        self
    }
}
