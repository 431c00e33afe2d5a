//! Student model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A student enrolled in a promotion.
///
/// Inactive students keep their history but are left out of scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    /// Unique student identifier.
    pub id: String,
    /// Family name.
    pub nom: String,
    /// Given name.
    pub prenom: String,
    /// Parent promotion.
    pub promotion_id: String,
    /// Whether the student takes part in scheduling.
    pub is_active: bool,
    /// Creation timestamp. Scheduling order follows it.
    pub created_at: DateTime<Utc>,
}

impl Student {
    /// Creates an active student.
    pub fn new(
        id: impl Into<String>,
        nom: impl Into<String>,
        prenom: impl Into<String>,
        promotion_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            nom: nom.into(),
            prenom: prenom.into(),
            promotion_id: promotion_id.into(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// Marks the student inactive.
    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Overrides the creation timestamp.
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    /// "Prénom Nom".
    pub fn full_name(&self) -> String {
        format!("{} {}", self.prenom, self.nom)
    }
}
