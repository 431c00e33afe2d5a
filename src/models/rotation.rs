//! Rotation model.
//!
//! A rotation places one student in one service over an inclusive range of
//! calendar days. `order` is the 1-based position of the rotation in the
//! student's sequence.
//!
//! # Day arithmetic
//! Both `date_debut` and `date_fin` are included: a 14-day rotation starting
//! on the 1st ends on the 14th. The idle gap between two rotations is
//! `next.date_debut - prev.date_fin - 1` days.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Number of days in the inclusive range `[start, end]`.
#[inline]
pub fn span_days(start: NaiveDate, end: NaiveDate) -> i64 {
    end.signed_duration_since(start).num_days() + 1
}

/// One student's assignment to one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    /// Unique rotation identifier.
    pub id: String,
    /// Assigned student.
    pub student_id: String,
    /// Assigned service.
    pub service_id: String,
    /// First day (inclusive).
    pub date_debut: NaiveDate,
    /// Last day (inclusive).
    pub date_fin: NaiveDate,
    /// Position in the student's sequence, 1-based.
    pub order: u32,
    /// Parent planning.
    pub planning_id: String,
    /// Promotion year the rotation belongs to.
    pub promotion_year_id: String,
    /// Edit counter, bumped on every committed update.
    pub version: u64,
    /// Soft-constraint warnings attached by the last edit.
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl Rotation {
    /// Creates a rotation with a fresh id.
    pub fn new(
        student_id: impl Into<String>,
        service_id: impl Into<String>,
        date_debut: NaiveDate,
        date_fin: NaiveDate,
        order: u32,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            student_id: student_id.into(),
            service_id: service_id.into(),
            date_debut,
            date_fin,
            order,
            planning_id: String::new(),
            promotion_year_id: String::new(),
            version: 0,
            warnings: Vec::new(),
        }
    }

    /// Sets the id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the parent planning and year.
    pub fn in_planning(
        mut self,
        planning_id: impl Into<String>,
        promotion_year_id: impl Into<String>,
    ) -> Self {
        self.planning_id = planning_id.into();
        self.promotion_year_id = promotion_year_id.into();
        self
    }

    /// Length in days, both ends included.
    #[inline]
    pub fn span_days(&self) -> i64 {
        span_days(self.date_debut, self.date_fin)
    }

    /// Whether the two day ranges share at least one day.
    pub fn overlaps(&self, other: &Rotation) -> bool {
        self.date_debut <= other.date_fin && other.date_debut <= self.date_fin
    }

    /// Idle days between this rotation and `other`, whichever comes first.
    ///
    /// Returns `None` when the rotations overlap.
    pub fn gap_days(&self, other: &Rotation) -> Option<i64> {
        if self.overlaps(other) {
            return None;
        }
        let (first, second) = if self.date_debut <= other.date_debut {
            (self, other)
        } else {
            (other, self)
        };
        Some(
            second
                .date_debut
                .signed_duration_since(first.date_fin)
                .num_days()
                - 1,
        )
    }

    /// Whether the rotation covers `day`.
    #[inline]
    pub fn covers(&self, day: NaiveDate) -> bool {
        self.date_debut <= day && day <= self.date_fin
    }

    /// Returns a copy with the patch applied. Identity fields are kept.
    pub fn patched(&self, patch: &RotationPatch) -> Rotation {
        let mut next = self.clone();
        if let Some(ref service_id) = patch.service_id {
            next.service_id = service_id.clone();
        }
        if let Some(start) = patch.date_debut {
            next.date_debut = start;
        }
        if let Some(end) = patch.date_fin {
            next.date_fin = end;
        }
        if let Some(order) = patch.order {
            next.order = order;
        }
        next
    }
}

/// Partial rotation edit. `None` fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RotationPatch {
    #[serde(default)]
    pub service_id: Option<String>,
    #[serde(default)]
    pub date_debut: Option<NaiveDate>,
    #[serde(default)]
    pub date_fin: Option<NaiveDate>,
    #[serde(default)]
    pub order: Option<u32>,
}

impl RotationPatch {
    /// Moves the rotation to new dates.
    pub fn dates(date_debut: NaiveDate, date_fin: NaiveDate) -> Self {
        Self {
            date_debut: Some(date_debut),
            date_fin: Some(date_fin),
            ..Default::default()
        }
    }

    /// Sets the order.
    pub fn with_order(mut self, order: u32) -> Self {
        self.order = Some(order);
        self
    }

    /// Sets the service.
    pub fn with_service(mut self, service_id: impl Into<String>) -> Self {
        self.service_id = Some(service_id.into());
        self
    }

    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.service_id.is_none()
            && self.date_debut.is_none()
            && self.date_fin.is_none()
            && self.order.is_none()
    }
}
