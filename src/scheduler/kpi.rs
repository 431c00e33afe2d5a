//! Planning efficiency indicators.
//!
//! Computes occupancy and balance indicators from the rotations of a
//! promotion. Reporting only: nothing here feeds back into generation.
//!
//! # Metrics
//!
//! | Metric | Definition |
//! |--------|-----------|
//! | Window | Earliest start to latest end, both included |
//! | Utilization | Assigned days / (capacity * window days) |
//! | Active days | Days with at least one student on the service |
//! | Mean occupancy | Assigned days / active days |
//! | Occupation rate | Mean occupancy / capacity |
//! | Idle days | Days between a student's consecutive rotations |
//! | Balance | [`BalanceMetric`] over per-service utilization |

use std::fmt::Debug;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::PlanningSettings;
use crate::models::{span_days, Rotation, Service};

/// Scores how evenly load is spread across services.
///
/// # Score Convention
/// **Lower score = better balance.** 0.0 means every service carries the
/// same load.
pub trait BalanceMetric: Send + Sync + Debug {
    /// Metric name (e.g., "CV").
    fn name(&self) -> &'static str;

    /// Scores a set of per-service loads.
    fn score(&self, loads: &[f64]) -> f64;
}

/// Coefficient of variation: population standard deviation over mean.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoefficientOfVariation;

impl BalanceMetric for CoefficientOfVariation {
    fn name(&self) -> &'static str {
        "CV"
    }

    fn score(&self, loads: &[f64]) -> f64 {
        if loads.is_empty() {
            return 0.0;
        }
        let n = loads.len() as f64;
        let mean = loads.iter().sum::<f64>() / n;
        if mean <= 0.0 {
            return 0.0;
        }
        let variance = loads.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        variance.sqrt() / mean
    }
}

/// Spread between the busiest and the idlest service, over the mean.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxMinSpread;

impl BalanceMetric for MaxMinSpread {
    fn name(&self) -> &'static str {
        "MaxMin"
    }

    fn score(&self, loads: &[f64]) -> f64 {
        if loads.is_empty() {
            return 0.0;
        }
        let mean = loads.iter().sum::<f64>() / loads.len() as f64;
        if mean <= 0.0 {
            return 0.0;
        }
        let max = loads.iter().copied().fold(f64::MIN, f64::max);
        let min = loads.iter().copied().fold(f64::MAX, f64::min);
        (max - min) / mean
    }
}

/// Occupancy of one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceUsage {
    pub service_id: String,
    pub service_name: String,
    /// Effective capacity.
    pub capacity: u32,
    pub rotations: usize,
    /// Sum of rotation spans.
    pub assigned_days: i64,
    pub active_days: i64,
    pub mean_occupancy: f64,
    /// Mean occupancy over capacity (0.0..1.0).
    pub occupation_rate: f64,
    /// Assigned days over seat-days in the window (0.0..1.0).
    pub utilization: f64,
}

/// Load of one student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentLoad {
    pub student_id: String,
    pub rotations: usize,
    pub assigned_days: i64,
    /// Days between consecutive rotations, summed.
    pub idle_days: i64,
}

/// Efficiency indicators of a set of rotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyReport {
    pub date_debut: Option<NaiveDate>,
    pub date_fin: Option<NaiveDate>,
    /// Window length in days, 0 when there is no rotation.
    pub duree_totale_jours: i64,
    pub nb_rotations: usize,
    /// One entry per service, in catalog order.
    pub services: Vec<ServiceUsage>,
    /// One entry per student, by id.
    pub students: Vec<StudentLoad>,
    /// Mean utilization across services.
    pub avg_utilization: f64,
    pub balance_metric: String,
    pub balance_score: f64,
}

impl EfficiencyReport {
    /// Computes indicators with the default balance metric.
    pub fn calculate(rotations: &[&Rotation], services: &[Service], settings: &PlanningSettings) -> Self {
        Self::calculate_with(rotations, services, settings, &CoefficientOfVariation)
    }

    /// Computes indicators with a custom balance metric.
    pub fn calculate_with(
        rotations: &[&Rotation],
        services: &[Service],
        settings: &PlanningSettings,
        metric: &dyn BalanceMetric,
    ) -> Self {
        let start = rotations.iter().map(|r| r.date_debut).min();
        let end = rotations.iter().map(|r| r.date_fin).max();
        let window = match (start, end) {
            (Some(s), Some(e)) => span_days(s, e),
            _ => 0,
        };

        let usage: Vec<ServiceUsage> = services
            .iter()
            .map(|service| {
                let hosted: Vec<&Rotation> = rotations
                    .iter()
                    .copied()
                    .filter(|r| r.service_id == service.id)
                    .collect();
                service_usage(service, &hosted, settings.effective_capacity(service.places_disponibles), window)
            })
            .collect();

        let mut student_ids: Vec<&str> = rotations.iter().map(|r| r.student_id.as_str()).collect();
        student_ids.sort_unstable();
        student_ids.dedup();
        let students = student_ids
            .into_iter()
            .map(|id| {
                let mine: Vec<&Rotation> = rotations
                    .iter()
                    .copied()
                    .filter(|r| r.student_id == id)
                    .collect();
                student_load(id, mine)
            })
            .collect();

        let utilizations: Vec<f64> = usage.iter().map(|u| u.utilization).collect();
        let avg_utilization = if utilizations.is_empty() {
            0.0
        } else {
            utilizations.iter().sum::<f64>() / utilizations.len() as f64
        };

        Self {
            date_debut: start,
            date_fin: end,
            duree_totale_jours: window,
            nb_rotations: rotations.len(),
            services: usage,
            students,
            avg_utilization,
            balance_metric: metric.name().to_string(),
            balance_score: metric.score(&utilizations),
        }
    }

    /// Usage of one service.
    pub fn service(&self, service_id: &str) -> Option<&ServiceUsage> {
        self.services.iter().find(|u| u.service_id == service_id)
    }
}

fn service_usage(service: &Service, hosted: &[&Rotation], capacity: u32, window: i64) -> ServiceUsage {
    let assigned_days: i64 = hosted.iter().map(|r| r.span_days()).sum();
    let active_days = covered_days(hosted);

    let mean_occupancy = if active_days > 0 {
        assigned_days as f64 / active_days as f64
    } else {
        0.0
    };
    let occupation_rate = if capacity > 0 {
        mean_occupancy / f64::from(capacity)
    } else {
        0.0
    };
    let seat_days = i64::from(capacity) * window;
    let utilization = if seat_days > 0 {
        assigned_days as f64 / seat_days as f64
    } else {
        0.0
    };

    ServiceUsage {
        service_id: service.id.clone(),
        service_name: service.name.clone(),
        capacity,
        rotations: hosted.len(),
        assigned_days,
        active_days,
        mean_occupancy,
        occupation_rate,
        utilization,
    }
}

/// Days covered by the union of the rotations' ranges.
fn covered_days(rotations: &[&Rotation]) -> i64 {
    let mut ranges: Vec<(NaiveDate, NaiveDate)> =
        rotations.iter().map(|r| (r.date_debut, r.date_fin)).collect();
    ranges.sort();

    let mut total = 0;
    let mut current: Option<(NaiveDate, NaiveDate)> = None;
    for (s, e) in ranges {
        current = match current {
            Some((cs, ce)) if s <= ce => Some((cs, ce.max(e))),
            Some((cs, ce)) => {
                total += span_days(cs, ce);
                Some((s, e))
            }
            None => Some((s, e)),
        };
    }
    if let Some((cs, ce)) = current {
        total += span_days(cs, ce);
    }
    total
}

fn student_load(student_id: &str, mut rotations: Vec<&Rotation>) -> StudentLoad {
    rotations.sort_by_key(|r| r.date_debut);
    let idle_days = rotations
        .windows(2)
        .map(|w| w[0].gap_days(w[1]).unwrap_or(0).max(0))
        .sum();

    StudentLoad {
        student_id: student_id.to_string(),
        rotations: rotations.len(),
        assigned_days: rotations.iter().map(|r| r.span_days()).sum(),
        idle_days,
    }
}
