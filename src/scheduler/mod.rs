//! Rotation scheduling and efficiency evaluation.
//!
//! # Algorithm
//!
//! `RotationScheduler` is a greedy round-robin over fixed slot lanes, one
//! lane per service. It is not optimal, but deterministic, fast, and free
//! of hard-rule violations by construction.
//!
//! # KPI
//!
//! `EfficiencyReport` computes occupancy per service, idle time per
//! student, and a replaceable balance score.
//!
//! # References
//!
//! - Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems", Ch. 3-4
//! - Burke et al. (2004), "The State of the Art of Nurse Rostering"

mod kpi;
mod rotation;

pub use kpi::{
    BalanceMetric, CoefficientOfVariation, EfficiencyReport, MaxMinSpread, ServiceUsage,
    StudentLoad,
};
pub use rotation::{PlannedRotation, RotationScheduler, SchedulingScope, ScopePlan};
