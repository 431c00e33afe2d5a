//! Rotation planning domain models.
//!
//! Provides the entities the scheduler and the constraint engine operate on.
//!
//! # Domain Mappings
//!
//! | u-rotation | Scheduling term | Original UI |
//! |------------|-----------------|-------------|
//! | Student | Job | Étudiant |
//! | Service | Resource (capacity > 1) | Service |
//! | Rotation | Assignment | Rotation |
//! | Planning | Schedule | Planning |
//! | PromotionYear | Scheduling scope | Année de promotion |

mod planning;
mod promotion;
mod rotation;
mod schedule;
mod service;
mod speciality;
mod student;

pub use planning::Planning;
pub use promotion::{Promotion, PromotionYear};
pub use rotation::{span_days, Rotation, RotationPatch};
pub use schedule::{
    DetailStatus, ScheduleDetail, ScheduleProgress, ScheduleStatus, ScheduleSummary, StatusUpdate,
    StudentSchedule,
};
pub use service::Service;
pub use speciality::{Speciality, DEFAULT_DURATION_YEARS};
pub use student::Student;
