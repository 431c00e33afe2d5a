//! Internship rotation planning.
//!
//! Assigns the students of a promotion year to a pool of hospital services
//! over a bounded period: each student visits each service once, services
//! never host more students than they have seats, and a student's
//! consecutive rotations are separated by a minimum break.
//!
//! # Modules
//!
//! - **`models`**: Domain types: `Speciality`, `Promotion`, `PromotionYear`,
//!   `Service`, `Student`, `Rotation`, `Planning`, `StudentSchedule`
//! - **`config`**: `PlanningSettings` and its TOML loader
//! - **`constraints`**: Rule evaluation (overlap, break, capacity, order, duration)
//! - **`scheduler`**: Greedy slot scheduler and efficiency indicators
//! - **`validation`**: Input checks and planning audits
//! - **`store`**: Persistence boundary and its in-memory implementation
//! - **`planner`**: Service facade tying the above together
//!
//! # Example
//!
//! ```
//! use chrono::NaiveDate;
//! use u_rotation::models::{Promotion, Service, Student};
//! use u_rotation::{GenerateRequest, MemoryStore, Planner};
//!
//! let planner = Planner::new(MemoryStore::new());
//! planner.add_service(Service::new("S1", "Cardiologie").with_places(2).with_duration_days(14)).unwrap();
//! planner.add_service(Service::new("S2", "Pédiatrie").with_duration_days(14)).unwrap();
//! let years = planner.create_promotion(Promotion::new("P1", "Promo 2025", 2025)).unwrap();
//! planner.assign_year_services(&years[0].id, &["S1".to_string(), "S2".to_string()]).unwrap();
//! planner.add_student(Student::new("E1", "Martin", "Léa", "P1")).unwrap();
//!
//! let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
//! planner.generate(&GenerateRequest::new("P1").with_start_date(start)).unwrap();
//!
//! let rotations = planner.get_student_rotations("E1").unwrap();
//! assert_eq!(rotations.len(), 2);
//! assert!(rotations[1].date_debut > rotations[0].date_fin);
//! ```
//!
//! # References
//!
//! - Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems"
//! - Burke et al. (2004), "The State of the Art of Nurse Rostering"

pub mod config;
pub mod constraints;
pub mod error;
pub mod models;
pub mod planner;
pub mod scheduler;
pub mod store;
pub mod validation;

pub use config::PlanningSettings;
pub use error::{PlanningError, PlanningResult};
pub use planner::{GenerateRequest, GenerationOutcome, Planner};
pub use store::{MemoryStore, PlanningStore};
