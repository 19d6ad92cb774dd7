//! Simulated visitor runtime split into smaller files for readability.
//! - config.rs: VisitorConfig and HumanizeConfig
//! - visitor.rs: the visitor itself and its cognitive phases
//! - humanize.rs: human-noise action substitution
//! - cadence.rs: background timer for the slow phases
//! - session.rs: the step loop and the run record

mod cadence;
mod config;
pub mod humanize;
mod session;
mod visitor;

// Public re-exports so external code keeps using crate::agent::{Visitor, Session}
pub use cadence::CadenceTask;
pub use config::{HumanizeConfig, VisitorConfig};
pub use session::{ObservationDigest, RunRecord, Session, TimingMetrics};
pub use visitor::{PlanState, Visitor};
