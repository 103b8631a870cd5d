//! Game rules, expressed as operations on [`crate::AppState`].

pub mod admin;
pub mod evaluator;
pub mod gate;
pub mod ledger;
pub mod scheduler;

pub use evaluator::EliminationReport;
pub use gate::{CurrentPhrase, WindowState};
pub use scheduler::RolloverReport;
