pub mod gate;
pub mod models;

pub use gate::{evaluate, worst_case_loss, RiskGate};
pub use models::*;
