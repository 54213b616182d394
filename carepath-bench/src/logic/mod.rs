pub mod inputs;
pub mod reports;

pub use inputs::{ModelChoice, NetworkChoice};
pub use reports::ReportFormat;
