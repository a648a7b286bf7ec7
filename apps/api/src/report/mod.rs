//! Review artifacts: the PDF report and the email that carries it.

pub mod builder;
pub mod email;

pub use builder::build_report;
