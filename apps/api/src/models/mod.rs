pub mod cv;
pub mod review;
pub mod session;
