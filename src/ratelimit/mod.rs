//! Admission control logic and per-key state management.

mod backend;
mod fixed_interval;
mod sliding_window;

pub use backend::AdmissionControl;
pub use fixed_interval::FixedIntervalLimiter;
pub use sliding_window::SlidingWindowLimiter;
