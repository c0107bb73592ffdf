//! Keygate - Per-Key Request Admission Control
//!
//! This crate decides whether a new event attributed to a key (a user, a
//! client identifier) is currently permitted, records admitted events, and
//! reports how long a caller must wait before its next event is permitted.
//! Two interchangeable strategies are provided: sliding-window counting and
//! fixed-interval throttling, both behind the [`ratelimit::AdmissionControl`]
//! trait.

pub mod clock;
pub mod config;
pub mod error;
pub mod ratelimit;
