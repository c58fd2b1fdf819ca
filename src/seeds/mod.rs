//! Sample data seeding
//!
//! Populates an empty service with the records the dashboard demo starts with.

pub mod sample_data;

pub use sample_data::{SeedReport, seed_sample_data};
