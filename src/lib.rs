//! # School Ops Library
//!
//! Core of the school equipment deployment dashboard: entity models,
//! in-memory repositories with an audit trail, the search and filter engine,
//! and dashboard statistics.

#[macro_use]
pub mod models;

pub mod adapters;
pub mod clock;
pub mod config;
pub mod error;
pub mod query;
pub mod repositories;
pub mod seeds;
pub mod service;
pub mod stats;
pub mod telemetry;
