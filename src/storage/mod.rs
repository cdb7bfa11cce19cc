//! Durable job storage

pub mod database;

pub use database::{JobPatch, JobStore};
