// src/engine/mod.rs

//! Adaptive question selection, priority scoring and answer grading.
//!
//! Everything here is synchronous and free of I/O; handlers load the data
//! from the store first and call into these functions afterwards.

pub mod grading;
pub mod report;
pub mod scoring;
pub mod selection;
