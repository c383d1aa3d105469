// src/handlers/mod.rs

pub mod auth;
pub mod pools;
pub mod sessions;
pub mod stats;
