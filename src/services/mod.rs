// src/services/mod.rs

pub mod attempt;
pub mod authoring;
pub mod redaction;
pub mod review;
pub mod scoring;
pub mod store;
