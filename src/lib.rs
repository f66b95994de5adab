//! animatr: production orchestration core
//!
//! Classifies incoming production inputs, drives the authoring stages that turn them into a
//! declarative animation spec, manages render jobs against an external render collaborator,
//! and closes the loop with QA scoring that delivers, routes a revision, or escalates.

pub mod cli;
pub mod config;
pub mod error;
pub mod feedback;
pub mod intake;
pub mod logging;
pub mod pipeline;
pub mod production;
pub mod progress;
pub mod render;
pub mod schema;
