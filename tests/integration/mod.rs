//! Integration tests for the production orchestration core

mod config;
mod end_to_end;
mod feedback;
mod pipeline;
mod render_jobs;
mod support;
