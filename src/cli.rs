//! CLI domain: parse and route only. Inspects inputs and history; never renders.

mod parse;
mod route;

pub use parse::{Cli, Commands};
pub use route::RunContext;
