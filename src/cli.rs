//! CLI domain: parse, route and presentation only.

mod parse;
mod presentation;
mod route;

pub use parse::{Cli, Commands};
pub use presentation::{format_info, format_list};
pub use route::RunContext;
