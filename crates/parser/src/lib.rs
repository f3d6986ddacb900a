// parser crate

pub mod schema;
pub mod workflow;

pub use workflow::{parse_str, parse_workflow, ParseError};
