//! Shared types for the metadata server: the `Status`/`Result` error model,
//! status-code tables, and strongly typed ids.

#[allow(non_snake_case)]
pub mod status_code;

pub mod status;

#[macro_use]
pub mod strong_type;

pub mod ids;

pub use ids::*;
pub use status::{make_error, make_error_msg, Result, Status};
pub use status_code::*;
