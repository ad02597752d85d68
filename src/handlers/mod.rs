//! HTTP handlers for the Pokemon routes.

pub mod pokemon;
pub use pokemon::*;
