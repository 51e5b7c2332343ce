//! Core traits for the change-token retry system
//!
//! - [`ChangeTokenSource`]: fetch a fresh single-use change token

pub mod token_source;

pub use token_source::{ChangeToken, ChangeTokenSource};
