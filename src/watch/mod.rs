//! Permanent data, child and state listeners.
//!
//! - [`DataListener`], [`ChildListener`], [`StateListener`] - callback traits
//! - the registry turning one-shot server watches into permanent listeners
//!   lives in `registry.rs`

mod listener;
mod registry;

pub use listener::*;
pub use registry::*;
