//! Shared components for unit tests: logger setup and an in-process ensemble
//! serving the coordination service on local ports.
mod common;
mod mock_ensemble;

pub use common::*;
pub use mock_ensemble::*;
