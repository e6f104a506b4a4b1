//! Session lifecycle and ensemble transport.
//!
//! - [`ConnectionManager`] owns one logical session and fails it over between
//!   ensemble members
//! - [`Session`] and [`SessionState`] describe that session
//! - typed node requests live in `requests.rs`

mod manager;
mod requests;
mod session;

pub use manager::*;
pub use session::*;
