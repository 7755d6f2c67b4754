//! Live-server test support
//!
//! Tests in this crate that talk to a real SSH server are `#[ignore]`d and
//! read their targets from the environment.

pub mod env;

pub use env::*;
