//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.

mod fake_spotify;
mod fixtures;

#[allow(unused_imports)]
pub use fake_spotify::{FakeSpotify, TOKEN_CALL};
#[allow(unused_imports)]
pub use fixtures::*;
