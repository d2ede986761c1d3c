//! Umbrella crate for the anti-cheat workspace.
//!
//! Re-exports the packet boundary types (`protocol`) and the detection
//! engine (`guard`) so the cross-crate integration tests under `tests/`
//! can reach both through a single dependency.

pub use guard;
pub use protocol;
