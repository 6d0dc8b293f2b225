//! Translate serialized kernel fuzzing programs into standalone C reproducers.
//!
//! A program is serialized into the compact exec encoding consumed by syz-executor,
//! decoded back into a per-call instruction list and rendered as C source that needs
//! no fuzzing engine at runtime, see [`csource::write`].
#[macro_use]
extern crate lazy_static;

#[macro_use]
pub mod utils;
pub mod csource;
pub mod exec;
pub mod targets;
