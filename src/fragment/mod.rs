//! Push-side fragmentation of messages into frames.
//!
//! The inverse lives in [`crate::message_assembler`].

pub mod fragmenter;

pub use fragmenter::Fragmenter;

#[cfg(test)]
mod tests;
