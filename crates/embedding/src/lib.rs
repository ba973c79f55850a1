//! Embedding crate
//!
//! The positional module exposes the fixed sinusoidal position signal added to
//! embedded sequences before the encoder and decoder stacks.

pub mod positional;

pub use positional::sinusoidal::{PositionalEncoding, DEFAULT_MAX_LEN};
