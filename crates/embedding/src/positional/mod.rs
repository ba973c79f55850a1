//! Positional signals for `(batch, seq, hidden)` sequences.

pub mod sinusoidal;
