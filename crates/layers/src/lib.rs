//! Building blocks for the forecasting transformer.
//!
//! Every layer consumes and produces `f32` tensors. Sequence layers follow the
//! `(batch, seq, hidden)` convention; convolutional layers follow the
//! channel-first `(batch, channels, seq)` convention. Learned parameters are
//! stored as [`candle_core::Var`] so an external harness can update them in
//! place, and every random initialisation draws from a caller supplied
//! [`TensorRng`].

pub mod activations;
pub mod checks;
pub mod conv;
pub mod linear;
pub mod mlp;
pub mod norm;
pub mod rng;

pub use activations::ActivationKind;
pub use conv::{Conv1d, Conv1dConfig};
pub use linear::{Linear, LinearConfig, LinearInit};
pub use mlp::{FeedForwardConfig, PoswiseFeedForward};
pub use norm::{BatchNorm1d, LayerNorm, NormConfig, NormalizationLayer};
pub use rng::TensorRng;
