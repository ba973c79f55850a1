//! Encoder-decoder transformer for time-series forecasting.
//!
//! [`Transformer`] embeds encoder and decoder inputs, runs them through the
//! attention stacks selected by [`TransformerConfig::attn_type`], optionally
//! routes the decoder states through the stochastic [`process::ProcessModel`]
//! and projects the last `pred_len` steps to a single output channel.

pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod transformer;

pub use config::TransformerConfig;
pub use decoder::{Decoder, DecoderLayer, DecoderLayerWeights};
pub use encoder::{Encoder, EncoderLayer};
pub use error::ModelError;
pub use transformer::{AttentionTrace, Forecast, Transformer};
