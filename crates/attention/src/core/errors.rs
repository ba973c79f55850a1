//! Error types emitted by attention strategies.

use thiserror::Error;

/// Attention-specific error category.
#[derive(Debug, Error)]
pub enum AttentionError {
    /// A strategy tag outside the supported set.
    #[error("unknown attention strategy `{tag}`; expected one of {expected}")]
    UnknownStrategy { tag: String, expected: String },
    /// A construction parameter is out of range.
    #[error("invalid attention configuration: {0}")]
    InvalidConfig(String),
    /// The supplied tensor shapes do not align with the documented contract.
    #[error("invalid tensor shape for {context}")]
    InvalidShape { context: String },
    /// A backend failure propagated to the caller unchanged.
    #[error(transparent)]
    Backend(#[from] candle_core::Error),
}
