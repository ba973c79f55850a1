//! Pluggable attention for the forecasting transformer.
//!
//! Strategies operate on head-split tensors with layout
//! `[batch, n_heads, seq_len, head_dim]`. Queries may be shorter or longer
//! than keys (cross-attention); values share the key length. Every strategy
//! returns a context tensor `[batch, n_heads, q_len, v_dim]` together with its
//! attention weights.
//!
//! Masks are `u8` tensors where `1` marks a disallowed `(query, key)` pair.
//! [`MultiHeadAttention`] accepts `[batch, q_len, k_len]` masks and broadcasts
//! them across heads before dispatching to the configured strategy.
//!
//! The strategy set is closed: [`AttentionKind`] enumerates it and rejects
//! unknown tags when parsed, so a bad configuration fails before any tensor
//! is touched.

pub mod core;
pub mod masks;
pub mod multi_head;
pub mod strategies;

pub use core::{
    AttentionError, AttentionKind, AttentionOutput, AttentionStrategy, Config, StrategyParams,
};
pub use multi_head::{MultiHeadAttention, MultiHeadConfig};
pub use strategies::build_strategy;
