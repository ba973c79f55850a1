//! Core traits and types shared across attention strategies.
//!
//! Implementations are expected to operate on tensors with layout
//! `[batch, n_heads, seq_len, head_dim]` and to leave the mask semantics of
//! [`crate::masks`] intact: `1` blocks a pair, `0` allows it.

pub mod config;
pub mod errors;
pub mod kind;

use candle_core::{Device, Tensor};

pub use config::Config;
pub use errors::AttentionError;
pub use kind::AttentionKind;

/// Context and weights produced by one strategy call.
#[derive(Debug, Clone)]
pub struct AttentionOutput {
    /// `[batch, n_heads, q_len, v_dim]`
    pub context: Tensor,
    /// Per-head weights. Shape is strategy specific; softmax-style strategies
    /// return `[batch, n_heads, q_len, k_len]`.
    pub weights: Tensor,
}

/// Everything a strategy may need at construction time.
#[derive(Debug, Clone)]
pub struct StrategyParams {
    pub heads: usize,
    pub head_dim: usize,
    pub device: Device,
    pub seed: u64,
    pub config: Config,
}

/// Unified interface for attention strategies.
///
/// * `q` is `[batch, n_heads, q_len, head_dim]`, `k` is
///   `[batch, n_heads, k_len, head_dim]`, `v` is `[batch, n_heads, k_len, v_dim]`.
/// * `mask`, when present, is a `u8` tensor shaped `[batch, n_heads, q_len, k_len]`.
/// * The returned context is always `[batch, n_heads, q_len, v_dim]`.
pub trait AttentionStrategy: Send + Sync + std::fmt::Debug {
    /// Tag this strategy was built from.
    fn kind(&self) -> AttentionKind;

    fn attend(
        &self,
        q: &Tensor,
        k: &Tensor,
        v: &Tensor,
        mask: Option<&Tensor>,
    ) -> Result<AttentionOutput, AttentionError>;
}
