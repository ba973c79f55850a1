//! Mask utilities shared by attention strategies.
//!
//! All masks produced here are `u8` tensors: `1` marks a `(query, key)` pair
//! that must not be attended, `0` a permitted one. Stack-level masks are
//! shaped `[batch, q_len, k_len]`; [`broadcast_to_heads`] expands them to the
//! `[batch, n_heads, q_len, k_len]` layout strategies consume.

pub mod causal;
pub mod log_sparse;

use candle_core::{DType, Result, Tensor};

/// Dtype shared by all masks.
pub const MASK_DTYPE: DType = DType::U8;

pub use causal::build_subsequent_mask;
pub use log_sparse::build_log_sparse_mask;

/// Repeats a `[batch, q_len, k_len]` mask across `num_heads`.
pub fn broadcast_to_heads(mask: &Tensor, num_heads: usize) -> Result<Tensor> {
    let (batch, q_len, k_len) = mask.dims3()?;
    mask.unsqueeze(1)?
        .broadcast_as((batch, num_heads, q_len, k_len))?
        .contiguous()
}

/// Blocks a pair when either mask blocks it. Shapes must broadcast.
pub fn union(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    a.broadcast_maximum(b)
}

/// Writes `fill` into `scores` wherever `mask` blocks the pair.
pub fn fill_masked(scores: &Tensor, mask: Option<&Tensor>, fill: f64) -> Result<Tensor> {
    match mask {
        None => Ok(scores.clone()),
        Some(mask) => {
            let mask = mask.broadcast_as(scores.shape().clone())?;
            let filled = Tensor::full(fill as f32, scores.shape().clone(), scores.device())?;
            mask.where_cond(&filled, scores)
        }
    }
}
