//! Builders for causal ("subsequent") masks.
//!
//! The resulting tensors have dtype [`MASK_DTYPE`](super::MASK_DTYPE) and shape
//! `[batch, q_len, k_len]`. Entries are `1` where the key lies in the query's
//! future and `0` otherwise, so a square mask is strictly upper triangular.

use candle_core::{Device, Result, Tensor};

/// Construct a causal mask for the supplied sequence dimensions.
///
/// When `k_len > q_len`, queries are assumed to align with the most recent
/// `q_len` keys, allowing access to the extended prefix.
pub fn build_subsequent_mask(
    device: &Device,
    batch: usize,
    q_len: usize,
    k_len: usize,
) -> Result<Tensor> {
    let offset = k_len.saturating_sub(q_len);
    let mut row_block = vec![0u8; q_len * k_len];
    for q in 0..q_len {
        let max_k = q + offset;
        for k in (max_k + 1)..k_len {
            row_block[q * k_len + k] = 1;
        }
    }

    let mut data = Vec::with_capacity(batch * row_block.len());
    for _ in 0..batch {
        data.extend_from_slice(&row_block);
    }
    Tensor::from_vec(data, (batch, q_len, k_len), device)
}
