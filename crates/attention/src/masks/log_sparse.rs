//! Log-sparse connectivity pattern.
//!
//! A query may only see keys whose distance from its aligned position is zero
//! or a power of two, giving `O(log L)` visible keys per query. Causality is
//! not part of this pattern; combine with a causal mask via
//! [`union`](super::union) when needed.

use candle_core::{Device, Result, Tensor};

/// Builds a `[q_len, k_len]` mask; queries align with the last `q_len` keys
/// when `k_len > q_len`.
pub fn build_log_sparse_mask(device: &Device, q_len: usize, k_len: usize) -> Result<Tensor> {
    let offset = k_len.saturating_sub(q_len);
    let mut data = vec![1u8; q_len * k_len];
    for q in 0..q_len {
        let aligned = q + offset;
        for k in 0..k_len {
            let distance = aligned.abs_diff(k);
            if distance == 0 || distance.is_power_of_two() {
                data[q * k_len + k] = 0;
            }
        }
    }
    Tensor::from_vec(data, (q_len, k_len), device)
}
