//! Log-sparse attention (LogTrans).
//!
//! Each query only scores keys at distance zero or a power of two from its
//! aligned position, so the per-query receptive field grows logarithmically.
//! The caller mask is applied on top of the sparsity pattern.

use candle_core::Tensor;

use super::{scaled_scores, softmax_attend, validate_inputs};
use crate::core::{AttentionError, AttentionKind, AttentionOutput, AttentionStrategy};
use crate::masks::{build_log_sparse_mask, fill_masked, union};

#[derive(Debug, Clone)]
pub struct LogSparse {
    mask_fill: f64,
}

impl LogSparse {
    pub fn new(mask_fill: f64) -> Self {
        Self { mask_fill }
    }
}

impl AttentionStrategy for LogSparse {
    fn kind(&self) -> AttentionKind {
        AttentionKind::LogSparse
    }

    fn attend(
        &self,
        q: &Tensor,
        k: &Tensor,
        v: &Tensor,
        mask: Option<&Tensor>,
    ) -> Result<AttentionOutput, AttentionError> {
        let dims = validate_inputs(q, k, v, mask)?;
        let pattern = build_log_sparse_mask(q.device(), dims.q_len, dims.k_len)?;
        let combined = match mask {
            Some(mask) => union(mask, &pattern)?,
            None => pattern
                .reshape((1, 1, dims.q_len, dims.k_len))?
                .broadcast_as((dims.batch, dims.heads, dims.q_len, dims.k_len))?
                .contiguous()?,
        };
        let scores = scaled_scores(q, k, dims.head_dim)?;
        let scores = fill_masked(&scores, Some(&combined), self.mask_fill)?;
        Ok(softmax_attend(&scores, v)?)
    }
}
