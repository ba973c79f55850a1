//! ACAT: adaptive multi-width smoothed attention.
//!
//! Queries and keys are smoothed with every configured moving-average width.
//! For each `(query, key)` pair the strongest scaled score over the widths is
//! kept, letting every pair pick the temporal resolution at which the two
//! positions agree the most. Masking and softmax then proceed as usual.

use candle_core::Tensor;

use super::{causal_moving_average, scaled_scores, softmax_attend, validate_inputs};
use crate::core::{AttentionError, AttentionKind, AttentionOutput, AttentionStrategy};
use crate::masks::fill_masked;

#[derive(Debug, Clone)]
pub struct Acat {
    kernel_sizes: Vec<usize>,
    mask_fill: f64,
}

impl Acat {
    pub fn new(kernel_sizes: Vec<usize>, mask_fill: f64) -> Self {
        Self {
            kernel_sizes,
            mask_fill,
        }
    }
}

impl AttentionStrategy for Acat {
    fn kind(&self) -> AttentionKind {
        AttentionKind::Acat
    }

    fn attend(
        &self,
        q: &Tensor,
        k: &Tensor,
        v: &Tensor,
        mask: Option<&Tensor>,
    ) -> Result<AttentionOutput, AttentionError> {
        let dims = validate_inputs(q, k, v, mask)?;

        let mut best: Option<Tensor> = None;
        for &kernel in &self.kernel_sizes {
            let q_smooth = causal_moving_average(q, kernel)?;
            let k_smooth = causal_moving_average(k, kernel)?;
            let scores = scaled_scores(&q_smooth, &k_smooth, dims.head_dim)?;
            best = Some(match best {
                Some(current) => current.maximum(&scores)?,
                None => scores,
            });
        }
        let scores = best.ok_or_else(|| {
            AttentionError::InvalidConfig("ACAT requires at least one kernel size".into())
        })?;

        let scores = fill_masked(&scores, mask, self.mask_fill)?;
        Ok(softmax_attend(&scores, v)?)
    }
}
